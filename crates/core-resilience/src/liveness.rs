//! Liveness handle: probe before use, reconnect at most once
//!
//! A [`LivenessHandle`] owns at most one connection produced by a
//! [`Connector`]. Every [`ensure_live`](LivenessHandle::ensure_live) call
//! checks the connection with a cheap round trip. A failed probe drops the
//! stale connection and triggers exactly one fresh connect. If that connect
//! fails too, the handle is left without a connection so the next call starts
//! from a clean connect instead of re-probing a known-bad handle.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──connect──▶ Connected ──probe ok──▶ Connected
//!                               │
//!                          probe failed
//!                               ▼
//!                          Reconnecting ──ok──▶ Connected
//!                               │
//!                             failed
//!                               ▼
//!                          Disconnected ──next ensure_live──▶ connect
//!
//! any state ──close──▶ Closed (terminal)
//! ```
//!
//! # Example
//!
//! ```
//! use gridlink_core_resilience::{Connector, LivenessHandle, LinkState};
//!
//! struct Loopback;
//!
//! impl Connector for Loopback {
//!     type Conn = u32;
//!     type Error = String;
//!
//!     fn connect(&self) -> Result<u32, String> {
//!         Ok(7)
//!     }
//!
//!     fn probe(&self, _conn: &mut u32) -> Result<(), String> {
//!         Ok(())
//!     }
//!
//!     fn endpoint(&self) -> String {
//!         "loopback".to_string()
//!     }
//! }
//!
//! let mut handle = LivenessHandle::new(Loopback);
//! assert_eq!(*handle.ensure_live().unwrap(), 7);
//! assert_eq!(handle.state(), LinkState::Connected);
//! handle.close();
//! assert!(handle.ensure_live().is_err());
//! ```

use crate::error::ResilienceError;
use std::fmt;
use tracing::{debug, info, warn};

/// Opens, probes and closes connections of one kind
pub trait Connector {
    /// Live connection type
    type Conn;

    /// Error produced by connect and probe
    type Error: fmt::Display;

    /// Open a fresh connection using the original credentials
    fn connect(&self) -> Result<Self::Conn, Self::Error>;

    /// Cheap round trip used only to detect a stale connection
    fn probe(&self, conn: &mut Self::Conn) -> Result<(), Self::Error>;

    /// Release a connection. Errors during release are ignored.
    fn close(&self, conn: Self::Conn) {
        drop(conn);
    }

    /// Human-readable endpoint used in errors and log lines
    fn endpoint(&self) -> String;
}

/// Lifecycle state of a [`LivenessHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No connection has been opened yet
    Uninitialized,
    /// A connection is held and passed its last check
    Connected,
    /// The probe failed and a replacement connection is being opened
    Reconnecting,
    /// The connection was dropped after a failure; next use reconnects
    Disconnected,
    /// Closed explicitly; terminal
    Closed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Uninitialized => write!(f, "uninitialized"),
            LinkState::Connected => write!(f, "connected"),
            LinkState::Reconnecting => write!(f, "reconnecting"),
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Closed => write!(f, "closed"),
        }
    }
}

/// Counters kept by a [`LivenessHandle`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Every call made to [`Connector::connect`]
    pub connect_attempts: u64,
    /// Connect calls that returned a connection
    pub connects: u64,
    /// Probes that failed
    pub probe_failures: u64,
    /// Connect calls made because a probe failed
    pub reconnect_attempts: u64,
    /// Reconnect attempts that succeeded
    pub reconnects: u64,
}

/// Owner of a single probed, self-healing connection
pub struct LivenessHandle<C: Connector> {
    connector: C,
    conn: Option<C::Conn>,
    state: LinkState,
    stats: LinkStats,
}

impl<C: Connector> LivenessHandle<C> {
    /// Create a handle without connecting
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            conn: None,
            state: LinkState::Uninitialized,
            stats: LinkStats::default(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Connection counters
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// The connector this handle opens connections with
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// True if a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Return a connection that just passed a liveness check.
    ///
    /// Opens the first connection lazily. A failed probe leads to exactly one
    /// reconnect; if it fails, the returned error carries both messages.
    pub fn ensure_live(&mut self) -> Result<&mut C::Conn, ResilienceError> {
        match self.state {
            LinkState::Closed => {
                return Err(ResilienceError::Closed {
                    endpoint: self.connector.endpoint(),
                });
            }
            LinkState::Uninitialized | LinkState::Disconnected => self.open()?,
            LinkState::Connected | LinkState::Reconnecting => {
                let probe = match self.conn.as_mut() {
                    Some(conn) => self.connector.probe(conn).map_err(|e| e.to_string()),
                    None => Err("connection handle missing".to_string()),
                };

                if let Err(message) = probe {
                    self.stats.probe_failures += 1;
                    warn!(
                        "Liveness probe to {} failed: {}",
                        self.connector.endpoint(),
                        message
                    );
                    self.reconnect(message)?;
                }
            }
        }

        let endpoint = self.connector.endpoint();
        self.conn
            .as_mut()
            .ok_or_else(|| ResilienceError::ConnectFailed {
                endpoint,
                message: "connection handle missing".to_string(),
            })
    }

    /// Drop the held connection after a failed operation.
    ///
    /// The next [`ensure_live`](Self::ensure_live) opens a fresh connection.
    /// Has no effect on a closed handle.
    pub fn release(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        if let Some(conn) = self.conn.take() {
            debug!("Releasing connection to {}", self.connector.endpoint());
            self.connector.close(conn);
        }
        if self.state != LinkState::Uninitialized {
            self.state = LinkState::Disconnected;
        }
    }

    /// Close the connection and mark the handle unusable. Idempotent.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            info!("Closing connection to {}", self.connector.endpoint());
            self.connector.close(conn);
        }
        self.state = LinkState::Closed;
    }

    fn open(&mut self) -> Result<(), ResilienceError> {
        self.stats.connect_attempts += 1;
        match self.connector.connect() {
            Ok(conn) => {
                self.stats.connects += 1;
                self.conn = Some(conn);
                self.state = LinkState::Connected;
                info!("Connected to {}", self.connector.endpoint());
                Ok(())
            }
            Err(e) => Err(ResilienceError::ConnectFailed {
                endpoint: self.connector.endpoint(),
                message: e.to_string(),
            }),
        }
    }

    fn reconnect(&mut self, probe_message: String) -> Result<(), ResilienceError> {
        self.state = LinkState::Reconnecting;
        if let Some(stale) = self.conn.take() {
            self.connector.close(stale);
        }

        self.stats.connect_attempts += 1;
        self.stats.reconnect_attempts += 1;
        match self.connector.connect() {
            Ok(conn) => {
                self.stats.connects += 1;
                self.stats.reconnects += 1;
                self.conn = Some(conn);
                self.state = LinkState::Connected;
                info!("Reconnected to {}", self.connector.endpoint());
                Ok(())
            }
            Err(e) => {
                self.state = LinkState::Disconnected;
                Err(ResilienceError::ReconnectFailed {
                    endpoint: self.connector.endpoint(),
                    probe: probe_message,
                    reconnect: e.to_string(),
                })
            }
        }
    }
}

impl<C: Connector> Drop for LivenessHandle<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.connector.close(conn);
        }
    }
}

impl<C: Connector> fmt::Debug for LivenessHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LivenessHandle")
            .field("endpoint", &self.connector.endpoint())
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Debug)]
    struct TestConnection {
        id: u32,
    }

    /// Connector whose failures are scripted per call
    #[derive(Default)]
    struct ScriptedConnector {
        next_id: Cell<u32>,
        failing_connects: Cell<u32>,
        failing_probes: Cell<u32>,
        closed: Rc<Cell<u32>>,
    }

    impl Connector for ScriptedConnector {
        type Conn = TestConnection;
        type Error = String;

        fn connect(&self) -> Result<TestConnection, String> {
            if self.failing_connects.get() > 0 {
                self.failing_connects.set(self.failing_connects.get() - 1);
                return Err("connection refused".to_string());
            }
            self.next_id.set(self.next_id.get() + 1);
            Ok(TestConnection {
                id: self.next_id.get(),
            })
        }

        fn probe(&self, _conn: &mut TestConnection) -> Result<(), String> {
            if self.failing_probes.get() > 0 {
                self.failing_probes.set(self.failing_probes.get() - 1);
                return Err("broken pipe".to_string());
            }
            Ok(())
        }

        fn close(&self, _conn: TestConnection) {
            self.closed.set(self.closed.get() + 1);
        }

        fn endpoint(&self) -> String {
            "test:1247".to_string()
        }
    }

    #[test]
    fn test_lazy_first_connect() {
        let mut handle = LivenessHandle::new(ScriptedConnector::default());
        assert_eq!(handle.state(), LinkState::Uninitialized);
        assert!(!handle.is_connected());

        let conn = handle.ensure_live().unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(handle.state(), LinkState::Connected);
        assert_eq!(handle.stats().connects, 1);
    }

    #[test]
    fn test_healthy_connection_is_reused() {
        let mut handle = LivenessHandle::new(ScriptedConnector::default());
        handle.ensure_live().unwrap();
        let conn = handle.ensure_live().unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(handle.stats().connect_attempts, 1);
    }

    #[test]
    fn test_probe_failure_reconnects_once() {
        let connector = ScriptedConnector::default();
        let closed = connector.closed.clone();
        let mut handle = LivenessHandle::new(connector);
        handle.ensure_live().unwrap();

        handle.connector().failing_probes.set(1);
        let conn = handle.ensure_live().unwrap();
        assert_eq!(conn.id, 2);

        let stats = handle.stats();
        assert_eq!(stats.probe_failures, 1);
        assert_eq!(stats.reconnect_attempts, 1);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(closed.get(), 1, "stale connection should be closed");

        // The replacement is healthy: no further reconnects
        handle.ensure_live().unwrap();
        assert_eq!(handle.stats().reconnect_attempts, 1);
    }

    #[test]
    fn test_reconnect_failure_reports_both_messages() {
        let mut handle = LivenessHandle::new(ScriptedConnector::default());
        handle.ensure_live().unwrap();

        handle.connector().failing_probes.set(1);
        handle.connector().failing_connects.set(1);
        let err = handle.ensure_live().unwrap_err();

        match err {
            ResilienceError::ReconnectFailed {
                probe, reconnect, ..
            } => {
                assert_eq!(probe, "broken pipe");
                assert_eq!(reconnect, "connection refused");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(handle.state(), LinkState::Disconnected);
        assert!(!handle.is_connected());
        assert_eq!(handle.stats().reconnect_attempts, 1);
    }

    #[test]
    fn test_disconnected_handle_connects_fresh_without_probe() {
        let mut handle = LivenessHandle::new(ScriptedConnector::default());
        handle.ensure_live().unwrap();
        handle.connector().failing_probes.set(1);
        handle.connector().failing_connects.set(1);
        assert!(handle.ensure_live().is_err());

        let conn = handle.ensure_live().unwrap();
        assert_eq!(conn.id, 2);
        let stats = handle.stats();
        assert_eq!(stats.probe_failures, 1);
        assert_eq!(stats.connect_attempts, 3);
        assert_eq!(stats.reconnect_attempts, 1);
    }

    #[test]
    fn test_initial_connect_failure() {
        let connector = ScriptedConnector::default();
        connector.failing_connects.set(1);
        let mut handle = LivenessHandle::new(connector);

        let err = handle.ensure_live().unwrap_err();
        assert!(matches!(err, ResilienceError::ConnectFailed { .. }));
        assert_eq!(handle.state(), LinkState::Uninitialized);

        assert!(handle.ensure_live().is_ok());
    }

    #[test]
    fn test_close_is_idempotent_and_terminal() {
        let connector = ScriptedConnector::default();
        let closed = connector.closed.clone();
        let mut handle = LivenessHandle::new(connector);
        handle.ensure_live().unwrap();

        handle.close();
        assert_eq!(handle.state(), LinkState::Closed);
        handle.close();
        assert_eq!(handle.state(), LinkState::Closed);
        assert_eq!(closed.get(), 1);

        let err = handle.ensure_live().unwrap_err();
        assert!(err.is_closed());
        assert_eq!(handle.stats().connect_attempts, 1);
    }

    #[test]
    fn test_release_forces_fresh_connect() {
        let mut handle = LivenessHandle::new(ScriptedConnector::default());
        handle.ensure_live().unwrap();
        handle.release();
        assert_eq!(handle.state(), LinkState::Disconnected);

        let conn = handle.ensure_live().unwrap();
        assert_eq!(conn.id, 2);
        assert_eq!(handle.stats().probe_failures, 0);
    }

    #[test]
    fn test_release_after_close_stays_closed() {
        let mut handle = LivenessHandle::new(ScriptedConnector::default());
        handle.close();
        handle.release();
        assert_eq!(handle.state(), LinkState::Closed);
    }
}
