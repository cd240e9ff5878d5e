/*!
 * Resilient session proxy
 *
 * A [`Session`] owns one remote connection for one account. Every operation
 * goes through [`Session::with_session`], which confirms the connection is
 * live first (probe, then at most one reconnect) and attributes any failure
 * to the acting component.
 *
 * # Example
 *
 * ```
 * use gridlink::backend::MemoryDriver;
 * use gridlink::config::Account;
 * use gridlink::session::Session;
 * use std::sync::Arc;
 *
 * let driver = MemoryDriver::new();
 * driver.add_file("/data/run.log", b"ok");
 *
 * let mut session = Session::new(Arc::new(driver.clone()), Account::default());
 * let size = session
 *     .with_session("stat", |fs| Ok(fs.stat("/data/run.log")?.size))
 *     .unwrap();
 * assert_eq!(size, 2);
 *
 * // The connection broke behind our back: the next call reconnects once.
 * driver.kill_transport();
 * assert!(session.with_session("stat", |fs| Ok(fs.stat("/data")?)).is_ok());
 * assert_eq!(session.stats().reconnects, 1);
 *
 * session.close();
 * session.close();
 * ```
 */

use gridlink_core_resilience::{Connector, LinkState, LinkStats, LivenessHandle};
use std::sync::Arc;
use tracing::debug;

use crate::backend::{path, Driver, DriverError, RemoteFs};
use crate::config::Account;
use crate::error::{GridError, Result};

/// Opens driver connections with one account's original credentials
pub struct DriverConnector {
    driver: Arc<dyn Driver>,
    account: Account,
}

impl DriverConnector {
    pub fn new(driver: Arc<dyn Driver>, account: Account) -> Self {
        Self { driver, account }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }
}

impl Connector for DriverConnector {
    type Conn = Box<dyn RemoteFs>;
    type Error = DriverError;

    fn connect(&self) -> std::result::Result<Self::Conn, Self::Error> {
        self.driver.connect(&self.account)
    }

    fn probe(&self, conn: &mut Self::Conn) -> std::result::Result<(), Self::Error> {
        conn.probe()
    }

    fn close(&self, mut conn: Self::Conn) {
        if let Err(e) = conn.close() {
            debug!("Ignoring error while closing {}: {}", self.endpoint(), e);
        }
    }

    fn endpoint(&self) -> String {
        format!("{} ({})", self.account.endpoint(), self.driver.name())
    }
}

/// Authenticated, self-healing handle to a remote file system
#[derive(Debug)]
pub struct Session {
    handle: LivenessHandle<DriverConnector>,
}

impl Session {
    /// Create a session; the first connection is opened on first use
    pub fn new(driver: Arc<dyn Driver>, account: Account) -> Self {
        Self {
            handle: LivenessHandle::new(DriverConnector::new(driver, account)),
        }
    }

    /// Create a session and open its connection right away
    pub fn connect(driver: Arc<dyn Driver>, account: Account) -> Result<Self> {
        let mut session = Self::new(driver, account);
        session.ensure_live()?;
        Ok(session)
    }

    /// Return a connection that just passed a liveness probe.
    ///
    /// A failed probe leads to exactly one reconnect with the original
    /// credentials. If that fails as well the error carries both messages
    /// and the session is left disconnected.
    pub fn ensure_live(&mut self) -> Result<&mut dyn RemoteFs> {
        let conn = self.handle.ensure_live()?;
        Ok(conn.as_mut())
    }

    /// Run `op` against a live connection.
    ///
    /// Validation errors from `op` pass through unchanged. Any other failure
    /// releases the connection, and driver failures come back as
    /// [`GridError::Operation`] naming `component`.
    pub fn with_session<T, F>(&mut self, component: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn RemoteFs) -> Result<T>,
    {
        let conn = self.ensure_live()?;
        match op(conn) {
            Ok(value) => Ok(value),
            Err(GridError::Validation(message)) => Err(GridError::Validation(message)),
            Err(err) => {
                debug!("{} failed, releasing connection: {}", component, err);
                self.handle.release();
                Err(attribute(component, err))
            }
        }
    }

    /// Release the connection and mark the session closed. Idempotent.
    pub fn close(&mut self) {
        self.handle.close();
    }

    pub fn state(&self) -> LinkState {
        self.handle.state()
    }

    pub fn stats(&self) -> LinkStats {
        self.handle.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.state() == LinkState::Closed
    }

    pub fn account(&self) -> &Account {
        self.handle.connector().account()
    }

    pub fn driver_name(&self) -> &str {
        self.handle.connector().driver_name()
    }

    /// Home collection of the account
    pub fn home(&self) -> &str {
        &self.account().home
    }

    /// Resolve a possibly relative remote path against the home collection
    pub fn resolve(&self, remote: &str) -> String {
        path::resolve(self.home(), remote)
    }
}

fn attribute(component: &str, err: GridError) -> GridError {
    match err {
        GridError::Driver(source) => GridError::Operation {
            component: component.to_string(),
            source,
        },
        GridError::Io(e) => GridError::Operation {
            component: component.to_string(),
            source: DriverError::Io(e),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDriver;
    use crate::logging::init_test_logging;

    fn session(driver: &MemoryDriver) -> Session {
        Session::new(Arc::new(driver.clone()), Account::default())
    }

    #[test]
    fn test_lazy_connect() {
        let driver = MemoryDriver::new();
        let mut session = session(&driver);
        assert_eq!(session.state(), LinkState::Uninitialized);
        assert_eq!(driver.connect_attempts(), 0);

        session.ensure_live().unwrap();
        assert_eq!(session.state(), LinkState::Connected);
        assert_eq!(driver.connect_attempts(), 1);
    }

    #[test]
    fn test_connect_is_eager() {
        let driver = MemoryDriver::new();
        let session = Session::connect(Arc::new(driver.clone()), Account::default()).unwrap();
        assert_eq!(session.state(), LinkState::Connected);

        driver.set_unreachable(true);
        let err = Session::connect(Arc::new(driver.clone()), Account::default()).unwrap_err();
        assert!(matches!(err, GridError::Connection(_)));
    }

    #[test]
    fn test_with_session_annotates_component() {
        init_test_logging();
        let driver = MemoryDriver::new();
        let mut session = session(&driver);

        let err = session
            .with_session("stat", |fs| Ok(fs.stat("/nope")?))
            .unwrap_err();
        match err {
            GridError::Operation { component, source } => {
                assert_eq!(component, "stat");
                assert!(source.is_not_found());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(session.state(), LinkState::Disconnected);

        // The next call starts from a fresh connect, not a probe
        session.with_session("stat", |fs| Ok(fs.stat("/")?)).unwrap();
        assert_eq!(driver.connect_attempts(), 2);
        assert_eq!(session.stats().probe_failures, 0);
    }

    #[test]
    fn test_validation_passes_through_and_keeps_connection() {
        let driver = MemoryDriver::new();
        let mut session = session(&driver);

        let err = session
            .with_session("mkdir", |_fs| -> Result<()> {
                Err(GridError::validation("no paths given"))
            })
            .unwrap_err();
        assert!(matches!(err, GridError::Validation(_)));
        assert_eq!(session.state(), LinkState::Connected);
    }

    #[test]
    fn test_close_twice_then_fail_fast() {
        let driver = MemoryDriver::new();
        let mut session = session(&driver);
        session.ensure_live().unwrap();

        session.close();
        session.close();
        assert!(session.is_closed());
        assert_eq!(driver.close_count(), 1);

        let err = session.ensure_live().err().unwrap();
        match err {
            GridError::Connection(inner) => assert!(inner.is_closed()),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(driver.connect_attempts(), 1);
    }

    #[test]
    fn test_resolve_against_home() {
        let driver = MemoryDriver::new();
        let mut account = Account::default();
        account.home = "/tempZone/home/kepler".to_string();
        let session = Session::new(Arc::new(driver), account);

        assert_eq!(session.resolve("runs/1"), "/tempZone/home/kepler/runs/1");
        assert_eq!(session.resolve("/abs"), "/abs");
        assert_eq!(session.driver_name(), "memory");
    }
}
