//! Driver registry
//!
//! Maps driver names to factories so a configuration can pick its driver by
//! name. The built-in drivers are registered on construction; callers can
//! register their own remote clients next to them.

use super::error::{DriverError, DriverResult};
use super::{Driver, LocalDriver, MemoryDriver};
use crate::config::{DriverConfig, DriverKind};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[cfg(feature = "ssh-backend")]
use super::SshDriver;

/// Factory function type for creating drivers
pub type DriverFactory = Arc<dyn Fn(&DriverConfig) -> DriverResult<Arc<dyn Driver>> + Send + Sync>;

/// Registry of driver factories
///
/// # Example
///
/// ```
/// use gridlink::backend::{Driver, DriverRegistry, DriverResult, MemoryDriver};
/// use gridlink::config::{DriverConfig, DriverKind};
/// use std::sync::Arc;
///
/// let registry = DriverRegistry::new();
/// registry.register(
///     "fixture",
///     Arc::new(|_config: &DriverConfig| -> DriverResult<Arc<dyn Driver>> {
///         let driver = MemoryDriver::new();
///         driver.add_file("/fixture/readme.txt", b"hello");
///         Ok(Arc::new(driver))
///     }),
/// );
///
/// assert!(registry.is_registered("fixture"));
/// let config = DriverConfig { kind: DriverKind::Memory, ..Default::default() };
/// let driver = registry.create_named("fixture", &config).unwrap();
/// assert_eq!(driver.name(), "memory");
/// ```
pub struct DriverRegistry {
    factories: RwLock<HashMap<String, DriverFactory>>,
}

impl DriverRegistry {
    /// Create a new registry with the built-in drivers
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&self) {
        self.register(
            "memory",
            Arc::new(|_config: &DriverConfig| -> DriverResult<Arc<dyn Driver>> {
                Ok(Arc::new(MemoryDriver::new()))
            }),
        );

        self.register(
            "local",
            Arc::new(|config: &DriverConfig| -> DriverResult<Arc<dyn Driver>> {
                let root = config.root.clone().ok_or_else(|| {
                    DriverError::other("local", "driver.root is required for the local driver")
                })?;
                Ok(Arc::new(LocalDriver::new(root)))
            }),
        );

        #[cfg(feature = "ssh-backend")]
        self.register(
            "ssh",
            Arc::new(|config: &DriverConfig| -> DriverResult<Arc<dyn Driver>> {
                Ok(Arc::new(SshDriver::from_config(config)))
            }),
        );
    }

    /// Register (or replace) a driver factory
    pub fn register(&self, name: impl Into<String>, factory: DriverFactory) {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        factories.insert(name.into(), factory);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }

    /// Registered driver names, sorted
    pub fn list_drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Create the driver named by `config.kind`
    pub fn create(&self, config: &DriverConfig) -> DriverResult<Arc<dyn Driver>> {
        self.create_named(&config.kind.to_string(), config)
    }

    /// Create a driver by registered name
    pub fn create_named(&self, name: &str, config: &DriverConfig) -> DriverResult<Arc<dyn Driver>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| match config.kind {
                DriverKind::Ssh => DriverError::other(
                    name,
                    "gridlink was built without the ssh-backend feature",
                ),
                _ => DriverError::unsupported(name, "connect"),
            })?;
        factory(config)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create the configured driver from the built-in registry
pub fn open_driver(config: &DriverConfig) -> DriverResult<Arc<dyn Driver>> {
    DriverRegistry::new().create(config)
}
