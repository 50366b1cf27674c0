//! Database builder for non-default setups
//!
//! `Database::open(path)` covers the usual case. The builder exists for
//! overriding `vigil.toml`, tracking sessions in a private leak registry, or
//! starting the log writer through a custom spawner.

use std::path::PathBuf;
use std::sync::Arc;
use vigil_core::{VigilConfig, VigilError, VigilResult};
use vigil_diagnostics::LeakRegistry;
use vigil_durability::TaskSpawner;

use super::Database;

/// Builder for Database configuration
///
/// ```ignore
/// let db = Database::builder()
///     .path("/data/orders")
///     .config(VigilConfig { write_delay_ms: 0, ..VigilConfig::default() })
///     .open()?;
/// ```
#[derive(Default)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    config: Option<VigilConfig>,
    leak_registry: Option<&'static LeakRegistry>,
    spawner: Option<Arc<dyn TaskSpawner>>,
}

impl DatabaseBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set database directory (required)
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Use `config` instead of reading `vigil.toml`.
    ///
    /// The file is left untouched.
    pub fn config(mut self, config: VigilConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Track sessions in `registry` instead of the process-wide one
    pub fn leak_registry(mut self, registry: &'static LeakRegistry) -> Self {
        self.leak_registry = Some(registry);
        self
    }

    /// Start the log writer through `spawner`
    pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Open the database.
    ///
    /// If the directory is already open, the existing instance is returned
    /// and the settings given here are ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if no path was set, or if the directory, config, or
    /// log cannot be opened.
    pub fn open(self) -> VigilResult<Arc<Database>> {
        let path = self
            .path
            .ok_or_else(|| VigilError::invalid_operation("DatabaseBuilder requires a path"))?;
        let registry = self.leak_registry.unwrap_or_else(LeakRegistry::global);
        Database::open_internal(path, self.config, registry, self.spawner.as_deref())
    }
}

impl std::fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("custom_registry", &self.leak_registry.is_some())
            .field("custom_spawner", &self.spawner.is_some())
            .finish()
    }
}
