//! # Setup Persistence
//!
//! The "store parameters" path writes the setup through a `SetupStore`, the
//! engine then restarts from the stored setup.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::config::Config;
use crate::error::Result;

/// Persistent storage of the setup record
#[cfg_attr(test, mockall::automock)]
pub trait SetupStore: Send {
    /// Persist `config`
    fn store(&mut self, config: &Config) -> Result<()>;

    /// Read back the persisted setup
    fn reload(&mut self) -> Result<Config>;
}

/// Setup stored as a TOML file
#[derive(Debug, Clone)]
pub struct TomlSetupStore {
    path: PathBuf,
}

impl TomlSetupStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl SetupStore for TomlSetupStore {
    fn store(&mut self, config: &Config) -> Result<()> {
        config.store(&self.path)?;
        info!("Setup stored to {}", self.path.display());
        Ok(())
    }

    fn reload(&mut self) -> Result<Config> {
        Config::load(&self.path)
    }
}

/// In-memory store, shared between clones
#[derive(Debug, Clone)]
pub struct MemorySetupStore {
    inner: Arc<Mutex<(Config, usize)>>,
}

impl MemorySetupStore {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Mutex::new((config, 0))),
        }
    }

    /// Currently stored setup
    pub fn stored(&self) -> Config {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).0.clone()
    }

    /// Number of `store` calls so far
    pub fn store_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}

impl SetupStore for MemorySetupStore {
    fn store(&mut self, config: &Config) -> Result<()> {
        config.validate()?;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.0 = config.clone();
        inner.1 += 1;
        Ok(())
    }

    fn reload(&mut self) -> Result<Config> {
        Ok(self.stored())
    }
}
