//! Bootstrap providers hand the repository a snapshot at startup, before any remote data.
use std::path::PathBuf;

use crate::{models::ClientFeatures, Result};

/// Source of the initial snapshot, read once by [`Repository::start`].
///
/// [`Repository::start`]: crate::repository::Repository::start
pub trait BootstrapProvider: Send + Sync {
    /// Read the bootstrap snapshot. `None` means there is nothing to bootstrap from.
    fn read_bootstrap(&self) -> Result<Option<ClientFeatures>>;
}

/// Bootstrap from definitions held in memory.
#[derive(Debug, Clone)]
pub struct StaticBootstrap {
    features: ClientFeatures,
}

impl StaticBootstrap {
    #[allow(missing_docs)]
    pub fn new(features: ClientFeatures) -> StaticBootstrap {
        StaticBootstrap { features }
    }
}

impl BootstrapProvider for StaticBootstrap {
    fn read_bootstrap(&self) -> Result<Option<ClientFeatures>> {
        Ok(Some(self.features.clone()))
    }
}

/// Bootstrap from a JSON file in the `{ version, features, segments }` shape.
#[derive(Debug, Clone)]
pub struct FileBootstrap {
    path: PathBuf,
}

impl FileBootstrap {
    #[allow(missing_docs)]
    pub fn new(path: impl Into<PathBuf>) -> FileBootstrap {
        FileBootstrap { path: path.into() }
    }
}

impl BootstrapProvider for FileBootstrap {
    fn read_bootstrap(&self) -> Result<Option<ClientFeatures>> {
        let bytes = std::fs::read(&self.path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

impl<T: Fn() -> Result<Option<ClientFeatures>> + Send + Sync> BootstrapProvider for T {
    fn read_bootstrap(&self) -> Result<Option<ClientFeatures>> {
        self()
    }
}
