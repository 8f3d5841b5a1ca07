//! Speckeep Core - service wiring
//!
//! Builds the long-lived services once at startup and hands them out by
//! reference: the workspace manager, both caches, and the blocking pool.
//! Nothing here is a global; tests build their own [`Services`].

pub mod config;
pub mod context;
pub mod pool;
pub mod store;

pub use config::{ConfigError, Settings};
pub use context::{CacheReport, Services};
pub use pool::{BlockingPool, PoolError};
pub use store::DocumentStore;

pub use speckeep_cache::{CacheConfig, CacheStats, RequestParams};
pub use speckeep_workspace::{Workspace, WorkspaceError};

use std::path::PathBuf;

/// Core errors
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl CoreError {
    /// True for "nothing there" conditions a routing layer maps to 404
    pub fn is_not_found(&self) -> bool {
        match self {
            CoreError::Workspace(e) => e.is_not_found(),
            CoreError::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
