//! Speckeep Workspace - encrypted per-project storage
//!
//! Every source project gets one private workspace: a fixed directory tree,
//! a `workspace.json` metadata file holding its salt, and documents sealed
//! with a key derived from the process passphrase and that salt.
//! Plaintext never touches the workspace directory.

pub mod discovery;
pub mod layout;
pub mod manager;
pub mod paths;
pub mod workspace;

pub use discovery::{discover_projects, PROJECT_MARKERS, VCS_MARKERS};
pub use layout::{HashedLocator, WorkspaceDir, WorkspaceLocator, ENCRYPTED_EXTENSION, METADATA_FILE};
pub use manager::WorkspaceManager;
pub use workspace::{EncryptionDescriptor, Workspace, WorkspaceMetadata};

use std::path::{Path, PathBuf};

use speckeep_crypto::CryptoError;

/// Errors from workspace operations
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Project not found: {}", .0.display())]
    ProjectNotFound(PathBuf),

    #[error("Workspace not found for project: {}", .0.display())]
    WorkspaceNotFound(PathBuf),

    #[error("Workspace metadata is unreadable, refusing to overwrite: {}", .0.display())]
    CorruptMetadata(PathBuf),

    #[error("Authentication failed for {} - ciphertext tampered or wrong key", .0.display())]
    Authentication(PathBuf),

    #[error("Path escapes workspace root: {0}")]
    PathSecurity(String),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl WorkspaceError {
    /// Build an `Io` error mapper bound to `path`
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True for "nothing there" conditions a routing layer maps to 404
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProjectNotFound(_) | Self::WorkspaceNotFound(_) | Self::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkspaceError>;
