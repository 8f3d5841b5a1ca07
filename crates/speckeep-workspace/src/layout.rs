//! Directory model and project-to-workspace mapping

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Metadata file at the root of every workspace
pub const METADATA_FILE: &str = "workspace.json";
/// Extension carried by every encrypted document
pub const ENCRYPTED_EXTENSION: &str = "enc";

/// The fixed subdirectories of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkspaceDir {
    Requirements,
    Designs,
    Tasks,
    Research,
    Outputs,
    Logs,
    Secrets,
}

impl WorkspaceDir {
    pub const ALL: [WorkspaceDir; 7] = [
        WorkspaceDir::Requirements,
        WorkspaceDir::Designs,
        WorkspaceDir::Tasks,
        WorkspaceDir::Research,
        WorkspaceDir::Outputs,
        WorkspaceDir::Logs,
        WorkspaceDir::Secrets,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkspaceDir::Requirements => "requirements",
            WorkspaceDir::Designs => "designs",
            WorkspaceDir::Tasks => "tasks",
            WorkspaceDir::Research => "research",
            WorkspaceDir::Outputs => "outputs",
            WorkspaceDir::Logs => "logs",
            WorkspaceDir::Secrets => "secrets",
        }
    }
}

/// Maps a canonical project path to its private workspace directory.
///
/// Implementations must be deterministic: the same project always maps to
/// the same workspace, or previously written documents become unreachable.
pub trait WorkspaceLocator: Send + Sync {
    /// Directory that holds every workspace
    fn workspaces_root(&self) -> &Path;

    /// Workspace directory for one project
    fn workspace_path(&self, project_path: &Path) -> PathBuf;
}

/// `<root>/<project-dir-name>-<sha256(project path)[..16]>`
#[derive(Debug, Clone)]
pub struct HashedLocator {
    root: PathBuf,
}

impl HashedLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl WorkspaceLocator for HashedLocator {
    fn workspaces_root(&self) -> &Path {
        &self.root
    }

    fn workspace_path(&self, project_path: &Path) -> PathBuf {
        let digest = hex::encode(Sha256::digest(project_path.to_string_lossy().as_bytes()));
        let name: String = project_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{}-{}", name, &digest[..16]))
    }
}
