//! Project discovery under a projects root

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, WorkspaceError};

/// Manifest files that mark a directory as a project
pub const PROJECT_MARKERS: &[&str] = &[
    "package.json",
    "pyproject.toml",
    "setup.py",
    "requirements.txt",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "Gemfile",
    "composer.json",
];

/// Version-control directories that mark a directory as a project
pub const VCS_MARKERS: &[&str] = &[".git"];

/// List the immediate subdirectories of `root` that look like projects.
///
/// Sorted lexicographically by path so repeated listings are stable.
/// A missing root yields an empty list.
pub fn discover_projects(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(root = %root.display(), "projects root does not exist");
            return Ok(Vec::new());
        }
        Err(e) => return Err(WorkspaceError::io(root)(e)),
    };

    let mut projects = Vec::new();
    for entry in entries {
        let entry = entry.map_err(WorkspaceError::io(root))?;
        let path = entry.path();
        if path.is_dir() && is_project(&path) {
            projects.push(path);
        }
    }
    projects.sort();

    debug!(root = %root.display(), count = projects.len(), "discovered projects");
    Ok(projects)
}

fn is_project(dir: &Path) -> bool {
    PROJECT_MARKERS.iter().any(|marker| dir.join(marker).is_file())
        || VCS_MARKERS.iter().any(|marker| dir.join(marker).is_dir())
}
