//! Path containment for workspace-relative document paths

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::layout::ENCRYPTED_EXTENSION;
use crate::{Result, WorkspaceError};

/// Join `relative` onto `root`, rejecting anything that could leave it.
///
/// Purely lexical: no filesystem access happens here. Absolute paths,
/// drive prefixes and any `..` component are refused outright.
pub fn resolve_in(root: &Path, relative: &Path) -> Result<PathBuf> {
    let mut resolved = root.to_path_buf();
    let mut pushed = false;

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::PathSecurity(relative.display().to_string()));
            }
        }
    }

    if !pushed {
        return Err(WorkspaceError::PathSecurity(format!(
            "'{}' does not name a file",
            relative.display()
        )));
    }
    Ok(resolved)
}

/// Verify that an existing path, after resolving symlinks, is still under `root`
pub fn ensure_contained(root: &Path, existing: &Path) -> Result<()> {
    let canonical = existing
        .canonicalize()
        .map_err(WorkspaceError::io(existing))?;
    if canonical.starts_with(root) {
        Ok(())
    } else {
        Err(WorkspaceError::PathSecurity(format!(
            "{} resolves outside the workspace",
            existing.display()
        )))
    }
}

/// Create `dir` and its missing ancestors below `root`, one level at a time.
///
/// Every existing level is checked before the next one is created, so a
/// symlink pointing outside `root` is refused before anything is made
/// through it. `root` must be canonical and `dir` must lie under it.
pub fn create_dir_within(root: &Path, dir: &Path) -> Result<()> {
    let relative = dir
        .strip_prefix(root)
        .map_err(|_| WorkspaceError::PathSecurity(dir.display().to_string()))?;

    let mut current = root.to_path_buf();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            return Err(WorkspaceError::PathSecurity(dir.display().to_string()));
        };
        current.push(part);

        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => ensure_contained(root, &current)?,
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(WorkspaceError::PathSecurity(format!(
                    "{} is not a directory",
                    current.display()
                )))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => match fs::create_dir(&current) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    ensure_contained(root, &current)?
                }
                Err(e) => return Err(WorkspaceError::io(&current)(e)),
            },
            Err(e) => return Err(WorkspaceError::io(&current)(e)),
        }
    }
    ensure_contained(root, dir)
}

/// Append `.enc` unless the name already carries it
pub fn encrypted_name(relative: &Path) -> PathBuf {
    if relative.extension().is_some_and(|ext| ext == ENCRYPTED_EXTENSION) {
        return relative.to_path_buf();
    }
    let mut name = OsString::from(relative.as_os_str());
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    PathBuf::from(name)
}
