//! Workspace manager - create, open, and encrypt-on-write / decrypt-on-read
//!
//! Keys are derived fresh for every operation from the process passphrase
//! and the workspace salt, and dropped (zeroized) when the operation ends.
//! Concurrent writes to the same document are last-writer-wins; each write
//! lands atomically via a temp file and rename in the target directory.

use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zeroize::Zeroizing;

use speckeep_crypto::{Cipher, CryptoError, KdfParams};

use crate::discovery;
use crate::layout::{WorkspaceDir, WorkspaceLocator, ENCRYPTED_EXTENSION, METADATA_FILE};
use crate::paths::{create_dir_within, encrypted_name, ensure_contained, resolve_in};
use crate::workspace::{Workspace, WorkspaceMetadata};
use crate::{Result, WorkspaceError};

/// Owns the passphrase and the project-to-workspace mapping
pub struct WorkspaceManager {
    locator: Box<dyn WorkspaceLocator>,
    passphrase: SecretString,
    kdf: KdfParams,
}

enum MetadataState {
    Missing,
    Corrupt(String),
    Valid(Workspace),
}

impl WorkspaceManager {
    pub fn new(locator: impl WorkspaceLocator + 'static, passphrase: SecretString) -> Self {
        Self {
            locator: Box::new(locator),
            passphrase,
            kdf: KdfParams::default(),
        }
    }

    /// Override the scrypt cost (tests use cheap parameters)
    pub fn with_kdf_params(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn workspaces_root(&self) -> &Path {
        self.locator.workspaces_root()
    }

    /// Projects directly under `root`, sorted by path
    pub fn discover_projects(&self, root: &Path) -> Result<Vec<PathBuf>> {
        discovery::discover_projects(root)
    }

    /// Open the workspace of an existing project.
    ///
    /// Absent or unreadable metadata means there is no workspace; this never
    /// creates one. Missing subdirectories are repaired.
    #[instrument(skip_all, fields(project = %project_path.display()))]
    pub fn workspace_for(&self, project_path: &Path) -> Result<Workspace> {
        let project = canonical_or_absolute(project_path);
        let workspace_path = self.locator.workspace_path(&project);

        match load_metadata(&workspace_path) {
            MetadataState::Valid(workspace) => {
                self.ensure_structure(&workspace)?;
                Ok(workspace)
            }
            MetadataState::Missing => Err(WorkspaceError::WorkspaceNotFound(project)),
            MetadataState::Corrupt(reason) => {
                warn!(workspace = %workspace_path.display(), %reason, "ignoring corrupt workspace metadata");
                Err(WorkspaceError::WorkspaceNotFound(project))
            }
        }
    }

    /// Create the workspace for a project, or return the existing one.
    ///
    /// Existing metadata is never rewritten and the salt is never
    /// regenerated. Racing creators converge on whichever metadata file
    /// landed first.
    #[instrument(skip_all, fields(project = %project_path.display()))]
    pub fn create_workspace(&self, project_path: &Path) -> Result<Workspace> {
        let project = match project_path.canonicalize() {
            Ok(path) if path.is_dir() => path,
            _ => return Err(WorkspaceError::ProjectNotFound(project_path.to_path_buf())),
        };
        let workspace_path = self.locator.workspace_path(&project);

        match load_metadata(&workspace_path) {
            MetadataState::Valid(workspace) => {
                debug!("workspace already initialized");
                self.ensure_structure(&workspace)?;
                return Ok(workspace);
            }
            MetadataState::Corrupt(reason) => {
                warn!(workspace = %workspace_path.display(), %reason, "refusing to overwrite corrupt metadata");
                return Err(WorkspaceError::CorruptMetadata(workspace_path.join(METADATA_FILE)));
            }
            MetadataState::Missing => {}
        }

        let salt = speckeep_crypto::generate_salt()?;

        fs::create_dir_all(&workspace_path).map_err(WorkspaceError::io(&workspace_path))?;
        let workspace_path = workspace_path
            .canonicalize()
            .map_err(WorkspaceError::io(&workspace_path))?;
        create_subdirectories(&workspace_path)?;

        let metadata = WorkspaceMetadata::new(&project, &salt);
        let json = serde_json::to_vec_pretty(&metadata)?;
        let metadata_path = workspace_path.join(METADATA_FILE);

        let mut staged = tempfile::NamedTempFile::new_in(&workspace_path)
            .map_err(WorkspaceError::io(&workspace_path))?;
        staged.write_all(&json).map_err(WorkspaceError::io(&metadata_path))?;
        staged.as_file().sync_all().map_err(WorkspaceError::io(&metadata_path))?;

        match staged.persist_noclobber(&metadata_path) {
            Ok(_) => {
                info!(workspace = %workspace_path.display(), "created workspace");
                Ok(Workspace {
                    project_path: project,
                    workspace_path,
                    salt,
                    created_at: metadata.created_at,
                })
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                debug!("lost creation race, adopting existing metadata");
                match load_metadata(&workspace_path) {
                    MetadataState::Valid(workspace) => Ok(workspace),
                    _ => Err(WorkspaceError::CorruptMetadata(metadata_path)),
                }
            }
            Err(e) => Err(WorkspaceError::io(&metadata_path)(e.error)),
        }
    }

    /// Every workspace under the root with readable metadata, sorted by project path
    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let root = self.locator.workspaces_root();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WorkspaceError::io(root)(e)),
        };

        let mut workspaces = Vec::new();
        for entry in entries {
            let path = entry.map_err(WorkspaceError::io(root))?.path();
            if !path.is_dir() {
                continue;
            }
            match load_metadata(&path) {
                MetadataState::Valid(workspace) => workspaces.push(workspace),
                MetadataState::Corrupt(reason) => {
                    warn!(workspace = %path.display(), %reason, "skipping corrupt workspace")
                }
                MetadataState::Missing => {}
            }
        }
        workspaces.sort_by(|a, b| a.project_path.cmp(&b.project_path));
        Ok(workspaces)
    }

    /// Derive this workspace's key and wrap it in a short-lived cipher
    pub fn cipher_for(&self, workspace: &Workspace) -> Result<Cipher> {
        Ok(speckeep_crypto::cipher_for(
            self.passphrase.expose_secret().as_bytes(),
            &workspace.salt,
            &self.kdf,
        )?)
    }

    /// Encrypt `plaintext` and store it at `relative_path` inside the workspace.
    ///
    /// `.enc` is appended when missing. Returns the absolute path written.
    #[instrument(skip_all, fields(path = %relative_path.as_ref().display(), bytes = plaintext.len()))]
    pub fn write_encrypted(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
        plaintext: &[u8],
    ) -> Result<PathBuf> {
        let target = resolve_in(
            &workspace.workspace_path,
            &encrypted_name(relative_path.as_ref()),
        )?;
        let parent = target
            .parent()
            .ok_or_else(|| WorkspaceError::PathSecurity(target.display().to_string()))?;

        let blob = self.cipher_for(workspace)?.encrypt(plaintext)?;

        create_dir_within(&workspace.workspace_path, parent)?;
        if fs::symlink_metadata(&target).is_ok() {
            ensure_contained(&workspace.workspace_path, &target)?;
        }

        let mut staged =
            tempfile::NamedTempFile::new_in(parent).map_err(WorkspaceError::io(parent))?;
        staged.write_all(&blob).map_err(WorkspaceError::io(&target))?;
        staged.as_file().sync_all().map_err(WorkspaceError::io(&target))?;
        staged
            .persist(&target)
            .map_err(|e| WorkspaceError::io(&target)(e.error))?;

        debug!(target = %target.display(), "stored encrypted document");
        Ok(target)
    }

    /// Read and decrypt a document.
    ///
    /// Tampering or a wrong passphrase yields [`WorkspaceError::Authentication`].
    #[instrument(skip_all, fields(path = %relative_path.as_ref().display()))]
    pub fn read_encrypted(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let target = resolve_in(
            &workspace.workspace_path,
            &encrypted_name(relative_path.as_ref()),
        )?;

        if !target.exists() {
            return Err(WorkspaceError::NotFound(target));
        }
        ensure_contained(&workspace.workspace_path, &target)?;
        let blob = match fs::read(&target) {
            Ok(blob) => blob,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(WorkspaceError::NotFound(target))
            }
            Err(e) => return Err(WorkspaceError::io(&target)(e)),
        };

        self.cipher_for(workspace)?
            .decrypt(&blob)
            .map_err(|e| match e {
                CryptoError::Authentication => {
                    warn!(target = %target.display(), "encrypted document failed authentication");
                    WorkspaceError::Authentication(target)
                }
                other => other.into(),
            })
    }

    /// Delete one encrypted document
    pub fn remove_encrypted(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
    ) -> Result<()> {
        let target = resolve_in(
            &workspace.workspace_path,
            &encrypted_name(relative_path.as_ref()),
        )?;
        if !target.exists() {
            return Err(WorkspaceError::NotFound(target));
        }
        ensure_contained(&workspace.workspace_path, &target)?;
        fs::remove_file(&target).map_err(WorkspaceError::io(&target))?;
        debug!(target = %target.display(), "removed encrypted document");
        Ok(())
    }

    /// All `.enc` files under the seven subdirectories, sorted
    pub fn list_workspace_files(&self, workspace: &Workspace) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for dir in WorkspaceDir::ALL {
            let root = workspace.subdir(dir);
            if !root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&root) {
                let entry = entry.map_err(|e| {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    WorkspaceError::Io {
                        path,
                        source: e.into(),
                    }
                })?;
                let is_encrypted = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == ENCRYPTED_EXTENSION);
                if entry.file_type().is_file() && is_encrypted {
                    files.push(entry.into_path());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Recreate any missing subdirectory
    pub fn ensure_structure(&self, workspace: &Workspace) -> Result<()> {
        let created = create_subdirectories(&workspace.workspace_path)?;
        if created > 0 {
            info!(workspace = %workspace.workspace_path.display(), created, "repaired workspace structure");
        }
        Ok(())
    }
}

fn create_subdirectories(workspace_path: &Path) -> Result<usize> {
    let mut created = 0;
    for dir in WorkspaceDir::ALL {
        let path = workspace_path.join(dir.as_str());
        if path.is_dir() {
            continue;
        }
        fs::create_dir_all(&path).map_err(WorkspaceError::io(&path))?;
        created += 1;
    }
    Ok(created)
}

fn load_metadata(workspace_path: &Path) -> MetadataState {
    let metadata_path = workspace_path.join(METADATA_FILE);
    let raw = match fs::read(&metadata_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return MetadataState::Missing,
        Err(e) => return MetadataState::Corrupt(e.to_string()),
    };
    let metadata: WorkspaceMetadata = match serde_json::from_slice(&raw) {
        Ok(metadata) => metadata,
        Err(e) => return MetadataState::Corrupt(e.to_string()),
    };
    let canonical = match workspace_path.canonicalize() {
        Ok(path) => path,
        Err(e) => return MetadataState::Corrupt(e.to_string()),
    };
    match Workspace::from_metadata(&metadata, canonical) {
        Ok(workspace) => MetadataState::Valid(workspace),
        Err(reason) => MetadataState::Corrupt(reason),
    }
}

fn canonical_or_absolute(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
