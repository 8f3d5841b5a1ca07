//! Document storage facade
//!
//! Every disk touch goes through the blocking pool, so request handlers
//! only ever await. Encrypted documents go through the workspace manager;
//! plain text files go through the file cache.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use speckeep_cache::{FileCache, FileStamp};
use speckeep_workspace::{Workspace, WorkspaceManager};

use crate::pool::BlockingPool;
use crate::{CoreError, Result};

/// Cheap to clone; clones share the manager, cache, and pool.
#[derive(Clone)]
pub struct DocumentStore {
    workspaces: Arc<WorkspaceManager>,
    files: Arc<FileCache>,
    pool: BlockingPool,
}

impl DocumentStore {
    pub fn new(workspaces: Arc<WorkspaceManager>, files: Arc<FileCache>, pool: BlockingPool) -> Self {
        Self {
            workspaces,
            files,
            pool,
        }
    }

    pub async fn discover_projects(&self, root: impl Into<PathBuf>) -> Result<Vec<PathBuf>> {
        let root = root.into();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run(move || workspaces.discover_projects(&root))
            .await??)
    }

    pub async fn create_workspace(&self, project: impl Into<PathBuf>) -> Result<Workspace> {
        let project = project.into();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run(move || workspaces.create_workspace(&project))
            .await??)
    }

    pub async fn workspace_for(&self, project: impl Into<PathBuf>) -> Result<Workspace> {
        let project = project.into();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run(move || workspaces.workspace_for(&project))
            .await??)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let workspaces = self.workspaces.clone();
        Ok(self.pool.run(move || workspaces.list_workspaces()).await??)
    }

    pub async fn list_workspace_files(&self, workspace: &Workspace) -> Result<Vec<PathBuf>> {
        let workspace = workspace.clone();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run(move || workspaces.list_workspace_files(&workspace))
            .await??)
    }

    pub async fn ensure_structure(&self, workspace: &Workspace) -> Result<()> {
        let workspace = workspace.clone();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run(move || workspaces.ensure_structure(&workspace))
            .await??)
    }

    /// Encrypt and store a document; returns the path written
    #[instrument(skip_all, fields(path = %relative_path.as_ref().display()))]
    pub async fn save_document(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
        plaintext: Vec<u8>,
    ) -> Result<PathBuf> {
        let plaintext = Zeroizing::new(plaintext);
        let relative_path = relative_path.as_ref().to_path_buf();
        let workspace = workspace.clone();
        let workspaces = self.workspaces.clone();

        let stored = self
            .pool
            .run(move || workspaces.write_encrypted(&workspace, &relative_path, &plaintext))
            .await??;
        Ok(stored)
    }

    /// Read and decrypt a document
    pub async fn load_document(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.load_document_cancellable(workspace, relative_path, &CancellationToken::new())
            .await
    }

    /// Like [`DocumentStore::load_document`], abandoned if `cancel` fires
    /// before the read starts.
    pub async fn load_document_cancellable(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let workspace = workspace.clone();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run_cancellable(cancel, move || {
                workspaces.read_encrypted(&workspace, &relative_path)
            })
            .await??)
    }

    pub async fn remove_document(
        &self,
        workspace: &Workspace,
        relative_path: impl AsRef<Path>,
    ) -> Result<()> {
        let relative_path = relative_path.as_ref().to_path_buf();
        let workspace = workspace.clone();
        let workspaces = self.workspaces.clone();
        Ok(self
            .pool
            .run(move || workspaces.remove_encrypted(&workspace, &relative_path))
            .await??)
    }

    /// Read a text file, served from the file cache while it is fresh.
    pub async fn read_text(&self, path: impl Into<PathBuf>) -> Result<String> {
        let path = path.into();
        let files = self.files.clone();
        self.pool.run(move || read_text_cached(&files, &path)).await?
    }

    /// Read a text file unless `cancel` fires first. A read that has started
    /// completes and fills the cache even if the caller stopped waiting.
    pub async fn read_text_cancellable(
        &self,
        path: impl Into<PathBuf>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let path = path.into();
        let files = self.files.clone();
        self.pool
            .run_cancellable(cancel, move || read_text_cached(&files, &path))
            .await?
    }

    /// Atomically replace a text file and cache the new content
    pub async fn write_text(&self, path: impl Into<PathBuf>, content: String) -> Result<()> {
        let path = path.into();
        let files = self.files.clone();
        self.pool
            .run(move || write_text_cached(&files, &path, content))
            .await?
    }

    /// Read many text files concurrently; one result per path, in order
    pub async fn read_many(&self, paths: Vec<PathBuf>) -> Vec<Result<String>> {
        let ops = paths.into_iter().map(|path| {
            let files = self.files.clone();
            move || read_text_cached(&files, &path)
        });
        self.pool
            .run_batch(ops)
            .await
            .into_iter()
            .map(|result| result.map_err(CoreError::from).and_then(|inner| inner))
            .collect()
    }

    /// Write many text files concurrently; one result per file, in order
    pub async fn write_many(&self, items: Vec<(PathBuf, String)>) -> Vec<Result<()>> {
        let ops = items.into_iter().map(|(path, content)| {
            let files = self.files.clone();
            move || write_text_cached(&files, &path, content)
        });
        self.pool
            .run_batch(ops)
            .await
            .into_iter()
            .map(|result| result.map_err(CoreError::from).and_then(|inner| inner))
            .collect()
    }
}

fn read_text_cached(files: &FileCache, path: &Path) -> Result<String> {
    if let Some(content) = files.get(path) {
        return Ok(content);
    }
    let io_error = |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::open(path).map_err(io_error)?;
    let stamp = file.metadata().ok().as_ref().and_then(FileStamp::from_metadata);
    let mut content = String::new();
    file.read_to_string(&mut content).map_err(io_error)?;

    if let Some(stamp) = stamp {
        files.put_stamped(path, content.clone(), stamp);
    }
    debug!(path = %path.display(), bytes = content.len(), "read text file from disk");
    Ok(content)
}

fn write_text_cached(files: &FileCache, path: &Path, content: String) -> Result<()> {
    let io_error = |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_error)?;

    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
    staged.write_all(content.as_bytes()).map_err(io_error)?;
    let written = staged.persist(path).map_err(|e| io_error(e.error))?;

    if let Some(stamp) = written.metadata().ok().as_ref().and_then(FileStamp::from_metadata) {
        files.put_stamped(path, content, stamp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use speckeep_cache::CacheConfig;
    use speckeep_crypto::KdfParams;
    use speckeep_workspace::{HashedLocator, WorkspaceError};
    use tempfile::TempDir;

    fn store(root: &TempDir) -> (DocumentStore, Arc<FileCache>) {
        let manager = WorkspaceManager::new(
            HashedLocator::new(root.path().join("workspaces")),
            SecretString::new("a-very-long-test-passphrase-0123456789".to_string()),
        )
        .with_kdf_params(KdfParams::insecure_fast());
        let files = Arc::new(FileCache::new(CacheConfig::new(16, 60)));
        let store = DocumentStore::new(Arc::new(manager), files.clone(), BlockingPool::new(4));
        (store, files)
    }

    fn project(root: &TempDir) -> PathBuf {
        let project = root.path().join("projects/demo");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join("Cargo.toml"), "[package]").unwrap();
        project
    }

    #[tokio::test]
    async fn test_document_roundtrip_through_pool() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = store(&root);
        let workspace = store.create_workspace(project(&root)).await.unwrap();

        let stored = store
            .save_document(&workspace, "designs/api.md", b"# API design".to_vec())
            .await
            .unwrap();
        assert!(stored.ends_with("designs/api.md.enc"));

        let loaded = store.load_document(&workspace, "designs/api.md").await.unwrap();
        assert_eq!(loaded.as_slice(), b"# API design");
        assert_eq!(store.list_workspace_files(&workspace).await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn test_remove_document_and_list_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = store(&root);
        let workspace = store.create_workspace(project(&root)).await.unwrap();
        assert_eq!(store.list_workspaces().await.unwrap(), vec![workspace.clone()]);

        store
            .save_document(&workspace, "tasks/todo.md", b"- ship".to_vec())
            .await
            .unwrap();
        store.remove_document(&workspace, "tasks/todo.md").await.unwrap();
        assert!(store.list_workspace_files(&workspace).await.unwrap().is_empty());

        let err = store
            .remove_document(&workspace, "tasks/todo.md")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_typed_errors_survive_offload() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = store(&root);

        let err = store
            .create_workspace(root.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Workspace(WorkspaceError::ProjectNotFound(_))
        ));
        assert!(err.is_not_found());

        let workspace = store.create_workspace(project(&root)).await.unwrap();
        let err = store
            .save_document(&workspace, "../escape", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Workspace(WorkspaceError::PathSecurity(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_load_never_reads() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = store(&root);
        let workspace = store.create_workspace(project(&root)).await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = store
            .load_document_cancellable(&workspace, "tasks/t.md", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Pool(crate::PoolError::Cancelled)));
    }

    #[tokio::test]
    async fn test_read_text_fills_and_uses_cache() {
        let root = tempfile::tempdir().unwrap();
        let (store, files) = store(&root);
        let path = root.path().join("steering.md");
        fs::write(&path, "be concise").unwrap();

        assert_eq!(store.read_text(path.clone()).await.unwrap(), "be concise");
        assert!(files.contains(&path));
        assert_eq!(store.read_text(path.clone()).await.unwrap(), "be concise");
        assert_eq!(files.stats().hits, 1);

        fs::write(&path, "be concise and precise").unwrap();
        assert_eq!(
            store.read_text(path.clone()).await.unwrap(),
            "be concise and precise"
        );
    }

    #[tokio::test]
    async fn test_write_text_replaces_and_caches() {
        let root = tempfile::tempdir().unwrap();
        let (store, files) = store(&root);
        let path = root.path().join("out/notes.md");

        store.write_text(path.clone(), "v1".to_string()).await.unwrap();
        store.write_text(path.clone(), "v2".to_string()).await.unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "v2");
        assert_eq!(files.get(&path).as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_batch_reports_partial_failure() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = store(&root);
        let good = root.path().join("good.md");
        fs::write(&good, "ok").unwrap();

        let results = store
            .read_many(vec![good.clone(), root.path().join("missing.md"), good])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_deref().unwrap(), "ok");
        assert!(matches!(results[1], Err(CoreError::Io { .. })));
        assert_eq!(results[2].as_deref().unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_write_many() {
        let root = tempfile::tempdir().unwrap();
        let (store, _) = store(&root);
        let blocker = root.path().join("blocker");
        fs::write(&blocker, "i am a file").unwrap();

        let results = store
            .write_many(vec![
                (root.path().join("a.md"), "a".to_string()),
                (blocker.join("b.md"), "b".to_string()),
            ])
            .await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(fs::read_to_string(root.path().join("a.md")).unwrap(), "a");
    }
}
