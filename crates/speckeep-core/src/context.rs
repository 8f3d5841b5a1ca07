//! Application context
//!
//! One [`Services`] value per process, created at startup and passed by
//! reference to every consumer. `shutdown` drains the worker pool.

use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use speckeep_cache::{CacheStats, FileCache, RequestParams, ResponseCache};
use speckeep_crypto::KdfParams;
use speckeep_workspace::WorkspaceManager;

use crate::config::Settings;
use crate::pool::BlockingPool;
use crate::store::DocumentStore;
use crate::Result;

/// Cache statistics for health endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub file_cache: CacheStats,
    pub ai_cache: CacheStats,
}

pub struct Services {
    projects_root: PathBuf,
    workspaces: Arc<WorkspaceManager>,
    file_cache: Arc<FileCache>,
    ai_cache: Arc<ResponseCache>,
    pool: BlockingPool,
    documents: DocumentStore,
}

impl Services {
    pub fn start(settings: Settings) -> Result<Self> {
        Self::start_with_kdf(settings, KdfParams::default())
    }

    /// Start with explicit scrypt costs
    pub fn start_with_kdf(settings: Settings, kdf: KdfParams) -> Result<Self> {
        settings.validate()?;
        let locator = settings.locator();
        let Settings {
            projects_root,
            workspaces_root,
            master_passphrase,
            file_cache,
            ai_cache,
            worker_threads,
        } = settings;

        let workspaces =
            Arc::new(WorkspaceManager::new(locator, master_passphrase).with_kdf_params(kdf));
        let file_cache = Arc::new(FileCache::new(file_cache));
        let ai_cache = Arc::new(ResponseCache::new(ai_cache));
        let pool = BlockingPool::new(worker_threads);
        let documents = DocumentStore::new(workspaces.clone(), file_cache.clone(), pool.clone());

        info!(
            projects_root = %projects_root.display(),
            workspaces_root = %workspaces_root.display(),
            worker_threads,
            "speckeep services started"
        );

        Ok(Self {
            projects_root,
            workspaces,
            file_cache,
            ai_cache,
            pool,
            documents,
        })
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    pub fn workspaces(&self) -> &Arc<WorkspaceManager> {
        &self.workspaces
    }

    pub fn file_cache(&self) -> &Arc<FileCache> {
        &self.file_cache
    }

    pub fn ai_cache(&self) -> &Arc<ResponseCache> {
        &self.ai_cache
    }

    pub fn pool(&self) -> &BlockingPool {
        &self.pool
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Projects under the configured projects root
    pub async fn discover_projects(&self) -> Result<Vec<PathBuf>> {
        self.documents.discover_projects(self.projects_root.clone()).await
    }

    /// Model call deduplicated through the response cache
    pub async fn cached_completion<F, Fut, E>(
        &self,
        model_id: &str,
        prompt: &str,
        params: &RequestParams,
        compute: F,
    ) -> std::result::Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<String, E>>,
    {
        self.ai_cache
            .get_or_compute(model_id, prompt, params, compute)
            .await
    }

    pub fn cache_report(&self) -> CacheReport {
        CacheReport {
            file_cache: self.file_cache.stats(),
            ai_cache: self.ai_cache.stats(),
        }
    }

    /// Stop the worker pool, waiting for in-flight storage operations
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("speckeep services stopped");
    }
}
