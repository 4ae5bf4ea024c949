pub mod audit;
pub mod auth;
pub mod config;
pub mod directory;
pub mod error;
pub mod notify;
pub mod policy;
pub mod storage;
pub mod workflow;

use std::sync::Arc;

use anyhow::Result;

use audit::AuditRecorder;
use auth::session::SessionManager;
use config::DeskConfig;
use directory::Directory;
use notify::Notifier;
use policy::{CapabilityMatrix, PermissionGuard};
use storage::Storage;
use workflow::TaskWorkflow;

/// Shared application state passed to the CLI and any transport collaborator.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DeskConfig>,
    pub storage: Arc<Storage>,
    /// The process-wide capability table. Built once here, never mutated.
    pub matrix: Arc<CapabilityMatrix>,
    pub guard: Arc<PermissionGuard>,
    pub sessions: Arc<SessionManager>,
    pub directory: Arc<Directory>,
    pub audit: Arc<AuditRecorder>,
    pub notifier: Arc<Notifier>,
    pub workflow: Arc<TaskWorkflow>,
}

impl AppContext {
    /// Open storage under the configured data dir and wire every service to
    /// the same pool.
    pub async fn bootstrap(config: DeskConfig) -> Result<Self> {
        let storage = Arc::new(Storage::new(&config.data_dir).await?);
        let pool = storage.pool();

        let matrix = Arc::new(CapabilityMatrix::standard());
        let guard = Arc::new(PermissionGuard::new(matrix.clone()));
        let sessions = Arc::new(SessionManager::new(
            pool.clone(),
            matrix.clone(),
            config.session_ttl_minutes,
        ));
        let directory = Arc::new(Directory::new(pool.clone(), guard.clone()));
        let audit = Arc::new(AuditRecorder::new(pool.clone(), guard.clone()));
        let notifier = Arc::new(Notifier::new(pool.clone()));
        let workflow = Arc::new(TaskWorkflow::new(pool, guard.clone(), notifier.clone()));

        Ok(Self {
            config: Arc::new(config),
            storage,
            matrix,
            guard,
            sessions,
            directory,
            audit,
            notifier,
            workflow,
        })
    }
}
