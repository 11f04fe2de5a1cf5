//! Shared runtime state for dl-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Besides the store/
//! provider dependencies, the state owns the worker registry that enforces
//! the one-worker-per-job-id contract.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use dl_ingest::{run_worker, ArchivePolicy, IngestDeps};

/// Static build metadata included in health responses.
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
pub struct AppState {
    pub deps: IngestDeps,
    pub build: BuildInfo,
    /// Live workers by job id. Present key = worker task running.
    workers: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl AppState {
    pub fn new(deps: IngestDeps) -> Self {
        Self {
            deps,
            build: BuildInfo {
                service: "dl-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Launch the background worker for `job_id` unless one is already live.
    ///
    /// Returns `true` if a new worker task was spawned. A second call for a
    /// running job is a no-op returning `false`: resume on a live job must
    /// not double-dispatch.
    pub async fn spawn_worker(
        self: &Arc<Self>,
        job_id: Uuid,
        archive: Option<ArchivePolicy>,
    ) -> bool {
        let cancel = {
            let mut workers = self.workers.lock().await;
            if workers.contains_key(&job_id) {
                return false;
            }
            let cancel = CancellationToken::new();
            workers.insert(job_id, cancel.clone());
            cancel
        };

        let state = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = run_worker(&state.deps, job_id, archive, cancel).await {
                // The job row stays `running`; a later resume recovers it.
                error!(%job_id, error = %err, "worker exited with store failure");
            }
            state.workers.lock().await.remove(&job_id);
        });

        info!(%job_id, "worker spawned");
        true
    }

    /// Cooperative shutdown: ask every live worker to stop after its
    /// in-flight item.
    pub async fn cancel_all_workers(&self) {
        let workers = self.workers.lock().await;
        for (job_id, cancel) in workers.iter() {
            info!(%job_id, "cancelling worker for shutdown");
            cancel.cancel();
        }
    }
}
