//! Run dispatcher
//!
//! Spawns one task per run request. Every task waits on the runner's
//! execution slot, so a burst of requests becomes a line of runs.

use mediaq_core::domain::job::JobStatus;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::execution::{JobRunner, RunRequest};
use crate::repository::job_repository;

/// Recorded on jobs that were mid-run when the previous process stopped
pub const INTERRUPTED_MESSAGE: &str = "interrupted by server restart";

/// Cheap to clone handle for scheduling runs
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<JobRunner>,
}

impl Dispatcher {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self { runner }
    }

    /// Schedule a run in the background and return without waiting for it
    pub fn dispatch(&self, request: RunRequest) -> JoinHandle<()> {
        debug!(
            "Dispatching run for job {} (force: {})",
            request.job_id, request.force_redownload
        );

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move { runner.run(request).await })
    }

    /// Restore the queue after a restart
    ///
    /// Jobs left `downloading` lost their run with the old process and are
    /// marked as errors; `queued` jobs are dispatched again, oldest first.
    /// Must run before the server accepts requests.
    pub async fn recover(&self) -> Result<Vec<JoinHandle<()>>, sqlx::Error> {
        let pool = self.runner.pool();

        let interrupted = job_repository::fail_interrupted(pool, INTERRUPTED_MESSAGE).await?;
        if interrupted > 0 {
            warn!("Marked {} interrupted job(s) as failed", interrupted);
        }

        let queued = job_repository::find_by_status(pool, JobStatus::Queued).await?;

        Ok(queued
            .into_iter()
            .map(|job| {
                self.dispatch(RunRequest {
                    job_id: job.id,
                    force_redownload: false,
                })
            })
            .collect())
    }
}
