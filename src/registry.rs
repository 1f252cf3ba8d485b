//! Task registry: per-job lifecycle state for asynchronous polling
//!
//! Status transitions are monotonic along
//! `pending -> processing -> {completed | failed}`. Entries are written by
//! the single worker and read by any request handler; reads never block the
//! worker. Entries are kept for the process lifetime (no eviction).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the status is terminal
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Registry entry for one job
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Present iff the job failed
    pub error: Option<String>,
    /// Present iff the job completed
    pub result_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

/// Shared map of job id to lifecycle state
///
/// The mutators are worker-only and treat unknown ids or terminal jobs as
/// programmer errors: they panic rather than silently corrupting the state
/// machine. Request handlers use [`get`](Self::get) exclusively.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    jobs: Arc<DashMap<Uuid, Job>>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh job id and insert a `pending` entry
    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.insert(
            id,
            Job {
                id,
                status: JobStatus::Pending,
                error: None,
                result_path: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    /// Transition a pending job to `processing`
    ///
    /// # Panics
    /// Panics on an unknown id or a job already in a terminal state.
    pub fn set_processing(&self, id: Uuid) {
        self.transition(id, |job| {
            job.status = JobStatus::Processing;
        });
    }

    /// Transition a job to `completed`, recording its result location
    ///
    /// # Panics
    /// Panics on an unknown id or a job already in a terminal state.
    pub fn set_completed(&self, id: Uuid, result_path: PathBuf) {
        self.transition(id, |job| {
            job.status = JobStatus::Completed;
            job.result_path = Some(result_path);
        });
    }

    /// Transition a job to `failed`, recording the error description
    ///
    /// # Panics
    /// Panics on an unknown id or a job already in a terminal state.
    pub fn set_failed(&self, id: Uuid, error: String) {
        self.transition(id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        });
    }

    fn transition<F: FnOnce(&mut Job)>(&self, id: Uuid, apply: F) {
        let mut entry = self
            .jobs
            .get_mut(&id)
            .unwrap_or_else(|| panic!("registry transition on unknown job {id}"));
        assert!(
            !entry.status.is_terminal(),
            "registry transition on terminal job {id} ({:?})",
            entry.status
        );
        apply(&mut entry);
    }

    /// Snapshot of a job's state; `None` for unknown ids
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.get(&id).map(|entry| entry.value().clone())
    }

    /// Number of registered jobs (all states)
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
