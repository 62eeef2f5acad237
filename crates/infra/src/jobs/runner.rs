//! In-process job registry and launcher.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use ledgerbatch_core::BusinessDate;

use super::job::Job;
use super::store::{JobRunStore, JobRunStoreError};
use super::types::{IllegalRunTransition, JobRun, JobRunStatus};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("job run store: {0}")]
    Store(#[from] JobRunStoreError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalRunTransition),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job '{0}' is already registered")]
pub struct DuplicateJob(pub String);

/// Registry of jobs plus the run history they write to.
///
/// Each launch allocates a fresh run id from the store, records the run as
/// `Created`, then `Running`, then its terminal status. Two runs of the same
/// job never overlap within one runner.
pub struct JobRunner<S: JobRunStore> {
    store: S,
    jobs: BTreeMap<String, Arc<Job>>,
    running: Mutex<HashSet<String>>,
}

impl<S: JobRunStore> JobRunner<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            jobs: BTreeMap::new(),
            running: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(&mut self, job: Job) -> Result<(), DuplicateJob> {
        let name = job.name().to_string();
        if self.jobs.contains_key(&name) {
            return Err(DuplicateJob(name));
        }
        info!(job = %name, steps = ?job.step_names().collect::<Vec<_>>(), "job registered");
        self.jobs.insert(name, Arc::new(job));
        Ok(())
    }

    /// Registered job names, sorted.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, job_name: &str) -> bool {
        self.jobs.contains_key(job_name)
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(job_name)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `job_name` for `business_date` on the calling thread.
    ///
    /// Returns the finished run, which may be `Failed`; an `Err` means the
    /// run could not be launched or recorded at all.
    pub fn launch(&self, job_name: &str, business_date: BusinessDate) -> Result<JobRun, LaunchError> {
        let job = self
            .jobs
            .get(job_name)
            .ok_or_else(|| LaunchError::UnknownJob(job_name.to_string()))?;

        let _guard = RunningGuard::acquire(&self.running, job_name).ok_or_else(|| {
            warn!(job = %job_name, "launch refused; previous run still running");
            LaunchError::AlreadyRunning(job_name.to_string())
        })?;

        let run_id = self.store.next_run_id()?;
        let mut run = JobRun::new(job_name, run_id, business_date);
        self.store.insert(&run)?;

        run.mark_running()?;
        self.store.update(&run)?;

        job.execute_steps(&mut run);
        self.store.update(&run)?;

        info!(
            job = %job_name,
            run_id = %run.run_id,
            business_date = %business_date,
            status = ?run.status,
            "job run recorded"
        );
        Ok(run)
    }

    /// Most recent runs of `job_name`, newest first.
    pub fn history(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, LaunchError> {
        if !self.contains(job_name) {
            return Err(LaunchError::UnknownJob(job_name.to_string()));
        }
        Ok(self.store.list(job_name, limit)?)
    }

    /// Whether a run of `job_name` already completed for `business_date`.
    pub fn already_ran_on(
        &self,
        job_name: &str,
        business_date: BusinessDate,
    ) -> Result<bool, LaunchError> {
        Ok(self
            .store
            .runs_on(job_name, business_date)?
            .iter()
            .any(|r| r.status == JobRunStatus::Completed))
    }
}

/// Marks a job name as running until dropped.
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    name: String,
}

impl<'a> RunningGuard<'a> {
    fn acquire(running: &'a Mutex<HashSet<String>>, name: &str) -> Option<Self> {
        let mut set = running.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            running,
            name: name.to_string(),
        })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}
