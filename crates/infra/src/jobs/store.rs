//! Job run history storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ledgerbatch_core::BusinessDate;

use super::types::{JobRun, JobRunStatus, RunId};

/// Persistence for job runs.
pub trait JobRunStore: Send + Sync {
    /// Allocate a fresh run id. Ids are unique and strictly increasing.
    fn next_run_id(&self) -> Result<RunId, JobRunStoreError>;

    /// Record a new run.
    fn insert(&self, run: &JobRun) -> Result<(), JobRunStoreError>;

    /// Replace a recorded run.
    fn update(&self, run: &JobRun) -> Result<(), JobRunStoreError>;

    fn get(&self, run_id: RunId) -> Result<Option<JobRun>, JobRunStoreError>;

    /// Runs of `job_name`, newest first.
    fn list(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, JobRunStoreError>;

    /// Latest run of `job_name`, if any.
    fn last_run(&self, job_name: &str) -> Result<Option<JobRun>, JobRunStoreError>;

    /// Runs of `job_name` for one business date, oldest first.
    fn runs_on(
        &self,
        job_name: &str,
        business_date: BusinessDate,
    ) -> Result<Vec<JobRun>, JobRunStoreError>;

    fn stats(&self, job_name: &str) -> Result<JobRunStats, JobRunStoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobRunStoreError {
    #[error("job run not found: {0}")]
    NotFound(RunId),
    #[error("job run already exists: {0}")]
    AlreadyExists(RunId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-job run counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobRunStats {
    pub created: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// In-memory run history for tests/dev.
#[derive(Debug)]
pub struct InMemoryJobRunStore {
    runs: RwLock<HashMap<RunId, JobRun>>,
    last_id: AtomicU64,
}

impl InMemoryJobRunStore {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            last_id: AtomicU64::new(0),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<RunId, JobRun>>, JobRunStoreError> {
        self.runs
            .read()
            .map_err(|_| JobRunStoreError::Storage("job run store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<RunId, JobRun>>, JobRunStoreError> {
        self.runs
            .write()
            .map_err(|_| JobRunStoreError::Storage("job run store lock poisoned".to_string()))
    }

    fn runs_of(&self, job_name: &str) -> Result<Vec<JobRun>, JobRunStoreError> {
        let runs = self.read()?;
        Ok(runs
            .values()
            .filter(|r| r.job_name == job_name)
            .cloned()
            .collect())
    }
}

impl Default for InMemoryJobRunStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunStore for InMemoryJobRunStore {
    fn next_run_id(&self) -> Result<RunId, JobRunStoreError> {
        Ok(RunId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn insert(&self, run: &JobRun) -> Result<(), JobRunStoreError> {
        let mut runs = self.write()?;
        if runs.contains_key(&run.run_id) {
            return Err(JobRunStoreError::AlreadyExists(run.run_id));
        }
        runs.insert(run.run_id, run.clone());
        Ok(())
    }

    fn update(&self, run: &JobRun) -> Result<(), JobRunStoreError> {
        let mut runs = self.write()?;
        match runs.get_mut(&run.run_id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(JobRunStoreError::NotFound(run.run_id)),
        }
    }

    fn get(&self, run_id: RunId) -> Result<Option<JobRun>, JobRunStoreError> {
        Ok(self.read()?.get(&run_id).cloned())
    }

    fn list(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, JobRunStoreError> {
        let mut result = self.runs_of(job_name)?;
        result.sort_by(|a, b| b.run_id.cmp(&a.run_id));
        result.truncate(limit);
        Ok(result)
    }

    fn last_run(&self, job_name: &str) -> Result<Option<JobRun>, JobRunStoreError> {
        Ok(self
            .runs_of(job_name)?
            .into_iter()
            .max_by_key(|r| r.run_id))
    }

    fn runs_on(
        &self,
        job_name: &str,
        business_date: BusinessDate,
    ) -> Result<Vec<JobRun>, JobRunStoreError> {
        let mut result: Vec<JobRun> = self
            .runs_of(job_name)?
            .into_iter()
            .filter(|r| r.business_date == business_date)
            .collect();
        result.sort_by_key(|r| r.run_id);
        Ok(result)
    }

    fn stats(&self, job_name: &str) -> Result<JobRunStats, JobRunStoreError> {
        let mut stats = JobRunStats::default();
        for run in self.runs_of(job_name)? {
            match run.status {
                JobRunStatus::Created => stats.created += 1,
                JobRunStatus::Running => stats.running += 1,
                JobRunStatus::Completed => stats.completed += 1,
                JobRunStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

impl<S> JobRunStore for Arc<S>
where
    S: JobRunStore + ?Sized,
{
    fn next_run_id(&self) -> Result<RunId, JobRunStoreError> {
        (**self).next_run_id()
    }

    fn insert(&self, run: &JobRun) -> Result<(), JobRunStoreError> {
        (**self).insert(run)
    }

    fn update(&self, run: &JobRun) -> Result<(), JobRunStoreError> {
        (**self).update(run)
    }

    fn get(&self, run_id: RunId) -> Result<Option<JobRun>, JobRunStoreError> {
        (**self).get(run_id)
    }

    fn list(&self, job_name: &str, limit: usize) -> Result<Vec<JobRun>, JobRunStoreError> {
        (**self).list(job_name, limit)
    }

    fn last_run(&self, job_name: &str) -> Result<Option<JobRun>, JobRunStoreError> {
        (**self).last_run(job_name)
    }

    fn runs_on(
        &self,
        job_name: &str,
        business_date: BusinessDate,
    ) -> Result<Vec<JobRun>, JobRunStoreError> {
        (**self).runs_on(job_name, business_date)
    }

    fn stats(&self, job_name: &str) -> Result<JobRunStats, JobRunStoreError> {
        (**self).stats(job_name)
    }
}
