//! Batch job engine.
//!
//! ## Design
//!
//! - A `Tasklet` is one idempotent unit of work that stages writes in a
//!   `Transaction`
//! - A `Step` runs one tasklet inside one transaction: commit on success,
//!   discard on failure
//! - A `Job` is a fixed, ordered sequence of uniquely named steps; the first
//!   failing step stops it and earlier commits stay
//! - Every run gets a fresh, strictly increasing `RunId`, including retries
//!   after a failure
//!
//! ## Components
//!
//! - `JobRunner`: registry, run-id allocation, history, same-name guard
//! - `JobRunStore`: run history (in-memory for tests/dev)
//! - `JobScheduler`: background thread launching registered jobs per tick
//! - `tasklets`: running-balance recomputation and dormancy classification

pub mod job;
pub mod runner;
pub mod scheduler;
pub mod step;
pub mod store;
pub mod tasklet;
pub mod tasklets;
pub mod types;

pub use job::{Job, JobBuilder, JobDefinitionError, JobStart};
pub use runner::{DuplicateJob, JobRunner, LaunchError};
pub use scheduler::{
    BusinessDateProvider, FixedBusinessDate, JobScheduler, JobSchedulerConfig, JobSchedulerHandle,
    SchedulerStats, SystemBusinessDate,
};
pub use step::{Step, StepFailure};
pub use store::{InMemoryJobRunStore, JobRunStats, JobRunStore, JobRunStoreError};
pub use tasklet::{StepContext, Tasklet, TaskletError};
pub use tasklets::{
    dormant_accounts_job, running_balance_job, AccountScope, DormantAccountsTasklet,
    RunningBalanceUpdateTasklet, DORMANT_ACCOUNTS_JOB, RUNNING_BALANCE_JOB,
};
pub use types::{
    FailureKind, IllegalRunTransition, JobRun, JobRunStatus, RunFailure, RunId, StepContribution,
    StepExecution, StepStatus,
};
