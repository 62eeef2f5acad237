//! Job: an ordered, named sequence of steps.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};

use ledgerbatch_core::BusinessDate;

use super::step::Step;
use super::types::{JobRun, RunFailure, RunId};
use crate::store::TransactionManager;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobDefinitionError {
    #[error("job '{job}' declares step '{step}' more than once")]
    DuplicateStep { job: String, step: String },
}

pub struct Job {
    name: String,
    steps: Vec<Step>,
    transactions: Arc<dyn TransactionManager>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Begin a job definition; the first step is declared with
    /// [`JobStart::start`].
    pub fn builder(name: impl Into<String>, transactions: Arc<dyn TransactionManager>) -> JobStart {
        JobStart {
            name: name.into(),
            transactions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(Step::name)
    }

    /// Run every step in order under `run_id` and return the finished run.
    pub fn run(&self, run_id: RunId, business_date: BusinessDate) -> JobRun {
        let mut run = JobRun::new(self.name.clone(), run_id, business_date);
        if let Err(e) = run.mark_running() {
            error!(job = %self.name, run_id = %run_id, error = %e, "could not start run");
            return run;
        }
        self.execute_steps(&mut run);
        run
    }

    /// Execute the steps against a run that is already `Running`.
    ///
    /// Stops at the first failing step and marks the run failed. Steps that
    /// committed before it stay committed.
    pub fn execute_steps(&self, run: &mut JobRun) {
        info!(
            job = %self.name,
            run_id = %run.run_id,
            business_date = %run.business_date,
            steps = self.steps.len(),
            "job run started"
        );

        for step in &self.steps {
            match step.execute(
                &self.name,
                run.run_id,
                run.business_date,
                self.transactions.as_ref(),
            ) {
                Ok(execution) => run.record_step(execution),
                Err(failure) => {
                    let kind = failure.error.kind();
                    run.record_step(failure.execution);
                    if let Err(e) = run.mark_failed(RunFailure {
                        step_name: step.name().to_string(),
                        kind,
                    }) {
                        error!(job = %self.name, run_id = %run.run_id, error = %e, "could not fail run");
                    }
                    error!(
                        job = %self.name,
                        run_id = %run.run_id,
                        step = %step.name(),
                        kind = kind.as_str(),
                        "job run failed"
                    );
                    return;
                }
            }
        }

        if let Err(e) = run.mark_completed() {
            error!(job = %self.name, run_id = %run.run_id, error = %e, "could not complete run");
            return;
        }
        info!(
            job = %self.name,
            run_id = %run.run_id,
            duration_ms = run.duration_ms().unwrap_or_default(),
            "job run completed"
        );
    }
}

/// A job definition with no steps yet.
pub struct JobStart {
    name: String,
    transactions: Arc<dyn TransactionManager>,
}

impl JobStart {
    /// First step of the job.
    pub fn start(self, step: Step) -> JobBuilder {
        JobBuilder {
            name: self.name,
            steps: vec![step],
            transactions: self.transactions,
        }
    }
}

/// A job definition with at least one step.
pub struct JobBuilder {
    name: String,
    steps: Vec<Step>,
    transactions: Arc<dyn TransactionManager>,
}

impl JobBuilder {
    /// Append a step after the ones already declared.
    pub fn next(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> Result<Job, JobDefinitionError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(JobDefinitionError::DuplicateStep {
                    job: self.name.clone(),
                    step: step.name().to_string(),
                });
            }
        }
        Ok(Job {
            name: self.name,
            steps: self.steps,
            transactions: self.transactions,
        })
    }
}
