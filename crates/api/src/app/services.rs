//! Composition root: stores, jobs, runner and scheduler wiring.

use std::sync::Arc;

use anyhow::Context;

use ledgerbatch_infra::jobs::{
    dormant_accounts_job, running_balance_job, BusinessDateProvider, InMemoryJobRunStore,
    JobRunner, JobScheduler, JobSchedulerConfig, JobSchedulerHandle, SystemBusinessDate,
};
use ledgerbatch_infra::store::InMemoryLedgerDatabase;
use ledgerbatch_infra::BatchConfig;

pub type Runner = JobRunner<Arc<InMemoryJobRunStore>>;

/// Everything the HTTP handlers reach.
pub struct AppServices {
    pub config: BatchConfig,
    pub db: Arc<InMemoryLedgerDatabase>,
    pub runs: Arc<InMemoryJobRunStore>,
    pub runner: Arc<Runner>,
    pub dates: Arc<dyn BusinessDateProvider>,
}

/// Wire services over fresh in-memory stores and the system calendar.
pub fn build_services(config: BatchConfig) -> anyhow::Result<AppServices> {
    build_services_with(
        config,
        InMemoryLedgerDatabase::arc(),
        Arc::new(SystemBusinessDate),
    )
}

/// Wire services over an existing database and date provider.
pub fn build_services_with(
    config: BatchConfig,
    db: Arc<InMemoryLedgerDatabase>,
    dates: Arc<dyn BusinessDateProvider>,
) -> anyhow::Result<AppServices> {
    let runs = InMemoryJobRunStore::arc();
    let mut runner = JobRunner::new(runs.clone());

    runner.register(
        running_balance_job(db.clone(), db.clone(), db.clone(), config.recompute_workers)
            .context("defining running balance job")?,
    )?;
    runner.register(
        dormant_accounts_job(db.clone(), db.clone(), config.dormancy_threshold_days)
            .context("defining dormant accounts job")?,
    )?;

    tracing::info!(
        jobs = ?runner.job_names(),
        dormancy_threshold_days = config.dormancy_threshold_days,
        recompute_workers = config.recompute_workers,
        "batch services ready"
    );

    Ok(AppServices {
        config,
        db,
        runs,
        runner: Arc::new(runner),
        dates,
    })
}

impl AppServices {
    /// Start the background scheduler when the config enables it.
    pub fn start_scheduler(&self) -> anyhow::Result<Option<JobSchedulerHandle>> {
        if !self.config.scheduler_enabled {
            tracing::info!("scheduler disabled");
            return Ok(None);
        }
        let handle = JobScheduler::spawn(
            self.runner.clone(),
            JobSchedulerConfig::default().with_interval(self.config.schedule_interval),
            self.dates.clone(),
        )
        .context("spawning job scheduler thread")?;
        Ok(Some(handle))
    }
}
