//! Background scheduler that launches registered jobs on a fixed interval.

use std::io;
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info};

use ledgerbatch_core::BusinessDate;

use super::runner::{JobRunner, LaunchError};
use super::store::JobRunStore;
use super::types::JobRunStatus;

/// Source of the business date a scheduled run is stamped with.
pub trait BusinessDateProvider: Send + Sync {
    fn business_date(&self) -> BusinessDate;
}

/// Always the same date. Used in tests and for catch-up runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedBusinessDate(pub BusinessDate);

impl BusinessDateProvider for FixedBusinessDate {
    fn business_date(&self) -> BusinessDate {
        self.0
    }
}

/// Today's UTC calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBusinessDate;

impl BusinessDateProvider for SystemBusinessDate {
    fn business_date(&self) -> BusinessDate {
        BusinessDate::new(Utc::now().date_naive())
    }
}

impl<P> BusinessDateProvider for Arc<P>
where
    P: BusinessDateProvider + ?Sized,
{
    fn business_date(&self) -> BusinessDate {
        (**self).business_date()
    }
}

#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Time between ticks. The first tick fires immediately.
    pub interval: Duration,
    /// Thread name, also used in logs.
    pub name: String,
    /// Skip a job that already completed for the tick's business date.
    pub skip_if_already_ran: bool,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(86_400),
            name: "job-scheduler".to_string(),
            skip_if_already_ran: true,
        }
    }
}

impl JobSchedulerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_skip_if_already_ran(mut self, skip: bool) -> Self {
        self.skip_if_already_ran = skip;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_skipped: u64,
    pub launch_errors: u64,
    pub uptime_secs: u64,
}

/// Handle to a running scheduler thread.
#[derive(Debug)]
pub struct JobSchedulerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl JobSchedulerHandle {
    /// Stop after the current tick and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

pub struct JobScheduler;

impl JobScheduler {
    /// Start the scheduler thread.
    pub fn spawn<S, P>(
        runner: Arc<JobRunner<S>>,
        config: JobSchedulerConfig,
        dates: P,
    ) -> io::Result<JobSchedulerHandle>
    where
        S: JobRunStore + 'static,
        P: BusinessDateProvider + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || {
                scheduler_loop(&runner, &config, &dates, shutdown_rx, &stats_clone);
            })?;

        Ok(JobSchedulerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn scheduler_loop<S: JobRunStore>(
    runner: &JobRunner<S>,
    config: &JobSchedulerConfig,
    dates: &dyn BusinessDateProvider,
    shutdown_rx: mpsc::Receiver<()>,
    stats: &Mutex<SchedulerStats>,
) {
    info!(
        scheduler = %config.name,
        interval_secs = config.interval.as_secs(),
        jobs = ?runner.job_names(),
        "job scheduler started"
    );
    let start_time = Instant::now();

    loop {
        tick(runner, config, dates.business_date(), stats);
        {
            let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match shutdown_rx.recv_timeout(config.interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(scheduler = %config.name, "job scheduler stopped");
}

fn tick<S: JobRunStore>(
    runner: &JobRunner<S>,
    config: &JobSchedulerConfig,
    business_date: BusinessDate,
    stats: &Mutex<SchedulerStats>,
) {
    debug!(scheduler = %config.name, business_date = %business_date, "scheduler tick");

    for job_name in runner.job_names() {
        let outcome = if config.skip_if_already_ran {
            runner.already_ran_on(job_name, business_date)
        } else {
            Ok(false)
        }
        .and_then(|ran| {
            if ran {
                Ok(None)
            } else {
                runner.launch(job_name, business_date).map(Some)
            }
        });

        let mut s = stats.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(None) => {
                debug!(job = %job_name, business_date = %business_date, "already ran; skipped");
                s.runs_skipped += 1;
            }
            Ok(Some(run)) if run.status == JobRunStatus::Completed => s.runs_completed += 1,
            Ok(Some(_)) => s.runs_failed += 1,
            Err(LaunchError::AlreadyRunning(_)) => s.runs_skipped += 1,
            Err(e) => {
                error!(job = %job_name, error = %e, "scheduled launch failed");
                s.launch_errors += 1;
            }
        }
    }

    stats.lock().unwrap_or_else(PoisonError::into_inner).ticks += 1;
}
