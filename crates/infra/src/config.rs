//! Batch configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

pub const DORMANCY_THRESHOLD_DAYS_VAR: &str = "LEDGERBATCH_DORMANCY_THRESHOLD_DAYS";
pub const RECOMPUTE_WORKERS_VAR: &str = "LEDGERBATCH_RECOMPUTE_WORKERS";
pub const SCHEDULE_INTERVAL_SECS_VAR: &str = "LEDGERBATCH_SCHEDULE_INTERVAL_SECS";
pub const SCHEDULER_ENABLED_VAR: &str = "LEDGERBATCH_SCHEDULER_ENABLED";
pub const BIND_ADDR_VAR: &str = "LEDGERBATCH_BIND_ADDR";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Days without activity after which an active account becomes dormant.
    pub dormancy_threshold_days: u32,
    /// Scoped worker threads used by the running-balance recomputation.
    pub recompute_workers: usize,
    pub schedule_interval: Duration,
    pub scheduler_enabled: bool,
    pub bind_addr: SocketAddr,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            dormancy_threshold_days: 300,
            recompute_workers: 1,
            schedule_interval: Duration::from_secs(86_400),
            scheduler_enabled: false,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl BatchConfig {
    /// Read the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let dormancy_threshold_days = parse(&lookup, DORMANCY_THRESHOLD_DAYS_VAR)?
            .unwrap_or(defaults.dormancy_threshold_days);

        let recompute_workers = match parse::<usize, _>(&lookup, RECOMPUTE_WORKERS_VAR)? {
            Some(0) => return Err(invalid(RECOMPUTE_WORKERS_VAR, "0", "must be at least 1")),
            Some(n) => n,
            None => defaults.recompute_workers,
        };

        let schedule_interval = match parse::<u64, _>(&lookup, SCHEDULE_INTERVAL_SECS_VAR)? {
            Some(0) => {
                return Err(invalid(SCHEDULE_INTERVAL_SECS_VAR, "0", "must be at least 1"));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.schedule_interval,
        };

        let scheduler_enabled = match lookup(SCHEDULER_ENABLED_VAR) {
            Some(raw) => parse_bool(SCHEDULER_ENABLED_VAR, &raw)?,
            None => defaults.scheduler_enabled,
        };

        let bind_addr = parse(&lookup, BIND_ADDR_VAR)?.unwrap_or(defaults.bind_addr);

        Ok(Self {
            dormancy_threshold_days,
            recompute_workers,
            schedule_interval,
            scheduler_enabled,
            bind_addr,
        })
    }

    pub fn with_dormancy_threshold_days(mut self, days: u32) -> Self {
        self.dormancy_threshold_days = days;
        self
    }

    pub fn with_recompute_workers(mut self, workers: usize) -> Self {
        self.recompute_workers = workers.max(1);
        self
    }

    pub fn with_schedule_interval(mut self, interval: Duration) -> Self {
        self.schedule_interval = interval;
        self
    }

    pub fn with_scheduler_enabled(mut self, enabled: bool) -> Self {
        self.scheduler_enabled = enabled;
        self
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(var, &raw, e)),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, raw, "expected a boolean")),
    }
}
