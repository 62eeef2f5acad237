//! Infrastructure layer: job engine, stores, tasklets, config, error mapping.

pub mod config;
pub mod errors;
pub mod jobs;
pub mod store;


pub use config::{BatchConfig, ConfigError};
pub use errors::GeneralError;
