//! `ledgerbatch-core`: shared building blocks.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod date;
pub mod error;
pub mod id;

pub use date::BusinessDate;
pub use error::DomainError;
pub use id::AccountId;
