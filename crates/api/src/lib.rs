//! HTTP API: on-demand job launch and run history over the batch engine.

pub mod app;
