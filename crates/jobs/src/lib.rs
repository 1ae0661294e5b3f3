// crates/jobs/src/lib.rs
//! Background job runtime & event bus (C7, §4.7).

pub mod config;
pub mod entry;
pub mod runner;

pub use config::JobRunnerConfig;
pub use runner::{JobRunner, JobSubscription, ProgressSink};
