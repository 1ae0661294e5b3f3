// crates/brightdata/src/lib.rs
//! Vendor refresh worker (C2, §4.2): BrightData-backed `VendorRefreshBackend`
//! for the pipeline orchestrator, plus an SSRF-guarded image fetch used when
//! proxying a refreshed `profile_image_url` back to a client.

pub mod client;
pub mod error;
pub mod ssrf;
pub mod worker;

pub use client::{BrightDataClient, BrightDataConfig};
pub use error::BrightDataError;
pub use worker::{BrightDataWorker, HandleResult};
