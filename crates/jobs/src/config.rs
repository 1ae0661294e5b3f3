// crates/jobs/src/config.rs
use std::time::Duration;

/// Runtime configuration for the job runner (§4.7, §6 "Environment").
#[derive(Debug, Clone)]
pub struct JobRunnerConfig {
    /// Fixed at configuration load (§4.7 "Scheduling model"). An enqueue to
    /// an unknown name falls back to `default`.
    pub queues: Vec<String>,
    pub default_timeout: Duration,
    /// How long a terminal job is retained before it becomes eligible for
    /// eviction (§4.7 "TTL"). spec.md leaves the exact number open; one
    /// hour balances "long enough to poll a result" against holding memory
    /// (see DESIGN.md Open Question decisions).
    pub result_ttl: Duration,
    /// Hard cap on retained job records, checked on every enqueue
    /// (§4.7 "TTL": "recommended 1000 per worker").
    pub max_retained_jobs: usize,
    /// Cap on `JobRecord.events` (§4.7 "Persistent snapshot").
    pub max_events_per_job: usize,
}

impl Default for JobRunnerConfig {
    fn default() -> Self {
        Self {
            queues: vec!["default".into(), "search".into(), "pipeline".into()],
            default_timeout: Duration::from_secs(900),
            result_ttl: Duration::from_secs(3600),
            max_retained_jobs: 1000,
            max_events_per_job: 100,
        }
    }
}
