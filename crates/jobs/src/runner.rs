// crates/jobs/src/runner.rs
//! Central job runner (C7, §4.7): enqueue, snapshot, and stream background
//! jobs. Grounded on `claude-view-server::jobs::runner::JobRunner` — same
//! `Arc<HashMap<Id, Arc<Entry>>>` shape and `tokio::spawn` plus
//! `tokio::time::timeout` wrapping, generalized so the job body reports
//! through a `ProgressEvent` sink instead of an atomics-counter `JobState`,
//! and cancellation is timeout-only rather than a `oneshot` handle (§4.7:
//! "The API has no user-initiated cancel operation in the core").

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

use scoutline_types::{EnqueueResponse, JobRecord, JobStatus, ProgressEvent};

use crate::config::JobRunnerConfig;
use crate::entry::JobEntry;

pub type ProgressSink = dyn Fn(ProgressEvent) + Send + Sync;

pub struct JobRunner {
    config: JobRunnerConfig,
    jobs: RwLock<HashMap<Uuid, Arc<JobEntry>>>,
    /// Enqueue order, used to find eviction candidates without scanning the
    /// whole map for timestamps on every sweep.
    order: RwLock<VecDeque<Uuid>>,
}

impl JobRunner {
    pub fn new(config: JobRunnerConfig) -> Self {
        Self { config, jobs: RwLock::new(HashMap::new()), order: RwLock::new(VecDeque::new()) }
    }

    /// §4.7 "an enqueue to an unknown name falls back to `default`".
    pub fn resolve_queue(&self, requested: &str) -> String {
        if self.config.queues.iter().any(|q| q == requested) {
            requested.to_string()
        } else {
            "default".to_string()
        }
    }

    /// Enqueue `work`, which receives a `ProgressSink` to report through and
    /// returns the job's final result payload. Runs under the runner's
    /// default timeout (§4.7 "Cancellation & timeout").
    pub fn enqueue<F, Fut>(&self, queue_name: &str, payload: serde_json::Value, work: F) -> EnqueueResponse
    where
        F: FnOnce(Arc<ProgressSink>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        self.sweep();

        let queue = self.resolve_queue(queue_name);
        let job_id = Uuid::new_v4();
        let record = JobRecord::new(job_id, queue.clone(), payload);
        let entry = Arc::new(JobEntry::new(record, self.config.max_events_per_job));

        self.jobs.write().expect("jobs lock poisoned").insert(job_id, Arc::clone(&entry));
        self.order.write().expect("order lock poisoned").push_back(job_id);

        let timeout = self.config.default_timeout;
        tokio::spawn(Self::drive(entry, timeout, work));

        EnqueueResponse { job_id, queue, status: JobStatus::Queued }
    }

    async fn drive<F, Fut>(entry: Arc<JobEntry>, timeout: std::time::Duration, work: F)
    where
        F: FnOnce(Arc<ProgressSink>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        entry.set_running();
        let sink: Arc<ProgressSink> = {
            let entry = Arc::clone(&entry);
            Arc::new(move |event: ProgressEvent| entry.push_event(event))
        };

        match tokio::time::timeout(timeout, work(sink)).await {
            Ok(Ok(result)) => entry.finish(result),
            Ok(Err(err)) => entry.fail(err),
            // §4.7 "On timeout the worker transitions the job to `failed`
            // with `error=\"timeout\"` and publishes a terminal event."
            Err(_) => {
                entry.push_event(ProgressEvent::new("JOB_TIMEOUT", serde_json::json!({})));
                entry.fail("timeout");
            }
        }
    }

    pub fn snapshot(&self, job_id: Uuid) -> Option<JobRecord> {
        let entry = self.jobs.read().expect("jobs lock poisoned").get(&job_id).cloned()?;
        Some(entry.snapshot())
    }

    /// History-then-live subscription for the SSE route (§4.7 "Live
    /// stream"; Open Question decision: drain history, then attach; if the
    /// job is already terminal, the caller should close immediately after
    /// replaying history since no further events will ever arrive).
    pub fn subscribe(&self, job_id: Uuid) -> Option<JobSubscription> {
        let entry = self.jobs.read().expect("jobs lock poisoned").get(&job_id).cloned()?;
        let receiver = entry.subscribe();
        let snapshot = entry.snapshot();
        Some(JobSubscription { history: snapshot.events, receiver, is_terminal: snapshot.status.is_terminal() })
    }

    /// Evict terminal jobs past their TTL, then trim to the retention cap
    /// if still over it (§4.7 "TTL").
    fn sweep(&self) {
        let now = chrono::Utc::now();
        let mut expired = Vec::new();
        {
            let jobs = self.jobs.read().expect("jobs lock poisoned");
            for (id, entry) in jobs.iter() {
                let snapshot = entry.snapshot();
                if let Some(ended_at) = snapshot.ended_at {
                    let age = now.signed_duration_since(ended_at);
                    if age.to_std().map(|d| d >= self.config.result_ttl).unwrap_or(false) {
                        expired.push(*id);
                    }
                }
            }
        }
        self.remove_many(&expired);

        let over = {
            let jobs = self.jobs.read().expect("jobs lock poisoned");
            jobs.len().saturating_sub(self.config.max_retained_jobs)
        };
        if over > 0 {
            let mut order = self.order.write().expect("order lock poisoned");
            let mut to_remove = Vec::with_capacity(over);
            // Only terminal jobs are eviction candidates; running jobs are
            // skipped in place rather than dequeued, so they're reconsidered
            // on the next sweep.
            let mut scanned = 0;
            while to_remove.len() < over && scanned < order.len() {
                if let Some(id) = order.get(scanned).copied() {
                    let terminal = self
                        .jobs
                        .read()
                        .expect("jobs lock poisoned")
                        .get(&id)
                        .map(|e| e.is_terminal())
                        .unwrap_or(true);
                    if terminal {
                        to_remove.push(id);
                    }
                }
                scanned += 1;
            }
            drop(order);
            self.remove_many(&to_remove);
        }
    }

    fn remove_many(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let mut jobs = self.jobs.write().expect("jobs lock poisoned");
        for id in ids {
            jobs.remove(id);
        }
        drop(jobs);
        let mut order = self.order.write().expect("order lock poisoned");
        order.retain(|id| !ids.contains(id));
    }
}

pub struct JobSubscription {
    pub history: Vec<ProgressEvent>,
    pub receiver: broadcast::Receiver<ProgressEvent>,
    pub is_terminal: bool,
}
