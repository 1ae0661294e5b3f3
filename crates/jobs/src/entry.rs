// crates/jobs/src/entry.rs
//! Dual-delivery storage for one job (§4.7 "Event delivery"): an
//! authoritative, capped `JobRecord` protected by a `RwLock` (the
//! "persistent snapshot") plus a `broadcast::Sender` for live subscribers
//! (the "live stream"). Grounded on `claude-view-server::jobs::state::JobState`,
//! generalized from one atomics-per-field struct to the full `JobRecord`
//! this system's event log needs to carry.

use std::sync::RwLock;

use tokio::sync::broadcast;

use scoutline_types::{JobRecord, JobStatus, ProgressEvent};

pub struct JobEntry {
    record: RwLock<JobRecord>,
    tx: broadcast::Sender<ProgressEvent>,
    max_events: usize,
}

impl JobEntry {
    pub fn new(record: JobRecord, max_events: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { record: RwLock::new(record), tx, max_events }
    }

    pub fn snapshot(&self) -> JobRecord {
        self.record.read().expect("job record lock poisoned").clone()
    }

    pub fn is_terminal(&self) -> bool {
        self.record.read().expect("job record lock poisoned").status.is_terminal()
    }

    pub fn set_running(&self) {
        let mut record = self.record.write().expect("job record lock poisoned");
        record.status = JobStatus::Running;
        record.started_at = Some(chrono::Utc::now());
    }

    pub fn finish(&self, result: serde_json::Value) {
        let mut record = self.record.write().expect("job record lock poisoned");
        record.status = JobStatus::Finished;
        record.result = Some(result);
        record.ended_at = Some(chrono::Utc::now());
    }

    pub fn fail(&self, error: impl Into<String>) {
        let mut record = self.record.write().expect("job record lock poisoned");
        record.status = JobStatus::Failed;
        record.error = Some(error.into());
        record.ended_at = Some(chrono::Utc::now());
    }

    /// Append to the capped event log and publish to the live channel
    /// (§4.7: "If pub/sub publish fails, the worker continues — the
    /// snapshot path is authoritative").
    pub fn push_event(&self, event: ProgressEvent) {
        {
            let mut record = self.record.write().expect("job record lock poisoned");
            record.events.push(event.clone());
            if record.events.len() > self.max_events {
                let overflow = record.events.len() - self.max_events;
                record.events.drain(0..overflow);
            }
        }
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(uuid::Uuid::nil(), "default", serde_json::json!({}))
    }

    #[test]
    fn caps_events_at_max_keeping_most_recent() {
        let entry = JobEntry::new(record(), 2);
        for i in 0..5 {
            entry.push_event(ProgressEvent::new(format!("STAGE_{i}"), serde_json::json!({})));
        }
        let snapshot = entry.snapshot();
        assert_eq!(snapshot.events.len(), 2);
        assert_eq!(snapshot.events[0].stage, "STAGE_3");
        assert_eq!(snapshot.events[1].stage, "STAGE_4");
    }

    #[test]
    fn lifecycle_transitions_set_timestamps() {
        let entry = JobEntry::new(record(), 10);
        assert!(entry.snapshot().started_at.is_none());
        entry.set_running();
        assert!(entry.snapshot().started_at.is_some());
        entry.finish(serde_json::json!({"ok": true}));
        assert!(entry.is_terminal());
        assert!(entry.snapshot().ended_at.is_some());
    }
}
