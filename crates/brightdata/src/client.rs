// crates/brightdata/src/client.rs
//! Low-level BrightData dataset API client: trigger a snapshot, poll it to
//! completion, download the result as CSV. Grounded on
//! `brightdata_client.py`'s `trigger_snapshot`/`wait_for_snapshot`/
//! `download_snapshot` (same three-call lifecycle, generalized off one
//! hardcoded dataset).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use scoutline_core::ExternalError;

#[derive(Debug, Clone)]
pub struct BrightDataConfig {
    pub api_key: String,
    pub base_url: String,
    pub poll_interval: Duration,
    /// §4.2 `MAX_URLS_PER_REQUEST`, default 50, must be ≥ 1.
    pub max_urls_per_request: usize,
    /// §4.2 `MAX_WORKERS` bound on per-platform chunk fan-out.
    pub max_workers: usize,
}

impl Default for BrightDataConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.brightdata.com/datasets/v3".into(),
            poll_interval: Duration::from_secs(30),
            max_urls_per_request: 50,
            max_workers: 8,
        }
    }
}

#[derive(Serialize)]
struct TriggerRow<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct TriggerResponse {
    snapshot_id: String,
}

#[derive(Deserialize)]
struct ProgressResponse {
    status: String,
}

pub struct BrightDataClient {
    http: reqwest::Client,
    config: BrightDataConfig,
    dataset_id: String,
}

impl BrightDataClient {
    pub fn new(http: reqwest::Client, config: BrightDataConfig, dataset_id: String) -> Self {
        Self { http, config, dataset_id }
    }

    pub async fn trigger_snapshot(&self, urls: &[String]) -> Result<String, ExternalError> {
        let rows: Vec<TriggerRow<'_>> = urls.iter().map(|u| TriggerRow { url: u }).collect();
        let endpoint = format!("{}/trigger", self.config.base_url);
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .query(&[("dataset_id", self.dataset_id.as_str()), ("include_errors", "true")])
            .json(&rows)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = check_status(response, "brightdata-trigger").await?;
        let parsed: TriggerResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "brightdata-trigger", message: e.to_string() })?;
        Ok(parsed.snapshot_id)
    }

    pub async fn get_snapshot_status(&self, snapshot_id: &str) -> Result<String, ExternalError> {
        let endpoint = format!("{}/progress/{snapshot_id}", self.config.base_url);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = check_status(response, "brightdata-progress").await?;
        let parsed: ProgressResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::Permanent { service: "brightdata-progress", message: e.to_string() })?;
        Ok(parsed.status)
    }

    /// Poll every `poll_interval` until the snapshot reaches `ready` or
    /// `failed` (§4.2 step 3c).
    pub async fn wait_for_snapshot(&self, snapshot_id: &str) -> Result<(), ExternalError> {
        loop {
            let status = self.get_snapshot_status(snapshot_id).await?;
            match status.as_str() {
                "ready" => return Ok(()),
                "failed" => {
                    return Err(ExternalError::Permanent {
                        service: "brightdata-progress",
                        message: format!("snapshot {snapshot_id} failed"),
                    })
                }
                _ => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }

    pub async fn download_snapshot(&self, snapshot_id: &str) -> Result<String, ExternalError> {
        let endpoint = format!("{}/snapshot/{snapshot_id}", self.config.base_url);
        let response = self
            .http
            .get(&endpoint)
            .bearer_auth(&self.config.api_key)
            .query(&[("format", "csv")])
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let response = check_status(response, "brightdata-snapshot").await?;
        response
            .text()
            .await
            .map_err(|e| ExternalError::Permanent { service: "brightdata-snapshot", message: e.to_string() })
    }

    /// Trigger, poll, and download in one call — one chunk's worth of work
    /// (§4.2 step 3b-3d).
    pub async fn refresh_urls(&self, urls: &[String]) -> Result<(String, String), ExternalError> {
        let snapshot_id = self.trigger_snapshot(urls).await?;
        self.wait_for_snapshot(&snapshot_id).await?;
        let csv = self.download_snapshot(&snapshot_id).await?;
        Ok((snapshot_id, csv))
    }
}

async fn check_status(response: reqwest::Response, service: &'static str) -> Result<reqwest::Response, ExternalError> {
    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(ExternalError::Transient { service, message: format!("status {status}") });
    }
    if !status.is_success() {
        return Err(ExternalError::Permanent { service, message: format!("status {status}") });
    }
    Ok(response)
}

pub(crate) fn classify_reqwest_error(e: &reqwest::Error) -> ExternalError {
    if e.is_timeout() || e.is_connect() {
        ExternalError::Transient { service: "brightdata", message: e.to_string() }
    } else {
        ExternalError::Permanent { service: "brightdata", message: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = BrightDataConfig::default();
        assert_eq!(config.max_urls_per_request, 50);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }
}
