// crates/brightdata/src/worker.rs
//! Vendor refresh worker (C2, §4.2): group handles by platform, chunk, fan
//! out in bounded parallel, match vendor rows back to handles by a
//! candidate-key set. Grounded on `image_refresh_worker.py`'s
//! `ImageRefreshWorker.refresh_profiles`/`results_from_dataframe` and
//! `brightdata_client.py`'s `dataframe_to_profile_map`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use scoutline_core::pipeline::{ProgressSink, VendorRefreshBackend, VendorRefreshOutcome};
use scoutline_core::ExternalError;
use scoutline_types::{CanonicalProfile, Platform, ProgressEvent};

use crate::client::{BrightDataClient, BrightDataConfig};
use crate::error::BrightDataError;

pub struct BrightDataWorker {
    http: reqwest::Client,
    config: BrightDataConfig,
    dataset_ids: HashMap<Platform, String>,
}

impl BrightDataWorker {
    pub fn new(http: reqwest::Client, config: BrightDataConfig, dataset_ids: HashMap<Platform, String>) -> Self {
        Self { http, config, dataset_ids }
    }

    fn client_for(&self, platform: Platform) -> Result<BrightDataClient, BrightDataError> {
        if self.config.api_key.is_empty() {
            return Err(BrightDataError::Config("vendor api key is not set".into()));
        }
        let dataset_id = self
            .dataset_ids
            .get(&platform)
            .cloned()
            .ok_or_else(|| BrightDataError::Config(format!("no dataset id configured for {platform}")))?;
        Ok(BrightDataClient::new(self.http.clone(), self.config.clone(), dataset_id))
    }

    /// Equivalent to a one-handle refresh (§4.2 "Single-profile path").
    pub async fn fetch_single(&self, username: &str, platform: Platform) -> Result<HandleResult, BrightDataError> {
        let handle = normalize_handle(username);
        if handle.is_empty() {
            return Err(BrightDataError::InvalidInput("username is required".into()));
        }
        let client = self.client_for(platform)?;
        let url = profile_url(&handle, platform);
        let (_, csv) = client.refresh_urls(&[url]).await?;
        let records = parse_csv(&csv)?;
        let profile_map = build_profile_map(&records);
        Ok(match_handle(&handle, platform, &profile_map))
    }
}

#[async_trait]
impl VendorRefreshBackend for BrightDataWorker {
    async fn refresh(
        &self,
        mut profiles: Vec<CanonicalProfile>,
        progress: &ProgressSink,
    ) -> Result<VendorRefreshOutcome, ExternalError> {
        let handles: Vec<(usize, String, Platform)> = profiles
            .iter()
            .enumerate()
            .filter_map(|(idx, p)| {
                let platform = p.platform?;
                let handle = normalize_handle(&p.username);
                (!handle.is_empty()).then_some((idx, handle, platform))
            })
            .collect();

        if handles.is_empty() {
            return Err(BrightDataError::InvalidInput("at least one profile handle is required".into()).into());
        }

        // `BTreeMap<Platform, _>` already iterates in `Platform`'s `Ord`
        // order, which is declaration order (Instagram, Tiktok) — already
        // alphabetical, satisfying the "deterministic (alphabetical) order"
        // requirement without a separate sort.
        let mut grouped: BTreeMap<Platform, Vec<(usize, String)>> = BTreeMap::new();
        for (idx, handle, platform) in handles {
            grouped.entry(platform).or_default().push((idx, handle));
        }

        let mut success_keys = HashSet::new();
        let mut platform_summaries = serde_json::Map::new();

        for (platform, entries) in grouped {
            let client = self.client_for(platform).map_err(ExternalError::from)?;
            let max_urls = self.config.max_urls_per_request.max(1);
            let chunks: Vec<Vec<(usize, String)>> = entries.chunks(max_urls).map(|c| c.to_vec()).collect();
            let total_chunks = chunks.len();
            let total_profiles = entries.len();

            progress(ProgressEvent::new(
                "PLATFORM_STARTED",
                json!({ "platform": platform.as_str(), "chunks": total_chunks, "totalProfiles": total_profiles }),
            ));
            for (i, _) in chunks.iter().enumerate() {
                progress(ProgressEvent::new(
                    "CHUNK_STARTED",
                    json!({
                        "platform": platform.as_str(),
                        "chunkIndex": i + 1,
                        "chunkSize": chunks[i].len(),
                        "totalChunks": total_chunks,
                    }),
                ));
            }

            let permits = total_chunks.min(self.config.max_workers).max(1);
            let semaphore = Arc::new(Semaphore::new(permits));
            let client = Arc::new(client);
            let mut join_set: JoinSet<ChunkOutcome> = JoinSet::new();

            for (zero_based, chunk) in chunks.into_iter().enumerate() {
                let semaphore = Arc::clone(&semaphore);
                let client = Arc::clone(&client);
                let chunk_index = zero_based + 1;
                join_set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    run_chunk(client, platform, chunk_index, chunk).await
                });
            }

            let mut snapshots = Vec::new();
            let mut completed = 0usize;
            while let Some(joined) = join_set.join_next().await {
                let outcome = joined.unwrap_or_else(|join_err| ChunkOutcome {
                    chunk_index: 0,
                    chunk_size: 0,
                    snapshot_id: None,
                    results: Vec::new(),
                    error: Some(format!("chunk task panicked: {join_err}")),
                });
                completed += 1;

                if let Some(ref snapshot_id) = outcome.snapshot_id {
                    snapshots.push(snapshot_id.clone());
                }

                progress(ProgressEvent::new(
                    "CHUNK_FINISHED",
                    json!({
                        "platform": platform.as_str(),
                        "chunkIndex": outcome.chunk_index,
                        "completedChunks": completed,
                        "totalChunks": total_chunks,
                        "chunkSize": outcome.chunk_size,
                        "snapshotId": outcome.snapshot_id,
                        "error": outcome.error,
                    }),
                ));

                for result in &outcome.results {
                    if result.success {
                        success_keys.insert(format!("{}:{}", platform.as_str(), result.username.to_lowercase()));
                        if let Some(idx) = index_for(&profiles, &result.username, platform) {
                            if let Some(image_url) = &result.profile_image_url {
                                profiles[idx].profile_image_url = image_url.clone();
                            }
                        }
                        progress(ProgressEvent::new(
                            "BRIGHTDATA_PROFILE_COMPLETED",
                            json!({ "platform": platform.as_str(), "account": result.username }),
                        ));
                    } else {
                        progress(ProgressEvent::new(
                            "BRIGHTDATA_PROFILE_FAILED",
                            json!({ "platform": platform.as_str(), "account": result.username, "error": result.error }),
                        ));
                    }
                }
            }

            progress(ProgressEvent::new(
                "PLATFORM_FINISHED",
                json!({ "platform": platform.as_str(), "chunks": total_chunks, "snapshots": snapshots, "totalProfiles": total_profiles }),
            ));
            platform_summaries.insert(platform.as_str().to_string(), json!({ "snapshots": snapshots }));
        }

        Ok(VendorRefreshOutcome {
            enriched: profiles,
            success_keys,
            debug: serde_json::Value::Object(platform_summaries),
        })
    }
}

pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub chunk_size: usize,
    pub snapshot_id: Option<String>,
    pub results: Vec<HandleResult>,
    pub error: Option<String>,
}

async fn run_chunk(
    client: Arc<BrightDataClient>,
    platform: Platform,
    chunk_index: usize,
    chunk: Vec<(usize, String)>,
) -> ChunkOutcome {
    let chunk_size = chunk.len();
    let urls: Vec<String> = chunk.iter().map(|(_, handle)| profile_url(handle, platform)).collect();

    match client.refresh_urls(&urls).await {
        Ok((snapshot_id, csv)) => match parse_csv(&csv) {
            Ok(records) => {
                let profile_map = build_profile_map(&records);
                let results = chunk
                    .iter()
                    .map(|(_, handle)| match_handle(handle, platform, &profile_map))
                    .collect();
                ChunkOutcome { chunk_index, chunk_size, snapshot_id: Some(snapshot_id), results, error: None }
            }
            Err(e) => failed_chunk(chunk_index, &chunk, platform, e.to_string()),
        },
        // §4.2 "Failure policy": a chunk failure aborts that chunk only.
        Err(e) => failed_chunk(chunk_index, &chunk, platform, e.to_string()),
    }
}

fn failed_chunk(chunk_index: usize, chunk: &[(usize, String)], _platform: Platform, message: String) -> ChunkOutcome {
    let results = chunk
        .iter()
        .map(|(_, handle)| HandleResult {
            username: handle.clone(),
            success: false,
            profile_image_url: None,
            error: Some(message.clone()),
        })
        .collect();
    ChunkOutcome {
        chunk_index,
        chunk_size: chunk.len(),
        snapshot_id: None,
        results,
        error: Some(message),
    }
}

fn index_for(profiles: &[CanonicalProfile], username: &str, platform: Platform) -> Option<usize> {
    profiles
        .iter()
        .position(|p| p.platform == Some(platform) && normalize_handle(&p.username) == username)
}

#[derive(Debug, Clone)]
pub struct HandleResult {
    pub username: String,
    pub success: bool,
    pub profile_image_url: Option<String>,
    pub error: Option<String>,
}

pub fn normalize_handle(value: &str) -> String {
    value.trim().trim_start_matches('@').to_string()
}

pub fn profile_url(handle: &str, platform: Platform) -> String {
    match platform {
        Platform::Tiktok => format!("https://www.tiktok.com/@{handle}"),
        Platform::Instagram => format!("https://www.instagram.com/{handle}"),
    }
}

/// Candidate keys for matching a vendor record to a handle: the lowercase
/// handle itself plus both `instagram.com`/`tiktok.com` URL variants with
/// and without `www.` (§4.2 step 3e). The vendor only ever serves one
/// platform per dataset, but we build both variants since a handle can
/// collide across platforms and the row itself carries no scheme hint.
fn build_candidate_keys(handle: &str) -> Vec<String> {
    let handle = handle.to_lowercase();
    vec![
        handle.clone(),
        format!("https://instagram.com/{handle}"),
        format!("https://www.instagram.com/{handle}"),
        format!("https://tiktok.com/@{handle}"),
        format!("https://www.tiktok.com/@{handle}"),
    ]
}

type VendorRow = HashMap<String, String>;

fn parse_csv(csv_text: &str) -> Result<Vec<VendorRow>, BrightDataError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(csv_text.as_bytes());
    let mut rows = Vec::new();
    for record in reader.deserialize::<VendorRow>() {
        let row = record.map_err(|e| BrightDataError::Vendor(ExternalError::Permanent {
            service: "brightdata-snapshot",
            message: format!("csv parse error: {e}"),
        }))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Grounded on `dataframe_to_profile_map`: key by `profile_url`/`url` and by
/// `account`/`username` plus the constructed URL variants, first match wins.
fn build_profile_map(rows: &[VendorRow]) -> HashMap<String, &VendorRow> {
    let mut map: HashMap<String, &VendorRow> = HashMap::new();
    for row in rows {
        let profile_url = row.get("profile_url").or_else(|| row.get("url"));
        let account = row.get("account").or_else(|| row.get("username"));

        let mut keys = Vec::new();
        if let Some(url) = profile_url {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                keys.push(trimmed.to_lowercase());
            }
        }
        if let Some(acc) = account {
            let handle = acc.trim().trim_start_matches('@');
            if !handle.is_empty() {
                keys.extend(build_candidate_keys(handle));
            }
        }

        for key in keys {
            map.entry(key).or_insert(row);
        }
    }
    map
}

const PROFILE_IMAGE_KEYS: &[&str] = &[
    "profile_image_url",
    "profile_image_link",
    "profile_pic_url_hd",
    "profile_pic_url",
    "profile_picture",
    "profile_pic",
    "picture",
    "avatar",
];

fn extract_profile_image(row: &VendorRow) -> Option<String> {
    PROFILE_IMAGE_KEYS.iter().find_map(|key| row.get(*key).filter(|v| !v.is_empty()).cloned())
}

fn match_handle(handle: &str, _platform: Platform, profile_map: &HashMap<String, &VendorRow>) -> HandleResult {
    let candidates = build_candidate_keys(handle);
    let matched = candidates.iter().find_map(|key| profile_map.get(key).copied());

    match matched {
        None => HandleResult {
            username: handle.to_string(),
            success: false,
            profile_image_url: None,
            error: Some("Profile not returned by BrightData".into()),
        },
        Some(row) => {
            let warning = row.get("warning").filter(|v| !v.is_empty());
            let warning_code = row.get("warning_code").filter(|v| !v.is_empty());
            if warning.is_some() || warning_code.is_some() {
                let message = warning
                    .or(warning_code)
                    .cloned()
                    .unwrap_or_else(|| "BrightData reported a warning".into());
                return HandleResult { username: handle.to_string(), success: false, profile_image_url: None, error: Some(message) };
            }
            HandleResult {
                username: handle.to_string(),
                success: true,
                profile_image_url: extract_profile_image(row),
                error: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> VendorRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn normalize_handle_strips_at_and_whitespace() {
        assert_eq!(normalize_handle(" @alice "), "alice");
        assert_eq!(normalize_handle("bob"), "bob");
    }

    #[test]
    fn profile_url_uses_platform_specific_template() {
        assert_eq!(profile_url("alice", Platform::Instagram), "https://www.instagram.com/alice");
        assert_eq!(profile_url("alice", Platform::Tiktok), "https://www.tiktok.com/@alice");
    }

    #[test]
    fn matches_by_account_field_case_insensitively() {
        let rows = vec![row(&[("account", "@Alice"), ("profile_pic_url", "https://cdn/x.jpg")])];
        let map = build_profile_map(&rows);
        let result = match_handle("alice", Platform::Instagram, &map);
        assert!(result.success);
        assert_eq!(result.profile_image_url.as_deref(), Some("https://cdn/x.jpg"));
    }

    #[test]
    fn matches_by_profile_url_field() {
        let rows = vec![row(&[("profile_url", "https://www.instagram.com/bob"), ("profile_image_url", "https://cdn/y.jpg")])];
        let map = build_profile_map(&rows);
        let result = match_handle("bob", Platform::Instagram, &map);
        assert!(result.success);
    }

    #[test]
    fn warning_on_matched_row_is_a_failure() {
        let rows = vec![row(&[("account", "carol"), ("warning", "private account")])];
        let map = build_profile_map(&rows);
        let result = match_handle("carol", Platform::Instagram, &map);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("private account"));
    }

    #[test]
    fn unmatched_handle_is_not_returned_failure() {
        let map = HashMap::new();
        let result = match_handle("dave", Platform::Instagram, &map);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Profile not returned by BrightData"));
    }

    #[test]
    fn profile_image_priority_list_picks_first_present() {
        let r = row(&[("profile_pic_url", "a"), ("avatar", "b")]);
        assert_eq!(extract_profile_image(&r).as_deref(), Some("a"));
    }

    #[test]
    fn build_candidate_keys_includes_both_platform_url_variants() {
        let keys = build_candidate_keys("alice");
        assert!(keys.contains(&"https://instagram.com/alice".to_string()));
        assert!(keys.contains(&"https://www.tiktok.com/@alice".to_string()));
    }

    // §4.2 scenario: 7 handles, MAX_URLS_PER_REQUEST=3 chunks into [3, 3, 1],
    // each chunk completing independently and the summary counting all 7.
    #[tokio::test]
    async fn refresh_chunks_seven_handles_into_three_three_one() {
        use std::time::Duration;

        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/trigger"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "snapshot_id": "snap1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/progress/snap1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ready" })))
            .mount(&server)
            .await;
        let csv_rows: Vec<String> = (1..=7).map(|i| format!("alice{i},https://cdn/img{i}.jpg")).collect();
        let csv_body = format!("account,profile_image_url\n{}\n", csv_rows.join("\n"));
        Mock::given(method("GET"))
            .and(path("/snapshot/snap1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(csv_body))
            .mount(&server)
            .await;

        let config = BrightDataConfig {
            api_key: "key".into(),
            base_url: server.uri(),
            poll_interval: Duration::from_millis(1),
            max_urls_per_request: 3,
            max_workers: 8,
        };
        let mut dataset_ids = HashMap::new();
        dataset_ids.insert(Platform::Instagram, "ds1".to_string());
        let worker = BrightDataWorker::new(reqwest::Client::new(), config, dataset_ids);

        let profiles: Vec<CanonicalProfile> = (1..=7)
            .map(|i| CanonicalProfile {
                platform: Some(Platform::Instagram),
                username: format!("alice{i}"),
                ..Default::default()
            })
            .collect();

        let events = Arc::new(std::sync::Mutex::new(Vec::new()));
        let events_clone = Arc::clone(&events);
        let progress: Arc<ProgressSink> = Arc::new(move |e| events_clone.lock().unwrap().push(e));

        let outcome = worker.refresh(profiles, &*progress).await.expect("refresh succeeds against mocked vendor");
        assert_eq!(outcome.success_keys.len(), 7);

        let events = events.lock().unwrap();
        let platform_started = events.iter().find(|e| e.stage == "PLATFORM_STARTED").expect("PLATFORM_STARTED emitted");
        assert_eq!(platform_started.data["totalProfiles"], 7);
        assert_eq!(platform_started.data["chunks"], 3);

        let mut chunk_sizes: Vec<u64> = events
            .iter()
            .filter(|e| e.stage == "CHUNK_STARTED")
            .map(|e| e.data["chunkSize"].as_u64().unwrap())
            .collect();
        chunk_sizes.sort_unstable();
        assert_eq!(chunk_sizes, vec![1, 3, 3]);

        let finished_count = events.iter().filter(|e| e.stage == "CHUNK_FINISHED").count();
        assert_eq!(finished_count, 3);

        let platform_finished =
            events.iter().find(|e| e.stage == "PLATFORM_FINISHED").expect("PLATFORM_FINISHED emitted");
        assert_eq!(platform_finished.data["totalProfiles"], 7);
        assert_eq!(platform_finished.data["snapshots"].as_array().unwrap().len(), 3);
    }
}
