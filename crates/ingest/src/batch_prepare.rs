// crates/ingest/src/batch_prepare.rs
//! Step 1 — batch prepare (§4.8 step 1). Grounded on
//! `pipeline_batch_process.py`'s `prepare_batches`/`_write_chunk_jsonl`/
//! `_build_prompt`: assign stable `lance_db_id`s, partition into
//! `chunk_size`-row chunks, and write one newline-delimited JSON request
//! file per chunk with the prompt template interpolated per row.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use scoutline_types::ChunkMetadata;

use crate::error::IngestError;
use crate::state;

pub const DEFAULT_CHUNK_SIZE: usize = 20_000;
pub const CAPTIONS_TO_INSPECT: usize = 9;

pub struct ChunkInfo {
    pub index: u32,
    pub jsonl_path: PathBuf,
    pub row_count: usize,
}

#[derive(Serialize)]
struct RequestBody<'a> {
    model: &'a str,
    input: [RequestMessage<'a>; 1],
    text: RequestText,
    reasoning: RequestReasoning<'a>,
    store: bool,
}

#[derive(Serialize)]
struct RequestMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct RequestText {
    format: RequestFormat,
    verbosity: &'static str,
}

#[derive(Serialize)]
struct RequestFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct RequestReasoning<'a> {
    effort: &'a str,
}

#[derive(Serialize)]
struct RequestEnvelope<'a> {
    custom_id: String,
    method: &'static str,
    url: &'static str,
    body: RequestBody<'a>,
}

/// Assign `{namespace}_{idx:06}` ids to each row of `rows`, in order — the
/// ordering must match the row order the caller will later join labels
/// against (§4.8 step 1 "Assign stable lance_db_ids").
pub fn assign_lance_ids(namespace: &str, rows: &[HashMap<String, String>]) -> Vec<String> {
    (1..=rows.len()).map(|idx| format!("{namespace}_{idx:06}")).collect()
}

/// §4.8 step 1's per-row prompt context: `account`, `full_name`,
/// `biography`, `captions` (pipe-joined `Post: ... (Location: ...)`
/// strings), `post_locations`.
pub fn build_prompt(template: &str, row: &HashMap<String, String>) -> String {
    let mut caption_location_pairs = Vec::new();
    let mut location_summary: Vec<String> = Vec::new();

    if let Some(posts_raw) = row.get("posts").filter(|s| !s.is_empty()) {
        match serde_json::from_str::<Vec<serde_json::Value>>(posts_raw) {
            Ok(posts) => {
                for post in posts.iter().take(CAPTIONS_TO_INSPECT) {
                    let caption = post.get("caption").and_then(|c| c.as_str()).unwrap_or("").trim().to_string();
                    if caption.is_empty() {
                        continue;
                    }
                    let location_name = post
                        .get("location_name")
                        .and_then(|v| v.as_str())
                        .or_else(|| post.get("location").and_then(|l| l.get("name")).and_then(|v| v.as_str()))
                        .map(str::trim)
                        .filter(|s| !s.is_empty());

                    if let Some(location) = location_name {
                        if !location_summary.iter().any(|existing| existing == location) {
                            location_summary.push(location.to_string());
                        }
                        caption_location_pairs.push(format!("Post: {caption} (Location: {location})"));
                    } else {
                        caption_location_pairs.push(format!("Post: {caption} (Location: Unknown)"));
                    }
                }
            }
            Err(_) => {
                let trimmed: String = posts_raw.chars().take(200).collect();
                caption_location_pairs.push(format!("Post: {trimmed} (Location: Unknown)"));
            }
        }
    }

    let context: HashMap<&str, String> = HashMap::from([
        ("account", row.get("account").cloned().unwrap_or_default()),
        ("full_name", row.get("full_name").cloned().unwrap_or_default()),
        ("biography", row.get("biography").cloned().unwrap_or_default()),
        ("captions", caption_location_pairs.join(" | ")),
        ("post_locations", if location_summary.is_empty() { "Unknown".to_string() } else { location_summary.join(" | ") }),
    ]);

    interpolate(template, &context)
}

/// Replaces `{key}` placeholders with `context[key]`; a template referencing
/// an unknown key is returned unmodified, matching the original's
/// `str.format(**context)` → `KeyError` → raw-template fallback.
fn interpolate(template: &str, context: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut placeholder = String::new();
    let mut in_placeholder = false;

    while let Some(c) = chars.next() {
        if in_placeholder {
            if c == '}' {
                match context.get(placeholder.as_str()) {
                    Some(value) => out.push_str(value),
                    None => return template.to_string(),
                }
                placeholder.clear();
                in_placeholder = false;
            } else {
                placeholder.push(c);
            }
        } else if c == '{' {
            in_placeholder = true;
        } else {
            out.push(c);
        }
    }
    out
}

pub struct PrepareOptions {
    pub chunk_size: usize,
    pub model: String,
    pub reasoning_effort: String,
    pub force: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self { chunk_size: DEFAULT_CHUNK_SIZE, model: "gpt-5-nano".to_string(), reasoning_effort: "medium".to_string(), force: false }
    }
}

pub async fn prepare_batches(
    filtered_csv: &Path,
    output_dir: &Path,
    namespace: &str,
    prompt_template: &str,
    prompt_fingerprint: &str,
    source_hash: &str,
    options: &PrepareOptions,
) -> Result<Vec<ChunkInfo>, IngestError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| IngestError::Io { path: output_dir.display().to_string(), source })?;

    let mut reader = csv::Reader::from_path(filtered_csv)?;
    let headers = reader.headers()?.clone();

    let mut chunks = Vec::new();
    let mut chunk_rows: Vec<HashMap<String, String>> = Vec::new();
    let mut chunk_index = 1u32;

    for record in reader.records() {
        let record = record?;
        let row: HashMap<String, String> =
            headers.iter().zip(record.iter()).map(|(h, v)| (h.to_string(), v.to_string())).collect();
        chunk_rows.push(row);
        if chunk_rows.len() == options.chunk_size {
            chunks.push(
                write_chunk(output_dir, namespace, chunk_index, &chunk_rows, prompt_template, prompt_fingerprint, source_hash, options)
                    .await?,
            );
            chunk_rows.clear();
            chunk_index += 1;
        }
    }
    if !chunk_rows.is_empty() {
        chunks.push(write_chunk(output_dir, namespace, chunk_index, &chunk_rows, prompt_template, prompt_fingerprint, source_hash, options).await?);
    }

    Ok(chunks)
}

async fn write_chunk(
    output_dir: &Path,
    namespace: &str,
    chunk_index: u32,
    rows: &[HashMap<String, String>],
    prompt_template: &str,
    prompt_fingerprint: &str,
    source_hash: &str,
    options: &PrepareOptions,
) -> Result<ChunkInfo, IngestError> {
    let jsonl_path = output_dir.join(format!("{namespace}_batch_{chunk_index:03}.jsonl"));
    let metadata_path = output_dir.join(format!("{namespace}_batch_{chunk_index:03}.metadata.json"));

    if !options.force && state::file_exists(&jsonl_path).await && state::file_exists(&metadata_path).await {
        let metadata: ChunkMetadata = state::load_json(&metadata_path).await?;
        if metadata.row_count == rows.len() && metadata.prompt_fingerprint == prompt_fingerprint {
            return Ok(ChunkInfo { index: chunk_index, jsonl_path, row_count: rows.len() });
        }
    }

    let mut body = String::new();
    for row in rows {
        let lance_id = row.get("lance_db_id").cloned().unwrap_or_default();
        let prompt = build_prompt(prompt_template, row);
        let envelope = RequestEnvelope {
            custom_id: format!("profile-{lance_id}"),
            method: "POST",
            url: "/v1/responses",
            body: RequestBody {
                model: &options.model,
                input: [RequestMessage { kind: "message", role: "user", content: &prompt }],
                text: RequestText { format: RequestFormat { kind: "text" }, verbosity: "medium" },
                reasoning: RequestReasoning { effort: &options.reasoning_effort },
                store: true,
            },
        };
        body.push_str(&serde_json::to_string(&envelope)?);
        body.push('\n');
    }
    tokio::fs::write(&jsonl_path, body).await.map_err(|source| IngestError::Io { path: jsonl_path.display().to_string(), source })?;

    let metadata = ChunkMetadata {
        chunk_number: chunk_index,
        row_count: rows.len(),
        source_hash: source_hash.to_string(),
        prompt_fingerprint: prompt_fingerprint.to_string(),
    };
    state::save_json(&metadata_path, &metadata).await?;

    Ok(ChunkInfo { index: chunk_index, jsonl_path, row_count: rows.len() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequential_namespaced_ids() {
        let rows = vec![HashMap::new(), HashMap::new()];
        let ids = assign_lance_ids("acme", &rows);
        assert_eq!(ids, vec!["acme_000001", "acme_000002"]);
    }

    #[test]
    fn prompt_interpolates_known_context_keys() {
        let mut row = HashMap::new();
        row.insert("account".to_string(), "alice".to_string());
        row.insert("biography".to_string(), "hi".to_string());
        let prompt = build_prompt("Account: {account}, Bio: {biography}", &row);
        assert_eq!(prompt, "Account: alice, Bio: hi");
    }

    #[test]
    fn prompt_falls_back_to_raw_template_on_unknown_key() {
        let row = HashMap::new();
        let prompt = build_prompt("Unknown: {nonexistent}", &row);
        assert_eq!(prompt, "Unknown: {nonexistent}");
    }

    #[test]
    fn captions_join_with_location_or_unknown() {
        let mut row = HashMap::new();
        row.insert("posts".to_string(), serde_json::json!([{"caption": "hi there", "location_name": "Paris"}]).to_string());
        let prompt = build_prompt("{captions}", &row);
        assert_eq!(prompt, "Post: hi there (Location: Paris)");
    }

    #[tokio::test]
    async fn prepares_one_jsonl_chunk_per_chunk_size_rows() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("in.csv");
        tokio::fs::write(&csv_path, "lance_db_id,account,biography,posts\nns_000001,alice,hi,\nns_000002,bob,hey,\n").await.unwrap();

        let options = PrepareOptions { chunk_size: 1, ..Default::default() };
        let chunks = prepare_batches(&csv_path, &dir.path().join("out"), "ns", "{account}", "fp1", "hash1", &options).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].row_count, 1);
    }
}
