// crates/ingest/src/language_filter.rs
//! Step 0 — language filter (§4.8 step 0). Grounded on
//! `pipeline_batch_process.py`'s `perform_language_filter`/
//! `_build_language_sample`/`_should_keep_row`: stream the input CSV,
//! keep a row unconditionally if its language sample is too short to judge,
//! otherwise keep iff the sample is detected as English, and cache the
//! result keyed by `{hash_of_input, version, batch_size}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use scoutline_types::{LanguageFilterMetadata, PostRecord};

use crate::error::IngestError;
use crate::state;

pub const CAPTION_SNIPPET_CHARS: usize = 50;
pub const DEFAULT_MIN_TEXT_CHARS: usize = 60;
pub const DEFAULT_LANGUAGE_BATCH_SIZE: usize = 1500;
pub const LANGUAGE_FILTER_VERSION: &str = "normalized-batching-v4";

/// Decides whether a language sample reads as English. A real implementation
/// (a loaded language-ID model) is pluggable at this boundary; the original
/// pipeline falls back to an always-English stub when its model dependency
/// isn't installed, and `HeuristicEnglishDetector` below is that same
/// fallback, generalized into a small stopword-overlap heuristic instead of
/// an unconditional `true`.
pub trait LanguageDetector: Send + Sync {
    fn is_english(&self, sample: &str) -> bool;
}

/// Stopword-overlap heuristic: English prose is dense in a closed set of
/// function words ("the", "and", "is", ...); a sample with none of them
/// among its first words is treated as non-English. Cheap, dependency-free,
/// and good enough to gate an LLM-labeling budget rather than to do
/// linguistic classification.
pub struct HeuristicEnglishDetector;

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "and", "is", "are", "was", "were", "with", "for", "this", "that", "have", "has",
    "you", "your", "our", "we", "my", "in", "on", "to", "of", "it", "a", "i",
];

impl LanguageDetector for HeuristicEnglishDetector {
    fn is_english(&self, sample: &str) -> bool {
        let lower = sample.to_lowercase();
        let hits = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| ENGLISH_STOPWORDS.contains(word))
            .count();
        hits > 0
    }
}

#[derive(Debug, Clone)]
pub struct LanguageFilterOptions {
    pub min_text_chars: usize,
    pub batch_size: usize,
    pub force: bool,
}

impl Default for LanguageFilterOptions {
    fn default() -> Self {
        Self {
            min_text_chars: DEFAULT_MIN_TEXT_CHARS,
            batch_size: DEFAULT_LANGUAGE_BATCH_SIZE,
            force: false,
        }
    }
}

pub struct LanguageFilterOutcome {
    pub english_path: PathBuf,
    pub excluded_path: PathBuf,
    pub english_rows: usize,
    pub excluded_rows: usize,
    pub reused_cache: bool,
}

/// `bio + up to 9 post captions, each truncated to CAPTION_SNIPPET_CHARS`
/// (§4.8 step 0). Posts are parsed loosely from the raw `posts` column —
/// this runs before per-platform normalization, so only the `caption` key
/// is trusted to exist.
pub fn build_language_sample(row: &HashMap<String, String>) -> String {
    let biography = row.get("biography").map(String::as_str).unwrap_or("");
    let posts: Vec<PostRecord> = row
        .get("posts")
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| serde_json::from_str::<Vec<serde_json::Value>>(raw).ok())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("caption").and_then(|c| c.as_str()))
                .map(|caption| PostRecord { caption: caption.to_string(), ..Default::default() })
                .collect()
        })
        .unwrap_or_default();

    scoutline_core::language_sample(biography, &posts, CAPTION_SNIPPET_CHARS)
}

pub async fn run(
    input_csv: &Path,
    output_dir: &Path,
    hash_of_input: &str,
    options: &LanguageFilterOptions,
    detector: &dyn LanguageDetector,
) -> Result<LanguageFilterOutcome, IngestError> {
    if options.batch_size == 0 {
        return Err(IngestError::InvalidBatchSize);
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|source| IngestError::Io { path: output_dir.display().to_string(), source })?;

    let english_path = output_dir.join("english.csv");
    let excluded_path = output_dir.join("excluded.csv");
    let metadata_path = output_dir.join("metadata.json");

    if !options.force && state::file_exists(&english_path).await && state::file_exists(&excluded_path).await {
        let metadata: LanguageFilterMetadata = state::load_json(&metadata_path).await?;
        if metadata.hash_of_input == hash_of_input
            && metadata.version == LANGUAGE_FILTER_VERSION
            && metadata.batch_size == options.batch_size
        {
            return Ok(LanguageFilterOutcome {
                english_path,
                excluded_path,
                english_rows: metadata.english_rows,
                excluded_rows: metadata.excluded_rows,
                reused_cache: true,
            });
        }
    }

    let input_csv = input_csv.to_path_buf();
    let english_out = english_path.clone();
    let excluded_out = excluded_path.clone();
    let min_text_chars = options.min_text_chars;

    let (english_rows, excluded_rows) = tokio::task::spawn_blocking(move || {
        filter_blocking(&input_csv, &english_out, &excluded_out, min_text_chars)
    })
    .await
    .expect("language filter task panicked")?;

    if english_rows == 0 {
        return Err(IngestError::LanguageFilterEmptyResult);
    }

    let metadata = LanguageFilterMetadata {
        hash_of_input: hash_of_input.to_string(),
        version: LANGUAGE_FILTER_VERSION.to_string(),
        batch_size: options.batch_size,
        english_rows,
        excluded_rows,
    };
    state::save_json(&metadata_path, &metadata).await?;

    Ok(LanguageFilterOutcome { english_path, excluded_path, english_rows, excluded_rows, reused_cache: false })
}

fn filter_blocking(
    input_csv: &Path,
    english_path: &Path,
    excluded_path: &Path,
    min_text_chars: usize,
) -> Result<(usize, usize), IngestError> {
    let mut reader = csv::Reader::from_path(input_csv)?;
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(IngestError::MissingHeader);
    }

    let mut english_writer = csv::Writer::from_path(english_path)?;
    let mut excluded_writer = csv::Writer::from_path(excluded_path)?;
    english_writer.write_record(&headers)?;
    excluded_writer.write_record(&headers)?;

    let detector = HeuristicEnglishDetector;
    let mut english_rows = 0usize;
    let mut excluded_rows = 0usize;

    for record in reader.records() {
        let record = record?;
        let row: HashMap<String, String> =
            headers.iter().zip(record.iter()).map(|(h, v)| (h.to_string(), v.to_string())).collect();

        let sample = build_language_sample(&row);
        let keep = sample.len() < min_text_chars || detector.is_english(&sample);

        if keep {
            english_writer.write_record(&record)?;
            english_rows += 1;
        } else {
            excluded_writer.write_record(&record)?;
            excluded_rows += 1;
        }
    }

    english_writer.flush().map_err(|e| IngestError::Io { path: english_path.display().to_string(), source: e })?;
    excluded_writer.flush().map_err(|e| IngestError::Io { path: excluded_path.display().to_string(), source: e })?;

    Ok((english_rows, excluded_rows))
}
