// crates/ingest/src/response_parser.rs
//! Parses one chunk's downloaded batch-API output JSONL into per-row labels
//! (§4.8 "Parser"). Grounded on `pipeline_batch_process.py`'s
//! `_process_results`/`_parse_response_text`: recover `lance_id` from
//! `custom_id`, extract the first `output_text` message, then split the
//! first comma-containing line as CSV and map its ≥18 fields onto
//! `{4 clamped integer scores, 4 text fields, 10 keywords}`.

use scoutline_types::LlmLabels;

pub struct ParsedLabelRow {
    pub lance_id: String,
    pub labels: LlmLabels,
    pub raw_response: String,
    pub processing_error: String,
    pub source_batch: String,
}

pub fn parse_output_jsonl(jsonl: &str, chunk_index: u32) -> Vec<ParsedLabelRow> {
    let source_batch = format!("batch_{chunk_index:03}");
    jsonl
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_output_line(line, &source_batch))
        .collect()
}

fn parse_output_line(line: &str, source_batch: &str) -> ParsedLabelRow {
    let payload: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => {
            return ParsedLabelRow {
                lance_id: String::new(),
                labels: LlmLabels::default(),
                raw_response: line.trim().to_string(),
                processing_error: "json_decode_error".to_string(),
                source_batch: source_batch.to_string(),
            }
        }
    };

    let custom_id = payload.get("custom_id").and_then(|v| v.as_str()).unwrap_or("");
    let lance_id = custom_id.strip_prefix("profile-").unwrap_or("").to_string();

    let response = payload.get("response");
    let status_ok = response.and_then(|r| r.get("status_code")).and_then(|v| v.as_u64()) == Some(200);

    if status_ok {
        let text_content = response
            .and_then(|r| r.get("body"))
            .and_then(|b| b.get("output"))
            .and_then(|o| o.as_array())
            .into_iter()
            .flatten()
            .filter(|output| output.get("type").and_then(|t| t.as_str()) == Some("message"))
            .flat_map(|output| output.get("content").and_then(|c| c.as_array()).into_iter().flatten())
            .find(|part| part.get("type").and_then(|t| t.as_str()) == Some("output_text"))
            .and_then(|part| part.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();

        let (labels, processing_error) = parse_response_text(&text_content);
        ParsedLabelRow { lance_id, labels, raw_response: text_content, processing_error, source_batch: source_batch.to_string() }
    } else {
        let error = response.and_then(|r| r.get("status_code"));
        let raw = serde_json::to_string(&payload).unwrap_or_default();
        ParsedLabelRow {
            lance_id,
            labels: LlmLabels::default(),
            raw_response: raw.chars().take(500).collect(),
            processing_error: format!("api_error:{}", error.map(|e| e.to_string()).unwrap_or_else(|| "unknown".to_string())),
            source_batch: source_batch.to_string(),
        }
    }
}

/// Splits the first comma-containing line of `text` as CSV and maps its
/// ≥18 fields onto `LlmLabels` + a processing-error string.
fn parse_response_text(text: &str) -> (LlmLabels, String) {
    if text.is_empty() {
        return (LlmLabels::default(), "empty_response".to_string());
    }

    let candidate_line = text.trim().lines().find(|line| line.contains(',')).unwrap_or_else(|| text.trim());

    let mut reader = csv::ReaderBuilder::new().has_headers(false).from_reader(candidate_line.as_bytes());
    let record = match reader.records().next() {
        Some(Ok(record)) => record,
        _ => return (LlmLabels::default(), "csv_parse_error".to_string()),
    };

    if record.len() < 18 {
        return (LlmLabels::default(), format!("unexpected_value_count:{}", record.len()));
    }

    let scores: Vec<Option<u8>> = (0..4).map(|i| parse_score(&record[i])).collect();
    let keywords: Vec<String> = (8..18).map(|i| record[i].trim().to_string()).collect();

    let labels = LlmLabels {
        individual_vs_org: scores[0],
        generational_appeal: scores[1],
        professionalization: scores[2],
        relationship_status: scores[3],
        location: record[4].trim().to_string(),
        ethnicity: record[5].trim().to_string(),
        age: record[6].trim().to_string(),
        occupation: record[7].trim().to_string(),
        keywords,
    };

    let processing_error = if scores.iter().all(Option::is_some) { String::new() } else { "missing_scores".to_string() };
    (labels, processing_error)
}

fn parse_score(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().map(|v| v.round().clamp(0.0, 10.0) as u8)
}
