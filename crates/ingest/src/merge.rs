// crates/ingest/src/merge.rs
//! Merge step (§4.8 "Merge"): join per-row LLM labels with the
//! language-filtered rows by `lance_db_id`, normalize into
//! `CanonicalProfile`, and write one canonical parquet file per dataset.
//! When both platforms are present, reassign `lance_id`s so the combined
//! set is globally unique — grounded on `combine_platform_datasets`'s
//! sequential-id reassignment, generalized from its CSV output to parquet.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{BooleanBuilder, Float64Builder, StringBuilder, UInt64Builder, UInt8Builder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use scoutline_types::{CanonicalProfile, Platform};

use crate::error::IngestError;
use crate::response_parser::ParsedLabelRow;

/// Joins filtered rows with their labels (by `lance_db_id`) and normalizes
/// each into a `CanonicalProfile`. Rows with no matching label are kept
/// unlabeled rather than dropped — a failed/timed-out batch chunk must not
/// silently remove profiles from the dataset.
pub fn merge_rows_with_labels(
    filtered_rows: Vec<HashMap<String, String>>,
    labels: Vec<ParsedLabelRow>,
    platform_hint: Option<Platform>,
) -> Vec<CanonicalProfile> {
    let mut labels_by_id: HashMap<String, ParsedLabelRow> =
        labels.into_iter().map(|row| (row.lance_id.clone(), row)).collect();

    filtered_rows
        .into_iter()
        .filter_map(|row| {
            let lance_id = row.get("lance_db_id").cloned().unwrap_or_default();
            let raw = serde_json::Value::Object(row.into_iter().map(|(k, v)| (k, serde_json::Value::String(v))).collect());
            let mut profile = scoutline_core::normalize(&raw, platform_hint).ok()?;
            if profile.lance_id.is_empty() {
                profile.lance_id = lance_id.clone();
            }
            if let Some(label_row) = labels_by_id.remove(&lance_id) {
                if label_row.processing_error.is_empty() {
                    profile.llm_labels = Some(label_row.labels);
                } else {
                    tracing::warn!(lance_id = %lance_id, error = %label_row.processing_error, "llm label unusable for row");
                }
            }
            Some(profile)
        })
        .collect()
}

/// Combines per-platform profile sets into one, reassigning `lance_id`s
/// sequentially in platform order (`Platform`'s derived `Ord` — Instagram
/// before Tiktok, same determinism rationale as the vendor-refresh worker's
/// platform grouping) so the combined ids are globally unique.
pub fn combine_platforms(mut by_platform: Vec<(Platform, Vec<CanonicalProfile>)>) -> Vec<CanonicalProfile> {
    by_platform.sort_by_key(|(platform, _)| *platform);
    let mut next_id = 1u64;
    let mut combined = Vec::new();
    for (_, profiles) in by_platform {
        for mut profile in profiles {
            profile.lance_id = next_id.to_string();
            next_id += 1;
            combined.push(profile);
        }
    }
    combined
}

pub fn write_canonical_parquet(profiles: &[CanonicalProfile], path: &Path) -> Result<(), IngestError> {
    let schema = canonical_schema();
    let batch = profiles_to_record_batch(profiles, schema.clone())?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| IngestError::Io { path: parent.display().to_string(), source })?;
    }
    let file = File::create(path).map_err(|source| IngestError::Io { path: path.display().to_string(), source })?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn canonical_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("lance_id", DataType::Utf8, false),
        Field::new("platform", DataType::Utf8, true),
        Field::new("platform_id", DataType::Utf8, true),
        Field::new("username", DataType::Utf8, true),
        Field::new("display_name", DataType::Utf8, true),
        Field::new("biography", DataType::Utf8, true),
        Field::new("external_url", DataType::Utf8, true),
        Field::new("profile_url", DataType::Utf8, true),
        Field::new("profile_image_url", DataType::Utf8, true),
        Field::new("followers", DataType::UInt64, true),
        Field::new("following", DataType::UInt64, true),
        Field::new("posts_count", DataType::UInt64, true),
        Field::new("likes_total", DataType::UInt64, true),
        Field::new("engagement_rate", DataType::Float64, true),
        Field::new("is_verified", DataType::Boolean, true),
        Field::new("is_private", DataType::Boolean, true),
        Field::new("is_commerce_user", DataType::Boolean, true),
        Field::new("posts_json", DataType::Utf8, true),
        Field::new("reel_post_ratio_last10", DataType::Float64, true),
        Field::new("median_view_count_last10", DataType::Float64, true),
        Field::new("median_like_count_last10", DataType::Float64, true),
        Field::new("median_comment_count_last10", DataType::Float64, true),
        Field::new("total_img_posts_ig", DataType::UInt64, true),
        Field::new("total_reels_ig", DataType::UInt64, true),
        Field::new("llm_labels_json", DataType::Utf8, true),
        Field::new("fit_score", DataType::UInt8, true),
        Field::new("fit_rationale", DataType::Utf8, true),
        Field::new("fit_error", DataType::Utf8, true),
        Field::new("scoring_json", DataType::Utf8, true),
        Field::new("extra_json", DataType::Utf8, true),
    ]))
}

fn profiles_to_record_batch(profiles: &[CanonicalProfile], schema: Arc<Schema>) -> Result<RecordBatch, IngestError> {
    let mut lance_id = StringBuilder::new();
    let mut platform = StringBuilder::new();
    let mut platform_id = StringBuilder::new();
    let mut username = StringBuilder::new();
    let mut display_name = StringBuilder::new();
    let mut biography = StringBuilder::new();
    let mut external_url = StringBuilder::new();
    let mut profile_url = StringBuilder::new();
    let mut profile_image_url = StringBuilder::new();
    let mut followers = UInt64Builder::new();
    let mut following = UInt64Builder::new();
    let mut posts_count = UInt64Builder::new();
    let mut likes_total = UInt64Builder::new();
    let mut engagement_rate = Float64Builder::new();
    let mut is_verified = BooleanBuilder::new();
    let mut is_private = BooleanBuilder::new();
    let mut is_commerce_user = BooleanBuilder::new();
    let mut posts_json = StringBuilder::new();
    let mut reel_post_ratio_last10 = Float64Builder::new();
    let mut median_view_count_last10 = Float64Builder::new();
    let mut median_like_count_last10 = Float64Builder::new();
    let mut median_comment_count_last10 = Float64Builder::new();
    let mut total_img_posts_ig = UInt64Builder::new();
    let mut total_reels_ig = UInt64Builder::new();
    let mut llm_labels_json = StringBuilder::new();
    let mut fit_score = UInt8Builder::new();
    let mut fit_rationale = StringBuilder::new();
    let mut fit_error = StringBuilder::new();
    let mut scoring_json = StringBuilder::new();
    let mut extra_json = StringBuilder::new();

    for profile in profiles {
        lance_id.append_value(&profile.lance_id);
        platform.append_option(profile.platform.map(|p| p.as_str()));
        platform_id.append_value(&profile.platform_id);
        username.append_value(&profile.username);
        display_name.append_value(&profile.display_name);
        biography.append_value(&profile.biography);
        external_url.append_value(&profile.external_url);
        profile_url.append_value(&profile.profile_url);
        profile_image_url.append_value(&profile.profile_image_url);
        followers.append_option(profile.followers);
        following.append_option(profile.following);
        posts_count.append_option(profile.posts_count);
        likes_total.append_option(profile.likes_total);
        engagement_rate.append_option(profile.engagement_rate);
        is_verified.append_option(profile.is_verified.as_bool());
        is_private.append_option(profile.is_private.as_bool());
        is_commerce_user.append_option(profile.is_commerce_user.as_bool());
        posts_json.append_value(serde_json::to_string(&profile.posts)?);
        reel_post_ratio_last10.append_option(profile.stats.reel_post_ratio_last10);
        median_view_count_last10.append_option(profile.stats.median_view_count);
        median_like_count_last10.append_option(profile.stats.median_like_count);
        median_comment_count_last10.append_option(profile.stats.median_comment_count);
        total_img_posts_ig.append_option(profile.stats.total_img_posts_ig);
        total_reels_ig.append_option(profile.stats.total_reels_ig);
        llm_labels_json.append_option(profile.llm_labels.as_ref().map(|l| serde_json::to_string(l)).transpose()?);
        fit_score.append_option(profile.fit_score);
        fit_rationale.append_option(profile.fit_rationale.as_deref());
        fit_error.append_option(profile.fit_error.as_deref());
        scoring_json.append_value(serde_json::to_string(&profile.scoring)?);
        extra_json.append_value(serde_json::to_string(&profile.extra)?);
    }

    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(lance_id.finish()),
            Arc::new(platform.finish()),
            Arc::new(platform_id.finish()),
            Arc::new(username.finish()),
            Arc::new(display_name.finish()),
            Arc::new(biography.finish()),
            Arc::new(external_url.finish()),
            Arc::new(profile_url.finish()),
            Arc::new(profile_image_url.finish()),
            Arc::new(followers.finish()),
            Arc::new(following.finish()),
            Arc::new(posts_count.finish()),
            Arc::new(likes_total.finish()),
            Arc::new(engagement_rate.finish()),
            Arc::new(is_verified.finish()),
            Arc::new(is_private.finish()),
            Arc::new(is_commerce_user.finish()),
            Arc::new(posts_json.finish()),
            Arc::new(reel_post_ratio_last10.finish()),
            Arc::new(median_view_count_last10.finish()),
            Arc::new(median_like_count_last10.finish()),
            Arc::new(median_comment_count_last10.finish()),
            Arc::new(total_img_posts_ig.finish()),
            Arc::new(total_reels_ig.finish()),
            Arc::new(llm_labels_json.finish()),
            Arc::new(fit_score.finish()),
            Arc::new(fit_rationale.finish()),
            Arc::new(fit_error.finish()),
            Arc::new(scoring_json.finish()),
            Arc::new(extra_json.finish()),
        ],
    )?)
}
