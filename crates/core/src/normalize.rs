// crates/core/src/normalize.rs
//! The canonical profile model & normalizer (C1, SPEC_FULL §4.1).
//!
//! `normalize` is a pure function: no I/O, never fails on missing data
//! (fields silently default), only fails on a non-mapping input.
//!
//! Field-priority lists below are grounded in
//! `examples/original_source/services/brightdata/app/utils/normalizers.py`.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use scoutline_types::{CanonicalProfile, Platform, PostRecord, PostStatistics, TriState};

use crate::error::NormalizeError;

const CAPTIONS_TO_INSPECT: usize = 9;

/// Pure conversion from a raw per-platform record into the canonical schema.
pub fn normalize(raw: &Value, platform_hint: Option<Platform>) -> Result<CanonicalProfile, NormalizeError> {
    let obj = raw.as_object().ok_or(NormalizeError::InvalidRecord)?;
    let platform = detect_platform(obj, platform_hint);

    let mapped = match platform {
        Platform::Instagram => map_instagram(obj),
        Platform::Tiktok => map_tiktok(obj),
    };

    let raw_posts = collect_posts(obj, platform);
    let mut posts: Vec<PostRecord> = raw_posts
        .iter()
        .filter_map(|p| p.as_object())
        .map(|p| normalize_post(p, platform))
        .collect();
    for post in &mut posts {
        strip_hashtags_from_caption(post);
    }
    let (ordered, stats) = compute_post_statistics(posts, platform);

    let mut extra = BTreeMap::new();
    for (k, v) in obj {
        if !mapped.consumed_keys.contains(k.as_str()) && k != "posts" && k != "top_videos" && k != "top_posts_data" {
            extra.insert(k.clone(), v.clone());
        }
    }

    Ok(CanonicalProfile {
        lance_id: String::new(),
        platform: Some(platform),
        platform_id: mapped.platform_id,
        username: mapped.username,
        display_name: mapped.display_name,
        biography: mapped.biography,
        external_url: mapped.external_url,
        profile_url: mapped.profile_url,
        profile_image_url: mapped.profile_image_url,
        followers: mapped.followers,
        following: mapped.following,
        posts_count: mapped.posts_count,
        likes_total: mapped.likes_total,
        engagement_rate: mapped.engagement_rate,
        is_verified: mapped.is_verified,
        is_private: mapped.is_private,
        is_commerce_user: mapped.is_commerce_user,
        posts: ordered,
        stats,
        llm_labels: None,
        fit_score: None,
        fit_rationale: None,
        fit_error: None,
        scoring: Default::default(),
        extra,
    })
}

fn detect_platform(obj: &Map<String, Value>, hint: Option<Platform>) -> Platform {
    if let Some(p) = hint {
        return p;
    }
    if let Some(Value::String(s)) = obj.get("platform") {
        let lower = s.to_lowercase();
        if lower.contains("tiktok") {
            return Platform::Tiktok;
        }
        if lower.contains("instagram") {
            return Platform::Instagram;
        }
    }
    let url = first_text(obj, &["profile_url", "url", "input_url"]);
    if url.contains("tiktok.com") {
        return Platform::Tiktok;
    }
    if url.contains("instagram.com") {
        return Platform::Instagram;
    }
    Platform::Instagram
}

struct Mapped {
    platform_id: String,
    username: String,
    display_name: String,
    biography: String,
    external_url: String,
    profile_url: String,
    profile_image_url: String,
    followers: Option<u64>,
    following: Option<u64>,
    posts_count: Option<u64>,
    likes_total: Option<u64>,
    engagement_rate: Option<f64>,
    is_verified: TriState,
    is_private: TriState,
    is_commerce_user: TriState,
    consumed_keys: HashSet<&'static str>,
}

fn map_instagram(obj: &Map<String, Value>) -> Mapped {
    let mut keys: HashSet<&'static str> = HashSet::new();
    let mut field = |out_keys: &[&'static str]| -> String {
        keys.extend(out_keys.iter());
        first_text(obj, out_keys)
    };
    let username = field(&["username"]);
    let platform_id = field(&["platform_id", "fbid", "id"]);
    let display_name = field(&["full_name", "display_name", "profile_name"]);
    let biography = field(&["biography", "bio"]);
    let external_url = field(&["external_url"]);
    let profile_url = field(&["profile_url", "url"]);
    let profile_image_url = field(&["profile_image_link", "profile_image_url", "profile_pic_url_hd", "profile_pic_url"]);
    let followers = first_u64(obj, &["followers", "follower_count"], &mut keys);
    let following = first_u64(obj, &["following", "followees_count"], &mut keys);
    let posts_count = first_u64(obj, &["posts_count", "posts_count_total"], &mut keys);
    let likes_total = first_u64(obj, &["likes_total"], &mut keys);
    let engagement_rate = first_f64(obj, &["engagement_rate", "avg_engagement"], &mut keys);
    let is_verified = first_tristate(obj, &["is_verified", "verified"], &mut keys);
    let is_private = first_tristate(obj, &["is_private", "private"], &mut keys);
    let is_commerce_user = first_tristate(obj, &["is_business_account", "is_commerce_user"], &mut keys);

    Mapped {
        platform_id,
        username,
        display_name,
        biography,
        external_url,
        profile_url,
        profile_image_url,
        followers,
        following,
        posts_count,
        likes_total,
        engagement_rate,
        is_verified,
        is_private,
        is_commerce_user,
        consumed_keys: keys,
    }
}

fn map_tiktok(obj: &Map<String, Value>) -> Mapped {
    let mut keys: HashSet<&'static str> = HashSet::new();
    let mut field = |out_keys: &[&'static str]| -> String {
        keys.extend(out_keys.iter());
        first_text(obj, out_keys)
    };
    let username = field(&["account_id", "account", "username"]);
    let platform_id = field(&["platform_id", "id"]);
    let display_name = field(&["profile_name", "nickname", "username"]);
    let biography = field(&["biography", "signature"]);
    let external_url = field(&["external_url"]);
    let profile_url = field(&["profile_url", "url"]);
    let profile_image_url = field(&["profile_pic_url_hd", "profile_pic_url", "profile_image_link"]);
    let followers = first_u64(obj, &["followers", "fans"], &mut keys);
    let following = first_u64(obj, &["following"], &mut keys);
    let posts_count = first_u64(obj, &["posts_count", "video_count"], &mut keys);
    let likes_total = first_u64(obj, &["likes_total"], &mut keys);
    let engagement_rate = first_f64(obj, &["avg_engagement", "awg_engagement_rate"], &mut keys);
    let is_verified = first_tristate(obj, &["is_verified", "verified"], &mut keys);
    let is_private = first_tristate(obj, &["is_private", "private"], &mut keys);
    let is_commerce_user = TriState::Unknown;

    Mapped {
        platform_id,
        username,
        display_name,
        biography,
        external_url,
        profile_url,
        profile_image_url,
        followers,
        following,
        posts_count,
        likes_total,
        engagement_rate,
        is_verified,
        is_private,
        is_commerce_user,
        consumed_keys: keys,
    }
}

/// Gather the raw post list for a record, merging TikTok's split
/// `top_videos`/`top_posts_data` lists by id (§4.1 "TikTok post merging").
fn collect_posts(obj: &Map<String, Value>, platform: Platform) -> Vec<Value> {
    if platform == Platform::Tiktok {
        let a = to_list(obj.get("top_videos"));
        let b = to_list(obj.get("top_posts_data"));
        let c = to_list(obj.get("posts"));
        if !a.is_empty() || !b.is_empty() {
            return merge_tiktok_posts(vec![a, b, c]);
        }
    }
    to_list(obj.get("posts"))
}

/// Merge post lists keyed by `post_id`/`video_id`/`aweme_id`, preferring the
/// first non-empty value per field, preserving first-seen order. Records
/// with no id under any synonym are dropped (§8 boundary behavior).
fn merge_tiktok_posts(lists: Vec<Vec<Value>>) -> Vec<Value> {
    let mut order: Vec<String> = Vec::new();
    let mut combined: BTreeMap<String, Map<String, Value>> = BTreeMap::new();

    for list in lists {
        for item in list {
            let Some(obj) = item.as_object() else { continue };
            let id = first_text(obj, &["post_id", "video_id", "aweme_id"]);
            if id.is_empty() {
                continue;
            }
            if !combined.contains_key(&id) {
                order.push(id.clone());
                combined.insert(id.clone(), Map::new());
            }
            let entry = combined.get_mut(&id).unwrap();
            for (k, v) in obj {
                let empty = entry.get(k).map(is_empty_value).unwrap_or(true);
                if empty && !is_empty_value(v) {
                    entry.insert(k.clone(), v.clone());
                }
            }
        }
    }

    order
        .into_iter()
        .map(|id| Value::Object(combined.remove(&id).unwrap_or_default()))
        .collect()
}

fn normalize_post(obj: &Map<String, Value>, platform: Platform) -> PostRecord {
    let default_media = if platform == Platform::Tiktok { "video" } else { "image" };
    let id = first_non_empty(obj, &["post_id", "video_id", "aweme_id", "id"]).map(|v| value_to_string(v));
    let caption = first_text(obj, &["caption", "desc", "title", "text", "description"]);
    let hashtags = extract_hashtags(obj);
    let like_count = first_u64_unkeyed(obj, &["likes", "like_count", "diggCount", "diggcount", "collectCount"]);
    let favorite_count = first_u64_unkeyed(obj, &["favorites_count", "favoriteCount", "collectCount"]);
    let comment_count = first_u64_unkeyed(obj, &["comments", "comment_count", "commentCount", "commentcount"]);
    let share_count = first_u64_unkeyed(obj, &["share_count", "shareCount", "forwardCount"]);
    let view_count = first_u64_unkeyed(obj, &["view_count", "viewCount", "playCount", "playcount"]);
    let url = first_non_empty(obj, &["url", "videoUrl", "video_url", "share_url", "permalink", "post_url"])
        .map(|v| value_to_string(v));
    let media_type = {
        let v = first_text(obj, &["content_type", "media_type", "type", "post_type"]);
        if v.is_empty() { default_media.to_string() } else { v }
    };
    let timestamp = first_non_empty(obj, &["datetime", "createTime", "create_time", "create_date", "published_at"])
        .map(|v| value_to_string(v));
    let duration = first_f64_unkeyed(obj, &["duration", "videoDuration", "video_duration"]);
    let thumbnail_url = first_non_empty(obj, &["image_url", "thumbnail_url", "thumb_url", "cover_image"])
        .map(|v| value_to_string(v));
    let location_name = if platform == Platform::Instagram {
        extract_location_name(obj.get("location"))
    } else {
        None
    };

    let known: HashSet<&str> = [
        "post_id", "video_id", "aweme_id", "id", "caption", "desc", "title", "text", "description",
        "hashtags", "post_hashtags", "likes", "like_count", "diggCount", "diggcount", "collectCount",
        "favorites_count", "favoriteCount", "comments", "comment_count", "commentCount", "commentcount",
        "share_count", "shareCount", "forwardCount", "view_count", "viewCount", "playCount", "playcount",
        "url", "videoUrl", "video_url", "share_url", "permalink", "post_url", "content_type", "media_type",
        "type", "post_type", "datetime", "createTime", "create_time", "create_date", "published_at",
        "duration", "videoDuration", "video_duration", "image_url", "thumbnail_url", "thumb_url",
        "cover_image", "location",
    ]
    .into_iter()
    .collect();
    let mut extra = BTreeMap::new();
    for (k, v) in obj {
        if !known.contains(k.as_str()) {
            extra.insert(k.clone(), v.clone());
        }
    }

    PostRecord {
        id,
        caption,
        hashtags,
        like_count,
        comment_count,
        share_count,
        view_count,
        favorite_count,
        url,
        media_type,
        timestamp,
        duration,
        thumbnail_url,
        location_name,
        extra,
    }
}

fn extract_hashtags(obj: &Map<String, Value>) -> Vec<String> {
    let raw = obj.get("hashtags").or_else(|| obj.get("post_hashtags"));
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in to_list(raw) {
        let text = value_to_string(&item);
        let tag = text.trim().trim_start_matches('#').to_string();
        if tag.is_empty() || !seen.insert(tag.clone()) {
            continue;
        }
        out.push(tag);
    }
    out
}

/// Remove a hashtag occurring as `#T` in the caption (case-insensitive,
/// optional whitespace after `#`, word-boundary respected), then collapse
/// whitespace (§4.1 step 4).
fn strip_hashtags_from_caption(post: &mut PostRecord) {
    if post.hashtags.is_empty() || post.caption.is_empty() {
        return;
    }
    let mut caption = post.caption.clone();
    for tag in &post.hashtags {
        caption = remove_hashtag_occurrence(&caption, tag);
    }
    post.caption = collapse_whitespace(caption.trim());
}

fn remove_hashtag_occurrence(caption: &str, tag: &str) -> String {
    let chars: Vec<char> = caption.chars().collect();
    let mut out = String::with_capacity(caption.len());
    let mut i = 0usize;
    while i < chars.len() {
        if chars[i] == '#' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            let start = j;
            while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
                j += 1;
            }
            let candidate: String = chars[start..j].iter().collect();
            let left_boundary = i == 0 || !chars[i - 1].is_alphanumeric();
            if left_boundary && candidate.eq_ignore_ascii_case(tag) {
                i = j;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

fn extract_location_name(v: Option<&Value>) -> Option<String> {
    let v = v?;
    match v {
        Value::Object(o) => first_non_empty(o, &["name", "title", "short_name"]).map(value_to_string),
        Value::Array(a) => a.first().and_then(extract_location_name_value),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn extract_location_name_value(v: &Value) -> Option<String> {
    match v {
        Value::Object(o) => first_non_empty(o, &["name", "title", "short_name"]).map(value_to_string),
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Order posts (timestamped descending, then untimestamped by original
/// index), truncate to 10, and compute derived statistics (§4.1 "Derived
/// statistics").
pub fn compute_post_statistics(posts: Vec<PostRecord>, platform: Platform) -> (Vec<PostRecord>, PostStatistics) {
    let mut with_ts: Vec<(usize, PostRecord)> = Vec::new();
    let mut without_ts: Vec<(usize, PostRecord)> = Vec::new();
    for (idx, post) in posts.into_iter().enumerate() {
        if post.parsed_timestamp().is_some() {
            with_ts.push((idx, post));
        } else {
            without_ts.push((idx, post));
        }
    }
    with_ts.sort_by(|a, b| {
        b.1.parsed_timestamp()
            .unwrap()
            .cmp(&a.1.parsed_timestamp().unwrap())
    });
    without_ts.sort_by_key(|(idx, _)| *idx);

    let mut ordered: Vec<PostRecord> = with_ts.into_iter().map(|(_, p)| p).collect();
    ordered.extend(without_ts.into_iter().map(|(_, p)| p));
    ordered.truncate(10);

    let total = ordered.len();
    let mut reel_like = 0usize;
    let mut image_like = 0usize;
    let mut views = Vec::new();
    let mut likes = Vec::new();
    let mut comments = Vec::new();

    for post in &ordered {
        let media = post.media_type.to_lowercase();
        let is_reel = media.contains("reel") || media.contains("video") || media == "igtv" || media == "graphvideo";
        let is_image = matches!(media.as_str(), "graphimage" | "image" | "photo" | "graphsidecar")
            || media.contains("image")
            || media.contains("photo");
        if is_reel {
            reel_like += 1;
        }
        if is_image {
            image_like += 1;
        }
        if let Some(v) = post.view_count {
            views.push(v as f64);
        }
        if let Some(v) = post.like_count {
            likes.push(v as f64);
        }
        if let Some(v) = post.comment_count {
            comments.push(v as f64);
        }
    }

    let stats = PostStatistics {
        reel_post_ratio_last10: if total == 0 {
            None
        } else {
            Some(round3(reel_like as f64 / total as f64))
        },
        median_view_count: median(&views).map(round_median),
        median_like_count: median(&likes).map(round_median),
        median_comment_count: median(&comments).map(round_median),
        total_img_posts_ig: (platform == Platform::Instagram).then_some(image_like as u64),
        total_reels_ig: (platform == Platform::Instagram).then_some(reel_like as u64),
    };

    (ordered, stats)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Integer output if exact integer, else 3 decimals (§4.1).
fn round_median(v: f64) -> f64 {
    if v.fract() == 0.0 {
        v
    } else {
        round3(v)
    }
}

// ---- value coercion helpers -------------------------------------------------

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => {
            let t = s.trim();
            t.is_empty() || t.eq_ignore_ascii_case("nan") || t.eq_ignore_ascii_case("none")
        }
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn first_non_empty<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !is_empty_value(v)))
}

fn value_to_string(v: &Value) -> String {
    let raw = match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    decode_text(&raw)
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    first_non_empty(obj, keys).map(value_to_string).unwrap_or_default()
}

fn first_u64(obj: &Map<String, Value>, keys: &[&'static str], consumed: &mut HashSet<&'static str>) -> Option<u64> {
    consumed.extend(keys.iter());
    first_u64_unkeyed(obj, keys)
}

fn first_f64(obj: &Map<String, Value>, keys: &[&'static str], consumed: &mut HashSet<&'static str>) -> Option<f64> {
    consumed.extend(keys.iter());
    first_f64_unkeyed(obj, keys)
}

fn first_tristate(obj: &Map<String, Value>, keys: &[&'static str], consumed: &mut HashSet<&'static str>) -> TriState {
    consumed.extend(keys.iter());
    first_non_empty(obj, keys).map(to_tristate).unwrap_or_default()
}

fn first_u64_unkeyed(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    first_non_empty(obj, keys).and_then(to_u64)
}

fn first_f64_unkeyed(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    first_non_empty(obj, keys).and_then(to_f64)
}

fn to_u64(v: &Value) -> Option<u64> {
    to_f64(v).map(|f| f.max(0.0).trunc() as u64)
}

fn to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn to_tristate(v: &Value) -> TriState {
    match v {
        Value::Bool(b) => {
            if *b {
                TriState::True
            } else {
                TriState::False
            }
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 1.0 => TriState::True,
            Some(f) if f == 0.0 => TriState::False,
            _ => TriState::Unknown,
        },
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            match lower.as_str() {
                "true" | "1" | "yes" | "y" => TriState::True,
                "false" | "0" | "no" | "n" => TriState::False,
                _ => TriState::Unknown,
            }
        }
        _ => TriState::Unknown,
    }
}

fn to_list(v: Option<&Value>) -> Vec<Value> {
    match v {
        Some(Value::Array(a)) => a.clone(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            if let Ok(Value::Array(a)) = serde_json::from_str::<Value>(trimmed) {
                a
            } else {
                trimmed
                    .split(',')
                    .map(|p| p.trim())
                    .filter(|p| !p.is_empty())
                    .map(|p| Value::String(p.to_string()))
                    .collect()
            }
        }
        _ => Vec::new(),
    }
}

fn decode_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('n') => {
                out.push('\n');
                chars.next();
            }
            Some('t') => {
                out.push('\t');
                chars.next();
            }
            Some('r') => {
                out.push('\r');
                chars.next();
            }
            Some('"') => {
                out.push('"');
                chars.next();
            }
            Some('\\') => {
                out.push('\\');
                chars.next();
            }
            Some('u') => {
                chars.next();
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                if hex.len() == 4 {
                    if let Ok(code) = u32::from_str_radix(&hex, 16) {
                        if let Some(ch) = char::from_u32(code) {
                            out.push(ch);
                            continue;
                        }
                    }
                }
                out.push('\\');
                out.push('u');
                out.push_str(&hex);
            }
            _ => out.push(c),
        }
    }
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the up-to-9-caption "language sample" used by the ingestion
/// pipeline's Step 0 (SPEC_FULL §4.8 supplement) — kept here since it
/// shares the normalizer's text decoding rules.
pub fn language_sample(biography: &str, posts: &[PostRecord], snippet_chars: usize) -> String {
    let mut parts = vec![biography.to_string()];
    for post in posts.iter().take(CAPTIONS_TO_INSPECT) {
        let snippet: String = post.caption.chars().take(snippet_chars).collect();
        if !snippet.is_empty() {
            parts.push(snippet);
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_non_mapping_input() {
        let err = normalize(&json!("not a record"), None).unwrap_err();
        assert!(matches!(err, NormalizeError::InvalidRecord));
    }

    #[test]
    fn detects_platform_from_url_when_hint_absent() {
        let raw = json!({"username": "alice", "profile_url": "https://www.tiktok.com/@alice"});
        let profile = normalize(&raw, None).unwrap();
        assert_eq!(profile.platform, Some(Platform::Tiktok));
    }

    #[test]
    fn defaults_to_instagram_when_ambiguous() {
        let raw = json!({"username": "alice"});
        let profile = normalize(&raw, None).unwrap();
        assert_eq!(profile.platform, Some(Platform::Instagram));
    }

    #[test]
    fn instagram_field_priority_falls_back_through_synonyms() {
        let raw = json!({"fbid": "123", "bio": "hi there", "profile_pic_url": "http://x/y.jpg"});
        let profile = normalize(&raw, Some(Platform::Instagram)).unwrap();
        assert_eq!(profile.platform_id, "123");
        assert_eq!(profile.biography, "hi there");
        assert_eq!(profile.profile_image_url, "http://x/y.jpg");
    }

    #[test]
    fn tiktok_merges_split_post_lists_by_id() {
        let raw = json!({
            "account": "bob",
            "top_videos": [{"video_id": "1", "likes": 10}],
            "top_posts_data": [{"video_id": "1", "caption": "hello #fun"}, {"aweme_id": ""}],
        });
        let profile = normalize(&raw, Some(Platform::Tiktok)).unwrap();
        assert_eq!(profile.posts.len(), 1);
        assert_eq!(profile.posts[0].like_count, Some(10));
        assert_eq!(profile.posts[0].caption, "hello");
    }

    #[test]
    fn hashtag_removed_from_caption_but_kept_in_hashtags() {
        let raw = json!({
            "username": "carol",
            "posts": [{"caption": "Loving this #Skincare routine", "hashtags": ["skincare"]}]
        });
        let profile = normalize(&raw, Some(Platform::Instagram)).unwrap();
        let post = &profile.posts[0];
        assert_eq!(post.caption, "Loving this routine");
        assert_eq!(post.hashtags, vec!["skincare".to_string()]);
    }

    #[test]
    fn posts_ordered_timestamped_desc_then_original_order() {
        let raw = json!({
            "username": "dana",
            "posts": [
                {"caption": "no ts 1"},
                {"caption": "old", "datetime": "2024-01-01T00:00:00Z"},
                {"caption": "no ts 2"},
                {"caption": "new", "datetime": "2024-06-01T00:00:00Z"},
            ]
        });
        let profile = normalize(&raw, Some(Platform::Instagram)).unwrap();
        let captions: Vec<_> = profile.posts.iter().map(|p| p.caption.as_str()).collect();
        assert_eq!(captions, vec!["new", "old", "no ts 1", "no ts 2"]);
    }

    #[test]
    fn posts_truncated_to_ten() {
        let posts: Vec<_> = (0..15).map(|i| json!({"caption": format!("p{i}")})).collect();
        let raw = json!({"username": "erin", "posts": posts});
        let profile = normalize(&raw, Some(Platform::Instagram)).unwrap();
        assert_eq!(profile.posts.len(), 10);
    }

    #[test]
    fn boolean_decoding_accepts_documented_forms() {
        assert_eq!(to_tristate(&json!("Yes")), TriState::True);
        assert_eq!(to_tristate(&json!("N")), TriState::False);
        assert_eq!(to_tristate(&json!(1)), TriState::True);
        assert_eq!(to_tristate(&json!("maybe")), TriState::Unknown);
    }

    #[test]
    fn unknown_keys_preserved_under_extra() {
        let raw = json!({"username": "frank", "some_weird_field": 42});
        let profile = normalize(&raw, Some(Platform::Instagram)).unwrap();
        assert_eq!(profile.extra.get("some_weird_field"), Some(&json!(42)));
    }

    #[test]
    fn normalize_is_a_retract() {
        let raw = json!({
            "username": "gail",
            "posts": [{"caption": "Hi #fun", "hashtags": ["fun"], "likes": 3}]
        });
        let once = normalize(&raw, Some(Platform::Instagram)).unwrap();
        let once_json = serde_json::to_value(&once).unwrap();
        let twice = normalize(&once_json, Some(Platform::Instagram)).unwrap();
        assert_eq!(once.username, twice.username);
        assert_eq!(once.posts.len(), twice.posts.len());
    }

    #[test]
    fn media_type_classification_matches_documented_sets() {
        let raw = json!({
            "username": "hank",
            "posts": [
                {"caption": "a", "media_type": "GraphSidecar"},
                {"caption": "b", "media_type": "Reel"},
                {"caption": "c", "media_type": "igtv"},
            ]
        });
        let profile = normalize(&raw, Some(Platform::Instagram)).unwrap();
        assert_eq!(profile.stats.total_img_posts_ig, Some(1));
        assert_eq!(profile.stats.total_reels_ig, Some(2));
    }
}
