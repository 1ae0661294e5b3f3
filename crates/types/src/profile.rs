// crates/types/src/profile.rs
//! The canonical profile schema (§3) shared by the discovery pipeline and
//! the ingestion pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Source network a profile was pulled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A boolean field that may be genuinely unknown rather than false.
///
/// Never collapse an absent/unparseable raw value into `false` — §9's
/// "Hierarchical nullable fields" re-architecture point forbids sentinel
/// strings flowing past the normalizer; this is the typed replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    True,
    False,
    #[default]
    Unknown,
}

impl TriState {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TriState::True => Some(true),
            TriState::False => Some(false),
            TriState::Unknown => None,
        }
    }
}

/// One post/video belonging to a `CanonicalProfile`, after normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub caption: String,
    /// `#` stripped, case preserved, insertion order, deduplicated by exact match.
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub share_count: Option<u64>,
    pub view_count: Option<u64>,
    pub favorite_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Free text: `video`/`reel`/`image`/`photo`/`graphsidecar`/etc.
    #[serde(default)]
    pub media_type: String,
    /// ISO-8601 instant, kept as text — only the ordering relation on it is
    /// load-bearing (see `compute_post_statistics`), not any particular
    /// calendar arithmetic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    /// Unmapped raw keys, preserved to avoid information loss (§4.1 step 5).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PostRecord {
    /// Parsed timestamp, if `timestamp` is a well-formed ISO-8601 instant.
    pub fn parsed_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let raw = self.timestamp.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .ok()
    }
}

/// Derived post-statistics computed over the most recent (≤10) posts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostStatistics {
    /// Reel-like post count / total, to 3 decimals; `None` if there are no posts.
    pub reel_post_ratio_last10: Option<f64>,
    pub median_view_count: Option<f64>,
    pub median_like_count: Option<f64>,
    pub median_comment_count: Option<f64>,
    /// Instagram-only counters (§3).
    pub total_img_posts_ig: Option<u64>,
    pub total_reels_ig: Option<u64>,
}

/// LLM-assigned descriptive labels, added during ingestion (§4.8 parser) —
/// distinct from the fit-scoring stage's `fit_*` fields below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LlmLabels {
    pub individual_vs_org: Option<u8>,
    pub generational_appeal: Option<u8>,
    pub professionalization: Option<u8>,
    pub relationship_status: Option<u8>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub ethnicity: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Scoring components attached by the search facade (C5) during a hybrid query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoringComponents {
    pub bm25: Option<f64>,
    pub profile_sim: Option<f64>,
    pub posts_sim: Option<f64>,
    pub combined_score: Option<f64>,
    pub rerank_score: Option<f64>,
}

/// The central entity (§3): one social-media creator, normalized into a
/// single schema regardless of source platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalProfile {
    /// Stable identifier assigned during ingestion; immutable thereafter.
    pub lance_id: String,
    pub platform: Option<Platform>,
    #[serde(default)]
    pub platform_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub biography: String,
    #[serde(default)]
    pub external_url: String,
    #[serde(default)]
    pub profile_url: String,
    #[serde(default)]
    pub profile_image_url: String,
    pub followers: Option<u64>,
    pub following: Option<u64>,
    pub posts_count: Option<u64>,
    pub likes_total: Option<u64>,
    pub engagement_rate: Option<f64>,
    #[serde(default)]
    pub is_verified: TriState,
    #[serde(default)]
    pub is_private: TriState,
    #[serde(default)]
    pub is_commerce_user: TriState,
    /// Ordered, length ≤ 10 after trimming (§3 invariant).
    #[serde(default)]
    pub posts: Vec<PostRecord>,
    #[serde(default)]
    pub stats: PostStatistics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_labels: Option<LlmLabels>,
    pub fit_score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_error: Option<String>,
    #[serde(default)]
    pub scoring: ScoringComponents,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CanonicalProfile {
    /// `lowercase(platform + ':' + username)`, or the normalized profile
    /// URL if username is absent — see §4.6 "Normalized-handle key".
    pub fn normalized_key(&self) -> String {
        if !self.username.is_empty() {
            let platform = self.platform.map(|p| p.as_str()).unwrap_or("unknown");
            format!("{platform}:{}", self.username.to_lowercase())
        } else {
            self.profile_url.trim_end_matches('/').to_lowercase()
        }
    }

    pub fn to_ref(&self) -> ProfileRef {
        ProfileRef {
            lance_id: Some(self.lance_id.clone()).filter(|s| !s.is_empty()),
            account: Some(self.username.clone()).filter(|s| !s.is_empty()),
            profile_url: Some(self.profile_url.clone()).filter(|s| !s.is_empty()),
        }
    }
}

/// Compact profile identifier carried in event payloads (§3) so events stay
/// small regardless of profile size. At least one field is populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_key_prefers_platform_and_username() {
        let mut p = CanonicalProfile {
            platform: Some(Platform::Instagram),
            username: "Alice".into(),
            profile_url: "https://instagram.com/alice".into(),
            ..Default::default()
        };
        assert_eq!(p.normalized_key(), "instagram:alice");
        p.username.clear();
        assert_eq!(p.normalized_key(), "https://instagram.com/alice");
    }

    #[test]
    fn tristate_round_trips_through_json() {
        let v = serde_json::to_value(TriState::True).unwrap();
        assert_eq!(v, serde_json::json!("true"));
        let back: TriState = serde_json::from_value(v).unwrap();
        assert_eq!(back, TriState::True);
    }
}
