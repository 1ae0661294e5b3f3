// crates/search/src/engine.rs
//! The search engine facade (C5, §4.5): combines dense + lexical hit lists
//! into a single ranked profile list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use scoutline_core::{PipelineError, SearchBackend, SearchStageError};
use scoutline_types::{CanonicalProfile, LexicalScope, SearchFilters, SearchMethod, SearchRequest};

use crate::embed::EmbeddingClient;
use crate::error::SearchError;
use crate::store::{distance_to_similarity, Facet, VectorStoreClient};

/// Weighting scheme for combining the three underlying hit lists
/// (§4.5 "Weighting (hybrid)"). Always used after `.normalized()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub profile: f64,
    pub posts: f64,
    pub keyword: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self { profile: 0.40, posts: 0.25, keyword: 0.35 }
    }
}

impl Weights {
    pub fn for_method(method: SearchMethod) -> Self {
        match method {
            SearchMethod::Lexical => Self { profile: 0.0, posts: 0.0, keyword: 1.0 },
            SearchMethod::Semantic => Self { profile: 0.6, posts: 0.4, keyword: 0.0 },
            SearchMethod::Hybrid => Self::default(),
        }
    }

    /// Similar-creator lookup's fixed scheme (§4.5 "Similar-creator lookup").
    pub fn similar_creator() -> Self {
        Self { profile: 0.2, posts: 0.5, keyword: 0.3 }
    }

    pub fn normalized(self) -> Self {
        let total = self.profile + self.posts + self.keyword;
        if total <= 0.0 {
            return Self { profile: 0.5, posts: 0.5, keyword: 0.0 };
        }
        Self { profile: self.profile / total, posts: self.posts / total, keyword: self.keyword / total }
    }
}

/// Overfetch multiplier applied to the caller's `limit` before combining,
/// so truncation happens on the combined score, not on any one facet.
const CANDIDATE_POOL_MULTIPLIER: usize = 3;
const CANDIDATE_POOL_MIN: usize = 50;

fn candidate_pool(limit: usize) -> usize {
    (limit * CANDIDATE_POOL_MULTIPLIER).max(CANDIDATE_POOL_MIN)
}

pub struct SearchEngine {
    store: Arc<dyn VectorStoreClient>,
    embedder: Option<Arc<dyn EmbeddingClient>>,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn VectorStoreClient>, embedder: Option<Arc<dyn EmbeddingClient>>) -> Self {
        Self { store, embedder }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<CanonicalProfile>, SearchError> {
        let weights = Weights::for_method(request.method).normalized();
        let pool = candidate_pool(request.limit);

        let (dense_profile, dense_posts) = if weights.profile > 0.0 || weights.posts > 0.0 {
            let embedder = self
                .embedder
                .as_ref()
                .ok_or_else(|| SearchError::Config("no embedding client configured for semantic/hybrid search".into()))?;
            let vector = embedder.embed(&request.query).await?;
            let profile_hits = self.store.dense_search(Facet::Profile, &vector, pool, &request.filters).await?;
            let posts_hits = self.store.dense_search(Facet::Posts, &vector, pool, &request.filters).await?;
            (to_similarity_map(profile_hits), to_similarity_map(posts_hits))
        } else {
            (HashMap::new(), HashMap::new())
        };

        let lexical_raw = if weights.keyword > 0.0 {
            let include_posts = matches!(request.lexical_scope, LexicalScope::BioPosts);
            let hits = self.store.lexical_search(include_posts, &request.query, pool, &request.filters).await?;
            to_raw_map(hits)
        } else {
            HashMap::new()
        };

        self.rank_and_fetch(dense_profile, dense_posts, lexical_raw, weights, request.limit, &HashSet::new())
            .await
    }

    pub async fn find_similar(&self, account: &str, limit: usize) -> Result<Vec<CanonicalProfile>, SearchError> {
        let anchor = self
            .store
            .lookup_by_username(account)
            .await?
            .ok_or(SearchError::ProfileNotFound)?;
        let anchor_vector = self
            .store
            .fetch_profile_vector(&anchor.lance_id)
            .await?
            .ok_or(SearchError::ProfileNotFound)?;

        let pool = candidate_pool(limit);
        let profile_hits = self.store.dense_search(Facet::Profile, &anchor_vector, pool, &SearchFilters::default()).await?;
        let posts_hits = self.store.dense_search(Facet::Posts, &anchor_vector, pool, &SearchFilters::default()).await?;
        let lexical_raw = if anchor.biography.is_empty() {
            HashMap::new()
        } else {
            let hits = self
                .store
                .lexical_search(true, &anchor.biography, pool, &SearchFilters::default())
                .await?;
            to_raw_map(hits)
        };

        let exclude: HashSet<String> = [anchor.lance_id.clone()].into_iter().collect();
        self.rank_and_fetch(
            to_similarity_map(profile_hits),
            to_similarity_map(posts_hits),
            lexical_raw,
            Weights::similar_creator().normalized(),
            limit,
            &exclude,
        )
        .await
    }

    pub async fn by_username(&self, username: &str) -> Result<CanonicalProfile, SearchError> {
        self.store.lookup_by_username(username).await?.ok_or(SearchError::ProfileNotFound)
    }

    async fn rank_and_fetch(
        &self,
        dense_profile: HashMap<String, f64>,
        dense_posts: HashMap<String, f64>,
        lexical_raw: HashMap<String, f64>,
        weights: Weights,
        limit: usize,
        exclude: &HashSet<String>,
    ) -> Result<Vec<CanonicalProfile>, SearchError> {
        let mut ranked = combine(&dense_profile, &dense_posts, &lexical_raw, weights);
        ranked.retain(|(id, _)| !exclude.contains(id));
        ranked.truncate(limit);

        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let fetched = self.store.fetch_profiles(&ids).await?;
        let mut by_id: HashMap<String, CanonicalProfile> =
            fetched.into_iter().map(|p| (p.lance_id.clone(), p)).collect();

        let mut out = Vec::with_capacity(ranked.len());
        for (id, combined_score) in ranked {
            if let Some(mut profile) = by_id.remove(&id) {
                profile.scoring.profile_sim = dense_profile.get(&id).copied();
                profile.scoring.posts_sim = dense_posts.get(&id).copied();
                profile.scoring.bm25 = lexical_raw.get(&id).copied();
                profile.scoring.combined_score = Some(combined_score);
                out.push(profile);
            }
        }
        Ok(out)
    }
}

fn to_similarity_map(hits: Vec<crate::store::DenseHit>) -> HashMap<String, f64> {
    let mut out: HashMap<String, f64> = HashMap::new();
    for hit in hits {
        let sim = distance_to_similarity(hit.distance);
        out.entry(hit.lance_id).and_modify(|v| *v = v.max(sim)).or_insert(sim);
    }
    out
}

fn to_raw_map(hits: Vec<crate::store::LexicalHit>) -> HashMap<String, f64> {
    let mut out: HashMap<String, f64> = HashMap::new();
    for hit in hits {
        out.entry(hit.lance_id).and_modify(|v| *v = v.max(hit.raw_score)).or_insert(hit.raw_score);
    }
    out
}

/// §4.5 "Combining": max similarity per facet, max raw lexical score,
/// `combined = w_profile*profile_sim + w_posts*posts_sim + w_keyword*lexical_norm`.
fn combine(
    dense_profile: &HashMap<String, f64>,
    dense_posts: &HashMap<String, f64>,
    lexical_raw: &HashMap<String, f64>,
    weights: Weights,
) -> Vec<(String, f64)> {
    let max_lexical = lexical_raw.values().copied().fold(0.0_f64, f64::max);
    let mut candidates: HashSet<String> = HashSet::new();
    candidates.extend(dense_profile.keys().cloned());
    candidates.extend(dense_posts.keys().cloned());
    candidates.extend(lexical_raw.keys().cloned());

    let mut scored: Vec<(String, f64)> = candidates
        .into_iter()
        .map(|id| {
            let profile_sim = dense_profile.get(&id).copied().unwrap_or(0.0);
            let posts_sim = dense_posts.get(&id).copied().unwrap_or(0.0);
            let lexical_norm = if max_lexical > 0.0 {
                lexical_raw.get(&id).copied().unwrap_or(0.0) / max_lexical
            } else {
                0.0
            };
            let combined = weights.profile * profile_sim + weights.posts * posts_sim + weights.keyword * lexical_norm;
            (id, combined)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[async_trait]
impl SearchBackend for SearchEngine {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CanonicalProfile>, SearchStageError> {
        SearchEngine::search(self, request).await.map_err(|e| SearchStageError::Backend(e.to_string()))
    }
}

impl From<SearchError> for PipelineError {
    fn from(e: SearchError) -> Self {
        PipelineError::Search(SearchStageError::Backend(e.to_string()))
    }
}
