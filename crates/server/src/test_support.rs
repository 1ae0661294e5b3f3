// crates/server/src/test_support.rs
//! Shared stubs for route tests — a `SearchEngine` wired to an in-memory
//! `VectorStoreClient` that always returns empty results, so route tests can
//! build an `AppState` without a real vector store.

#![cfg(test)]

use std::sync::Arc;

use async_trait::async_trait;

use scoutline_core::ExternalError;
use scoutline_search::{DenseHit, Facet, LexicalHit, SearchEngine, VectorStoreClient};
use scoutline_types::{CanonicalProfile, SearchFilters};

struct EmptyStore;

#[async_trait]
impl VectorStoreClient for EmptyStore {
    async fn dense_search(
        &self,
        _facet: Facet,
        _vector: &[f32],
        _limit: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<DenseHit>, ExternalError> {
        Ok(Vec::new())
    }

    async fn lexical_search(
        &self,
        _include_posts: bool,
        _query: &str,
        _limit: usize,
        _filters: &SearchFilters,
    ) -> Result<Vec<LexicalHit>, ExternalError> {
        Ok(Vec::new())
    }

    async fn fetch_profiles(&self, _lance_ids: &[String]) -> Result<Vec<CanonicalProfile>, ExternalError> {
        Ok(Vec::new())
    }

    async fn fetch_profile_vector(&self, _lance_id: &str) -> Result<Option<Vec<f32>>, ExternalError> {
        Ok(None)
    }

    async fn lookup_by_username(&self, _username: &str) -> Result<Option<CanonicalProfile>, ExternalError> {
        Ok(None)
    }

    async fn lookup_by_url(&self, _profile_url: &str) -> Result<Option<CanonicalProfile>, ExternalError> {
        Ok(None)
    }
}

pub fn empty_search_engine() -> Arc<SearchEngine> {
    Arc::new(SearchEngine::new(Arc::new(EmptyStore), None))
}
