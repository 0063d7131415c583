//! In-memory vector store with brute-force similarity search
//!
//! Intentionally a linear scan: the corpora this serves (per-conversation
//! message embeddings) stay small, and exact scores keep threshold and
//! ordering semantics simple.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::math;
use crate::storage::VectorStorage;

/// A stored vector with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl VectorEntry {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: HashMap::new(),
            content: None,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Options for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum results returned
    pub limit: usize,

    /// Minimum `[0, 1]` score to keep
    pub threshold: f32,

    /// Exact-match metadata filter; every key must match, entries missing a
    /// filtered key never match
    pub filter: Option<HashMap<String, serde_json::Value>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.0,
            filter: None,
        }
    }
}

/// One similarity search hit.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub id: String,
    /// Cosine similarity remapped to `[0, 1]`
    pub score: f32,
    /// `1 - cosine similarity`
    pub distance: f32,
    pub metadata: HashMap<String, serde_json::Value>,
    pub content: Option<String>,
}

struct VectorState {
    entries: HashMap<String, VectorEntry>,
    /// Insertion order of ids; search iterates in this order so equal
    /// scores rank deterministically
    order: Vec<String>,
    /// Fixed by the first stored vector, reset by `clear`
    dimensions: Option<usize>,
}

/// Brute-force in-memory vector store.
pub struct InMemoryVectorStore {
    state: RwLock<VectorState>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(VectorState {
                entries: HashMap::new(),
                order: Vec::new(),
                dimensions: None,
            }),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(
    metadata: &HashMap<String, serde_json::Value>,
    filter: &HashMap<String, serde_json::Value>,
) -> bool {
    filter
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}

#[async_trait]
impl VectorStorage for InMemoryVectorStore {
    async fn store(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        match state.dimensions {
            Some(expected) if expected != vector.len() => {
                return Err(Error::dimension_mismatch(expected, vector.len()));
            }
            None => state.dimensions = Some(vector.len()),
            _ => {}
        }

        if !state.entries.contains_key(id) {
            state.order.push(id.to_string());
        }
        state.entries.insert(
            id.to_string(),
            VectorEntry {
                id: id.to_string(),
                vector: vector.to_vec(),
                metadata: metadata.unwrap_or_default(),
                content: None,
            },
        );

        Ok(())
    }

    async fn store_batch(&self, entries: Vec<VectorEntry>) -> Result<()> {
        for entry in entries {
            let mut state = self.state.write().await;

            match state.dimensions {
                Some(expected) if expected != entry.vector.len() => {
                    return Err(Error::dimension_mismatch(expected, entry.vector.len()));
                }
                None => state.dimensions = Some(entry.vector.len()),
                _ => {}
            }

            if !state.entries.contains_key(&entry.id) {
                state.order.push(entry.id.clone());
            }
            state.entries.insert(entry.id.clone(), entry);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        options: SearchOptions,
    ) -> Result<Vec<VectorSearchResult>> {
        let state = self.state.read().await;

        let Some(dimensions) = state.dimensions else {
            return Ok(Vec::new());
        };
        if query.len() != dimensions {
            return Err(Error::dimension_mismatch(dimensions, query.len()));
        }

        let mut results = Vec::new();
        for id in &state.order {
            let Some(entry) = state.entries.get(id) else {
                continue;
            };

            if let Some(filter) = &options.filter {
                if !matches_filter(&entry.metadata, filter) {
                    continue;
                }
            }

            let similarity = math::cosine_similarity(query, &entry.vector)?;
            let score = math::similarity_to_score(similarity);
            if score < options.threshold {
                continue;
            }

            results.push(VectorSearchResult {
                id: entry.id.clone(),
                score,
                distance: 1.0 - similarity,
                metadata: entry.metadata.clone(),
                content: entry.content.clone(),
            });
        }

        // Stable sort keeps insertion order for equal scores.
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(options.limit);

        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorEntry>> {
        let state = self.state.read().await;
        Ok(state.entries.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.entries.remove(id).is_some() {
            state.order.retain(|existing| existing != id);
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        let VectorState { entries, order, .. } = &mut *state;
        for id in ids {
            entries.remove(id);
        }
        order.retain(|id| entries.contains_key(id));
        Ok(())
    }

    async fn delete_by_filter(
        &self,
        filter: &HashMap<String, serde_json::Value>,
    ) -> Result<usize> {
        let mut state = self.state.write().await;
        let VectorState { entries, order, .. } = &mut *state;
        let before = entries.len();
        entries.retain(|_, entry| !matches_filter(&entry.metadata, filter));
        order.retain(|id| entries.contains_key(id));
        Ok(before - entries.len())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.order.clear();
        state.dimensions = None;
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state.entries.len())
    }
}
