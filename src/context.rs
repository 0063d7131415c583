//! Context assembly: recency plus optional semantic recall
//!
//! The assembler composes the conversation store, the vector store, and the
//! embedding cache to answer "give me the message context for this turn".
//! Recency is the floor guarantee; the semantic path is strictly additive
//! and any failure inside it degrades to recency-only results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::EmbeddingCache;
use crate::config::{MemoryConfig, WorkingMemoryScope};
use crate::conversation::{Conversation, ConversationInput, ConversationQuery, ConversationUpdate};
use crate::embedding::EmbeddingAdapter;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::storage::{
    ConversationStorage, GetMessagesOptions, SearchOptions, VectorEntry, VectorStorage,
};

/// How semantic hits are combined with recent messages.
///
/// Merge order is authoritative; results are never re-sorted by timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Recent messages first, semantic hits after
    #[default]
    Append,
    /// Semantic hits first, recent messages after
    Prepend,
    /// Alternate one recent, one semantic, then the remainder
    Interleave,
}

/// Options for one context read.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Recent-message count; falls back to the configured retrieval limit
    pub limit: Option<usize>,

    /// Enable the semantic path (also requires `current_query`)
    pub use_semantic_search: bool,

    /// The turn input driving semantic recall
    pub current_query: Option<String>,

    /// Semantic result count; falls back to `limit`
    pub semantic_limit: Option<usize>,

    /// Minimum `[0, 1]` score; falls back to the configured threshold
    pub semantic_threshold: Option<f32>,

    /// Merge strategy; falls back to the configured default
    pub merge_strategy: Option<MergeStrategy>,
}

impl ContextOptions {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn semantic(limit: usize, query: impl Into<String>) -> Self {
        Self {
            limit: Some(limit),
            use_semantic_search: true,
            current_query: Some(query.into()),
            ..Default::default()
        }
    }
}

/// Vector id derived from the message location, so re-indexing the same
/// message overwrites its entry instead of duplicating it.
pub fn vector_id(conversation_id: &str, message_id: &str) -> String {
    format!("msg_{}_{}", conversation_id, message_id)
}

/// The memory orchestration layer.
pub struct ContextAssembler {
    storage: Arc<dyn ConversationStorage>,
    vector: Option<Arc<dyn VectorStorage>>,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    cache: Mutex<EmbeddingCache>,
    working_memory_validator: Option<jsonschema::Validator>,
    config: MemoryConfig,
}

impl ContextAssembler {
    /// Create an assembler over a conversation store, without semantic
    /// support. Fails when a configured working-memory schema is itself
    /// invalid.
    pub fn new(storage: Arc<dyn ConversationStorage>, config: MemoryConfig) -> Result<Self> {
        let working_memory_validator = match config
            .working_memory
            .as_ref()
            .and_then(|wm| wm.schema.as_ref())
        {
            Some(schema) => Some(
                jsonschema::validator_for(schema)
                    .map_err(|e| Error::working_memory(format!("invalid schema: {e}")))?,
            ),
            None => None,
        };

        let cache = EmbeddingCache::new(config.cache.max_size, config.cache.ttl);

        Ok(Self {
            storage,
            vector: None,
            embedder: None,
            cache: Mutex::new(cache),
            working_memory_validator,
            config,
        })
    }

    /// Attach vector and embedding adapters, enabling the semantic path.
    pub fn with_vector_support(
        mut self,
        vector: Arc<dyn VectorStorage>,
        embedder: Arc<dyn EmbeddingAdapter>,
    ) -> Self {
        self.vector = Some(vector);
        self.embedder = Some(embedder);
        self
    }

    /// Whether both a vector store and an embedding adapter are configured.
    pub fn has_vector_support(&self) -> bool {
        self.vector.is_some() && self.embedder.is_some()
    }

    /// The configured embedding adapter, if any.
    pub fn embedding_adapter(&self) -> Option<Arc<dyn EmbeddingAdapter>> {
        self.embedder.clone()
    }

    /// The configured vector store, if any.
    pub fn vector_adapter(&self) -> Option<Arc<dyn VectorStorage>> {
        self.vector.clone()
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // === Conversation CRUD ===

    pub async fn create_conversation(&self, input: ConversationInput) -> Result<Conversation> {
        self.storage.create_conversation(input).await
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.storage.get_conversation(id).await
    }

    pub async fn query_conversations(&self, query: ConversationQuery) -> Result<Vec<Conversation>> {
        self.storage.query_conversations(query).await
    }

    pub async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        self.storage.update_conversation(id, update).await
    }

    /// Delete a conversation, its messages, and every vector entry carrying
    /// its conversation id.
    ///
    /// The vector cleanup filters on metadata rather than re-deriving ids
    /// from the message log, so entries for messages already evicted from
    /// the bounded log are removed too.
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        if let Some(vector) = &self.vector {
            let mut filter = HashMap::new();
            filter.insert(
                "conversation_id".to_string(),
                serde_json::Value::String(id.to_string()),
            );
            if let Err(error) = vector.delete_by_filter(&filter).await {
                tracing::warn!(
                    conversation_id = id,
                    %error,
                    "failed to delete vector entries for conversation"
                );
            }
        }
        self.storage.delete_conversation(id).await
    }

    // === Message writes ===

    /// Persist a message, then auto-embed it when vector support is
    /// configured. Embedding or vector failures never fail the write.
    pub async fn add_message(
        &self,
        message: Message,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Message> {
        let stored = self
            .storage
            .add_message(message, user_id, conversation_id)
            .await?;
        self.index_messages(std::slice::from_ref(&stored), user_id, conversation_id)
            .await;
        Ok(stored)
    }

    /// Persist a batch of messages, then auto-embed the ones with text in a
    /// single batch call (chunked to the adapter's batch limit).
    pub async fn add_messages(
        &self,
        messages: Vec<Message>,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>> {
        let stored = self
            .storage
            .add_messages(messages, user_id, conversation_id)
            .await?;
        self.index_messages(&stored, user_id, conversation_id).await;
        Ok(stored)
    }

    pub async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        options: GetMessagesOptions,
    ) -> Result<Vec<Message>> {
        self.storage
            .get_messages(user_id, conversation_id, options)
            .await
    }

    pub async fn clear_messages(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<()> {
        self.storage.clear_messages(user_id, conversation_id).await
    }

    // === Context reads ===

    /// Produce the message context for a turn.
    ///
    /// The recent-message fetch is mandatory and its failure propagates.
    /// The semantic path runs only when requested and configured, and any
    /// failure inside it falls back to the recency-only list with a warning
    /// in the logs; the return value carries no degradation marker.
    pub async fn get_messages_with_context(
        &self,
        user_id: &str,
        conversation_id: &str,
        options: ContextOptions,
    ) -> Result<Vec<Message>> {
        let limit = options.limit.unwrap_or(self.config.retrieval_limit);
        let recent = self
            .storage
            .get_messages(user_id, conversation_id, GetMessagesOptions::last(limit))
            .await?;

        if !options.use_semantic_search {
            return Ok(recent);
        }
        let Some(query) = options.current_query.as_deref().filter(|q| !q.is_empty()) else {
            return Ok(recent);
        };
        if !self.has_vector_support() {
            tracing::debug!(
                conversation_id,
                "semantic search requested without vector support; returning recent only"
            );
            return Ok(recent);
        }

        match self
            .semantic_hits(user_id, conversation_id, query, limit, &options)
            .await
        {
            Ok(semantic) => {
                let strategy = options
                    .merge_strategy
                    .unwrap_or(self.config.merge_strategy);
                Ok(merge_messages(recent, semantic, strategy))
            }
            Err(error) => {
                tracing::warn!(
                    conversation_id,
                    user_id,
                    %error,
                    "semantic search failed; falling back to recent messages"
                );
                Ok(recent)
            }
        }
    }

    /// Convenience wrapper that always runs the semantic path.
    pub async fn get_messages_with_semantic_search(
        &self,
        user_id: &str,
        conversation_id: &str,
        query: impl Into<String>,
        mut options: ContextOptions,
    ) -> Result<Vec<Message>> {
        options.use_semantic_search = true;
        options.current_query = Some(query.into());
        self.get_messages_with_context(user_id, conversation_id, options)
            .await
    }

    /// Embed the query, search the vector store scoped to this bucket, and
    /// resolve hits back to stored messages. Hits whose message has been
    /// evicted from the bounded log are dropped silently.
    async fn semantic_hits(
        &self,
        user_id: &str,
        conversation_id: &str,
        query: &str,
        limit: usize,
        options: &ContextOptions,
    ) -> Result<Vec<Message>> {
        let Some(vector) = self.vector.as_ref() else {
            return Ok(Vec::new());
        };

        let query_vector = self.embed_cached(query).await?;

        let mut filter = HashMap::new();
        filter.insert(
            "conversation_id".to_string(),
            serde_json::Value::String(conversation_id.to_string()),
        );
        filter.insert(
            "user_id".to_string(),
            serde_json::Value::String(user_id.to_string()),
        );

        let hits = vector
            .search(
                &query_vector,
                SearchOptions {
                    limit: options.semantic_limit.unwrap_or(limit),
                    threshold: options
                        .semantic_threshold
                        .unwrap_or(self.config.semantic_threshold),
                    filter: Some(filter),
                },
            )
            .await?;

        // The bucket itself is bounded, so reading it whole is cheap.
        let bucket = self
            .storage
            .get_messages(user_id, conversation_id, GetMessagesOptions::default())
            .await?;
        let by_id: HashMap<&str, &Message> =
            bucket.iter().map(|m| (m.id.as_str(), m)).collect();

        let resolved = hits
            .iter()
            .filter_map(|hit| {
                hit.metadata
                    .get("message_id")
                    .and_then(|v| v.as_str())
                    .and_then(|id| by_id.get(id))
                    .map(|m| (*m).clone())
            })
            .collect();

        Ok(resolved)
    }

    /// Cache-then-adapter embedding for a single text.
    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(hit) = self.cache.lock().await.get(text) {
            return Ok(hit);
        }
        let embedder = self
            .embedder
            .as_ref()
            .ok_or_else(|| Error::embedding("no embedding adapter configured"))?;
        let embedding = embedder.embed(text).await?;
        self.cache.lock().await.set(text, &embedding);
        Ok(embedding)
    }

    /// Embed and store vectors for every message with extractable text.
    ///
    /// Failures are logged and swallowed: indexing is best-effort and must
    /// never break the write path.
    async fn index_messages(&self, messages: &[Message], user_id: &str, conversation_id: &str) {
        let (Some(vector), Some(embedder)) = (&self.vector, &self.embedder) else {
            return;
        };

        let with_text: Vec<(&Message, String)> = messages
            .iter()
            .filter_map(|m| m.extract_text().map(|t| (m, t)))
            .collect();
        if with_text.is_empty() {
            return;
        }

        let texts: Vec<String> = with_text.iter().map(|(_, t)| t.clone()).collect();
        let split = self.cache.lock().await.split_by_cached(&texts);

        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for cached in &split.cached {
            embeddings[cached.index] = Some(cached.embedding.clone());
        }

        if !split.uncached.is_empty() {
            let chunk_size = embedder
                .max_batch_size()
                .unwrap_or(split.uncached.len())
                .max(1);

            for chunk in split.uncached.chunks(chunk_size) {
                let chunk_texts: Vec<String> = chunk.iter().map(|u| u.text.clone()).collect();
                let embedded = match embedder.embed_batch(&chunk_texts).await {
                    Ok(embedded) if embedded.len() == chunk_texts.len() => embedded,
                    Ok(embedded) => {
                        tracing::warn!(
                            expected = chunk_texts.len(),
                            actual = embedded.len(),
                            "embedding adapter returned wrong batch size; skipping indexing"
                        );
                        return;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "batch embedding failed; skipping indexing");
                        return;
                    }
                };

                let mut cache = self.cache.lock().await;
                for (uncached, embedding) in chunk.iter().zip(embedded) {
                    cache.set(&uncached.text, &embedding);
                    embeddings[uncached.index] = Some(embedding);
                }
            }
        }

        let entries: Vec<VectorEntry> = with_text
            .iter()
            .zip(embeddings)
            .filter_map(|((message, _), embedding)| {
                let embedding = embedding?;
                let mut metadata = HashMap::new();
                metadata.insert(
                    "message_id".to_string(),
                    serde_json::Value::String(message.id.clone()),
                );
                metadata.insert(
                    "conversation_id".to_string(),
                    serde_json::Value::String(conversation_id.to_string()),
                );
                metadata.insert(
                    "user_id".to_string(),
                    serde_json::Value::String(user_id.to_string()),
                );
                metadata.insert(
                    "role".to_string(),
                    serde_json::Value::String(message.role.to_string()),
                );
                Some(
                    VectorEntry::new(vector_id(conversation_id, &message.id), embedding)
                        .with_metadata(metadata),
                )
            })
            .collect();

        if let Err(error) = vector.store_batch(entries).await {
            tracing::warn!(conversation_id, %error, "failed to store message vectors");
        }
    }

    // === Working memory ===

    /// Whether working memory is configured.
    pub fn has_working_memory_support(&self) -> bool {
        self.config.working_memory.is_some()
    }

    fn working_memory_key(&self, user_id: &str, conversation_id: &str) -> Option<String> {
        self.config.working_memory.as_ref().map(|wm| match wm.scope {
            WorkingMemoryScope::Conversation => format!("conversation:{conversation_id}"),
            WorkingMemoryScope::User => format!("user:{user_id}"),
        })
    }

    /// Read the working-memory blob for this scope, `None` when unset or
    /// the feature is disabled.
    pub async fn get_working_memory(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<String>> {
        match self.working_memory_key(user_id, conversation_id) {
            Some(key) => self.storage.get_working_memory(&key).await,
            None => Ok(None),
        }
    }

    /// Replace the working-memory blob. With a configured schema the
    /// content must be JSON that validates against it; otherwise it is
    /// stored as free-form text.
    pub async fn update_working_memory(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<()> {
        let key = self
            .working_memory_key(user_id, conversation_id)
            .ok_or_else(|| Error::invalid_input("working memory is not configured"))?;

        if let Some(validator) = &self.working_memory_validator {
            let value: serde_json::Value = serde_json::from_str(content)
                .map_err(|e| Error::working_memory(format!("content is not JSON: {e}")))?;
            if let Err(error) = validator.validate(&value) {
                return Err(Error::working_memory(error.to_string()));
            }
        }

        self.storage.set_working_memory(&key, content).await
    }

    /// Drop the working-memory blob for this scope.
    pub async fn clear_working_memory(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        match self.working_memory_key(user_id, conversation_id) {
            Some(key) => self.storage.clear_working_memory(&key).await,
            None => Ok(()),
        }
    }
}

/// Merge recent and semantic messages under a strategy, deduplicating by
/// message id. Strategy order is final; no timestamp resort happens.
fn merge_messages(
    recent: Vec<Message>,
    semantic: Vec<Message>,
    strategy: MergeStrategy,
) -> Vec<Message> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(recent.len() + semantic.len());

    fn push(message: Message, merged: &mut Vec<Message>, seen: &mut HashSet<String>) {
        if seen.insert(message.id.clone()) {
            merged.push(message);
        }
    }

    match strategy {
        MergeStrategy::Append => {
            for message in recent {
                push(message, &mut merged, &mut seen);
            }
            for message in semantic {
                push(message, &mut merged, &mut seen);
            }
        }
        MergeStrategy::Prepend => {
            for message in semantic {
                push(message, &mut merged, &mut seen);
            }
            for message in recent {
                push(message, &mut merged, &mut seen);
            }
        }
        MergeStrategy::Interleave => {
            let mut recent_iter = recent.into_iter();
            let mut semantic_iter = semantic.into_iter();
            loop {
                let next_recent = recent_iter.next();
                let next_semantic = semantic_iter.next();
                if next_recent.is_none() && next_semantic.is_none() {
                    break;
                }
                if let Some(message) = next_recent {
                    push(message, &mut merged, &mut seen);
                }
                if let Some(message) = next_semantic {
                    push(message, &mut merged, &mut seen);
                }
            }
        }
    }

    merged
}
