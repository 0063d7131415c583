//! Storage contracts and in-memory reference backends
//!
//! Any backing implementation (in-memory, SQL) must satisfy these traits
//! exactly, including the most-recent-N slicing in `get_messages` and the
//! cascade on `delete_conversation`.

pub mod conversation;
pub mod vector;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::conversation::{Conversation, ConversationInput, ConversationQuery, ConversationUpdate};
use crate::error::Result;
use crate::message::{Message, Role};

pub use conversation::InMemoryConversationStore;
pub use vector::{InMemoryVectorStore, SearchOptions, VectorEntry, VectorSearchResult};

/// Filters for reading messages out of a conversation bucket.
#[derive(Debug, Clone, Default)]
pub struct GetMessagesOptions {
    /// Keep only the most recent N messages after filtering
    pub limit: Option<usize>,

    /// Exclusive upper bound on creation time
    pub before: Option<DateTime<Utc>>,

    /// Exclusive lower bound on creation time
    pub after: Option<DateTime<Utc>>,

    /// Keep only these roles
    pub roles: Option<Vec<Role>>,
}

impl GetMessagesOptions {
    pub fn last(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }
}

/// Conversation and message persistence contract.
#[async_trait]
pub trait ConversationStorage: Send + Sync {
    /// Create a conversation; fails when the id is already present.
    async fn create_conversation(&self, input: ConversationInput) -> Result<Conversation>;

    /// Fetch a conversation by id.
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// List conversations matching a filter, paginated and ordered.
    async fn query_conversations(&self, query: ConversationQuery) -> Result<Vec<Conversation>>;

    /// Merge a partial update; `id` and `created_at` stay untouched and
    /// `updated_at` is bumped.
    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation>;

    /// Delete a conversation and every message bucket that references it,
    /// across all users.
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Append a message to the `(user, conversation)` bucket. Buckets are
    /// trimmed to the store's limit after every single append, oldest first.
    async fn add_message(
        &self,
        message: Message,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Message>;

    /// Append several messages; the per-append eviction check also runs
    /// mid-batch.
    async fn add_messages(
        &self,
        messages: Vec<Message>,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>>;

    /// Read messages sorted ascending by creation time. When `limit` is set,
    /// the most recent N after filtering are returned (the tail, not the
    /// head).
    async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        options: GetMessagesOptions,
    ) -> Result<Vec<Message>>;

    /// Clear one bucket, or all buckets for the user when no conversation
    /// is given. Working memory is unaffected.
    async fn clear_messages(&self, user_id: &str, conversation_id: Option<&str>) -> Result<()>;

    /// Read the working-memory blob stored under a scope key.
    async fn get_working_memory(&self, key: &str) -> Result<Option<String>>;

    /// Write the working-memory blob for a scope key.
    async fn set_working_memory(&self, key: &str, content: &str) -> Result<()>;

    /// Drop the working-memory blob for a scope key.
    async fn clear_working_memory(&self, key: &str) -> Result<()>;
}

/// Vector persistence and similarity search contract.
#[async_trait]
pub trait VectorStorage: Send + Sync {
    /// Insert or overwrite an entry. All vectors in one store share the
    /// dimensionality fixed by the first stored vector.
    async fn store(
        &self,
        id: &str,
        vector: &[f32],
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<()>;

    /// Sequential `store` per entry; not atomic, a mid-batch failure leaves
    /// earlier entries stored.
    async fn store_batch(&self, entries: Vec<VectorEntry>) -> Result<()>;

    /// Brute-force cosine scan over entries matching the metadata filter.
    async fn search(
        &self,
        query: &[f32],
        options: SearchOptions,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Fetch an entry by id.
    async fn get(&self, id: &str) -> Result<Option<VectorEntry>>;

    /// Remove an entry by id; absent ids are ignored.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Remove several entries by id.
    async fn delete_batch(&self, ids: &[String]) -> Result<()>;

    /// Remove every entry whose metadata matches the filter exactly.
    /// Returns the number of entries removed. This is how cascade cleanup
    /// reaches entries whose source rows are gone.
    async fn delete_by_filter(
        &self,
        filter: &HashMap<String, serde_json::Value>,
    ) -> Result<usize>;

    /// Drop all entries and reset the established dimensionality.
    async fn clear(&self) -> Result<()>;

    /// Number of stored entries.
    async fn count(&self) -> Result<usize>;
}
