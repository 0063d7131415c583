//! Configuration for relay-memory

use std::time::Duration;

use crate::context::MergeStrategy;

/// Scope of the working-memory blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkingMemoryScope {
    /// One blob per conversation
    Conversation,
    /// One blob per user, shared across their conversations
    User,
}

/// Working-memory feature configuration
#[derive(Debug, Clone)]
pub struct WorkingMemoryConfig {
    pub scope: WorkingMemoryScope,

    /// Optional JSON schema the content must validate against.
    /// Without a schema, content is treated as free-form text.
    pub schema: Option<serde_json::Value>,
}

impl Default for WorkingMemoryConfig {
    fn default() -> Self {
        Self {
            scope: WorkingMemoryScope::Conversation,
            schema: None,
        }
    }
}

/// Embedding cache sizing
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached embeddings
    pub max_size: usize,

    /// Entry lifetime; expired entries are treated as absent
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Background task queue sizing
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrent worker count
    pub workers: usize,

    /// Retries after the first failed attempt
    pub retries: usize,

    /// Channel capacity before `enqueue` applies backpressure
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            retries: 2,
            capacity: 64,
        }
    }
}

/// Configuration for the memory system.
///
/// The per-bucket message cap is not configured here: it belongs to the
/// conversation store and is fixed at store construction
/// ([`crate::storage::InMemoryConversationStore::new`]).
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Default number of recent messages fetched for context
    pub retrieval_limit: usize,

    /// Default minimum score for semantic results (0.0 - 1.0)
    pub semantic_threshold: f32,

    /// How semantic hits are combined with recent messages
    pub merge_strategy: MergeStrategy,

    /// Embedding cache sizing
    pub cache: CacheConfig,

    /// Background queue sizing
    pub queue: QueueConfig,

    /// Working-memory feature; `None` disables it
    pub working_memory: Option<WorkingMemoryConfig>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            retrieval_limit: 10,
            semantic_threshold: 0.0,
            merge_strategy: MergeStrategy::Append,
            cache: CacheConfig::default(),
            queue: QueueConfig::default(),
            working_memory: None,
        }
    }
}

impl MemoryConfig {
    /// Enable working memory with the given scope
    pub fn with_working_memory(mut self, config: WorkingMemoryConfig) -> Self {
        self.working_memory = Some(config);
        self
    }
}
