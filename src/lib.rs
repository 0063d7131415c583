//! # Relay Memory
//!
//! Conversation memory and semantic context system for Relay agents.
//!
//! ## Architecture
//!
//! The memory system is composed leaf-first:
//! - **VectorMath** - pure similarity functions
//! - **EmbeddingCache** - bounded text-to-vector cache with TTL
//! - **VectorStore** - keyed vectors with brute-force similarity search
//! - **ConversationStore** - conversation CRUD plus bounded message logs
//! - **ContextAssembler** - recency + semantic retrieval and merging
//! - **MemoryManager** - turn-loop orchestration with background writes
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relay_memory::{
//!     ContextAssembler, ContextOptions, MemoryConfig, MemoryManager,
//!     storage::InMemoryConversationStore,
//! };
//!
//! let storage = Arc::new(InMemoryConversationStore::new(100));
//! let assembler = Arc::new(ContextAssembler::new(storage, MemoryConfig::default())?);
//! let manager = MemoryManager::new(assembler);
//!
//! // Persist the turn's input in the background
//! let handle = manager.remember("user-1", "conv-1", message).await?;
//!
//! // Assemble context for the next generation call
//! let context = manager.recall("user-1", "conv-1", ContextOptions::recent(10)).await?;
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod events;
pub mod manager;
pub mod math;
pub mod message;
pub mod queue;
pub mod storage;

pub use cache::EmbeddingCache;
pub use config::{CacheConfig, MemoryConfig, QueueConfig, WorkingMemoryConfig, WorkingMemoryScope};
pub use context::{ContextAssembler, ContextOptions, MergeStrategy};
pub use conversation::{
    Conversation, ConversationInput, ConversationQuery, ConversationUpdate, OrderBy, SortDirection,
};
pub use embedding::EmbeddingAdapter;
pub use error::{Error, Result};
pub use events::{MemoryEvent, MemoryEventKind};
pub use manager::MemoryManager;
pub use message::{Message, MessagePart, Role, StoredMessage};
pub use queue::{TaskHandle, TaskQueue};
pub use storage::{
    ConversationStorage, GetMessagesOptions, InMemoryConversationStore, InMemoryVectorStore,
    SearchOptions, VectorEntry, VectorSearchResult, VectorStorage,
};
