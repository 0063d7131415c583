//! Error types for relay-memory

use thiserror::Error;

/// Result type alias for relay-memory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in relay-memory
#[derive(Error, Debug)]
pub enum Error {
    #[error("Conversation already exists: {0}")]
    ConversationAlreadyExists(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty vector passed to similarity math")]
    EmptyVector,

    #[error("Invalid working memory format: {0}")]
    InvalidWorkingMemoryFormat(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector search error: {0}")]
    VectorSearch(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn conversation_exists(id: impl Into<String>) -> Self {
        Self::ConversationAlreadyExists(id.into())
    }

    pub fn conversation_not_found(id: impl Into<String>) -> Self {
        Self::ConversationNotFound(id.into())
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn working_memory(msg: impl Into<String>) -> Self {
        Self::InvalidWorkingMemoryFormat(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn vector_search(msg: impl Into<String>) -> Self {
        Self::VectorSearch(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
