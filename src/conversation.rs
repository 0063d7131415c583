//! Conversation records and query types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation between a user and an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Globally unique conversation ID
    pub id: String,

    /// Owning user
    pub user_id: String,

    /// Resource this conversation is attached to (agent, workflow, ...)
    pub resource_id: String,

    /// Human-readable title
    pub title: String,

    /// Opaque key-value metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Creation time; immutable after creation
    pub created_at: DateTime<Utc>,

    /// Bumped on every mutation, never moves backwards
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a conversation
#[derive(Debug, Clone, Default)]
pub struct ConversationInput {
    /// Explicit id; generated when absent
    pub id: Option<String>,
    pub user_id: String,
    pub resource_id: String,
    pub title: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ConversationInput {
    pub fn new(user_id: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            resource_id: resource_id.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Materialize into a conversation record with fresh timestamps.
    pub fn into_conversation(self) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: self.user_id,
            resource_id: self.resource_id,
            title: self.title,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a conversation; `id` and `created_at` are immutable.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub resource_id: Option<String>,
    /// Keys merged into the existing metadata map
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Conversation list ordering column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    CreatedAt,
    UpdatedAt,
    Title,
}

/// Conversation list ordering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Filter and pagination options for listing conversations
#[derive(Debug, Clone)]
pub struct ConversationQuery {
    pub user_id: Option<String>,
    pub resource_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub order_by: OrderBy,
    pub direction: SortDirection,
}

impl Default for ConversationQuery {
    fn default() -> Self {
        Self {
            user_id: None,
            resource_id: None,
            limit: None,
            offset: 0,
            order_by: OrderBy::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl ConversationQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}
