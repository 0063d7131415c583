//! Memory lifecycle events
//!
//! Every event is a tagged variant wrapped in a common envelope, so sinks
//! can match on the kinds they care about without parsing opaque blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemoryEventKind {
    ConversationCreated {
        conversation_id: String,
        user_id: String,
    },
    ConversationDeleted {
        conversation_id: String,
    },
    MessageSaved {
        conversation_id: String,
        user_id: String,
        message_id: String,
    },
    MessagesCleared {
        user_id: String,
        conversation_id: Option<String>,
    },
    WorkingMemoryUpdated {
        user_id: String,
        conversation_id: String,
    },
}

/// Envelope around an event kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MemoryEventKind,
}

impl MemoryEvent {
    pub fn new(kind: MemoryEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }
}
