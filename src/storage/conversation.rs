//! In-memory conversation store with bounded per-conversation message logs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::RwLock;

use crate::conversation::{
    Conversation, ConversationInput, ConversationQuery, ConversationUpdate, OrderBy, SortDirection,
};
use crate::error::{Error, Result};
use crate::message::{Message, StoredMessage};
use crate::storage::{ConversationStorage, GetMessagesOptions};

/// Key for a message bucket: one log per user per conversation.
type BucketKey = (String, String);

#[derive(Default)]
struct StoreState {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<BucketKey, Vec<StoredMessage>>,
    working_memory: HashMap<String, String>,
}

/// In-memory reference implementation of [`ConversationStorage`].
///
/// Each `(user, conversation)` bucket behaves as a FIFO ring: appends past
/// `storage_limit` drop the oldest entries.
pub struct InMemoryConversationStore {
    storage_limit: usize,
    state: RwLock<StoreState>,
}

impl InMemoryConversationStore {
    pub fn new(storage_limit: usize) -> Self {
        Self {
            storage_limit: storage_limit.max(1),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Append one message into a bucket and trim to the storage limit.
    fn append_locked(
        &self,
        state: &mut StoreState,
        message: Message,
        user_id: &str,
        conversation_id: &str,
    ) -> Message {
        let bucket = state
            .messages
            .entry((user_id.to_string(), conversation_id.to_string()))
            .or_default();

        // Keep created_at strictly ascending within a bucket even when the
        // clock does not move between appends.
        let mut created_at = Utc::now();
        if let Some(last) = bucket.last() {
            if created_at <= last.created_at {
                created_at = last.created_at + ChronoDuration::microseconds(1);
            }
        }

        bucket.push(StoredMessage {
            message: message.clone(),
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
            created_at,
        });

        if bucket.len() > self.storage_limit {
            let excess = bucket.len() - self.storage_limit;
            bucket.drain(0..excess);
        }

        message
    }
}

#[async_trait]
impl ConversationStorage for InMemoryConversationStore {
    async fn create_conversation(&self, input: ConversationInput) -> Result<Conversation> {
        let conversation = input.into_conversation();

        let mut state = self.state.write().await;
        if state.conversations.contains_key(&conversation.id) {
            return Err(Error::conversation_exists(&conversation.id));
        }
        state
            .conversations
            .insert(conversation.id.clone(), conversation.clone());

        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations.get(id).cloned())
    }

    async fn query_conversations(&self, query: ConversationQuery) -> Result<Vec<Conversation>> {
        let state = self.state.read().await;

        let mut matched: Vec<Conversation> = state
            .conversations
            .values()
            .filter(|c| {
                query
                    .user_id
                    .as_ref()
                    .map_or(true, |user_id| &c.user_id == user_id)
                    && query
                        .resource_id
                        .as_ref()
                        .map_or(true, |resource_id| &c.resource_id == resource_id)
            })
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let ordering = match query.order_by {
                OrderBy::CreatedAt => a.created_at.cmp(&b.created_at),
                OrderBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                OrderBy::Title => a.title.cmp(&b.title),
            };
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let page: Vec<Conversation> = matched
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(page)
    }

    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or_else(|| Error::conversation_not_found(id))?;

        if let Some(title) = update.title {
            conversation.title = title;
        }
        if let Some(resource_id) = update.resource_id {
            conversation.resource_id = resource_id;
        }
        if let Some(metadata) = update.metadata {
            conversation.metadata.extend(metadata);
        }

        // updated_at never moves backwards, even with a skewed clock.
        conversation.updated_at = Utc::now().max(conversation.updated_at);

        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.conversations.remove(id).is_none() {
            return Err(Error::conversation_not_found(id));
        }
        state
            .messages
            .retain(|(_, conversation_id), _| conversation_id != id);
        Ok(())
    }

    async fn add_message(
        &self,
        message: Message,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Message> {
        let mut state = self.state.write().await;
        Ok(self.append_locked(&mut state, message, user_id, conversation_id))
    }

    async fn add_messages(
        &self,
        messages: Vec<Message>,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>> {
        let mut state = self.state.write().await;
        let stored = messages
            .into_iter()
            .map(|message| self.append_locked(&mut state, message, user_id, conversation_id))
            .collect();
        Ok(stored)
    }

    async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        options: GetMessagesOptions,
    ) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        let key = (user_id.to_string(), conversation_id.to_string());

        let Some(bucket) = state.messages.get(&key) else {
            return Ok(Vec::new());
        };

        // Buckets are append-ordered with ascending created_at, so the
        // filtered view is already sorted.
        let mut filtered: Vec<&StoredMessage> = bucket
            .iter()
            .filter(|stored| {
                options
                    .roles
                    .as_ref()
                    .map_or(true, |roles| roles.contains(&stored.message.role))
                    && options
                        .before
                        .map_or(true, |before| stored.created_at < before)
                    && options.after.map_or(true, |after| stored.created_at > after)
            })
            .collect();

        // Limit takes the most recent N: the tail of the filtered list.
        if let Some(limit) = options.limit {
            if filtered.len() > limit {
                filtered = filtered.split_off(filtered.len() - limit);
            }
        }

        Ok(filtered.into_iter().map(|s| s.message.clone()).collect())
    }

    async fn clear_messages(&self, user_id: &str, conversation_id: Option<&str>) -> Result<()> {
        let mut state = self.state.write().await;
        match conversation_id {
            Some(conversation_id) => {
                state
                    .messages
                    .remove(&(user_id.to_string(), conversation_id.to_string()));
            }
            None => {
                state.messages.retain(|(uid, _), _| uid != user_id);
            }
        }
        Ok(())
    }

    async fn get_working_memory(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state.working_memory.get(key).cloned())
    }

    async fn set_working_memory(&self, key: &str, content: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .working_memory
            .insert(key.to_string(), content.to_string());
        Ok(())
    }

    async fn clear_working_memory(&self, key: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.working_memory.remove(key);
        Ok(())
    }
}
