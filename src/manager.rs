//! Memory manager: turn-loop orchestration over the context assembler
//!
//! Adds background-queued side effects around the agent's turn loop. The
//! triggering input of a turn is persisted off the hot path as one atomic
//! unit: ensure the conversation exists, then save the message. Callers get
//! a handle they may await, but a concurrently issued context read is not
//! guaranteed to observe the just-enqueued input.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::context::{ContextAssembler, ContextOptions};
use crate::conversation::{Conversation, ConversationInput, ConversationQuery, ConversationUpdate};
use crate::embedding::EmbeddingAdapter;
use crate::error::{Error, Result};
use crate::events::{MemoryEvent, MemoryEventKind};
use crate::message::Message;
use crate::queue::{TaskHandle, TaskQueue};
use crate::storage::{GetMessagesOptions, VectorStorage};

/// Orchestrates reads and writes around an agent's turn-taking loop.
pub struct MemoryManager {
    assembler: Arc<ContextAssembler>,
    queue: TaskQueue,
    events: Option<mpsc::UnboundedSender<MemoryEvent>>,
    default_resource: String,
}

impl MemoryManager {
    pub fn new(assembler: Arc<ContextAssembler>) -> Self {
        let queue = TaskQueue::new(assembler.config().queue.clone());
        Self {
            assembler,
            queue,
            events: None,
            default_resource: "default".to_string(),
        }
    }

    /// Send lifecycle events to this sink. Absent sink means no emission.
    pub fn with_event_sink(mut self, sink: mpsc::UnboundedSender<MemoryEvent>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Resource id used when `remember` has to create the conversation.
    pub fn with_default_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.default_resource = resource_id.into();
        self
    }

    fn emit(&self, kind: MemoryEventKind) {
        if let Some(sink) = &self.events {
            let _ = sink.send(MemoryEvent::new(kind));
        }
    }

    fn emit_via(sink: &Option<mpsc::UnboundedSender<MemoryEvent>>, kind: MemoryEventKind) {
        if let Some(sink) = sink {
            let _ = sink.send(MemoryEvent::new(kind));
        }
    }

    /// Persist a turn's triggering input in the background.
    ///
    /// Enqueues one atomic unit: create the conversation if it does not
    /// exist yet, then save the message. Creation always precedes the save;
    /// a concurrent create by another caller is tolerated. The returned
    /// handle resolves once all attempts finish.
    pub async fn remember(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: Message,
    ) -> Result<TaskHandle> {
        let assembler = Arc::clone(&self.assembler);
        let events = self.events.clone();
        let user_id = user_id.to_string();
        let conversation_id = conversation_id.to_string();
        let resource_id = self.default_resource.clone();

        self.queue
            .enqueue("remember", move || {
                let assembler = Arc::clone(&assembler);
                let events = events.clone();
                let user_id = user_id.clone();
                let conversation_id = conversation_id.clone();
                let resource_id = resource_id.clone();
                let message = message.clone();

                Box::pin(async move {
                    if assembler.get_conversation(&conversation_id).await?.is_none() {
                        let input = ConversationInput::new(&user_id, &resource_id)
                            .with_id(&conversation_id);
                        match assembler.create_conversation(input).await {
                            Ok(_) => Self::emit_via(
                                &events,
                                MemoryEventKind::ConversationCreated {
                                    conversation_id: conversation_id.clone(),
                                    user_id: user_id.clone(),
                                },
                            ),
                            // Lost a race against another creator; the
                            // conversation exists, which is all we need.
                            Err(Error::ConversationAlreadyExists(_)) => {}
                            Err(error) => return Err(error),
                        }
                    }

                    let saved = assembler
                        .add_message(message, &user_id, &conversation_id)
                        .await?;
                    Self::emit_via(
                        &events,
                        MemoryEventKind::MessageSaved {
                            conversation_id: conversation_id.clone(),
                            user_id: user_id.clone(),
                            message_id: saved.id,
                        },
                    );
                    Ok(())
                })
            })
            .await
    }

    /// Assemble the message context for a turn.
    pub async fn recall(
        &self,
        user_id: &str,
        conversation_id: &str,
        options: ContextOptions,
    ) -> Result<Vec<Message>> {
        self.assembler
            .get_messages_with_context(user_id, conversation_id, options)
            .await
    }

    // === Conversation surface ===

    pub async fn create_conversation(&self, input: ConversationInput) -> Result<Conversation> {
        let conversation = self.assembler.create_conversation(input).await?;
        self.emit(MemoryEventKind::ConversationCreated {
            conversation_id: conversation.id.clone(),
            user_id: conversation.user_id.clone(),
        });
        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.assembler.get_conversation(id).await
    }

    pub async fn query_conversations(&self, query: ConversationQuery) -> Result<Vec<Conversation>> {
        self.assembler.query_conversations(query).await
    }

    pub async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        self.assembler.update_conversation(id, update).await
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.assembler.delete_conversation(id).await?;
        self.emit(MemoryEventKind::ConversationDeleted {
            conversation_id: id.to_string(),
        });
        Ok(())
    }

    // === Message surface ===

    pub async fn add_message(
        &self,
        message: Message,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Message> {
        let saved = self
            .assembler
            .add_message(message, user_id, conversation_id)
            .await?;
        self.emit(MemoryEventKind::MessageSaved {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            message_id: saved.id.clone(),
        });
        Ok(saved)
    }

    pub async fn add_messages(
        &self,
        messages: Vec<Message>,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<Message>> {
        let saved = self
            .assembler
            .add_messages(messages, user_id, conversation_id)
            .await?;
        for message in &saved {
            self.emit(MemoryEventKind::MessageSaved {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
                message_id: message.id.clone(),
            });
        }
        Ok(saved)
    }

    pub async fn get_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        options: GetMessagesOptions,
    ) -> Result<Vec<Message>> {
        self.assembler
            .get_messages(user_id, conversation_id, options)
            .await
    }

    pub async fn clear_messages(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
    ) -> Result<()> {
        self.assembler.clear_messages(user_id, conversation_id).await?;
        self.emit(MemoryEventKind::MessagesCleared {
            user_id: user_id.to_string(),
            conversation_id: conversation_id.map(str::to_string),
        });
        Ok(())
    }

    // === Working memory surface ===

    pub fn has_working_memory_support(&self) -> bool {
        self.assembler.has_working_memory_support()
    }

    pub async fn get_working_memory(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<String>> {
        self.assembler
            .get_working_memory(user_id, conversation_id)
            .await
    }

    pub async fn update_working_memory(
        &self,
        user_id: &str,
        conversation_id: &str,
        content: &str,
    ) -> Result<()> {
        self.assembler
            .update_working_memory(user_id, conversation_id, content)
            .await?;
        self.emit(MemoryEventKind::WorkingMemoryUpdated {
            user_id: user_id.to_string(),
            conversation_id: conversation_id.to_string(),
        });
        Ok(())
    }

    pub async fn clear_working_memory(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        self.assembler
            .clear_working_memory(user_id, conversation_id)
            .await
    }

    // === Capability introspection ===

    pub fn has_vector_support(&self) -> bool {
        self.assembler.has_vector_support()
    }

    pub fn embedding_adapter(&self) -> Option<Arc<dyn EmbeddingAdapter>> {
        self.assembler.embedding_adapter()
    }

    pub fn vector_adapter(&self) -> Option<Arc<dyn VectorStorage>> {
        self.assembler.vector_adapter()
    }

    /// Drain the background queue and stop its workers.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfig;
    use crate::message::Role;
    use crate::storage::InMemoryConversationStore;

    fn manager() -> MemoryManager {
        let storage = Arc::new(InMemoryConversationStore::new(10));
        let assembler =
            Arc::new(ContextAssembler::new(storage, MemoryConfig::default()).unwrap());
        MemoryManager::new(assembler)
    }

    #[tokio::test]
    async fn remember_creates_conversation_then_saves() {
        let m = manager();

        let handle = m
            .remember("u1", "c1", Message::text(Role::User, "hello"))
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let conversation = m.get_conversation("c1").await.unwrap();
        assert!(conversation.is_some());
        assert_eq!(conversation.unwrap().user_id, "u1");

        let messages = m
            .get_messages("u1", "c1", GetMessagesOptions::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].extract_text().unwrap(), "hello");

        m.shutdown().await;
    }

    #[tokio::test]
    async fn remember_tolerates_existing_conversation() {
        let m = manager();
        m.create_conversation(ConversationInput::new("u1", "agent").with_id("c1"))
            .await
            .unwrap();

        let handle = m
            .remember("u1", "c1", Message::text(Role::User, "again"))
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let messages = m
            .get_messages("u1", "c1", GetMessagesOptions::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);

        m.shutdown().await;
    }

    #[tokio::test]
    async fn events_are_emitted_in_order_for_remember() {
        let (sink, mut events) = mpsc::unbounded_channel();
        let storage = Arc::new(InMemoryConversationStore::new(10));
        let assembler =
            Arc::new(ContextAssembler::new(storage, MemoryConfig::default()).unwrap());
        let m = MemoryManager::new(assembler).with_event_sink(sink);

        let handle = m
            .remember("u1", "c1", Message::text(Role::User, "hi"))
            .await
            .unwrap();
        handle.wait().await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(
            first.kind,
            MemoryEventKind::ConversationCreated { .. }
        ));
        let second = events.recv().await.unwrap();
        assert!(matches!(second.kind, MemoryEventKind::MessageSaved { .. }));

        m.shutdown().await;
    }

    #[tokio::test]
    async fn batch_saves_emit_one_event_per_message() {
        let (sink, mut events) = mpsc::unbounded_channel();
        let storage = Arc::new(InMemoryConversationStore::new(10));
        let assembler =
            Arc::new(ContextAssembler::new(storage, MemoryConfig::default()).unwrap());
        let m = MemoryManager::new(assembler).with_event_sink(sink);

        let saved = m
            .add_messages(
                vec![
                    Message::text(Role::User, "a"),
                    Message::text(Role::Assistant, "b"),
                ],
                "u1",
                "c1",
            )
            .await
            .unwrap();
        assert_eq!(saved.len(), 2);

        for message in &saved {
            let event = events.recv().await.unwrap();
            assert!(matches!(
                event.kind,
                MemoryEventKind::MessageSaved { ref message_id, .. } if *message_id == message.id
            ));
        }

        m.shutdown().await;
    }

    #[tokio::test]
    async fn recall_returns_recent_messages() {
        let m = manager();
        for body in ["one", "two", "three"] {
            m.add_message(Message::text(Role::User, body), "u1", "c1")
                .await
                .unwrap();
        }

        let context = m
            .recall("u1", "c1", ContextOptions::recent(2))
            .await
            .unwrap();
        assert_eq!(context.len(), 2);
        assert_eq!(context[1].extract_text().unwrap(), "three");

        m.shutdown().await;
    }

    #[tokio::test]
    async fn capability_introspection_without_adapters() {
        let m = manager();
        assert!(!m.has_vector_support());
        assert!(!m.has_working_memory_support());
        assert!(m.embedding_adapter().is_none());
        assert!(m.vector_adapter().is_none());
        m.shutdown().await;
    }
}
