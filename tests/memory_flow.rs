//! End-to-end flows through the memory manager with stub adapters.

use std::sync::Arc;

use async_trait::async_trait;
use relay_memory::{
    ContextAssembler, ContextOptions, ConversationInput, EmbeddingAdapter, GetMessagesOptions,
    InMemoryConversationStore, InMemoryVectorStore, MemoryConfig, MemoryManager, MergeStrategy,
    Message, Result, Role, VectorStorage,
};

/// Embeds text onto a 3-axis "topic" space keyed by keywords, so similarity
/// in tests is predictable.
struct TopicEmbedder;

fn topic_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v = vec![0.0f32, 0.0, 0.0];
    if lower.contains("rocket") {
        v[0] = 1.0;
    }
    if lower.contains("garden") {
        v[1] = 1.0;
    }
    if lower.contains("budget") {
        v[2] = 1.0;
    }
    if v.iter().all(|x| *x == 0.0) {
        v[2] = 0.1;
    }
    v
}

#[async_trait]
impl EmbeddingAdapter for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(topic_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| topic_vector(t)).collect())
    }

    fn dimensions(&self) -> Option<usize> {
        Some(3)
    }

    fn model_name(&self) -> &str {
        "topic-stub"
    }
}

fn build_manager(storage_limit: usize) -> (MemoryManager, Arc<InMemoryVectorStore>) {
    let storage = Arc::new(InMemoryConversationStore::new(storage_limit));
    let vector = Arc::new(InMemoryVectorStore::new());
    let assembler = Arc::new(
        ContextAssembler::new(storage, MemoryConfig::default())
            .unwrap()
            .with_vector_support(vector.clone(), Arc::new(TopicEmbedder)),
    );
    (MemoryManager::new(assembler), vector)
}

#[tokio::test]
async fn turn_loop_write_then_semantic_recall() {
    let (manager, vector) = build_manager(50);

    let bodies = [
        "the rocket engine test is on friday",
        "the garden needs watering",
        "remember to review the budget spreadsheet",
        "garden gnomes arrived",
        "budget meeting moved to monday",
    ];
    for body in bodies {
        let handle = manager
            .remember("u1", "c1", Message::text(Role::User, body))
            .await
            .unwrap();
        handle.wait().await.unwrap();
    }
    assert_eq!(vector.count().await.unwrap(), 5);

    // Semantic recall for the rocket topic must surface the oldest message
    // even though the recency window misses it.
    let context = manager
        .recall(
            "u1",
            "c1",
            ContextOptions {
                limit: Some(2),
                use_semantic_search: true,
                current_query: Some("when is the rocket test?".to_string()),
                semantic_limit: Some(1),
                semantic_threshold: Some(0.9),
                merge_strategy: Some(MergeStrategy::Prepend),
            },
        )
        .await
        .unwrap();

    assert_eq!(context.len(), 3);
    assert!(context[0]
        .extract_text()
        .unwrap()
        .contains("rocket engine test"));
    // The recency tail follows in insertion order.
    assert!(context[1].extract_text().unwrap().contains("gnomes"));
    assert!(context[2].extract_text().unwrap().contains("monday"));

    manager.shutdown().await;
}

#[tokio::test]
async fn eviction_bounds_recall_window() {
    let (manager, _) = build_manager(3);

    for i in 0..6 {
        manager
            .add_message(
                Message::text(Role::User, format!("note {i} about the garden")),
                "u1",
                "c1",
            )
            .await
            .unwrap();
    }

    let messages = manager
        .get_messages("u1", "c1", GetMessagesOptions::default())
        .await
        .unwrap();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].extract_text().unwrap().contains("note 3"));
    assert!(messages[2].extract_text().unwrap().contains("note 5"));

    manager.shutdown().await;
}

#[tokio::test]
async fn semantic_results_scoped_to_conversation_and_user() {
    let (manager, _) = build_manager(50);

    manager
        .add_message(
            Message::text(Role::User, "rocket fuel order placed"),
            "u1",
            "c1",
        )
        .await
        .unwrap();
    // Same topic, different conversation and different user.
    manager
        .add_message(
            Message::text(Role::User, "rocket launch postponed"),
            "u1",
            "c2",
        )
        .await
        .unwrap();
    manager
        .add_message(
            Message::text(Role::User, "rocket payload specs"),
            "u2",
            "c1",
        )
        .await
        .unwrap();

    let context = manager
        .recall(
            "u1",
            "c1",
            ContextOptions {
                limit: Some(10),
                use_semantic_search: true,
                current_query: Some("rocket status".to_string()),
                semantic_limit: Some(10),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Only the one message from this (user, conversation) bucket.
    assert_eq!(context.len(), 1);
    assert!(context[0].extract_text().unwrap().contains("fuel order"));

    manager.shutdown().await;
}

#[tokio::test]
async fn cascade_delete_clears_messages_and_vectors() {
    let (manager, vector) = build_manager(50);

    manager
        .create_conversation(ConversationInput::new("u1", "agent").with_id("c1"))
        .await
        .unwrap();
    for body in ["rocket one", "garden two", "budget three"] {
        manager
            .add_message(Message::text(Role::User, body), "u1", "c1")
            .await
            .unwrap();
    }
    assert_eq!(vector.count().await.unwrap(), 3);

    manager.delete_conversation("c1").await.unwrap();

    assert!(manager.get_conversation("c1").await.unwrap().is_none());
    assert!(manager
        .get_messages("u1", "c1", GetMessagesOptions::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(vector.count().await.unwrap(), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn recall_without_vector_support_is_recency_only() {
    let storage = Arc::new(InMemoryConversationStore::new(50));
    let assembler =
        Arc::new(ContextAssembler::new(storage, MemoryConfig::default()).unwrap());
    let manager = MemoryManager::new(assembler);
    assert!(!manager.has_vector_support());

    for body in ["one", "two", "three"] {
        manager
            .add_message(Message::text(Role::User, body), "u1", "c1")
            .await
            .unwrap();
    }

    let context = manager
        .recall(
            "u1",
            "c1",
            ContextOptions {
                limit: Some(2),
                use_semantic_search: true,
                current_query: Some("anything".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(context.len(), 2);
    assert_eq!(context[0].extract_text().unwrap(), "two");
    assert_eq!(context[1].extract_text().unwrap(), "three");

    manager.shutdown().await;
}

#[tokio::test]
async fn append_merge_places_semantic_after_recent() {
    let (manager, _) = build_manager(50);

    manager
        .add_message(
            Message::text(Role::User, "rocket telemetry looks good"),
            "u1",
            "c1",
        )
        .await
        .unwrap();
    for body in ["garden update one", "garden update two"] {
        manager
            .add_message(Message::text(Role::User, body), "u1", "c1")
            .await
            .unwrap();
    }

    let context = manager
        .recall(
            "u1",
            "c1",
            ContextOptions {
                limit: Some(2),
                use_semantic_search: true,
                current_query: Some("rocket?".to_string()),
                semantic_limit: Some(1),
                semantic_threshold: Some(0.9),
                merge_strategy: Some(MergeStrategy::Append),
            },
        )
        .await
        .unwrap();

    assert_eq!(context.len(), 3);
    assert!(context[0].extract_text().unwrap().contains("update one"));
    assert!(context[1].extract_text().unwrap().contains("update two"));
    assert!(context[2].extract_text().unwrap().contains("telemetry"));

    manager.shutdown().await;
}
