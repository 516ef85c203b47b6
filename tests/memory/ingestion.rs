use crate::harness::{self, CannedProvider, KeyedEmbedding, axis};
use meera::agent::{ConversationTurn, IntentDetector};
use meera::config::PersonaConfig;
use meera::memory::embeddings::EmbeddingProvider;
use meera::memory::{MemoryClassifier, MemoryScope, MemoryWriter};
use meera::prompt::PromptBuilder;
use std::sync::Arc;

#[tokio::test]
async fn invalid_type_candidates_never_reach_the_store() {
    let repo = harness::repository().await;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
        KeyedEmbedding::new()
            .map("real memory", &axis(0))
            .map("fake memory", &axis(1)),
    );
    let writer = MemoryWriter::new(repo.clone(), embedder);

    let classifier = MemoryClassifier::new(
        Arc::new(CannedProvider::ok(
            "[{\"content\": \"fake memory\", \"memory_type\": \"random_string\", \"tags\": []},\
              {\"content\": \"real memory\", \"memory_type\": \"factual\", \"tags\": []}]",
        )),
        "test-model",
        3,
    );

    let candidates = classifier.extract("msg", "reply").await;
    let ids = writer.remember(Some("u1"), candidates, false, "conversation").await;

    // The invalid candidate was dropped silently; only the valid one landed.
    assert_eq!(ids.len(), 1);
    let stored = repo
        .fetch_recent(MemoryScope::Personal, Some("u1"), 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "real memory");
}

#[tokio::test]
async fn classification_failure_stores_nothing() {
    let repo = harness::repository().await;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(KeyedEmbedding::new());
    let writer = MemoryWriter::new(repo.clone(), embedder);

    let classifier = MemoryClassifier::new(
        Arc::new(CannedProvider::failing("quota exhausted")),
        "test-model",
        3,
    );

    let candidates = classifier.extract("msg", "reply").await;
    assert!(candidates.is_empty());
    let ids = writer.remember(Some("u1"), candidates, false, "conversation").await;
    assert!(ids.is_empty());
}

/// The end-to-end write-then-retrieve scenario: a stated preference becomes a
/// memory node, and a later paraphrased question finds it again.
#[tokio::test]
async fn stated_preference_is_retrievable_in_a_later_turn() {
    let repo = harness::repository().await;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
        KeyedEmbedding::new()
            .map("loves classic Bollywood movies", &[0.9, 0.1, 0.0, 0.0])
            .map("What do I enjoy watching?", &[1.0, 0.0, 0.0, 0.0]),
    );

    let classifier = MemoryClassifier::new(
        Arc::new(CannedProvider::ok(
            "[{\"content\": \"loves classic Bollywood movies\", \
              \"memory_type\": \"preference\", \"tags\": [\"movies\"]}]",
        )),
        "test-model",
        3,
    );
    let writer = MemoryWriter::new(repo.clone(), embedder.clone());

    // Turn one: "I love classic Bollywood movies" is classified and stored.
    let candidates = classifier
        .extract("I love classic Bollywood movies", "They really don't make them like that anymore!")
        .await;
    assert_eq!(candidates.len(), 1);
    let ids = writer
        .remember(Some("39383"), candidates, false, "conversation")
        .await;
    assert_eq!(ids.len(), 1);

    // The stored node carries a valid embedding.
    let stored = repo
        .fetch_recent(MemoryScope::Personal, Some("39383"), 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].embedding.len(), harness::EMBEDDING_DIMS);

    // A later turn asks a paraphrased question and gets the memory back.
    let retriever = harness::retriever(repo, embedder);
    let result = retriever
        .retrieve("What do I enjoy watching?", MemoryScope::Personal, Some("39383"), 3)
        .await
        .unwrap();

    assert!(result.iter().any(|m| m.node.id == ids[0]));
    let hit = result.iter().find(|m| m.node.id == ids[0]).unwrap();
    assert!(hit.similarity.unwrap() > 0.8);
}

/// Full turn wiring: retrieval, completion, extraction and identity update
/// execute in sequence, and memory ids come back on the outcome.
#[tokio::test]
async fn conversation_turn_stores_memories_and_identity() {
    let repo = harness::repository().await;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(
        KeyedEmbedding::new()
            .map("enjoys retro cinema nights", &axis(0))
            .map("I love classic Bollywood movies, by the way my name is Kiran", &axis(1)),
    );

    // One canned reply serves both the chat call and the extraction call;
    // the classifier finds the JSON array embedded in it.
    let reply = "So glad to hear it! \
        [{\"content\": \"enjoys retro cinema nights\", \"memory_type\": \"preference\", \"tags\": []}]";
    let provider = Arc::new(CannedProvider::ok(reply));

    let classifier = MemoryClassifier::new(provider.clone(), "test-model", 3);
    let writer = Arc::new(MemoryWriter::new(repo.clone(), embedder.clone()));
    let retriever = Arc::new(harness::retriever(repo.clone(), embedder));
    let prompt_builder = PromptBuilder::new(PersonaConfig::default()).unwrap();

    let turn = ConversationTurn::new(
        provider.clone(),
        retriever,
        writer,
        repo.clone(),
        Some(classifier),
        Some(IntentDetector::new(provider, "test-model")),
        prompt_builder,
        "test-model".into(),
        0.7,
        3,
        true,
    );

    let outcome = turn
        .process(
            "39383",
            "I love classic Bollywood movies, by the way my name is Kiran",
            &[],
        )
        .await
        .unwrap();

    assert_eq!(outcome.response, reply);
    assert_eq!(outcome.memory_ids.len(), 1);
    assert!(outcome.intent.is_some());

    let stored = repo
        .fetch_recent(MemoryScope::Personal, Some("39383"), 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "enjoys retro cinema nights");
    assert_eq!(stored[0].source, "conversation");

    // Identity was created for the new user during the turn.
    assert!(repo.get_identity("39383").await.unwrap().is_some());
}

/// Memory failures degrade the turn instead of failing it: with the
/// embedding provider offline, the reply still goes out and nothing is
/// stored.
#[tokio::test]
async fn turn_survives_offline_embedding_provider() {
    let repo = harness::repository().await;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(harness::OfflineEmbedding);

    let reply = "Still here! [{\"content\": \"x\", \"memory_type\": \"factual\", \"tags\": []}]";
    let provider = Arc::new(CannedProvider::ok(reply));
    let classifier = MemoryClassifier::new(provider.clone(), "test-model", 3);
    let writer = Arc::new(MemoryWriter::new(repo.clone(), embedder.clone()));
    let retriever = Arc::new(harness::retriever(repo.clone(), embedder));
    let prompt_builder = PromptBuilder::new(PersonaConfig::default()).unwrap();

    let turn = ConversationTurn::new(
        provider,
        retriever,
        writer,
        repo.clone(),
        Some(classifier),
        None,
        prompt_builder,
        "test-model".into(),
        0.7,
        3,
        true,
    );

    let outcome = turn.process("u1", "hello there", &[]).await.unwrap();
    assert_eq!(outcome.response, reply);
    assert!(outcome.memory_ids.is_empty());
    assert_eq!(outcome.personal_memory_count, 0);
}
