use crate::harness::{self, KeyedEmbedding, axis};
use meera::memory::MemoryScope;
use std::sync::Arc;

/// A `personal` query for user A must never surface another user's private
/// record, through either the semantic or the recency path.
#[tokio::test]
async fn personal_retrieval_never_leaks_across_users() {
    let repo = harness::repository().await;

    repo.save(harness::node("a1", "userA", "a's private fact", "2024-05-01T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();
    // B's record is both newer (wins recency) and a perfect semantic match.
    repo.save(harness::node("b1", "userB", "b's private fact", "2024-05-09T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();

    let embedder = Arc::new(KeyedEmbedding::new().map("the fact", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    let result = retriever
        .retrieve("the fact", MemoryScope::Personal, Some("userA"), 10)
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].node.id, "a1");
    assert!(result.iter().all(|m| m.node.owner_id.as_deref() == Some("userA")));
}

/// Hive retrieval reaches shared records from any user, with attribution
/// intact, and personal retrieval does not see hive records.
#[tokio::test]
async fn hive_scope_is_shared_and_disjoint_from_personal() {
    let repo = harness::repository().await;

    repo.save(
        harness::node("shared", "userB", "everyone benefits", "2024-05-02T00:00:00+00:00", &axis(0))
            .with_hive_mind(true),
    )
    .await
    .unwrap();
    repo.save(harness::node("private", "userA", "only mine", "2024-05-03T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();

    let embedder = Arc::new(KeyedEmbedding::new().map("benefits", &axis(0)));
    let retriever = harness::retriever(repo.clone(), embedder);

    // User A queries the hive and sees B's shared record.
    let hive = retriever
        .retrieve("benefits", MemoryScope::Hive, Some("userA"), 10)
        .await
        .unwrap();
    assert_eq!(hive.len(), 1);
    assert_eq!(hive[0].node.id, "shared");
    assert_eq!(hive[0].node.owner_id.as_deref(), Some("userB"));

    // A's personal view contains only the private record.
    let embedder = Arc::new(KeyedEmbedding::new().map("benefits", &axis(0)));
    let retriever = harness::retriever(repo, embedder);
    let personal = retriever
        .retrieve("benefits", MemoryScope::Personal, Some("userA"), 10)
        .await
        .unwrap();
    assert_eq!(personal.len(), 1);
    assert_eq!(personal[0].node.id, "private");
}
