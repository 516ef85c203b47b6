use crate::harness::{self, axis};
use meera::MemoryError;
use meera::memory::{MemoryScope, UserIdentity};

#[tokio::test]
async fn save_returns_id_used_by_both_backends() {
    let repo = harness::repository().await;
    let node = harness::node("n1", "u1", "remembers the id", "2024-05-01T00:00:00+00:00", &axis(0));
    let id = repo.save(node).await.unwrap();
    assert_eq!(id, "n1");

    let recent = repo
        .fetch_recent(MemoryScope::Personal, Some("u1"), 10)
        .await
        .unwrap();
    assert_eq!(recent[0].id, "n1");

    let hits = repo
        .vector_search(&axis(0), MemoryScope::Personal, Some("u1"), 10)
        .await
        .unwrap();
    assert_eq!(hits[0].0.id, "n1");
}

#[tokio::test]
async fn failed_index_write_leaves_no_visible_record() {
    let repo = harness::repository_with_broken_index().await;
    let result = repo
        .save(harness::node("orphan", "u1", "must not leak", "2024-05-01T00:00:00+00:00", &axis(0)))
        .await;
    assert!(matches!(result, Err(MemoryError::IndexUnavailable(_))));

    // Neither read path may observe the rolled-back record.
    assert!(repo
        .fetch_recent(MemoryScope::Personal, Some("u1"), 10)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(repo.count(MemoryScope::Personal, Some("u1")).await.unwrap(), 0);
}

#[tokio::test]
async fn vector_search_filters_by_scope() {
    let repo = harness::repository().await;
    repo.save(harness::node("a-personal", "userA", "a's fact", "2024-05-01T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();
    repo.save(harness::node("b-personal", "userB", "b's fact", "2024-05-01T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();
    repo.save(
        harness::node("shared", "userB", "shared fact", "2024-05-01T00:00:00+00:00", &axis(0))
            .with_hive_mind(true),
    )
    .await
    .unwrap();

    let for_a = repo
        .vector_search(&axis(0), MemoryScope::Personal, Some("userA"), 10)
        .await
        .unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_a[0].0.id, "a-personal");

    // Hive scope reaches the shared record regardless of who asks.
    let hive = repo
        .vector_search(&axis(0), MemoryScope::Hive, Some("userA"), 10)
        .await
        .unwrap();
    assert_eq!(hive.len(), 1);
    assert_eq!(hive[0].0.id, "shared");
}

#[tokio::test]
async fn hive_nodes_keep_owner_attribution() {
    let repo = harness::repository().await;
    repo.save(
        harness::node("h1", "userB", "insight", "2024-05-01T00:00:00+00:00", &axis(0))
            .with_hive_mind(true),
    )
    .await
    .unwrap();

    let hive = repo.fetch_recent(MemoryScope::Hive, None, 10).await.unwrap();
    assert_eq!(hive[0].owner_id.as_deref(), Some("userB"));
    assert!(hive[0].is_hive_mind);
}

#[tokio::test]
async fn save_rejects_wrong_dimensionality() {
    let repo = harness::repository().await;
    let bad = harness::node("bad", "u1", "wrong dims", "2024-05-01T00:00:00+00:00", &[1.0, 0.0]);
    assert!(matches!(repo.save(bad).await, Err(MemoryError::Validation(_))));
}

#[tokio::test]
async fn identity_upsert_and_fetch() {
    let repo = harness::repository().await;
    assert!(repo.get_identity("39383").await.unwrap().is_none());

    let mut identity = UserIdentity::new("39383");
    identity.name = Some("Kiran".into());
    repo.save_identity(&identity).await.unwrap();

    identity.set_trait("favorite_genre", "bollywood classics");
    repo.save_identity(&identity).await.unwrap();

    let loaded = repo.get_identity("39383").await.unwrap().unwrap();
    assert_eq!(loaded.name.as_deref(), Some("Kiran"));
    assert_eq!(
        loaded.traits.get("favorite_genre").unwrap(),
        "bollywood classics"
    );
}
