use crate::harness::{self, KeyedEmbedding, OfflineEmbedding, axis};
use meera::memory::MemoryScope;
use std::sync::Arc;

#[tokio::test]
async fn cold_start_returns_empty_without_error() {
    let repo = harness::repository().await;
    let embedder = Arc::new(KeyedEmbedding::new().map("anything", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    let result = retriever
        .retrieve("anything", MemoryScope::Personal, Some("fresh-user"), 3)
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn fallback_supplements_sparse_vector_results() {
    // limit=3, exactly 1 reachable vector hit, 5 stored memories total:
    // the result must be the vector hit plus 2 recency records, deduplicated.
    let repo = harness::repository().await;

    // Only "m1" shares an axis with the query; the rest are orthogonal.
    repo.save(harness::node("m1", "u1", "semantic hit", "2024-05-01T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();
    for (i, (id, day)) in [("m2", "02"), ("m3", "03"), ("m4", "04"), ("m5", "05")]
        .into_iter()
        .enumerate()
    {
        repo.save(harness::node(
            id,
            "u1",
            &format!("recent {id}"),
            &format!("2024-05-{day}T00:00:00+00:00"),
            &axis(1 + (i % 3)),
        ))
        .await
        .unwrap();
    }

    let embedder = Arc::new(KeyedEmbedding::new().map("query", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    let result = retriever
        .retrieve("query", MemoryScope::Personal, Some("u1"), 3)
        .await
        .unwrap();

    assert_eq!(result.len(), 3);
    let ids: Vec<&str> = result.iter().map(|m| m.node.id.as_str()).collect();
    assert!(ids.contains(&"m1"), "vector hit must survive the merge: {ids:?}");
    // The two newest records fill the remaining slots.
    assert!(ids.contains(&"m5"));
    assert!(ids.contains(&"m4"));
}

#[tokio::test]
async fn merged_results_contain_no_duplicate_ids() {
    let repo = harness::repository().await;
    // Newest record is also the only vector hit, so it enters through both
    // paths and must be counted once.
    repo.save(harness::node("dup", "u1", "both paths", "2024-05-09T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();
    repo.save(harness::node("old", "u1", "recency only", "2024-05-01T00:00:00+00:00", &axis(1)))
        .await
        .unwrap();

    let embedder = Arc::new(KeyedEmbedding::new().map("query", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    let result = retriever
        .retrieve("query", MemoryScope::Personal, Some("u1"), 5)
        .await
        .unwrap();

    let mut ids: Vec<&str> = result.iter().map(|m| m.node.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 2, "duplicate ids in merge");

    // The record that entered through both paths keeps its similarity score.
    let dup = result.iter().find(|m| m.node.id == "dup").unwrap();
    assert!(dup.similarity.is_some());
}

#[tokio::test]
async fn output_is_bounded_by_limit() {
    let repo = harness::repository().await;
    for i in 0..10 {
        repo.save(harness::node(
            &format!("m{i}"),
            "u1",
            &format!("memory {i}"),
            &format!("2024-05-{:02}T00:00:00+00:00", i + 1),
            &axis(0),
        ))
        .await
        .unwrap();
    }

    let embedder = Arc::new(KeyedEmbedding::new().map("query", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    for limit in [1, 3, 5] {
        let result = retriever
            .retrieve("query", MemoryScope::Personal, Some("u1"), limit)
            .await
            .unwrap();
        assert!(result.len() <= limit);
    }

    // limit 0 is a no-op, not an error.
    let result = retriever
        .retrieve("query", MemoryScope::Personal, Some("u1"), 0)
        .await
        .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
async fn retrieval_is_deterministic_across_repeated_calls() {
    let repo = harness::repository().await;
    for i in 0..6 {
        repo.save(harness::node(
            &format!("m{i}"),
            "u1",
            &format!("memory {i}"),
            // Two records per timestamp to force tie-breaks.
            &format!("2024-05-{:02}T00:00:00+00:00", (i / 2) + 1),
            &axis(i % 2),
        ))
        .await
        .unwrap();
    }

    let embedder = Arc::new(KeyedEmbedding::new().map("query", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    let first: Vec<String> = retriever
        .retrieve("query", MemoryScope::Personal, Some("u1"), 4)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.node.id)
        .collect();

    for _ in 0..5 {
        let again: Vec<String> = retriever
            .retrieve("query", MemoryScope::Personal, Some("u1"), 4)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.node.id)
            .collect();
        assert_eq!(first, again);
    }
}

#[tokio::test]
async fn final_order_is_recency_descending() {
    let repo = harness::repository().await;
    // The oldest record is the best semantic match; it still ranks below
    // newer records because recency governs presentation order.
    repo.save(harness::node("old-hit", "u1", "old but relevant", "2024-04-01T00:00:00+00:00", &axis(0)))
        .await
        .unwrap();
    repo.save(harness::node("new-a", "u1", "recent a", "2024-05-05T00:00:00+00:00", &axis(1)))
        .await
        .unwrap();
    repo.save(harness::node("new-b", "u1", "recent b", "2024-05-06T00:00:00+00:00", &axis(2)))
        .await
        .unwrap();

    let embedder = Arc::new(KeyedEmbedding::new().map("query", &axis(0)));
    let retriever = harness::retriever(repo, embedder);

    let result = retriever
        .retrieve("query", MemoryScope::Personal, Some("u1"), 3)
        .await
        .unwrap();

    let ids: Vec<&str> = result.iter().map(|m| m.node.id.as_str()).collect();
    assert_eq!(ids, vec!["new-b", "new-a", "old-hit"]);

    // Recency values are monotone over the returned sequence and the newest
    // record anchors the curve at 1.0.
    assert!((result[0].recency - 1.0).abs() < 1e-9);
    assert!(result[0].recency >= result[1].recency);
    assert!(result[1].recency >= result[2].recency);
}

#[tokio::test]
async fn embedding_failure_falls_back_to_recency_only() {
    let repo = harness::repository().await;
    for (id, day) in [("m1", "01"), ("m2", "02"), ("m3", "03")] {
        repo.save(harness::node(
            id,
            "u1",
            &format!("memory {id}"),
            &format!("2024-05-{day}T00:00:00+00:00"),
            &axis(0),
        ))
        .await
        .unwrap();
    }

    let retriever = harness::retriever(repo, Arc::new(OfflineEmbedding));
    let result = retriever
        .retrieve("whatever", MemoryScope::Personal, Some("u1"), 2)
        .await
        .unwrap();

    // Newest-first, no similarity scores anywhere.
    let ids: Vec<&str> = result.iter().map(|m| m.node.id.as_str()).collect();
    assert_eq!(ids, vec!["m3", "m2"]);
    assert!(result.iter().all(|m| m.similarity.is_none()));
}

#[tokio::test]
async fn broken_index_degrades_to_recency_not_error() {
    use meera::memory::{MemoryRepository, SqliteStore};

    // Rows written while the index was healthy; the index then goes down.
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    for (id, day) in [("m1", "01"), ("m2", "02")] {
        store
            .insert_node(&harness::node(
                id,
                "u1",
                &format!("memory {id}"),
                &format!("2024-05-{day}T00:00:00+00:00"),
                &axis(0),
            ))
            .await
            .unwrap();
    }
    let repo = Arc::new(MemoryRepository::new(
        store,
        Arc::new(harness::BrokenIndex),
        harness::EMBEDDING_DIMS,
    ));

    let embedder = Arc::new(KeyedEmbedding::new().map("query", &axis(0)));
    let retriever = harness::retriever(repo, embedder);
    let result = retriever
        .retrieve("query", MemoryScope::Personal, Some("u1"), 3)
        .await
        .unwrap();

    let ids: Vec<&str> = result.iter().map(|m| m.node.id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m1"]);
    assert!(result.iter().all(|m| m.similarity.is_none()));
}
