use super::embeddings::EmbeddingProvider;
use super::repository::MemoryRepository;
use super::types::{MemoryNode, MemoryScope, RecalledMemory};
use super::vector;
use crate::MemoryError;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hybrid memory retrieval: semantic similarity chooses which records enter
/// the candidate pool, recency governs the final presentation order, and the
/// recency fallback keeps the pool full when similarity search comes up
/// short.
///
/// Similarity alone fails cold-start (a new user has no near-duplicate
/// phrasing yet) and short conversational turns embed poorly against a sparse
/// corpus, so the newest records act as a safety net: the prompt is never
/// starved of context just because nothing was semantically close.
///
/// Holds no mutable state and never writes.
pub struct MemoryRetriever {
    repository: Arc<MemoryRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    half_life_days: f64,
}

impl MemoryRetriever {
    pub fn new(
        repository: Arc<MemoryRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        half_life_days: f64,
    ) -> Self {
        Self {
            repository,
            embedder,
            half_life_days,
        }
    }

    /// Return up to `limit` memories for the scope, ranked for prompt
    /// construction. An empty corpus yields an empty list, never an error;
    /// only structured-store failure propagates.
    pub async fn retrieve(
        &self,
        query_text: &str,
        scope: MemoryScope,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<RecalledMemory>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embed_query(query_text).await;

        let mut candidates: Vec<(MemoryNode, Option<f32>)> = match &query_embedding {
            Some(embedding) => self
                .repository
                .vector_search(embedding, scope, owner_id, limit)
                .await?
                .into_iter()
                .map(|(node, similarity)| (node, Some(similarity)))
                .collect(),
            None => Vec::new(),
        };

        // Similarity produced fewer candidates than requested (or none at
        // all): top up from the newest records, deduplicated by id. A record
        // found both ways keeps its similarity score. Only the remaining
        // slots are filled, so a vector hit can never be displaced by newer
        // fallback records.
        if candidates.len() < limit {
            let seen: HashSet<String> = candidates.iter().map(|(n, _)| n.id.clone()).collect();
            let mut open_slots = limit - candidates.len();
            let recent = self
                .repository
                .fetch_recent(scope, owner_id, limit)
                .await?;
            for node in recent {
                if open_slots == 0 {
                    break;
                }
                if !seen.contains(&node.id) {
                    candidates.push((node, None));
                    open_slots -= 1;
                }
            }
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut ranked = rank_by_recency(candidates, self.half_life_days);
        ranked.truncate(limit);

        debug!(
            scope = %scope,
            owner_id = owner_id.unwrap_or("-"),
            count = ranked.len(),
            semantic = query_embedding.is_some(),
            "memories retrieved"
        );
        Ok(ranked)
    }

    async fn embed_query(&self, query_text: &str) -> Option<Vec<f32>> {
        if self.embedder.dimensions() == 0 || query_text.trim().is_empty() {
            return None;
        }
        match self.embedder.embed_one(query_text).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(provider = self.embedder.name(), error = %e, "query embedding failed; falling back to recency");
                None
            }
        }
    }
}

/// Map candidates onto the recency decay curve (newest candidate = 1.0) and
/// order them: recency descending, ties by raw similarity descending, then
/// `created_at` descending, then id. The anchor is the newest candidate
/// rather than wall clock, so identical input sets always produce identical
/// output sequences.
fn rank_by_recency(
    candidates: Vec<(MemoryNode, Option<f32>)>,
    half_life_days: f64,
) -> Vec<RecalledMemory> {
    let newest = candidates
        .iter()
        .map(|(node, _)| node.created_at.clone())
        .max()
        .unwrap_or_default();

    let mut ranked: Vec<RecalledMemory> = candidates
        .into_iter()
        .map(|(node, similarity)| {
            let recency = vector::recency_value(&node.created_at, &newest, half_life_days);
            RecalledMemory {
                node,
                similarity,
                recency,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        let sim_a = a.similarity.unwrap_or(f32::MIN);
        let sim_b = b.similarity.unwrap_or(f32::MIN);
        b.recency
            .partial_cmp(&a.recency)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                sim_b
                    .partial_cmp(&sim_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| b.node.created_at.cmp(&a.node.created_at))
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
    ranked
}
