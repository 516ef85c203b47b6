use super::index::{IndexEntry, VectorIndex};
use super::sqlite::SqliteStore;
use super::types::{MemoryNode, MemoryScope, UserIdentity};
use crate::MemoryError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Unified write/read surface over the structured store and the vector index.
///
/// Write consistency contract: a node is either present in both backends or
/// in neither. `save` rolls the structured row back when the index write
/// fails, so reads can trust that every structured record is reachable
/// through similarity search.
///
/// Read degradation contract: a failing vector index turns `vector_search`
/// into an empty result (callers fall back to recency); a failing structured
/// store is fatal for every operation.
pub struct MemoryRepository {
    store: Arc<SqliteStore>,
    index: Arc<dyn VectorIndex>,
    /// Expected embedding dimensionality; 0 disables the check.
    dimensions: usize,
}

impl MemoryRepository {
    pub fn new(store: Arc<SqliteStore>, index: Arc<dyn VectorIndex>, dimensions: usize) -> Self {
        Self {
            store,
            index,
            dimensions,
        }
    }

    /// Persist a node in both backends. Returns the node id on success.
    pub async fn save(&self, node: MemoryNode) -> Result<String, MemoryError> {
        if node.embedding.is_empty() {
            return Err(MemoryError::Validation(format!(
                "node {} has no embedding",
                node.id
            )));
        }
        if self.dimensions > 0 && node.embedding.len() != self.dimensions {
            return Err(MemoryError::Validation(format!(
                "node {} embedding has {} dimensions, corpus uses {}",
                node.id,
                node.embedding.len(),
                self.dimensions
            )));
        }

        self.store
            .insert_node(&node)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;

        let entry = IndexEntry {
            id: node.id.clone(),
            owner_id: node.owner_id.clone(),
            is_hive_mind: node.is_hive_mind,
            created_at: node.created_at.clone(),
            embedding: node.embedding.clone(),
        };

        if let Err(index_err) = self.index.upsert(entry).await {
            // Roll the structured row back so reads never observe a record
            // the index cannot reach.
            if let Err(rollback_err) = self.store.delete_node(&node.id).await {
                warn!(
                    memory_id = %node.id,
                    error = %rollback_err,
                    "rollback after index failure also failed; structured row may be orphaned"
                );
            }
            return Err(MemoryError::IndexUnavailable(index_err.to_string()));
        }

        debug!(
            memory_id = %node.id,
            owner_id = node.owner_id.as_deref().unwrap_or("-"),
            hive = node.is_hive_mind,
            "memory saved"
        );
        Ok(node.id)
    }

    /// Most recent nodes for the scope, `created_at` descending.
    pub async fn fetch_recent(
        &self,
        scope: MemoryScope,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MemoryNode>, MemoryError> {
        self.store
            .fetch_recent(scope, owner_id, limit)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))
    }

    /// Cosine top-k within the scope, joined back to full records.
    ///
    /// Index unavailability degrades to an empty result; only structured-store
    /// failure propagates.
    pub async fn vector_search(
        &self,
        query_embedding: &[f32],
        scope: MemoryScope,
        owner_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(MemoryNode, f32)>, MemoryError> {
        let hits = match self
            .index
            .search(query_embedding, scope, owner_id, limit)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                warn!(index = self.index.name(), error = %e, "vector index unavailable; degrading to recency-only");
                return Ok(Vec::new());
            }
        };

        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = hits.iter().map(|(id, _)| id.clone()).collect();
        let nodes = self
            .store
            .fetch_by_ids(&ids)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))?;

        let mut by_id: std::collections::HashMap<String, MemoryNode> =
            nodes.into_iter().map(|n| (n.id.clone(), n)).collect();

        // Preserve index ranking; drop index hits with no structured row
        // (possible only if an external process removed rows underneath us).
        let mut results = Vec::with_capacity(hits.len());
        for (id, similarity) in hits {
            match by_id.remove(&id) {
                Some(node) => results.push((node, similarity)),
                None => warn!(memory_id = %id, "vector hit without structured record; skipping"),
            }
        }
        Ok(results)
    }

    pub async fn save_identity(&self, identity: &UserIdentity) -> Result<(), MemoryError> {
        self.store
            .save_identity(identity)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))
    }

    pub async fn get_identity(&self, user_id: &str) -> Result<Option<UserIdentity>, MemoryError> {
        self.store
            .get_identity(user_id)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))
    }

    pub async fn count(
        &self,
        scope: MemoryScope,
        owner_id: Option<&str>,
    ) -> Result<u64, MemoryError> {
        self.store
            .count(scope, owner_id)
            .await
            .map_err(|e| MemoryError::StoreUnavailable(e.to_string()))
    }

    /// `(structured store healthy, vector index healthy)`
    pub async fn health_check(&self) -> (bool, bool) {
        (
            self.store.health_check().await,
            self.index.health_check().await,
        )
    }

    pub fn index_name(&self) -> &str {
        self.index.name()
    }
}
