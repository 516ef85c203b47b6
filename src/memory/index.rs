use super::types::MemoryScope;
use super::vector;
use anyhow::Context;
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// A single indexed embedding with the filter columns the scope predicates
/// need. Carries `created_at` so similarity ties can break on recency.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub owner_id: Option<String>,
    pub is_hive_mind: bool,
    pub created_at: String,
    pub embedding: Vec<f32>,
}

/// Nearest-neighbor index over node embeddings.
///
/// Backends must support filtered cosine top-k with the same scope predicates
/// as the structured store. The repository treats a failing index as a
/// degraded read path, so implementations report errors rather than papering
/// over them.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn name(&self) -> &str;

    async fn health_check(&self) -> bool;

    /// Insert or replace the entry for `entry.id`.
    async fn upsert(&self, entry: IndexEntry) -> anyhow::Result<()>;

    /// Remove the entry for `id`; absent ids are a no-op.
    async fn remove(&self, id: &str) -> anyhow::Result<()>;

    /// Cosine top-k restricted to the scope filter. Returns `(id, similarity)`
    /// sorted similarity descending, ties by `created_at` descending.
    async fn search(
        &self,
        query: &[f32],
        scope: MemoryScope,
        owner_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<(String, f32)>>;
}

// ── SQLite-backed exact index ────────────────────────────────

/// Default index: embeddings in a dedicated SQLite database, scanned with
/// brute-force cosine. Exact rather than approximate, which is the right
/// trade for the corpus sizes a per-user companion accumulates.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
}

const INDEX_SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS vector_entries (
        id           TEXT PRIMARY KEY,
        owner_id     TEXT,
        is_hive_mind INTEGER NOT NULL DEFAULT 0,
        created_at   TEXT NOT NULL,
        embedding    BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_vector_entries_owner
        ON vector_entries(owner_id, is_hive_mind);";

impl SqliteVectorIndex {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create index dir {}", parent.display()))?;
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .with_context(|| format!("open vector index at {}", path.display()))?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("open in-memory vector index")?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::raw_sql(INDEX_SCHEMA)
            .execute(pool)
            .await
            .context("init vector index schema")?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    async fn upsert(&self, entry: IndexEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO vector_entries (id, owner_id, is_hive_mind, created_at, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 is_hive_mind = excluded.is_hive_mind,
                 created_at = excluded.created_at,
                 embedding = excluded.embedding",
        )
        .bind(&entry.id)
        .bind(&entry.owner_id)
        .bind(i64::from(entry.is_hive_mind))
        .bind(&entry.created_at)
        .bind(vector::vec_to_bytes(&entry.embedding))
        .execute(&self.pool)
        .await
        .context("upsert vector entry")?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM vector_entries WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("remove vector entry")?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        scope: MemoryScope,
        owner_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<(String, f32)>> {
        if limit == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, Vec<u8>, String)> = match scope {
            MemoryScope::Personal => {
                let Some(owner) = owner_id else {
                    return Ok(Vec::new());
                };
                sqlx::query_as(
                    "SELECT id, embedding, created_at FROM vector_entries
                     WHERE owner_id = ?1 AND is_hive_mind = 0",
                )
                .bind(owner)
                .fetch_all(&self.pool)
                .await
            }
            MemoryScope::Hive => {
                sqlx::query_as(
                    "SELECT id, embedding, created_at FROM vector_entries
                     WHERE is_hive_mind = 1",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("vector search query")?;

        let mut scored: Vec<(String, f32, String)> = Vec::with_capacity(rows.len());
        for (id, blob, created_at) in &rows {
            let emb = vector::bytes_to_vec(blob);
            let sim = vector::cosine_similarity(query, &emb);
            if sim > 0.0 {
                scored.push((id.clone(), sim, created_at.clone()));
            }
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.2.cmp(&a.2))
        });
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(id, sim, _)| (id, sim)).collect())
    }
}
