use super::types::{MemoryNode, MemoryScope, MemoryType, UserIdentity};
use super::vector;
use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Durable structured store for memory nodes and user identities.
///
/// This is the system of record: every node row carries the full record
/// (embedding included), keyed by the same id the vector index uses.
pub struct SqliteStore {
    pool: SqlitePool,
}

const SCHEMA: &str = "\
    CREATE TABLE IF NOT EXISTS memory_nodes (
        id           TEXT PRIMARY KEY,
        owner_id     TEXT,
        content      TEXT NOT NULL,
        memory_type  TEXT NOT NULL,
        tags         TEXT NOT NULL DEFAULT '[]',
        is_hive_mind INTEGER NOT NULL DEFAULT 0,
        embedding    BLOB NOT NULL,
        source       TEXT NOT NULL DEFAULT 'conversation',
        created_at   TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_memory_nodes_owner
        ON memory_nodes(owner_id, is_hive_mind, created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_memory_nodes_hive
        ON memory_nodes(is_hive_mind, created_at DESC);

    CREATE TABLE IF NOT EXISTS user_identities (
        user_id    TEXT PRIMARY KEY,
        profile    TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );";

type NodeRow = (
    String,         // id
    Option<String>, // owner_id
    String,         // content
    String,         // memory_type
    String,         // tags (JSON array)
    i64,            // is_hive_mind
    Vec<u8>,        // embedding
    String,         // source
    String,         // created_at
);

impl SqliteStore {
    /// Open (or create) a file-backed store.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store dir {}", parent.display()))?;
        }
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&url)
            .await
            .with_context(|| format!("open sqlite store at {}", path.display()))?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. A single pooled connection keeps the
    /// database alive for the pool's lifetime.
    pub async fn open_in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("open in-memory sqlite store")?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(pool)
            .await
            .context("init sqlite schema")?;
        Ok(())
    }

    /// Insert a new node. Nodes are immutable, so a duplicate id is an error,
    /// never an update.
    pub async fn insert_node(&self, node: &MemoryNode) -> anyhow::Result<()> {
        let tags = serde_json::to_string(&node.tags).context("encode tags")?;
        sqlx::query(
            "INSERT INTO memory_nodes
                 (id, owner_id, content, memory_type, tags, is_hive_mind,
                  embedding, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&node.id)
        .bind(&node.owner_id)
        .bind(&node.content)
        .bind(node.memory_type.to_string())
        .bind(tags)
        .bind(i64::from(node.is_hive_mind))
        .bind(vector::vec_to_bytes(&node.embedding))
        .bind(&node.source)
        .bind(&node.created_at)
        .execute(&self.pool)
        .await
        .context("insert memory node")?;
        Ok(())
    }

    /// Remove a node row. Only the repository's dual-write rollback path
    /// calls this; the public surface has no deletion operation.
    pub async fn delete_node(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM memory_nodes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete memory node")?;
        Ok(())
    }

    /// Most recent nodes for a scope, `created_at` descending. Ties break on
    /// id so repeated calls return an identical ordering.
    pub async fn fetch_recent(
        &self,
        scope: MemoryScope,
        owner_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<MemoryNode>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        #[allow(clippy::cast_possible_wrap)]
        let limit_i64 = limit as i64;

        let rows: Vec<NodeRow> = match scope {
            MemoryScope::Personal => {
                let Some(owner) = owner_id else {
                    return Ok(Vec::new());
                };
                sqlx::query_as(
                    "SELECT id, owner_id, content, memory_type, tags, is_hive_mind,
                            embedding, source, created_at
                     FROM memory_nodes
                     WHERE owner_id = ?1 AND is_hive_mind = 0
                     ORDER BY created_at DESC, id ASC
                     LIMIT ?2",
                )
                .bind(owner)
                .bind(limit_i64)
                .fetch_all(&self.pool)
                .await
            }
            MemoryScope::Hive => {
                sqlx::query_as(
                    "SELECT id, owner_id, content, memory_type, tags, is_hive_mind,
                            embedding, source, created_at
                     FROM memory_nodes
                     WHERE is_hive_mind = 1
                     ORDER BY created_at DESC, id ASC
                     LIMIT ?1",
                )
                .bind(limit_i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("fetch recent nodes")?;

        Ok(rows.into_iter().map(decode_node).collect())
    }

    /// Fetch full records for a set of ids. Output order is unspecified;
    /// callers re-order against their own candidate list.
    pub async fn fetch_by_ids(&self, ids: &[String]) -> anyhow::Result<Vec<MemoryNode>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = std::iter::repeat_n("?", ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT id, owner_id, content, memory_type, tags, is_hive_mind,
                    embedding, source, created_at
             FROM memory_nodes
             WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, NodeRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .context("fetch nodes by id")?;
        Ok(rows.into_iter().map(decode_node).collect())
    }

    pub async fn count(&self, scope: MemoryScope, owner_id: Option<&str>) -> anyhow::Result<u64> {
        let count: i64 = match scope {
            MemoryScope::Personal => {
                let Some(owner) = owner_id else {
                    return Ok(0);
                };
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM memory_nodes WHERE owner_id = ?1 AND is_hive_mind = 0",
                )
                .bind(owner)
                .fetch_one(&self.pool)
                .await
            }
            MemoryScope::Hive => {
                sqlx::query_scalar("SELECT COUNT(*) FROM memory_nodes WHERE is_hive_mind = 1")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .context("count nodes")?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Upsert the identity profile by `user_id`.
    pub async fn save_identity(&self, identity: &UserIdentity) -> anyhow::Result<()> {
        let profile = serde_json::to_string(identity).context("encode identity profile")?;
        sqlx::query(
            "INSERT INTO user_identities (user_id, profile, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                 profile = excluded.profile,
                 updated_at = excluded.updated_at",
        )
        .bind(&identity.user_id)
        .bind(profile)
        .bind(&identity.created_at)
        .bind(&identity.updated_at)
        .execute(&self.pool)
        .await
        .context("upsert user identity")?;
        Ok(())
    }

    pub async fn get_identity(&self, user_id: &str) -> anyhow::Result<Option<UserIdentity>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT profile FROM user_identities WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("fetch user identity")?;

        match row {
            Some((profile,)) => {
                let identity =
                    serde_json::from_str(&profile).context("decode identity profile")?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// Health check: execute a trivial query.
    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}

fn decode_node(row: NodeRow) -> MemoryNode {
    let (id, owner_id, content, memory_type, tags, is_hive_mind, embedding, source, created_at) =
        row;
    MemoryNode {
        id,
        owner_id,
        content,
        memory_type: memory_type
            .parse::<MemoryType>()
            .unwrap_or(MemoryType::Factual),
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        is_hive_mind: is_hive_mind != 0,
        embedding: vector::bytes_to_vec(&embedding),
        source,
        created_at,
    }
}
