//! LanceDB-backed vector index, behind the `vector-search` feature.
//!
//! The default SQLite index is exact; this backend trades exactness for ANN
//! performance once a corpus outgrows brute-force scanning.

use super::index::{IndexEntry, VectorIndex};
use super::types::MemoryScope;
use anyhow::Context;
use async_trait::async_trait;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{Array, BooleanArray, Float32Array, Float64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};

use futures_util::TryStreamExt;
use lancedb::Table;
use lancedb::index::Index;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use tokio::sync::OnceCell;

use std::path::{Path, PathBuf};
use std::sync::Arc;

const TABLE_NAME: &str = "memory_vectors";
const LANCE_DISTANCE_COL: &str = "_distance";

struct LanceInner {
    db_dir: PathBuf,
    schema: SchemaRef,
    table: OnceCell<Table>,
}

impl LanceInner {
    async fn table(&self) -> anyhow::Result<&Table> {
        self.table
            .get_or_try_init(|| async {
                let uri = self.db_dir.to_string_lossy().to_string();
                let conn = lancedb::connect(&uri)
                    .execute()
                    .await
                    .with_context(|| format!("Failed to connect to LanceDB at {uri}"))?;

                let table = match conn.open_table(TABLE_NAME).execute().await {
                    Ok(t) => t,
                    Err(_) => conn
                        .create_empty_table(TABLE_NAME, self.schema.clone())
                        .execute()
                        .await
                        .context("Failed to create empty LanceDB vector table")?,
                };

                if let Err(e) = table
                    .create_index(&["embedding"], Index::Auto)
                    .execute()
                    .await
                {
                    tracing::debug!("lancedb vector index create skipped: {e}");
                }

                Ok(table)
            })
            .await
    }
}

pub struct LanceDbIndex {
    inner: Arc<LanceInner>,
}

impl LanceDbIndex {
    pub fn open(dir: &Path, dims: usize) -> anyhow::Result<Self> {
        anyhow::ensure!(dims > 0, "LanceDB index requires embedding_dimensions > 0");
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create LanceDB dir: {}", dir.display()))?;

        let dims_i32 =
            i32::try_from(dims).with_context(|| format!("Invalid embedding dimension: {dims}"))?;

        let embedding_field = Field::new("item", DataType::Float32, true);
        let embedding_dt = DataType::FixedSizeList(Arc::new(embedding_field), dims_i32);
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("owner_id", DataType::Utf8, true),
            Field::new("is_hive_mind", DataType::Boolean, false),
            Field::new("created_at", DataType::Utf8, false),
            Field::new("embedding", embedding_dt, true),
        ]));

        Ok(Self {
            inner: Arc::new(LanceInner {
                db_dir: dir.to_path_buf(),
                schema,
                table: OnceCell::new(),
            }),
        })
    }

    fn sql_eq(column: &str, value: &str) -> String {
        let v = value.replace('\'', "''");
        format!("{column} = '{v}'")
    }

    fn scope_filter(scope: MemoryScope, owner_id: Option<&str>) -> Option<String> {
        match scope {
            MemoryScope::Hive => Some("is_hive_mind = true".to_string()),
            MemoryScope::Personal => owner_id.map(|owner| {
                format!("is_hive_mind = false AND {}", Self::sql_eq("owner_id", owner))
            }),
        }
    }

    fn build_entry_batch(schema: SchemaRef, entry: &IndexEntry) -> anyhow::Result<RecordBatch> {
        let id = Arc::new(StringArray::from(vec![Some(entry.id.as_str())]));
        let owner_id = Arc::new(StringArray::from(vec![entry.owner_id.as_deref()]));
        let is_hive_mind = Arc::new(BooleanArray::from(vec![entry.is_hive_mind]));
        let created_at = Arc::new(StringArray::from(vec![Some(entry.created_at.as_str())]));

        let dims = match schema.field_with_name("embedding")?.data_type() {
            DataType::FixedSizeList(_, n) => *n,
            other => anyhow::bail!("Unexpected embedding type in schema: {other:?}"),
        };
        let dims_usize = usize::try_from(dims)
            .with_context(|| format!("Invalid embedding dimension in schema: {dims}"))?;
        if entry.embedding.len() != dims_usize {
            anyhow::bail!(
                "Embedding dimension mismatch: got {}, expected {}",
                entry.embedding.len(),
                dims
            );
        }

        let mut emb_builder = FixedSizeListBuilder::new(Float32Builder::new(), dims);
        emb_builder.values().append_slice(&entry.embedding);
        emb_builder.append(true);
        let embedding = Arc::new(emb_builder.finish());

        let cols: Vec<Arc<dyn Array>> = vec![id, owner_id, is_hive_mind, created_at, embedding];
        Ok(RecordBatch::try_new(schema, cols)?)
    }

    fn parse_hits(batch: &RecordBatch) -> Vec<(String, f32, String)> {
        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let created = batch
            .column_by_name("created_at")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let distance_col = batch.column_by_name(LANCE_DISTANCE_COL);

        let (Some(ids), Some(created)) = (ids, created) else {
            return Vec::new();
        };

        let distance_at = |row: usize| -> f32 {
            let Some(col) = distance_col else { return 1.0 };
            if let Some(f32s) = col.as_any().downcast_ref::<Float32Array>() {
                return f32s.value(row);
            }
            if let Some(f64s) = col.as_any().downcast_ref::<Float64Array>() {
                #[allow(clippy::cast_possible_truncation)]
                return f64s.value(row) as f32;
            }
            1.0
        };

        let mut out = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            if ids.is_null(row) {
                continue;
            }
            let similarity = (1.0 - distance_at(row)).clamp(0.0, 1.0);
            out.push((
                ids.value(row).to_string(),
                similarity,
                if created.is_null(row) {
                    String::new()
                } else {
                    created.value(row).to_string()
                },
            ));
        }
        out
    }
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    fn name(&self) -> &str {
        "lancedb"
    }

    async fn health_check(&self) -> bool {
        match self.inner.table().await {
            Ok(t) => t.count_rows(None).await.is_ok(),
            Err(_) => false,
        }
    }

    async fn upsert(&self, entry: IndexEntry) -> anyhow::Result<()> {
        let table = self.inner.table().await?;
        let batch = Self::build_entry_batch(self.inner.schema.clone(), &entry)?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new([Ok(batch)].into_iter(), schema);

        let mut merge_insert = table.merge_insert(&["id"]);
        merge_insert
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge_insert
            .execute(Box::new(reader))
            .await
            .context("LanceDB merge_insert failed")?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        let table = self.inner.table().await?;
        table
            .delete(&Self::sql_eq("id", id))
            .await
            .context("LanceDB delete failed")?;
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
        let Some(filter) = Self::scope_filter(scope, owner_id) else {
            return Ok(Vec::new());
        };

        let table = self.inner.table().await?;
        let mut stream = table
            .query()
            .only_if(filter)
            .nearest_to(query)?
            .column("embedding")
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(limit)
            .select(Select::columns(&["id", "created_at", LANCE_DISTANCE_COL]))
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let mut scored = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            scored.extend(Self::parse_hits(&batch));
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
