use super::embeddings::{EmbeddingProvider, create_embedding_provider};
use super::index::{SqliteVectorIndex, VectorIndex};
use super::repository::MemoryRepository;
use super::retrieval::MemoryRetriever;
use super::sqlite::SqliteStore;
use crate::config::Config;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use super::ingestion::MemoryWriter;

/// The assembled memory subsystem for one workspace.
pub struct MemoryStack {
    pub repository: Arc<MemoryRepository>,
    pub retriever: Arc<MemoryRetriever>,
    pub writer: Arc<MemoryWriter>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

/// Wire stores, index, embedder, retriever and writer from config.
pub async fn create_memory_stack(config: &Config) -> anyhow::Result<MemoryStack> {
    let data_dir = config.memory_data_dir();

    let embedder = create_embedding_provider(
        &config.memory.embedding_provider,
        config.resolved_api_key().as_deref(),
        &config.memory.embedding_model,
        config.memory.embedding_dimensions,
    );

    let store = Arc::new(
        SqliteStore::open(&data_dir.join("nodes.db"))
            .await
            .context("open structured store")?,
    );

    let index: Arc<dyn VectorIndex> = match config.memory.index_backend.as_str() {
        "lancedb" => open_lancedb_index(&data_dir, embedder.dimensions())?,
        _ => Arc::new(
            SqliteVectorIndex::open(&data_dir.join("vectors.db"))
                .await
                .context("open sqlite vector index")?,
        ),
    };

    let repository = Arc::new(MemoryRepository::new(
        store,
        index,
        embedder.dimensions(),
    ));
    let retriever = Arc::new(MemoryRetriever::new(
        repository.clone(),
        embedder.clone(),
        config.memory.recency_half_life_days,
    ));
    let writer = Arc::new(MemoryWriter::new(repository.clone(), embedder.clone()));

    info!(
        index = repository.index_name(),
        embedding_provider = embedder.name(),
        dimensions = embedder.dimensions(),
        data_dir = %data_dir.display(),
        "memory stack initialized"
    );

    Ok(MemoryStack {
        repository,
        retriever,
        writer,
        embedder,
    })
}

#[cfg(feature = "vector-search")]
fn open_lancedb_index(
    data_dir: &std::path::Path,
    dimensions: usize,
) -> anyhow::Result<Arc<dyn VectorIndex>> {
    let index = super::lancedb::LanceDbIndex::open(&data_dir.join("lancedb"), dimensions.max(1))
        .context("open lancedb index")?;
    Ok(Arc::new(index))
}

#[cfg(not(feature = "vector-search"))]
fn open_lancedb_index(
    _data_dir: &std::path::Path,
    _dimensions: usize,
) -> anyhow::Result<Arc<dyn VectorIndex>> {
    anyhow::bail!(
        "memory.index_backend = \"lancedb\" requires building with the vector-search feature"
    )
}
