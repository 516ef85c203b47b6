#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use meera::memory::embeddings::EmbeddingProvider;
use meera::memory::{
    IndexEntry, MemoryNode, MemoryRepository, MemoryRetriever, MemoryScope, MemoryType,
    SqliteStore, SqliteVectorIndex, VectorIndex,
};
use meera::providers::Provider;

pub const EMBEDDING_DIMS: usize = 4;

/// Embedding provider with hand-assigned vectors per text, so tests control
/// exactly which records a similarity query can reach. Unmapped texts fail,
/// which doubles as the transient-provider-error case.
pub struct KeyedEmbedding {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
}

impl KeyedEmbedding {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
        }
    }

    pub fn map(self, text: &str, vector: &[f32]) -> Self {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector.to_vec());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for KeyedEmbedding {
    fn name(&self) -> &str {
        "keyed-test"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMS
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let vectors = self.vectors.lock().unwrap();
        texts
            .iter()
            .map(|text| {
                vectors
                    .get(*text)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no embedding mapped for: {text}"))
            })
            .collect()
    }
}

/// Embedding provider that always fails.
pub struct OfflineEmbedding;

#[async_trait]
impl EmbeddingProvider for OfflineEmbedding {
    fn name(&self) -> &str {
        "offline"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIMS
    }

    async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding provider offline")
    }
}

/// Vector index whose every operation fails.
pub struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    fn name(&self) -> &str {
        "broken"
    }

    async fn health_check(&self) -> bool {
        false
    }

    async fn upsert(&self, _entry: IndexEntry) -> anyhow::Result<()> {
        anyhow::bail!("index offline")
    }

    async fn remove(&self, _id: &str) -> anyhow::Result<()> {
        anyhow::bail!("index offline")
    }

    async fn search(
        &self,
        _query: &[f32],
        _scope: MemoryScope,
        _owner_id: Option<&str>,
        _limit: usize,
    ) -> anyhow::Result<Vec<(String, f32)>> {
        anyhow::bail!("index offline")
    }
}

/// Chat provider returning a fixed reply (or a fixed failure).
pub struct CannedProvider {
    reply: Result<String, String>,
}

impl CannedProvider {
    pub fn ok(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl Provider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    async fn chat_with_system(
        &self,
        _system_prompt: Option<&str>,
        _message: &str,
        _model: &str,
        _temperature: f64,
    ) -> anyhow::Result<String> {
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

pub async fn repository() -> Arc<MemoryRepository> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let index = Arc::new(SqliteVectorIndex::open_in_memory().await.unwrap());
    Arc::new(MemoryRepository::new(store, index, EMBEDDING_DIMS))
}

pub async fn repository_with_broken_index() -> Arc<MemoryRepository> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    Arc::new(MemoryRepository::new(store, Arc::new(BrokenIndex), EMBEDDING_DIMS))
}

pub fn retriever(
    repository: Arc<MemoryRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
) -> MemoryRetriever {
    MemoryRetriever::new(repository, embedder, 7.0)
}

/// A personal node with a fixed id, timestamp and embedding.
pub fn node(
    id: &str,
    owner: &str,
    content: &str,
    created_at: &str,
    embedding: &[f32],
) -> MemoryNode {
    let mut node = MemoryNode::new(
        Some(owner.to_string()),
        content,
        MemoryType::Factual,
        embedding.to_vec(),
    )
    .with_created_at(created_at);
    node.id = id.to_string();
    node
}

/// Unit basis vectors for the harness dimensionality.
pub fn axis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMS];
    v[index % EMBEDDING_DIMS] = 1.0;
    v
}
