pub mod embeddings;
mod factory;
pub mod index;
pub mod ingestion;
#[cfg(feature = "vector-search")]
pub mod lancedb;
pub mod repository;
pub mod retrieval;
pub mod sqlite;
pub mod types;
pub mod vector;

pub use factory::{MemoryStack, create_memory_stack};
pub use index::{IndexEntry, SqliteVectorIndex, VectorIndex};
pub use ingestion::{MemoryClassifier, MemoryWriter};
#[cfg(feature = "vector-search")]
pub use lancedb::LanceDbIndex;
pub use repository::MemoryRepository;
pub use retrieval::MemoryRetriever;
pub use sqlite::SqliteStore;
pub use types::{
    MemoryCandidate, MemoryNode, MemoryScope, MemoryType, RawCandidate, RecalledMemory,
    UserIdentity,
};
