use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Closed set of memory classifications.
///
/// Classifier output is parsed against this set via `FromStr`; anything else
/// is rejected before a node is ever constructed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryType {
    PersonalIdentity,
    Preference,
    Factual,
    EmotionalState,
}

/// Retrieval partition: owner-scoped or shared hive-mind corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MemoryScope {
    Personal,
    Hive,
}

/// A single immutable memory record.
///
/// Created exactly once per extraction event; the corpus is append-only and
/// nodes are never updated in place. The same `id` keys the record in both
/// the structured store and the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    /// `None` only for hive-mind memories shared without attribution.
    pub owner_id: Option<String>,
    pub content: String,
    pub memory_type: MemoryType,
    /// Filtering/debugging only; never part of ranking.
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_hive_mind: bool,
    pub embedding: Vec<f32>,
    /// RFC 3339 UTC; immutable, drives recency scoring.
    pub created_at: String,
    pub source: String,
}

impl MemoryNode {
    pub fn new(
        owner_id: Option<String>,
        content: impl Into<String>,
        memory_type: MemoryType,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id,
            content: content.into(),
            memory_type,
            tags: Vec::new(),
            is_hive_mind: false,
            embedding,
            created_at: chrono::Utc::now().to_rfc3339(),
            source: "conversation".to_string(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_hive_mind(mut self, is_hive_mind: bool) -> Self {
        self.is_hive_mind = is_hive_mind;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    /// Scope membership check used by in-process filters.
    pub fn in_scope(&self, scope: MemoryScope, owner_id: Option<&str>) -> bool {
        match scope {
            MemoryScope::Hive => self.is_hive_mind,
            MemoryScope::Personal => {
                !self.is_hive_mind && self.owner_id.as_deref() == owner_id && owner_id.is_some()
            }
        }
    }
}

/// Untrusted classifier output, straight off the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub memory_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawCandidate {
    /// Validate against the closed type set. Empty content or an unknown
    /// `memory_type` yields `None` and the candidate is dropped.
    pub fn validate(self) -> Option<MemoryCandidate> {
        let content = self.content.trim();
        if content.is_empty() {
            return None;
        }
        let memory_type = self.memory_type.trim().parse::<MemoryType>().ok()?;
        Some(MemoryCandidate {
            content: content.to_string(),
            memory_type,
            tags: self
                .tags
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        })
    }
}

/// A validated extraction candidate, ready for the write path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub content: String,
    pub memory_type: MemoryType,
    pub tags: Vec<String>,
}

/// User identity profile, mutated incrementally across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_role: Option<String>,
    /// Free-form traits, keyed by short slug.
    #[serde(default)]
    pub traits: BTreeMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            user_id: user_id.into(),
            name: None,
            origin: None,
            current_context: None,
            primary_role: None,
            traits: BTreeMap::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Refresh the mutation timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn set_trait(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.traits.insert(key.into(), value.into());
        self.touch();
    }

    /// True when nothing beyond the bare `user_id` has been learned yet.
    pub fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.origin.is_none()
            && self.current_context.is_none()
            && self.primary_role.is_none()
            && self.traits.is_empty()
    }
}

/// A node as returned by the retriever: final recency rank plus the raw
/// similarity when the node entered through vector search.
#[derive(Debug, Clone, Serialize)]
pub struct RecalledMemory {
    pub node: MemoryNode,
    pub similarity: Option<f32>,
    pub recency: f64,
}
