use super::embeddings::EmbeddingProvider;
use super::repository::MemoryRepository;
use super::types::{MemoryCandidate, MemoryNode, MemoryType, RawCandidate};
use crate::providers::Provider;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns a conversation exchange into zero-or-more typed memory candidates.
///
/// The LLM is a labeling function, not a trusted source: its reply is scanned
/// for a JSON array, each element is validated against the closed type set,
/// and anything malformed is dropped. Total provider failure yields an empty
/// list — extraction is best-effort and never aborts the surrounding turn.
pub struct MemoryClassifier {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    max_candidates: usize,
}

impl MemoryClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, max_candidates: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_candidates: max_candidates.max(1),
        }
    }

    pub async fn extract(
        &self,
        user_message: &str,
        assistant_response: &str,
    ) -> Vec<MemoryCandidate> {
        let prompt = self.extraction_prompt(user_message, assistant_response);

        let response = match self
            .provider
            .chat_with_system(None, &prompt, &self.model, self.temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "memory extraction failed; skipping turn");
                return Vec::new();
            }
        };

        let candidates = parse_candidates(&response, self.max_candidates);
        debug!(count = candidates.len(), "memory candidates extracted");
        candidates
    }

    fn extraction_prompt(&self, user_message: &str, assistant_response: &str) -> String {
        format!(
            "Analyze the following conversation and extract up to {max} memory signals worth \
             remembering for future interactions.\n\n\
             User message: {user_message}\n\n\
             Assistant response: {assistant_response}\n\n\
             For each signal provide a concise 1-2 sentence summary, a memory type \
             (one of: personal_identity, preference, factual, emotional_state), and short tags.\n\
             Only extract signals that are about the user's identity, preferences, important \
             facts, or emotional state, and that stay relevant beyond this conversation.\n\n\
             Reply with a JSON array only:\n\
             [{{\"content\": \"...\", \"memory_type\": \"...\", \"tags\": [\"...\"]}}]\n\n\
             Reply with [] if nothing is worth remembering.",
            max = self.max_candidates,
        )
    }
}

/// Scan untrusted model output for a JSON array of candidates. Parse failure
/// or a missing array yields an empty list; invalid elements are dropped.
fn parse_candidates(response: &str, max_candidates: usize) -> Vec<MemoryCandidate> {
    let Some(start) = response.find('[') else {
        return Vec::new();
    };
    let Some(end) = response.rfind(']') else {
        return Vec::new();
    };
    if end < start {
        return Vec::new();
    }

    let raw: Vec<RawCandidate> = match serde_json::from_str(&response[start..=end]) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "memory candidate JSON did not parse; dropping batch");
            return Vec::new();
        }
    };

    let mut candidates: Vec<MemoryCandidate> =
        raw.into_iter().filter_map(RawCandidate::validate).collect();
    candidates.truncate(max_candidates);
    candidates
}

/// The node-creation write path: embed each validated candidate, construct
/// the immutable node, and persist it through the repository.
///
/// Partial failure is the norm, not the exception: a candidate whose
/// embedding or save fails is skipped (nothing is ever persisted without an
/// embedding), and whatever subset succeeded is returned.
pub struct MemoryWriter {
    repository: Arc<MemoryRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl MemoryWriter {
    pub fn new(repository: Arc<MemoryRepository>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            repository,
            embedder,
        }
    }

    /// Persist candidates for `owner_id`. Returns the ids that were created.
    pub async fn remember(
        &self,
        owner_id: Option<&str>,
        candidates: Vec<MemoryCandidate>,
        is_hive_mind: bool,
        source: &str,
    ) -> Vec<String> {
        let mut created = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let embedding = match self.embedder.embed_one(&candidate.content).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(error = %e, "embedding failed; discarding candidate");
                    continue;
                }
            };

            let node = MemoryNode::new(
                owner_id.map(String::from),
                candidate.content,
                candidate.memory_type,
                embedding,
            )
            .with_tags(candidate.tags)
            .with_hive_mind(is_hive_mind)
            .with_source(source);

            match self.repository.save(node).await {
                Ok(id) => created.push(id),
                Err(e) => warn!(error = %e, "memory save failed; discarding candidate"),
            }
        }

        created
    }

    /// Publish a single insight into the shared hive-mind corpus, keeping the
    /// contributing user as attribution.
    pub async fn share(
        &self,
        owner_id: Option<&str>,
        content: &str,
        memory_type: MemoryType,
        tags: Vec<String>,
    ) -> Option<String> {
        let candidate = MemoryCandidate {
            content: content.to_string(),
            memory_type,
            tags,
        };
        self.remember(owner_id, vec![candidate], true, "hive_mind")
            .await
            .into_iter()
            .next()
    }
}
