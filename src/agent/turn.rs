use super::identity::apply_message_heuristics;
use super::intent::IntentDetector;
use crate::memory::{
    MemoryClassifier, MemoryRepository, MemoryRetriever, MemoryScope, MemoryWriter,
    RecalledMemory, UserIdentity,
};
use crate::prompt::PromptBuilder;
use crate::providers::Provider;
use crate::{LlmError, MemoryError};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub user_id: String,
    pub intent: Option<String>,
    pub memory_ids: Vec<String>,
    pub personal_memory_count: usize,
    pub hive_memory_count: usize,
}

/// One conversation turn, executed in strict sequence: intent → identity →
/// retrieval → completion → extraction/storage. Extraction runs only after
/// the model reply exists because it classifies the full exchange.
///
/// Memory failures never surface as conversational failures: a turn with
/// zero retrieved or zero stored memories is a successful turn with degraded
/// personalization. Only the completion call itself can fail the turn.
pub struct ConversationTurn {
    provider: Arc<dyn Provider>,
    retriever: Arc<MemoryRetriever>,
    writer: Arc<MemoryWriter>,
    repository: Arc<MemoryRepository>,
    classifier: Option<MemoryClassifier>,
    intent_detector: Option<IntentDetector>,
    prompt_builder: PromptBuilder,
    chat_model: String,
    chat_temperature: f64,
    retrieve_limit: usize,
    hive_mind_enabled: bool,
}

impl ConversationTurn {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<MemoryRetriever>,
        writer: Arc<MemoryWriter>,
        repository: Arc<MemoryRepository>,
        classifier: Option<MemoryClassifier>,
        intent_detector: Option<IntentDetector>,
        prompt_builder: PromptBuilder,
        chat_model: String,
        chat_temperature: f64,
        retrieve_limit: usize,
        hive_mind_enabled: bool,
    ) -> Self {
        Self {
            provider,
            retriever,
            writer,
            repository,
            classifier,
            intent_detector,
            prompt_builder,
            chat_model,
            chat_temperature,
            retrieve_limit,
            hive_mind_enabled,
        }
    }

    pub async fn process(
        &self,
        user_id: &str,
        message: &str,
        history: &[ChatMessage],
    ) -> crate::Result<TurnOutcome> {
        info!(user_id, "turn started");

        let intent = match &self.intent_detector {
            Some(detector) => detector.detect(message).await,
            None => None,
        };

        let identity = self.update_identity(user_id, message).await;

        let personal = self
            .retrieve_degraded(message, MemoryScope::Personal, Some(user_id))
            .await;
        let hive = if self.hive_mind_enabled {
            self.retrieve_degraded(message, MemoryScope::Hive, None).await
        } else {
            Vec::new()
        };

        let system_prompt = self.prompt_builder.build_system_prompt(
            identity.as_ref(),
            &personal,
            &hive,
            intent.as_deref(),
        )?;

        let rendered_message = render_with_history(message, history);
        let response = self
            .provider
            .chat_with_system(
                Some(&system_prompt),
                &rendered_message,
                &self.chat_model,
                self.chat_temperature,
            )
            .await
            .map_err(|e| LlmError::Request {
                provider: self.provider.name().to_string(),
                message: e.to_string(),
            })?;

        // Extraction depends on the full exchange, so it runs strictly after
        // the completion. Best-effort by contract.
        let memory_ids = match &self.classifier {
            Some(classifier) => {
                let candidates = classifier.extract(message, &response).await;
                self.writer
                    .remember(Some(user_id), candidates, false, "conversation")
                    .await
            }
            None => Vec::new(),
        };

        info!(
            user_id,
            intent = intent.as_deref().unwrap_or("-"),
            personal = personal.len(),
            hive = hive.len(),
            stored = memory_ids.len(),
            "turn completed"
        );

        Ok(TurnOutcome {
            response,
            user_id: user_id.to_string(),
            intent,
            memory_ids,
            personal_memory_count: personal.len(),
            hive_memory_count: hive.len(),
        })
    }

    /// Retrieval with the turn-level degradation policy applied: a failing
    /// store means an empty context, not a failed conversation.
    async fn retrieve_degraded(
        &self,
        message: &str,
        scope: MemoryScope,
        owner_id: Option<&str>,
    ) -> Vec<RecalledMemory> {
        match self
            .retriever
            .retrieve(message, scope, owner_id, self.retrieve_limit)
            .await
        {
            Ok(memories) => memories,
            Err(MemoryError::StoreUnavailable(msg)) => {
                error!(scope = %scope, error = %msg, "structured store unavailable; continuing without memories");
                Vec::new()
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "memory retrieval failed; continuing without memories");
                Vec::new()
            }
        }
    }

    /// Load-or-create the identity, fold in message heuristics, upsert.
    /// Returns `None` when the store is down (prompt renders without an
    /// identity section).
    async fn update_identity(&self, user_id: &str, message: &str) -> Option<UserIdentity> {
        let mut identity = match self.repository.get_identity(user_id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                info!(user_id, "new user identity created");
                UserIdentity::new(user_id)
            }
            Err(e) => {
                warn!(user_id, error = %e, "identity load failed; continuing without profile");
                return None;
            }
        };

        apply_message_heuristics(&mut identity, message);
        identity.touch();

        if let Err(e) = self.repository.save_identity(&identity).await {
            warn!(user_id, error = %e, "identity save failed; profile not persisted this turn");
        }
        Some(identity)
    }
}

/// Fold prior exchanges into the user message for a single-message provider
/// call. Roles other than "user"/"assistant" are skipped.
fn render_with_history(message: &str, history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return message.to_string();
    }

    let mut rendered = String::from("Previous conversation:\n");
    for entry in history {
        match entry.role.as_str() {
            "user" | "assistant" => {
                let _ = writeln!(rendered, "{}: {}", entry.role, entry.content);
            }
            _ => {}
        }
    }
    let _ = write!(rendered, "\nCurrent message: {message}");
    rendered
}
