use crate::providers::Provider;
use std::sync::Arc;
use tracing::{debug, warn};

/// Thin LLM call that labels the user's intent with a short phrase.
///
/// Best-effort: quota errors, timeouts or empty replies yield `None` and the
/// turn continues without an intent hint.
pub struct IntentDetector {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
}

impl IntentDetector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
        }
    }

    pub async fn detect(&self, message: &str) -> Option<String> {
        let prompt = format!(
            "Identify the primary intent of the following message in one short phrase \
             (e.g. \"emotional support\", \"technical inquiry\", \"casual conversation\", \
             \"philosophical discussion\").\n\nMessage: {message}\n\nIntent:"
        );

        match self
            .provider
            .chat_with_system(None, &prompt, &self.model, self.temperature)
            .await
        {
            Ok(reply) => {
                let intent = normalize_label(&reply)?;
                debug!(intent = %intent, "intent detected");
                Some(intent)
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "intent detection failed; continuing without intent");
                None
            }
        }
    }
}

/// First line only, trimmed of quotes/markup, capped to a label length.
fn normalize_label(reply: &str) -> Option<String> {
    let line = reply.lines().find(|l| !l.trim().is_empty())?;
    let label: String = line.trim().trim_matches(['"', '\'', '*', '`']).chars().take(80).collect();
    let label = label.trim().to_string();
    if label.is_empty() { None } else { Some(label) }
}
