mod gemini;
mod gemini_types;

pub use gemini::GeminiProvider;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A black-box text-completion service: system prompt + message in, text out.
///
/// Intent detection and memory extraction ride the same trait with different
/// models and temperatures.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String>;
}

/// Shared HTTP client with sane timeouts for provider calls.
pub fn build_provider_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Build a chat provider by name. Only Gemini is wired today; the trait
/// boundary keeps the rest of the system provider-agnostic.
pub fn create_provider(name: &str, api_key: Option<&str>) -> anyhow::Result<Arc<dyn Provider>> {
    match name {
        "gemini" => Ok(Arc::new(GeminiProvider::new(api_key))),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}
