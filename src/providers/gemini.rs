//! Google Gemini chat provider.
//!
//! Authentication: explicit API key from config, or the `GEMINI_API_KEY` /
//! `GOOGLE_API_KEY` environment variables.

use super::gemini_types::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use super::{Provider, build_provider_client};
use async_trait::async_trait;
use reqwest::Client;

pub struct GeminiProvider {
    api_key: Option<String>,
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(api_key: Option<&str>) -> Self {
        Self::with_base_url(Self::DEFAULT_BASE_URL, api_key)
    }

    /// Overridable base URL, used by contract tests against a mock server.
    pub fn with_base_url(base_url: &str, api_key: Option<&str>) -> Self {
        let resolved_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok());

        Self {
            api_key: resolved_key,
            client: build_provider_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn has_any_auth() -> bool {
        std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GOOGLE_API_KEY").is_ok()
    }

    fn model_name(model: &str) -> String {
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }

    fn build_request(
        system_prompt: Option<&str>,
        message: &str,
        temperature: f64,
    ) -> GenerateContentRequest {
        let system_instruction = system_prompt.map(|sys| Content {
            role: None,
            parts: vec![Part::text(sys.to_string())],
        });

        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(message.to_string())],
            }],
            system_instruction,
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: 8192,
            },
        }
    }

    fn extract_text(candidates: Option<&[Candidate]>) -> anyhow::Result<String> {
        let text = candidates
            .and_then(|c| c.first())
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_ref())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        if text.is_empty() {
            anyhow::bail!("No response from Gemini");
        }

        Ok(text)
    }

    async fn call_api(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!(
                "Gemini API key not found. Set GEMINI_API_KEY or add api_key to config.toml \
                 (get one from https://aistudio.google.com/app/apikey)"
            )
        })?;

        let model_name = Self::model_name(model);
        let url = format!(
            "{}/v1beta/{model_name}:generateContent?key={api_key}",
            self.base_url
        );

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({status}): {error_text}");
        }

        let result: GenerateContentResponse = response.json().await?;

        if let Some(err) = result.error.as_ref() {
            anyhow::bail!("Gemini API error: {}", err.message);
        }

        Ok(result)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat_with_system(
        &self,
        system_prompt: Option<&str>,
        message: &str,
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let request = Self::build_request(system_prompt, message, temperature);
        let result = self.call_api(model, &request).await?;
        Self::extract_text(result.candidates.as_deref())
    }
}
