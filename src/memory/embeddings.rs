use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding providers — convert text to vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts into vectors
    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut results = self.embed(&[text]).await?;
        results
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding result"))
    }
}

// ── Noop provider (disables vector search) ───────────────────

pub struct NoopEmbedding;

#[async_trait]
impl EmbeddingProvider for NoopEmbedding {
    fn name(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(Vec::new())
    }
}

// ── Gemini embedding provider ────────────────────────────────

pub struct GeminiEmbedding {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

#[derive(serde::Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(serde::Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
}

#[derive(serde::Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(serde::Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(serde::Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(serde::Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiEmbedding {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(api_key: &str, model: &str, dims: usize) -> Self {
        Self::with_base_url(Self::DEFAULT_BASE_URL, api_key, model, dims)
    }

    /// Overridable base URL, used by contract tests against a mock server.
    pub fn with_base_url(base_url: &str, api_key: &str, model: &str, dims: usize) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: Self::model_name(model),
            dims,
        }
    }

    fn model_name(model: &str) -> String {
        if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    fn name(&self) -> &str {
        "gemini"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: self.model.clone(),
                    content: EmbedContent {
                        parts: vec![EmbedPart {
                            text: (*text).to_string(),
                        }],
                    },
                })
                .collect(),
        };

        let url = format!(
            "{}/v1beta/{}:batchEmbedContents?key={}",
            self.base_url, self.model, self.api_key
        );

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding HTTP request failed: {e}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!("Embedding API error {status}");
        }

        let parsed: BatchEmbedResponse = resp.json().await?;
        if parsed.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: requested {}, got {}",
                texts.len(),
                parsed.embeddings.len()
            );
        }

        let mut out = Vec::with_capacity(parsed.embeddings.len());
        for embedding in parsed.embeddings {
            if embedding.values.is_empty() {
                anyhow::bail!("Embedding API returned an empty vector");
            }
            out.push(embedding.values);
        }
        Ok(out)
    }
}

// ── Factory ──────────────────────────────────────────────────

/// Build an embedding provider from config strings.
///
/// Unknown providers and missing keys degrade to the no-op provider, which
/// turns retrieval into recency-only mode rather than failing startup.
pub fn create_embedding_provider(
    provider: &str,
    api_key: Option<&str>,
    model: &str,
    dims: usize,
) -> Arc<dyn EmbeddingProvider> {
    match provider {
        "gemini" => match api_key {
            Some(key) if !key.is_empty() => Arc::new(GeminiEmbedding::new(key, model, dims)),
            _ => {
                tracing::warn!("gemini embedding provider selected but no API key; vector search disabled");
                Arc::new(NoopEmbedding)
            }
        },
        _ => Arc::new(NoopEmbedding),
    }
}

// ── Deterministic provider (unit tests) ──────────────────────

#[cfg(test)]
pub(crate) struct DeterministicEmbedding {
    dims: usize,
    seed: u64,
}

#[cfg(test)]
impl DeterministicEmbedding {
    pub(crate) fn new(dims: usize) -> Self {
        Self { dims, seed: 0 }
    }

    pub(crate) fn with_seed(dims: usize, seed: u64) -> Self {
        Self { dims, seed }
    }

    fn fnv1a64(seed: u64, bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ seed;
        for &b in bytes {
            hash ^= u64::from(b);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn splitmix64(mut x: u64) -> u64 {
        x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = x;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    #[allow(clippy::cast_precision_loss)]
    fn u64_to_unit_f32(x: u64) -> f32 {
        const U24_MAX: f32 = ((1u32 << 24) - 1) as f32;
        let top_u24: u32 = (x >> 40) as u32;
        (top_u24 as f32 / U24_MAX) * 2.0 - 1.0
    }
}

#[cfg(test)]
#[async_trait]
impl EmbeddingProvider for DeterministicEmbedding {
    fn name(&self) -> &str {
        "deterministic_test"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for &t in texts {
            let base = Self::fnv1a64(self.seed, t.as_bytes());
            let mut v = Vec::with_capacity(self.dims);
            for i in 0..self.dims {
                let mixed = Self::splitmix64(base ^ (i as u64));
                v.push(Self::u64_to_unit_f32(mixed));
            }
            out.push(v);
        }
        Ok(out)
    }
}
