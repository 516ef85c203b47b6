use crate::ConfigError;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Provider API key; environment variables take precedence.
    pub api_key: Option<String>,
    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default)]
    pub persona: PersonaConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_provider() -> String {
    "gemini".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_persona_name")]
    pub name: String,
    /// Immutable personality description rendered into every system prompt.
    #[serde(default = "default_persona_description")]
    pub description: String,
}

fn default_persona_name() -> String {
    "Meera".into()
}

fn default_persona_description() -> String {
    "A warm, attentive companion that remembers what matters to each person \
     it talks to, and learns from every conversation."
        .into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: default_persona_name(),
            description: default_persona_description(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Model answering the user.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Lightweight model for intent detection and memory extraction.
    #[serde(default = "default_utility_model")]
    pub utility_model: String,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f64,
    #[serde(default = "default_utility_temperature")]
    pub utility_temperature: f64,
    #[serde(default = "default_true")]
    pub intent_detection: bool,
    #[serde(default = "default_true")]
    pub extraction_enabled: bool,
    /// Upper bound on memory candidates extracted per turn.
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_turn: usize,
}

fn default_chat_model() -> String {
    "gemini-2.5-pro".into()
}
fn default_utility_model() -> String {
    "gemini-flash-latest".into()
}
fn default_chat_temperature() -> f64 {
    0.7
}
fn default_utility_temperature() -> f64 {
    0.3
}
fn default_true() -> bool {
    true
}
fn default_max_candidates() -> usize {
    3
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            utility_model: default_utility_model(),
            chat_temperature: default_chat_temperature(),
            utility_temperature: default_utility_temperature(),
            intent_detection: true,
            extraction_enabled: true,
            max_candidates_per_turn: default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Vector index backend: "sqlite" | "lancedb"
    #[serde(default = "default_index_backend")]
    pub index_backend: String,
    /// Optional override for the memory data directory (supports `~`).
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Embedding provider: "gemini" | "none"
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dims")]
    pub embedding_dimensions: usize,
    /// Memories fetched per scope when building a prompt.
    #[serde(default = "default_retrieve_limit")]
    pub retrieve_limit: usize,
    /// Half-life of the recency decay curve, in days.
    #[serde(default = "default_recency_half_life")]
    pub recency_half_life_days: f64,
    /// Include the shared hive-mind corpus in prompt context.
    #[serde(default = "default_true")]
    pub hive_mind_enabled: bool,
}

fn default_index_backend() -> String {
    "sqlite".into()
}
fn default_embedding_provider() -> String {
    "gemini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-004".into()
}
fn default_embedding_dims() -> usize {
    768
}
fn default_retrieve_limit() -> usize {
    3
}
fn default_recency_half_life() -> f64 {
    7.0
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            index_backend: default_index_backend(),
            data_dir: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dims(),
            retrieve_limit: default_retrieve_limit(),
            recency_half_life_days: default_recency_half_life(),
            hive_mind_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    7700
}
fn default_request_timeout() -> u64 {
    120
}
fn default_max_body_bytes() -> usize {
    256 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::new(),
            config_path: PathBuf::new(),
            api_key: None,
            default_provider: default_provider(),
            persona: PersonaConfig::default(),
            agents: AgentsConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.meera/config.toml`, writing a default config on first run.
    pub fn load_or_init() -> crate::Result<Self> {
        let workspace = Self::default_workspace_dir()?;
        Self::load_or_init_at(&workspace)
    }

    /// Same as `load_or_init`, rooted at an explicit workspace directory.
    pub fn load_or_init_at(workspace_dir: &Path) -> crate::Result<Self> {
        fs::create_dir_all(workspace_dir).map_err(ConfigError::Io)?;
        let config_path = workspace_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let raw = fs::read_to_string(&config_path).map_err(ConfigError::Io)?;
            toml::from_str::<Self>(&raw)
                .map_err(|e| ConfigError::Load(format!("{}: {e}", config_path.display())))?
        } else {
            let config = Self::default();
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| ConfigError::Load(e.to_string()))?;
            fs::write(&config_path, rendered).map_err(ConfigError::Io)?;
            config
        };

        config.workspace_dir = workspace_dir.to_path_buf();
        config.config_path = config_path;
        config.validate()?;
        Ok(config)
    }

    fn default_workspace_dir() -> Result<PathBuf, ConfigError> {
        let dirs = UserDirs::new()
            .ok_or_else(|| ConfigError::Load("cannot resolve home directory".into()))?;
        Ok(dirs.home_dir().join(".meera"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.retrieve_limit == 0 {
            return Err(ConfigError::Validation(
                "memory.retrieve_limit must be at least 1".into(),
            ));
        }
        if self.memory.recency_half_life_days <= 0.0 {
            return Err(ConfigError::Validation(
                "memory.recency_half_life_days must be positive".into(),
            ));
        }
        if self.agents.max_candidates_per_turn == 0 {
            return Err(ConfigError::Validation(
                "agents.max_candidates_per_turn must be at least 1".into(),
            ));
        }
        match self.memory.index_backend.as_str() {
            "sqlite" | "lancedb" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "memory.index_backend must be \"sqlite\" or \"lancedb\", got \"{other}\""
            ))),
        }
    }

    /// API key with environment variables taking precedence over config.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.is_empty())
    }

    /// Directory holding the memory databases, honoring the `data_dir`
    /// override with `~` expansion.
    pub fn memory_data_dir(&self) -> PathBuf {
        match &self.memory.data_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).into_owned()),
            None => self.workspace_dir.join("memory"),
        }
    }
}
