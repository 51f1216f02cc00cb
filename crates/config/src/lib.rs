//! Configuration loading, validation, and management for llmcraft.
//!
//! Loads configuration from `~/.llmcraft/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.llmcraft/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat and embedding model endpoint
    #[serde(default)]
    pub model: ModelConfig,

    /// HTTP server binding
    #[serde(default)]
    pub server: ServerConfig,

    /// Session memory bounds
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Document ingestion and retrieval gating
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Input safety screening
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Persona and tool-calling behavior
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL (Ollama serves one under `/v1`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Bearer token, only needed for hosted endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_chat_model() -> String {
    "glm-5:cloud".into()
}
fn default_embedding_model() -> String {
    "embeddinggemma".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Messages kept per session; older ones are evicted first.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Corpus root, walked recursively at startup
    #[serde(default = "default_docs_path")]
    pub docs_path: PathBuf,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity, in `[0, 1]`, for a hit to be kept
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,

    /// File extensions treated as text documents
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_docs_path() -> PathBuf {
    PathBuf::from("resources/docs")
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    3
}
fn default_score_threshold() -> f32 {
    0.5
}
fn default_extensions() -> Vec<String> {
    vec!["txt".into(), "md".into()]
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            docs_path: default_docs_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            extensions: default_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Maximum input length in characters
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Whole-word matches are rejected (case-insensitive)
    #[serde(default = "default_sensitive_words")]
    pub sensitive_words: BTreeSet<String>,

    /// Prompt-injection phrases, matched as substrings (case-insensitive)
    #[serde(default = "default_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,
}

fn default_max_length() -> usize {
    2000
}
fn default_sensitive_words() -> BTreeSet<String> {
    ["fuck", "shit", "bitch"].into_iter().map(String::from).collect()
}
fn default_dangerous_patterns() -> Vec<String> {
    vec![
        "ignore previous instructions".into(),
        "忽略之前的指令".into(),
        "忽略上面的内容".into(),
        "你现在是".into(),
    ]
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_length: default_max_length(),
            sensitive_words: default_sensitive_words(),
            dangerous_patterns: default_dangerous_patterns(),
        }
    }
}

/// What to do when the model asks for a tool that is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownToolPolicy {
    /// Drop the call and log it.
    #[default]
    Skip,
    /// Answer the call with an error tool message so the model can recover.
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_true")]
    pub tools_enabled: bool,

    #[serde(default)]
    pub unknown_tool_policy: UnknownToolPolicy,
}

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a programming expert. Your name is Raina. \
You help users solve programming problems, with a focus on three areas:
- Planning programming learning paths
- Providing programming study advice
- Sharing high-frequency interview questions
Please solve users' programming problems using professional language.";

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}
fn default_true() -> bool {
    true
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            tools_enabled: true,
            unknown_tool_policy: UnknownToolPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.llmcraft/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, apply environment overrides, and validate the result.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production, a map in tests).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.model.base_url = normalize_base_url(&url);
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.model.chat_model = model;
        }
        if let Some(model) = lookup("OLLAMA_EMBEDDING_MODEL") {
            self.model.embedding_model = model;
        }
        if let Some(key) = lookup("LLMCRAFT_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(host) = lookup("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("SERVER_PORT is not a valid port: {port}"))
            })?;
        }
        if let Some(path) = lookup("LLMCRAFT_DOCS_PATH") {
            self.retrieval.docs_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".llmcraft")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_messages must be at least 1".into(),
            ));
        }

        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_size must be at least 1".into(),
            ));
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if r.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&r.score_threshold) {
            return Err(ConfigError::ValidationError(
                "retrieval.score_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.guardrail.max_length == 0 {
            return Err(ConfigError::ValidationError(
                "guardrail.max_length must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Ollama's native URL has no `/v1`; the OpenAI-compatible API lives under it.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
