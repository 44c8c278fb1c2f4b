//! Configuration management for the Yara bot.
//!
//! The bot reads a single configuration file, `~/.yara/config.json` by default.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (YARA_* prefix, plus a few well-known names)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `YARA_TELEGRAM_TOKEN` / `TELEGRAM_BOT_TOKEN` → telegram.bot_token
//! - `YARA_ALLOWED_USERS` (comma separated) → telegram.allowed_users
//! - `GROQ_API_KEY` → llm.api_key
//! - `YARA_LLM_MODEL` → llm.model
//! - `YARA_HISTORY_DB` → history.db_path
//! - `YARA_LOG_LEVEL` → observability.log_level
//! - `YARA_LOG_FORMAT` → observability.log_format

use crate::error::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".yara"),
        |dirs| dirs.home_dir().join(".yara"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Telegram
// ============================================================================

/// Telegram transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token issued by BotFather
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Authorized user identities (numeric ids or usernames, `*` for everyone)
    #[serde(default)]
    pub allowed_users: Vec<String>,

    /// Bot API base URL
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            allowed_users: Vec::new(),
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_poll_timeout_secs() -> u64 {
    30
}

// ============================================================================
// LLM
// ============================================================================

/// Completion endpoint configuration (any OpenAI-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name used in logs and errors
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Base URL; `/v1/chat/completions` is appended
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// API key. Without it the AI features reply with a "not configured" notice.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Request timeout for a single completion call
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            base_url: default_llm_base_url(),
            api_key: None,
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "groq".into()
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai".into()
}

fn default_llm_model() -> String {
    "llama3-8b-8192".into()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

fn default_llm_timeout_secs() -> u64 {
    120
}

// ============================================================================
// Content lookup
// ============================================================================

/// Web content lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Article URL prefix; the normalized term is appended
    #[serde(default = "default_lookup_base_url")]
    pub base_url: String,

    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of paragraphs kept from the page
    #[serde(default = "default_max_paragraphs")]
    pub max_paragraphs: usize,

    /// Paragraphs must be strictly longer than this to count
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,

    /// Extracted text is cut to this many characters in the reply
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_lookup_base_url(),
            timeout_secs: default_lookup_timeout_secs(),
            max_paragraphs: default_max_paragraphs(),
            min_paragraph_chars: default_min_paragraph_chars(),
            max_reply_chars: default_max_reply_chars(),
        }
    }
}

fn default_lookup_base_url() -> String {
    "https://pt.wikipedia.org/wiki/".into()
}

fn default_lookup_timeout_secs() -> u64 {
    10
}

fn default_max_paragraphs() -> usize {
    3
}

fn default_min_paragraph_chars() -> usize {
    50
}

fn default_max_reply_chars() -> usize {
    1000
}

// ============================================================================
// History
// ============================================================================

/// Conversation history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// SQLite database path (`~` is expanded)
    #[serde(default = "default_history_db_path")]
    pub db_path: String,

    /// Optional cap on stored turns per user, seed included.
    /// Unset means history grows without bound.
    #[serde(default)]
    pub max_turns: Option<usize>,

    /// Persona directive inserted as the first turn of every conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_history_db_path(),
            max_turns: None,
            system_prompt: default_system_prompt(),
        }
    }
}

impl HistoryConfig {
    /// Database path with `~` and environment variables expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.db_path).map_or_else(
            |_| shellexpand::tilde(&self.db_path).into_owned(),
            std::borrow::Cow::into_owned,
        ))
    }
}

fn default_history_db_path() -> String {
    "~/.yara/history.db".into()
}

fn default_system_prompt() -> String {
    "Você é Yara, uma assistente de IA prestativa. Responda sempre em português do Brasil.".into()
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub lookup: LookupConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration (default path or `path`) and apply environment overrides.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("YARA_TELEGRAM_TOKEN").or_else(|| lookup("TELEGRAM_BOT_TOKEN"))
        {
            self.telegram.bot_token = Some(token);
        }

        if let Some(users) = lookup("YARA_ALLOWED_USERS") {
            self.telegram.allowed_users = users
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(key) = lookup("GROQ_API_KEY") {
            self.llm.api_key = Some(key);
        }

        if let Some(model) = lookup("YARA_LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(path) = lookup("YARA_HISTORY_DB") {
            self.history.db_path = path;
        }

        if let Some(level) = lookup("YARA_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(format) = lookup("YARA_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Bot token, treating an empty string as absent.
    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// LLM API key, treating an empty string as absent.
    pub fn llm_api_key(&self) -> Option<&str> {
        self.llm.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    /// Bot token, or a configuration error when none is set.
    pub fn require_telegram_bot_token(&self) -> Result<&str> {
        self.telegram_bot_token().ok_or_else(|| {
            Error::Config(
                "telegram.bot_token is not set (or set YARA_TELEGRAM_TOKEN)".into(),
            )
        })
    }
}
