//! Configuration validation.
//!
//! Checks that required values are present and within valid ranges before
//! any service is started.

use thiserror::Error;

use crate::config::{Config, HistoryConfig, LlmConfig, LookupConfig, ObservabilityConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    ///
    /// `require_telegram` is set when the Telegram transport will be started;
    /// the CLI transport runs without a token.
    pub fn validate(&self, require_telegram: bool) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if require_telegram && self.telegram_bot_token().is_none() {
            errors.push(ValidationError::MissingField {
                field: "telegram.bot_token".into(),
            });
        }

        if let Err(e) = self.llm.validate() {
            errors.push(e);
        }

        if let Err(e) = self.lookup.validate() {
            errors.push(e);
        }

        if let Err(e) = self.history.validate() {
            errors.push(e);
        }

        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple(errors)),
        }
    }
}

impl Validate for LlmConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "llm.base_url".into(),
            });
        }

        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "llm.model".into(),
            });
        }

        if self.max_tokens == 0 {
            return Err(ValidationError::InvalidValue {
                field: "llm.max_tokens".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ValidationError::InvalidValue {
                field: "llm.temperature".into(),
                reason: "must be between 0.0 and 2.0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for LookupConfig {
    fn validate(&self) -> ValidationResult<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidValue {
                field: "lookup.base_url".into(),
                reason: "must be an http(s) URL".into(),
            });
        }

        if self.max_paragraphs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "lookup.max_paragraphs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_reply_chars == 0 {
            return Err(ValidationError::InvalidValue {
                field: "lookup.max_reply_chars".into(),
                reason: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

impl Validate for HistoryConfig {
    fn validate(&self) -> ValidationResult<()> {
        // Seed plus one full exchange.
        if self.max_turns.is_some_and(|n| n < 3) {
            return Err(ValidationError::InvalidValue {
                field: "history.max_turns".into(),
                reason: "must be at least 3 when set".into(),
            });
        }

        if self.db_path.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "history.db_path".into(),
            });
        }

        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}
