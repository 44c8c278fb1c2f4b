//! Content lookup collaborator: fetch an encyclopedia article and extract its
//! opening paragraphs.

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

static PARAGRAPH: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));

/// Lookup failure.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("No content found")]
    NoContent,
}

/// Extracted article text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    /// Term as typed by the user
    pub term: String,
    /// Qualifying paragraphs, each followed by a blank line
    pub text: String,
    /// Article address
    pub url: String,
}

/// `fetch(term) -> text | error`.
#[async_trait]
pub trait ContentLookup: Send + Sync {
    async fn fetch(&self, term: &str) -> Result<LookupResult, LookupError>;
}

/// Wikipedia article scraper.
pub struct WikipediaLookup {
    base_url: String,
    max_paragraphs: usize,
    min_paragraph_chars: usize,
    client: Client,
}

impl WikipediaLookup {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            max_paragraphs: 3,
            min_paragraph_chars: 50,
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("yara-bot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn from_config(config: &yara_common::LookupConfig) -> Self {
        let mut lookup = Self::new(&config.base_url, Duration::from_secs(config.timeout_secs));
        lookup.max_paragraphs = config.max_paragraphs;
        lookup.min_paragraph_chars = config.min_paragraph_chars;
        lookup
    }

    /// Article URL for a term.
    pub fn article_url(&self, term: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{}", self.base_url, normalize_term(term))
        } else {
            format!("{}/{}", self.base_url, normalize_term(term))
        }
    }

    /// Keep the first paragraphs whose trimmed text is longer than the minimum.
    fn extract(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        document
            .select(&PARAGRAPH)
            .map(|p| p.text().collect::<String>())
            .map(|text| text.trim().to_string())
            .filter(|text| text.chars().count() > self.min_paragraph_chars)
            .take(self.max_paragraphs)
            .fold(String::new(), |mut acc, text| {
                acc.push_str(&text);
                acc.push_str("\n\n");
                acc
            })
    }
}

#[async_trait]
impl ContentLookup for WikipediaLookup {
    async fn fetch(&self, term: &str) -> Result<LookupResult, LookupError> {
        let url = self.article_url(term);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout
            } else {
                LookupError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Http(status.as_u16()));
        }

        let html = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Timeout
            } else {
                LookupError::Network(e.to_string())
            }
        })?;

        let text = self.extract(&html);
        if text.is_empty() {
            return Err(LookupError::NoContent);
        }

        tracing::debug!(term = %term, url = %url, chars = text.len(), "Article extracted");

        Ok(LookupResult {
            term: term.to_string(),
            text,
            url,
        })
    }
}

/// Article path segment for a term: spaces become underscores.
pub fn normalize_term(term: &str) -> String {
    term.replace(' ', "_")
}
