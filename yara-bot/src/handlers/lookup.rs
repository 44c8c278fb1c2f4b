use super::Responder;
use crate::error::BotError;
use crate::lookup::ContentLookup;
use crate::messages;
use std::sync::Arc;

/// Answers `pesquisar <term>` from the content lookup collaborator.
/// Results never touch conversation history.
pub struct LookupHandler {
    lookup: Arc<dyn ContentLookup>,
    max_reply_chars: usize,
}

impl LookupHandler {
    pub fn new(lookup: Arc<dyn ContentLookup>, max_reply_chars: usize) -> Self {
        Self {
            lookup,
            max_reply_chars,
        }
    }

    pub async fn handle(&self, responder: &Responder<'_>, term: &str) -> Result<(), BotError> {
        responder.text(messages::searching(term)).await?;

        match self.lookup.fetch(term).await {
            Ok(result) => {
                let reply = messages::lookup_reply(
                    &result.term,
                    &result.text,
                    &result.url,
                    self.max_reply_chars,
                );
                responder.markdown(reply).await
            }
            Err(source) => {
                let err = BotError::Lookup {
                    term: term.to_string(),
                    source,
                };
                tracing::error!(error = %err, "Lookup failed");
                responder.text(err.user_notice().unwrap_or_default()).await
            }
        }
    }

    /// Reply to a lookup request without a term.
    pub async fn usage_hint(&self, responder: &Responder<'_>) -> Result<(), BotError> {
        responder
            .text(BotError::EmptyQuery.user_notice().unwrap_or_default())
            .await
    }
}
