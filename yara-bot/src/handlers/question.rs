use super::Responder;
use crate::error::BotError;
use crate::history::{HistoryStore, Role};
use crate::provider::{CompletionProvider, CompletionSettings, ProviderError};
use std::sync::Arc;

/// Answers free-form questions with the user's conversation as context.
pub struct QuestionHandler {
    history: Arc<HistoryStore>,
    provider: Option<Arc<dyn CompletionProvider>>,
    settings: CompletionSettings,
}

impl QuestionHandler {
    /// `provider` is `None` when no API key is configured.
    pub fn new(
        history: Arc<HistoryStore>,
        provider: Option<Arc<dyn CompletionProvider>>,
        settings: CompletionSettings,
    ) -> Self {
        Self {
            history,
            provider,
            settings,
        }
    }

    pub async fn handle(&self, responder: &Responder<'_>, question: &str) -> Result<(), BotError> {
        let user_id = responder.message().user_id.as_str();

        let Some(provider) = &self.provider else {
            let err = BotError::CompletionNotConfigured;
            tracing::warn!(user_id = %user_id, "Question received but no completion provider is configured");
            return responder.text(err.user_notice().unwrap_or_default()).await;
        };

        responder.typing().await;

        self.history.get(user_id).await;
        let turns = self.history.append(user_id, Role::User, question).await;

        match self.ask(provider.as_ref(), turns).await {
            Ok(answer) => {
                self.history
                    .append(user_id, Role::Assistant, answer.as_str())
                    .await;
                responder.text(answer.trim()).await
            }
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "Completion failed");
                // Undo the speculative user turn before replying.
                self.history.remove_last(user_id).await;
                responder.text(err.user_notice().unwrap_or_default()).await
            }
        }
    }

    async fn ask(
        &self,
        provider: &dyn CompletionProvider,
        turns: Vec<crate::history::Turn>,
    ) -> Result<String, BotError> {
        let response = provider.chat(self.settings.request(turns)).await?;

        if response.content.trim().is_empty() {
            return Err(ProviderError {
                provider: response.provider,
                model: response.model,
                message: "Empty completion".into(),
                status_code: None,
            }
            .into());
        }

        tracing::debug!(
            provider = %response.provider,
            model = %response.model,
            total_tokens = response.usage.total_tokens,
            latency_ms = response.latency_ms,
            "Completion received"
        );

        Ok(response.content)
    }
}
