use super::Responder;
use crate::dispatch::Command;
use crate::error::BotError;
use crate::history::HistoryStore;
use crate::messages;

/// Run `/start`, `/ajuda` or `/reset`.
pub async fn handle_command(
    responder: &Responder<'_>,
    history: &HistoryStore,
    command: Command,
) -> Result<(), BotError> {
    let message = responder.message();
    match command {
        Command::Start | Command::Help => {
            responder
                .markdown(messages::welcome(message.first_name.as_deref()))
                .await
        }
        Command::Reset => {
            history.clear(&message.user_id).await;
            tracing::info!(user_id = %message.user_id, "Conversation reset by user");
            responder.text(messages::HISTORY_CLEARED).await
        }
    }
}
