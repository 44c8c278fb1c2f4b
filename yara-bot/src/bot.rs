//! Message pipeline: allow-list gate, commands, dispatcher, and the per-user
//! worker queues that serialize each user's messages.

use crate::access::AccessGate;
use crate::dispatch::{self, Route};
use crate::error::BotError;
use crate::handlers::{handle_command, LookupHandler, QuestionHandler, Responder};
use crate::history::HistoryStore;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use yara_channels::{Channel, ChannelMessage};

/// The bot: owns the gate, history, and handlers.
pub struct Bot {
    gate: AccessGate,
    history: Arc<HistoryStore>,
    questions: QuestionHandler,
    lookups: LookupHandler,
}

impl Bot {
    pub fn new(
        gate: AccessGate,
        history: Arc<HistoryStore>,
        questions: QuestionHandler,
        lookups: LookupHandler,
    ) -> Self {
        Self {
            gate,
            history,
            questions,
            lookups,
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn is_authorized(&self, message: &ChannelMessage) -> bool {
        self.gate.is_any_authorized(message.identities())
    }

    /// Full pipeline for one message: gate first, then routing.
    pub async fn handle_message(&self, channel: &dyn Channel, message: &ChannelMessage) {
        if self.is_authorized(message) {
            self.handle_authorized(channel, message).await;
        } else {
            self.reject(channel, message).await;
        }
    }

    /// Send the fixed rejection. No state is touched.
    pub async fn reject(&self, channel: &dyn Channel, message: &ChannelMessage) {
        let err = BotError::Unauthorized(message.user_id.clone());
        tracing::warn!(
            user_id = %message.user_id,
            username = message.username.as_deref().unwrap_or("-"),
            "Access denied"
        );

        let responder = Responder::new(channel, message);
        if let Err(e) = responder.text(err.user_notice().unwrap_or_default()).await {
            tracing::error!(user_id = %message.user_id, error = %e, "Failed to send rejection");
        }
    }

    /// Route a message from an authorized sender.
    pub async fn handle_authorized(&self, channel: &dyn Channel, message: &ChannelMessage) {
        let Some(text) = message.text() else {
            tracing::debug!(user_id = %message.user_id, "Ignoring non-text message");
            return;
        };

        let responder = Responder::new(channel, message);
        let result = match dispatch::classify(text) {
            Route::Command(command) => handle_command(&responder, &self.history, command).await,
            Route::UnknownCommand(command) => {
                tracing::debug!(user_id = %message.user_id, command = %command, "Ignoring unknown command");
                Ok(())
            }
            Route::Lookup(term) => self.lookups.handle(&responder, term).await,
            Route::EmptyLookup => self.lookups.usage_hint(&responder).await,
            Route::Question(question) => self.questions.handle(&responder, question).await,
        };

        if let Err(e) = result {
            tracing::error!(
                trace_id = %message.trace_id,
                user_id = %message.user_id,
                error = %e,
                "Failed to reply"
            );
        }
    }
}

/// How long a user worker waits for another message before retiring.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// One single-consumer queue per user identity.
///
/// Each user's messages are handled one at a time in arrival order while
/// different users proceed concurrently. A worker retires after
/// `idle_timeout` without messages; the next message starts a fresh one.
pub struct UserQueues {
    bot: Arc<Bot>,
    channel: Arc<dyn Channel>,
    workers: Arc<DashMap<String, UserWorker>>,
    idle_timeout: Duration,
    next_worker_id: AtomicU64,
}

struct UserWorker {
    id: u64,
    tx: mpsc::UnboundedSender<ChannelMessage>,
    handle: JoinHandle<()>,
}

impl UserQueues {
    pub fn new(bot: Arc<Bot>, channel: Arc<dyn Channel>) -> Self {
        Self {
            bot,
            channel,
            workers: Arc::new(DashMap::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            next_worker_id: AtomicU64::new(0),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Queue a message on its sender's worker, starting the worker if needed.
    ///
    /// The send happens while the map entry is held, so a retiring worker
    /// either sees the message in its queue or is already gone from the map.
    pub fn enqueue(&self, message: ChannelMessage) {
        let user_id = message.user_id.clone();
        let mut worker = self
            .workers
            .entry(user_id.clone())
            .or_insert_with(|| self.spawn_worker(&user_id));

        if let Err(mpsc::error::SendError(message)) = worker.tx.send(message) {
            // The worker task died (panic); replace it once.
            tracing::warn!(user_id = %user_id, "User worker stopped, restarting");
            *worker = self.spawn_worker(&user_id);
            if worker.tx.send(message).is_err() {
                tracing::error!(user_id = %user_id, "Failed to queue message");
            }
        }
    }

    /// Number of users with a running worker.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Stop accepting messages and wait for every queued message to be handled.
    pub async fn close(&self) {
        let user_ids: Vec<String> = self.workers.iter().map(|w| w.key().clone()).collect();
        for user_id in user_ids {
            if let Some((_, worker)) = self.workers.remove(&user_id) {
                drop(worker.tx);
                if let Err(e) = worker.handle.await {
                    tracing::warn!(user_id = %user_id, error = %e, "User worker ended abnormally");
                }
            }
        }
    }

    fn spawn_worker(&self, user_id: &str) -> UserWorker {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMessage>();
        let bot = self.bot.clone();
        let channel = self.channel.clone();
        let workers = self.workers.clone();
        let idle_timeout = self.idle_timeout;
        let user_id = user_id.to_string();

        tracing::debug!(user_id = %user_id, worker_id = id, "Starting user worker");
        let handle = tokio::spawn(async move {
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(message)) => bot.handle_authorized(channel.as_ref(), &message).await,
                    Ok(None) => break,
                    Err(_) => {
                        // Only retire our own entry, and only with nothing queued.
                        let retired = workers
                            .remove_if(&user_id, |_, w| w.id == id && rx.is_empty())
                            .is_some();
                        if retired {
                            tracing::debug!(user_id = %user_id, worker_id = id, "User worker idle, retired");
                            break;
                        }
                    }
                }
            }
        });
        UserWorker { id, tx, handle }
    }
}

/// Start a background processor that handles messages from a channel.
///
/// Unauthorized senders are answered directly; everything else goes through
/// the sender's queue. When the inbound channel closes, queued messages are
/// drained before the task ends.
pub fn spawn_processor(
    bot: Arc<Bot>,
    channel: Arc<dyn Channel>,
    mut rx: mpsc::Receiver<ChannelMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(channel = channel.name(), "Message processor started");
        let queues = UserQueues::new(bot.clone(), channel.clone());

        while let Some(message) = rx.recv().await {
            tracing::info!(
                trace_id = %message.trace_id,
                channel = message.channel_type_str(),
                user_id = %message.user_id,
                chat_id = %message.channel_id,
                "Processing message"
            );

            if bot.is_authorized(&message) {
                queues.enqueue(message);
            } else {
                let bot = bot.clone();
                let channel = channel.clone();
                tokio::spawn(async move {
                    bot.reject(channel.as_ref(), &message).await;
                });
            }
        }

        queues.close().await;
        tracing::info!("Message processor stopped");
    })
}
