//! End-to-end message handling with in-process test doubles.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use yara_bot::{
    messages, spawn_processor, AccessGate, Bot, ChatRequest, ChatResponse, CompletionProvider,
    CompletionSettings, ContentLookup, HistoryStore, LookupError, LookupHandler, LookupResult,
    MemoryConversationStore, ProviderError, QuestionHandler, Role, TokenUsage, UserQueues,
};
use yara_channels::{
    Channel, ChannelMessage, ChannelResult, ChannelType, MessageContent, OutgoingContent,
    OutgoingMessage,
};

const SEED: &str = "Você é Yara, uma assistente de IA prestativa.";
const ALLOWED: &str = "1001";

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<OutgoingMessage>>,
    typing: Mutex<Vec<String>>,
}

impl RecordingChannel {
    fn replies(&self) -> Vec<OutgoingContent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    fn texts(&self) -> Vec<String> {
        self.replies()
            .iter()
            .map(|c| c.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        self.sent.lock().unwrap().push(message);
        Ok("sent".into())
    }

    async fn send_typing(&self, channel_id: &str) -> ChannelResult<()> {
        self.typing.lock().unwrap().push(channel_id.to_string());
        Ok(())
    }

    async fn listen(&self, _tx: mpsc::Sender<ChannelMessage>) -> ChannelResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

/// Replays scripted outcomes and records every request.
#[derive(Default)]
struct ScriptedProvider {
    outcomes: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    fn new(outcomes: Vec<Result<&str, &str>>) -> Self {
        Self {
            outcomes: Mutex::new(
                outcomes
                    .into_iter()
                    .map(|o| o.map(String::from).map_err(String::from))
                    .collect(),
            ),
            ..Self::default()
        }
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);

        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".into()));

        outcome
            .map(|content| ChatResponse {
                provider: "scripted".into(),
                model: model.clone(),
                content,
                usage: TokenUsage::default(),
                finish_reason: Some("stop".into()),
                latency_ms: 1,
            })
            .map_err(|message| ProviderError {
                provider: "scripted".into(),
                model,
                message,
                status_code: Some(500),
            })
    }
}

struct StubLookup {
    result: Result<(String, String), ()>,
    calls: Mutex<Vec<String>>,
}

impl StubLookup {
    fn found(text: &str) -> Self {
        Self {
            result: Ok((text.into(), "https://pt.wikipedia.org/wiki/".into())),
            calls: Mutex::new(vec![]),
        }
    }

    fn missing() -> Self {
        Self {
            result: Err(()),
            calls: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl ContentLookup for StubLookup {
    async fn fetch(&self, term: &str) -> Result<LookupResult, LookupError> {
        self.calls.lock().unwrap().push(term.to_string());
        match &self.result {
            Ok((text, base)) => Ok(LookupResult {
                term: term.to_string(),
                text: text.clone(),
                url: format!("{base}{}", term.replace(' ', "_")),
            }),
            Err(()) => Err(LookupError::NoContent),
        }
    }
}

struct Harness {
    bot: Arc<Bot>,
    history: Arc<HistoryStore>,
    channel: Arc<RecordingChannel>,
    provider: Arc<ScriptedProvider>,
    lookup: Arc<StubLookup>,
}

fn harness_with(provider: Option<ScriptedProvider>, lookup: StubLookup) -> Harness {
    let history = Arc::new(HistoryStore::new(
        Arc::new(MemoryConversationStore::new()),
        SEED,
    ));
    let has_provider = provider.is_some();
    let provider = Arc::new(provider.unwrap_or_default());
    let lookup = Arc::new(lookup);

    let questions = QuestionHandler::new(
        history.clone(),
        has_provider.then(|| provider.clone() as Arc<dyn CompletionProvider>),
        CompletionSettings {
            model: "llama3-8b-8192".into(),
            max_tokens: 1024,
            temperature: 0.7,
        },
    );
    let lookups = LookupHandler::new(lookup.clone(), 1000);
    let bot = Arc::new(Bot::new(
        AccessGate::new([ALLOWED, "carol"]),
        history.clone(),
        questions,
        lookups,
    ));

    Harness {
        bot,
        history,
        channel: Arc::new(RecordingChannel::default()),
        provider,
        lookup,
    }
}

fn harness(outcomes: Vec<Result<&str, &str>>) -> Harness {
    harness_with(Some(ScriptedProvider::new(outcomes)), StubLookup::missing())
}

fn text_from(user_id: &str, text: &str) -> ChannelMessage {
    ChannelMessage {
        id: "1".into(),
        channel_type: ChannelType::Telegram,
        channel_id: format!("chat-{user_id}"),
        user_id: user_id.into(),
        username: None,
        first_name: Some("Ana".into()),
        content: MessageContent::Text { text: text.into() },
        timestamp: 0,
        trace_id: "trace".into(),
    }
}

impl Harness {
    async fn send(&self, user_id: &str, text: &str) {
        self.bot
            .handle_message(self.channel.as_ref(), &text_from(user_id, text))
            .await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Allow-list gate
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthorized_sender_gets_rejection_and_no_conversation() {
    let h = harness(vec![Ok("nunca")]);

    for text in ["olá", "/start", "/reset", "pesquisar gatos", "pesquisar  "] {
        h.send("666", text).await;
    }

    let texts = h.channel.texts();
    assert_eq!(texts.len(), 5);
    assert!(texts.iter().all(|t| t == messages::REJECTION));
    assert!(!h.history.contains("666"));
    assert!(h.provider.requests.lock().unwrap().is_empty());
    assert!(h.lookup.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unauthorized_non_text_is_rejected_too() {
    let h = harness(vec![]);
    let mut msg = text_from("666", "");
    msg.content = MessageContent::Unsupported {
        kind: "sticker".into(),
    };

    h.bot.handle_message(h.channel.as_ref(), &msg).await;
    assert_eq!(h.channel.texts(), vec![messages::REJECTION.to_string()]);
}

#[tokio::test]
async fn username_on_allow_list_is_accepted() {
    let h = harness(vec![Ok("oi!")]);
    let mut msg = text_from("2002", "oi");
    msg.username = Some("carol".into());

    h.bot.handle_message(h.channel.as_ref(), &msg).await;
    assert_eq!(h.channel.texts(), vec!["oi!".to_string()]);
}

#[tokio::test]
async fn authorized_non_text_is_ignored() {
    let h = harness(vec![]);
    let mut msg = text_from(ALLOWED, "");
    msg.content = MessageContent::Unsupported {
        kind: "photo".into(),
    };

    h.bot.handle_message(h.channel.as_ref(), &msg).await;
    assert!(h.channel.texts().is_empty());
    assert!(!h.history.contains(ALLOWED));
}

// ─────────────────────────────────────────────────────────────────────────────
// Questions and history
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_answer_grows_history_by_two() {
    let h = harness(vec![Ok("  A capital da França é Paris.\n")]);
    h.history.get(ALLOWED).await;

    h.send(ALLOWED, "Qual a capital da França?").await;

    let conv = h.history.get(ALLOWED).await;
    assert_eq!(conv.len(), 3);
    assert_eq!(conv[1].role, Role::User);
    assert_eq!(conv[1].content, "Qual a capital da França?");
    assert_eq!(conv[2].role, Role::Assistant);
    // Stored untrimmed, replied trimmed.
    assert_eq!(conv[2].content, "  A capital da França é Paris.\n");
    assert_eq!(h.channel.texts(), vec!["A capital da França é Paris.".to_string()]);
    assert_eq!(*h.channel.typing.lock().unwrap(), vec![format!("chat-{ALLOWED}")]);
}

#[tokio::test]
async fn failed_completion_rolls_back_user_turn() {
    let h = harness(vec![Err("boom")]);
    assert_eq!(h.history.get(ALLOWED).await.len(), 1);

    h.send(ALLOWED, "Qual a capital da França?").await;

    assert_eq!(h.history.get(ALLOWED).await.len(), 1);
    assert_eq!(h.channel.texts(), vec![messages::COMPLETION_FAILED.to_string()]);
}

#[tokio::test]
async fn rollback_restores_longer_conversation_exactly() {
    let h = harness(vec![Ok("Paris."), Err("timeout")]);

    h.send(ALLOWED, "Capital da França?").await;
    let before = h.history.get(ALLOWED).await;
    assert_eq!(before.len(), 3);

    h.send(ALLOWED, "E da Itália?").await;
    assert_eq!(h.history.get(ALLOWED).await, before);
}

#[tokio::test]
async fn provider_receives_full_conversation() {
    let h = harness(vec![Ok("Paris."), Ok("Roma.")]);

    h.send(ALLOWED, "Capital da França?").await;
    h.send(ALLOWED, "E da Itália?").await;

    let requests = h.provider.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    assert_eq!(second.model, "llama3-8b-8192");
    assert_eq!(second.max_tokens, 1024);
    let contents: Vec<&str> = second.messages.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec![SEED, "Capital da França?", "Paris.", "E da Itália?"]);
}

#[tokio::test]
async fn blank_answer_is_treated_as_failure() {
    let h = harness(vec![Ok("   ")]);
    h.send(ALLOWED, "Oi?").await;

    assert_eq!(h.history.get(ALLOWED).await.len(), 1);
    assert_eq!(h.channel.texts(), vec![messages::COMPLETION_FAILED.to_string()]);
}

#[tokio::test]
async fn missing_provider_replies_not_configured_without_history() {
    let h = harness_with(None, StubLookup::missing());
    h.send(ALLOWED, "Oi?").await;

    assert_eq!(
        h.channel.texts(),
        vec![messages::COMPLETION_NOT_CONFIGURED.to_string()]
    );
    assert!(!h.history.contains(ALLOWED));
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reset_clears_history_and_next_question_reseeds() {
    let h = harness(vec![Ok("Paris."), Ok("Oi de novo.")]);
    h.send(ALLOWED, "Capital da França?").await;
    assert_eq!(h.history.get(ALLOWED).await.len(), 3);

    h.send(ALLOWED, "/reset").await;
    assert!(!h.history.contains(ALLOWED));
    assert_eq!(h.channel.texts().last().unwrap(), messages::HISTORY_CLEARED);

    h.send(ALLOWED, "Oi").await;
    let conv = h.history.get(ALLOWED).await;
    assert_eq!(conv.len(), 3);
    assert_eq!(conv[0].content, SEED);
}

#[tokio::test]
async fn start_and_help_send_markdown_welcome() {
    let h = harness(vec![]);
    h.send(ALLOWED, "/start").await;
    h.send(ALLOWED, "/ajuda@yara_bot").await;

    let replies = h.channel.replies();
    assert_eq!(replies.len(), 2);
    for reply in replies {
        assert!(matches!(reply, OutgoingContent::Markdown { .. }));
        assert!(reply.as_str().starts_with("👋 Olá Ana!"));
    }
    assert!(!h.history.contains(ALLOWED));
}

#[tokio::test]
async fn unknown_command_is_ignored() {
    let h = harness(vec![Ok("nunca")]);
    h.send(ALLOWED, "/foo").await;

    assert!(h.channel.texts().is_empty());
    assert!(h.provider.requests.lock().unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookup
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn lookup_acknowledges_then_replies_with_extract() {
    let h = harness_with(None, StubLookup::found("Gatos são felinos domésticos.\n\n"));
    h.send(ALLOWED, "pesquisar gatos pretos").await;

    let replies = h.channel.replies();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0], OutgoingContent::text(messages::searching("gatos pretos")));
    assert!(matches!(replies[1], OutgoingContent::Markdown { .. }));
    let body = replies[1].as_str();
    assert!(body.starts_with("📚 *Gatos pretos*\n\nGatos são felinos domésticos."));
    assert!(body.ends_with("https://pt.wikipedia.org/wiki/gatos_pretos"));
    assert_eq!(*h.lookup.calls.lock().unwrap(), vec!["gatos pretos".to_string()]);
    assert!(!h.history.contains(ALLOWED));
}

#[tokio::test]
async fn lookup_without_content_names_the_term() {
    let h = harness_with(None, StubLookup::missing());
    h.send(ALLOWED, "Pesquisar Xyzzy Plugh").await;

    let texts = h.channel.texts();
    assert_eq!(texts.len(), 2);
    assert_eq!(texts[1], messages::not_found("Xyzzy Plugh"));
    assert!(!texts[1].contains("No content"));
}

#[tokio::test]
async fn blank_lookup_sends_usage_hint_without_fetching() {
    let h = harness_with(None, StubLookup::found("nunca"));
    h.send(ALLOWED, "Pesquisar   ").await;

    assert_eq!(h.channel.texts(), vec![messages::USAGE_HINT.to_string()]);
    assert!(h.lookup.calls.lock().unwrap().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Processor
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn processor_keeps_per_user_order() {
    let provider = ScriptedProvider {
        delay: Some(Duration::from_millis(20)),
        ..ScriptedProvider::new(vec![Ok("r1"), Ok("r2"), Ok("r3")])
    };
    let h = harness_with(Some(provider), StubLookup::missing());

    let (tx, rx) = mpsc::channel(16);
    let processor = spawn_processor(h.bot.clone(), h.channel.clone(), rx);

    for q in ["q1", "q2", "q3"] {
        tx.send(text_from(ALLOWED, q)).await.unwrap();
    }
    tx.send(text_from("666", "intruso")).await.unwrap();
    drop(tx);

    tokio::time::timeout(Duration::from_secs(5), processor)
        .await
        .unwrap()
        .unwrap();

    // Give the detached rejection task a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let conv = h.history.get(ALLOWED).await;
    let contents: Vec<&str> = conv.iter().skip(1).map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["q1", "r1", "q2", "r2", "q3", "r3"]);

    let texts = h.channel.texts();
    assert!(texts.contains(&messages::REJECTION.to_string()));
    assert!(!h.history.contains("666"));
}

fn open_bot(history: Arc<HistoryStore>) -> Arc<Bot> {
    let questions = QuestionHandler::new(
        history.clone(),
        Some(Arc::new(ScriptedProvider::new(vec![Ok("r1")])) as Arc<dyn CompletionProvider>),
        CompletionSettings {
            model: "llama3-8b-8192".into(),
            max_tokens: 1024,
            temperature: 0.7,
        },
    );
    let lookups = LookupHandler::new(Arc::new(StubLookup::missing()), 1000);
    Arc::new(Bot::new(AccessGate::new(["*"]), history, questions, lookups))
}

async fn wait_until_idle(queues: &UserQueues) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !queues.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn idle_user_workers_are_retired() {
    let history = Arc::new(HistoryStore::new(
        Arc::new(MemoryConversationStore::new()),
        SEED,
    ));
    let channel = Arc::new(RecordingChannel::default());
    let queues = UserQueues::new(open_bot(history.clone()), channel.clone())
        .with_idle_timeout(Duration::from_millis(50));

    for user in 0..200 {
        queues.enqueue(text_from(&format!("user-{user}"), "/foo"));
    }
    assert_eq!(queues.len(), 200);

    wait_until_idle(&queues).await;

    // A retired user is served again by a fresh worker.
    queues.enqueue(text_from("user-7", "q1"));
    assert_eq!(queues.len(), 1);
    wait_until_idle(&queues).await;

    assert_eq!(channel.texts(), vec!["r1".to_string()]);
    assert_eq!(history.len("user-7"), 3);
    queues.close().await;
}
