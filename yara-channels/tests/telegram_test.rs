//! Telegram adapter tests against a mocked Bot API.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yara_channels::{
    Channel, ChannelError, ChannelType, MessageContent, OutgoingContent, OutgoingMessage,
    TelegramChannel,
};

const TOKEN: &str = "123:TEST";

fn channel(server: &MockServer) -> TelegramChannel {
    TelegramChannel::with_api_base(TOKEN, server.uri(), 0)
}

fn outgoing(content: OutgoingContent) -> OutgoingMessage {
    OutgoingMessage {
        channel_type: ChannelType::Telegram,
        channel_id: "42".into(),
        reply_to: None,
        content,
    }
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
}

#[tokio::test]
async fn test_send_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({ "chat_id": "42", "text": "Olá *mundo*" })))
        .respond_with(ok(json!({ "message_id": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let ch = channel(&server);
    ch.send(outgoing(OutgoingContent::text("Olá *mundo*")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_markdown_as_html() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({
            "chat_id": "42",
            "text": "📚 <b>Gato</b>",
            "parse_mode": "HTML"
        })))
        .respond_with(ok(json!({ "message_id": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let ch = channel(&server);
    ch.send(outgoing(OutgoingContent::markdown("📚 *Gato*")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_html_parse_failure_falls_back_to_plain() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({ "parse_mode": "HTML" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities: unsupported start tag"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .and(body_partial_json(json!({ "text": "*Gato*" })))
        .respond_with(ok(json!({ "message_id": 3 })))
        .expect(1)
        .mount(&server)
        .await;

    let ch = channel(&server);
    ch.send(outgoing(OutgoingContent::markdown("*Gato*")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_long_message_is_split() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ok(json!({ "message_id": 4 })))
        .expect(2)
        .mount(&server)
        .await;

    let ch = channel(&server);
    ch.send(outgoing(OutgoingContent::text("a".repeat(5000))))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rate_limit_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendMessage")))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "description": "Too Many Requests: retry after 7",
            "parameters": { "retry_after": 7 }
        })))
        .mount(&server)
        .await;

    let ch = channel(&server);
    let err = ch
        .send(outgoing(OutgoingContent::text("oi")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChannelError::RateLimited {
            retry_after_secs: 7
        }
    ));
}

#[tokio::test]
async fn test_send_typing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/sendChatAction")))
        .and(body_partial_json(json!({ "chat_id": "42", "action": "typing" })))
        .respond_with(ok(json!(true)))
        .expect(1)
        .mount(&server)
        .await;

    let ch = channel(&server);
    ch.send_typing("42").await.unwrap();
}

#[tokio::test]
async fn test_init_rejects_bad_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let mut ch = channel(&server);
    let err = ch.init().await.unwrap_err();
    assert!(matches!(err, ChannelError::Auth(_)));
    assert!(ch.health_check().await.is_err());
}

#[tokio::test]
async fn test_init_with_valid_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getMe")))
        .respond_with(ok(json!({ "id": 1, "is_bot": true, "username": "yara_bot" })))
        .mount(&server)
        .await;

    let mut ch = channel(&server);
    ch.init().await.unwrap();
    ch.health_check().await.unwrap();
}

#[tokio::test]
async fn test_listen_forwards_updates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 0 })))
        .respond_with(ok(json!([
            {
                "update_id": 100,
                "message": {
                    "message_id": 1,
                    "date": 1_700_000_000,
                    "chat": { "id": 42 },
                    "from": { "id": 42, "username": "alice", "first_name": "Alice" },
                    "text": "/start"
                }
            },
            {
                "update_id": 101,
                "message": {
                    "message_id": 2,
                    "chat": { "id": 42 },
                    "from": { "id": 42 },
                    "voice": { "file_id": "v" }
                }
            }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(body_partial_json(json!({ "offset": 102 })))
        .respond_with(ok(json!([])))
        .mount(&server)
        .await;

    let ch = channel(&server);
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let handle = tokio::spawn(async move { ch.listen(tx).await });

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.text(), Some("/start"));
    assert_eq!(first.username.as_deref(), Some("alice"));
    assert_eq!(first.channel_id, "42");

    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        second.content,
        MessageContent::Unsupported {
            kind: "voice".into()
        }
    );

    handle.abort();
}
