use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use livekit_protocol::{ParticipantInfo, Room, WebhookEvent};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;
use wzrd_context::{
    create_conversation, create_twin, list_messages, NewConversation, NewTwin,
    DEFAULT_SYSTEM_PROMPT,
};
use wzrd_db::{create_pool, run_migrations, DbRuntimeSettings};
use wzrd_server::config::Config;
use wzrd_server::webhook::apply_room_event;
use wzrd_server::{app, AppState};
use wzrd_types::{ChatMessage, TwinFeatures};
use wzrd_voice::{LlmBackend, LlmReply, LlmRequest, VoiceError};

struct CannedReply;

#[async_trait]
impl LlmBackend for CannedReply {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmReply, VoiceError> {
        Ok(LlmReply {
            text: "Nice to meet you.".to_string(),
            audio: None,
        })
    }
}

fn setup() -> (TempDir, AppState) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("server.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("pool");

    {
        let conn = pool.get().expect("connection");
        run_migrations(&conn).expect("migrations");
        create_twin(
            &conn,
            &NewTwin {
                id: "twin-ada".to_string(),
                name: "Ada".to_string(),
                description: Some("A mathematician".to_string()),
                features: TwinFeatures {
                    knowledge: Some("Analytical engines".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        )
        .expect("twin");
        create_conversation(
            &conn,
            &NewConversation {
                id: "conv-ada".to_string(),
                twin_id: Some("twin-ada".to_string()),
                ..Default::default()
            },
        )
        .expect("conversation");
        create_conversation(
            &conn,
            &NewConversation {
                id: "conv-plain".to_string(),
                ..Default::default()
            },
        )
        .expect("conversation");
    }

    let state = AppState::new(pool, Config::default(), Arc::new(CannedReply));
    (dir, state)
}

async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let response = app(state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (_dir, state) = setup();
    let (status, body) = send(&state, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn context_preview_uses_twin_persona() {
    let (_dir, state) = setup();
    let (status, body) = send(&state, "GET", "/api/conversations/conv-ada/context", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["twin"]["name"], "Ada");
    let first = &body["messages"][0];
    assert_eq!(first["role"], "system");
    assert!(first["content"]
        .as_str()
        .unwrap()
        .contains("Knowledge: Analytical engines"));
}

#[tokio::test]
async fn context_preview_without_twin_uses_default_prompt() {
    let (_dir, state) = setup();
    let (status, body) =
        send(&state, "GET", "/api/conversations/conv-plain/context", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["twin"].is_null());
    assert_eq!(body["messages"][0]["content"], DEFAULT_SYSTEM_PROMPT);
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let (_dir, state) = setup();

    let (status, _) = send(&state, "GET", "/api/conversations/nope/context", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &state,
        "POST",
        "/api/bots",
        Some(json!({"conversation_id": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
    assert_eq!(state.session_count(), 0);
}

#[tokio::test]
async fn empty_conversation_id_is_rejected() {
    let (_dir, state) = setup();
    let (status, _) = send(
        &state,
        "POST",
        "/api/bots",
        Some(json!({"conversation_id": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bot_session_lifecycle_persists_turns() {
    let (_dir, state) = setup();

    let (status, started) = send(
        &state,
        "POST",
        "/api/bots",
        Some(json!({"conversation_id": "conv-ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["room_url"], "");
    assert_eq!(started["token"], "");
    assert_eq!(state.session_count(), 1);

    let session_id = started["session_id"].as_str().unwrap().to_string();
    assert_eq!(started["room_name"], format!("wzrd-{session_id}"));

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/bots/{session_id}/messages"),
        Some(json!({
            "id": "msg-1",
            "label": "rtvi-ai",
            "type": "action",
            "data": {
                "service": "llm",
                "action": "append_to_messages",
                "arguments": [
                    {"name": "messages", "value": [{"role": "user", "content": "Hello Ada"}]}
                ]
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(&state, "DELETE", &format!("/api/bots/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ended");
    assert_eq!(state.session_count(), 0);

    let conn = state.pool.get().unwrap();
    let stored = list_messages(&conn, "conv-ada").unwrap();
    assert_eq!(
        stored,
        vec![
            ChatMessage::user("Hello Ada"),
            ChatMessage::assistant("Nice to meet you."),
        ]
    );
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let (_dir, state) = setup();

    let (status, _) = send(&state, "DELETE", "/api/bots/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &state,
        "POST",
        "/api/bots/missing/messages",
        Some(json!({"id": "1", "type": "client-ready"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_requires_livekit() {
    let (_dir, state) = setup();
    let (status, _) = send(&state, "POST", "/webhooks/livekit", Some(json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn room_events_reach_the_session_transport() {
    let (_dir, state) = setup();
    let (_, started) = send(
        &state,
        "POST",
        "/api/bots",
        Some(json!({"conversation_id": "conv-ada"})),
    )
    .await;
    let session_id = started["session_id"].as_str().unwrap().to_string();
    let room_name = started["room_name"].as_str().unwrap().to_string();

    let event = |kind: &str, identity: &str| WebhookEvent {
        event: kind.to_string(),
        room: Some(Room {
            name: room_name.clone(),
            ..Default::default()
        }),
        participant: Some(ParticipantInfo {
            identity: identity.to_string(),
            name: "Grace".to_string(),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert!(apply_room_event(&state, &event("participant_joined", "user-1")).await);
    assert!(!apply_room_event(&state, &event("participant_joined", "bot-1")).await);

    let transport = state
        .sessions
        .read()
        .unwrap()
        .get(&session_id)
        .map(|s| s.transport.clone())
        .expect("session");
    let participants = transport.participants();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].id, "user-1");
    assert_eq!(participants[0].name.as_deref(), Some("Grace"));
    assert_eq!(transport.captures().len(), 2);

    let mut other_room = event("participant_joined", "user-2");
    other_room.room = Some(Room {
        name: "somewhere-else".to_string(),
        ..Default::default()
    });
    assert!(!apply_room_event(&state, &other_room).await);

    let (status, _) = send(&state, "DELETE", &format!("/api/bots/{session_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn storage_failure_ends_session_and_is_logged_once() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (_dir, state) = setup();
    let (status, started) = send(
        &state,
        "POST",
        "/api/bots",
        Some(json!({"conversation_id": "conv-ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let session_id = started["session_id"].as_str().unwrap().to_string();

    state
        .pool
        .get()
        .unwrap()
        .execute_batch("DROP TABLE messages;")
        .unwrap();

    let (status, _) = send(
        &state,
        "POST",
        &format!("/api/bots/{session_id}/messages"),
        Some(json!({
            "id": "msg-1",
            "type": "action",
            "data": {
                "service": "llm",
                "action": "append_to_messages",
                "arguments": [
                    {"name": "messages", "value": [{"role": "user", "content": "Hello Ada"}]}
                ]
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.session_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session should end after the failed write");

    let output = logs.contents();
    assert_eq!(output.matches("failed to store messages").count(), 1);
    assert_eq!(output.matches("no such table: messages").count(), 1);
    assert!(output.contains("bot session aborted after a storage failure"));
}
