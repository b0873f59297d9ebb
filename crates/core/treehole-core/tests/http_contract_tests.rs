//! HTTP contract tests against a mock Treehole backend

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use treehole_core::voice::{fetch_audio, SLOW_GENERATION};
use treehole_core::*;
use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "u_123e4567-e89b-12d3-a456-426614174000";

fn client(server: &MockServer) -> ApiClient {
    ApiClient::with_client(reqwest::Client::new(), server.uri(), Some("tok".to_string()))
}

fn context() -> SessionContext {
    SessionContext::new(USER).with_character(Some("linyu".to_string()))
}

fn fast_policy(timeout: Duration) -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(10),
        growth: Growth::Linear(Duration::from_millis(10)),
        cap: Duration::from_millis(30),
        timeout,
    }
}

async fn send(server: &MockServer, utterance: &str) -> (ChatSession, Result<TurnOutcome>) {
    let mut chat = ChatSession::new(Arc::new(client(server)));
    let result = chat
        .send_turn(&context(), utterance, &CancellationToken::new())
        .await;
    (chat, result)
}

#[tokio::test]
async fn test_chat_stream_completes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_stream"))
        .and(header("authorization", "Bearer tok"))
        .and(body_partial_json(json!({
            "user_id": USER,
            "user_input": "hi",
            "character_id": "linyu"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("Hello there", "text/plain; charset=utf-8"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (chat, result) = send(&server, "  hi ").await;
    match result.unwrap() {
        TurnOutcome::Completed { content, round_id } => {
            assert_eq!(content, "Hello there");
            assert!(!round_id.is_empty());
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let turns = chat.transcript().turns();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0], ChatTurn::user("hi"));
    assert_eq!(turns[1], ChatTurn::assistant("Hello there"));
    assert_eq!(chat.state(), TurnState::Completed);
}

#[tokio::test]
async fn test_chat_stream_json_error_uses_msg() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_stream"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"ok": false, "msg": "boom"})))
        .mount(&server)
        .await;

    let (chat, result) = send(&server, "hi").await;
    match result {
        Err(TreeholeError::RequestFailed(msg)) => assert_eq!(msg, "boom"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(chat.state(), TurnState::Failed);
    // the optimistic user turn stays
    assert_eq!(chat.transcript().turns(), &[ChatTurn::user("hi")]);
}

#[tokio::test]
async fn test_chat_stream_non_json_error_uses_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_stream"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("<h1>bad gateway</h1>", "text/html"))
        .mount(&server)
        .await;

    let (_, result) = send(&server, "hi").await;
    match result {
        Err(TreeholeError::RequestFailed(msg)) => assert_eq!(msg, SERVICE_UNAVAILABLE),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_chat_stream_without_body_is_empty_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_stream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (chat, result) = send(&server, "hi").await;
    assert!(matches!(result, Err(TreeholeError::EmptyStream)));
    assert_eq!(chat.state(), TurnState::EmptyStream);
}

#[tokio::test]
async fn test_invalid_identity_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat_stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("nope", "text/plain"))
        .expect(0)
        .mount(&server)
        .await;

    let mut chat = ChatSession::new(Arc::new(client(&server)));
    let ctx = SessionContext::new("guest");
    let result = chat.send_turn(&ctx, "hi", &CancellationToken::new()).await;
    assert!(matches!(result, Err(TreeholeError::IdentityInvalid)));
    assert!(chat.transcript().is_empty());
}

#[tokio::test]
async fn test_start_session_from_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "user_id": USER,
            "profile": {"username": "Mo", "avatar_url": ""}
        })))
        .mount(&server)
        .await;

    let ctx = start_session(&client(&server), Some("linyu".to_string()))
        .await
        .unwrap();
    assert_eq!(ctx.user_id, USER);
    assert_eq!(ctx.display_name, "Mo");
    assert_eq!(ctx.avatar_url, session::DEFAULT_AVATAR_URL);
    assert_eq!(ctx.character_id.as_deref(), Some("linyu"));
}

#[tokio::test]
async fn test_profile_with_invalid_identity_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "user_id": "admin",
            "profile": {"display_name": "Mo"}
        })))
        .mount(&server)
        .await;

    let result = fetch_profile(&client(&server)).await;
    assert!(matches!(result, Err(TreeholeError::IdentityInvalid)));
}

#[tokio::test]
async fn test_update_display_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/profile"))
        .and(body_json(json!({"display_name": "Lin"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "profile": {"display_name": "Lin", "avatar_url": "/static/avatars/u.png"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut ctx = context();
    update_display_name(&client(&server), &mut ctx, " Lin ").await.unwrap();
    assert_eq!(ctx.display_name, "Lin");
    assert_eq!(ctx.avatar_url, "/static/avatars/u.png");
}

#[tokio::test]
async fn test_load_history_scoped_to_character() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/load_history"))
        .and(query_param("user_id", USER))
        .and(query_param("character_id", "linyu"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "history": [
                {"role": "user", "content": "hello"},
                {"role": "assistant", "content": "hi, how was today?"},
                {"role": "assistant", "content": ""}
            ]
        })))
        .mount(&server)
        .await;

    let turns = load_history(&client(&server), &context()).await.unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[0].role, Role::User);

    let mut chat = ChatSession::new(Arc::new(client(&server)));
    assert_eq!(chat.restore_history(turns), 2);
}

#[tokio::test]
async fn test_history_error_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/load_history"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "msg": "no such user"})),
        )
        .mount(&server)
        .await;

    match load_history(&client(&server), &context()).await {
        Err(TreeholeError::RequestFailed(msg)) => assert_eq!(msg, "no such user"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_emotion_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/emotion"))
        .and(body_partial_json(json!({"current_input": "tired", "round_id": "r-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "data": {"emotion": "sad", "intensity": 0.7}
        })))
        .mount(&server)
        .await;

    let history = vec![ChatTurn::user("hello"), ChatTurn::assistant("hi")];
    let data = analyze_emotion(&client(&server), &context(), &history, "tired", Some("r-1"))
        .await
        .unwrap();
    assert_eq!(data["emotion"], "sad");
}

#[tokio::test]
async fn test_emotion_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/emotion"))
        .respond_with(ResponseTemplate::new(503).set_body_raw("down", "text/plain"))
        .mount(&server)
        .await;

    let result = analyze_emotion(&client(&server), &context(), &[], "tired", None).await;
    assert!(matches!(result, Err(TreeholeError::EmotionUnavailable)));
}

#[tokio::test]
async fn test_synthesize_polls_until_ready() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice_clone/tts/create"))
        .and(body_partial_json(json!({"user_id": USER, "text": "good night"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "taskId": "t-9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/result"))
        .and(query_param("taskId", "t-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "status": 1})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/result"))
        .and(query_param("taskId", "t-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "status": 2,
            "voiceUrl": "https://cdn.example/v.mp3"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/audio"))
        .and(query_param("voiceUrl", "https://cdn.example/v.mp3"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3, 4], "audio/mpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let options = TtsOptions {
        policy: fast_policy(Duration::from_secs(5)),
        ..TtsOptions::default()
    };
    let audio = synthesize(&client(&server), &context(), "good night", &options)
        .await
        .unwrap();
    assert_eq!(audio.content_type, "audio/mpeg");
    assert_eq!(audio.data.as_ref(), &[1, 2, 3, 4]);
}

#[tokio::test]
async fn test_synthesize_times_out_when_slow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice_clone/tts/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "taskId": "t-1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "status": 1})))
        .mount(&server)
        .await;

    let options = TtsOptions {
        policy: fast_policy(Duration::from_millis(120)),
        ..TtsOptions::default()
    };
    match synthesize(&client(&server), &context(), "hello", &options).await {
        Err(TreeholeError::Timeout(msg)) => assert_eq!(msg, SLOW_GENERATION),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_synthesize_reports_failed_task() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice_clone/tts/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "taskId": "t-2"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/result"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "status": 3})))
        .mount(&server)
        .await;

    let options = TtsOptions {
        policy: fast_policy(Duration::from_secs(5)),
        ..TtsOptions::default()
    };
    let result = synthesize(&client(&server), &context(), "hello", &options).await;
    assert!(matches!(result, Err(TreeholeError::Voice(_))));
}

#[tokio::test]
async fn test_synthesize_error_envelope_while_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice_clone/tts/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "taskId": "t-3"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/result"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"ok": false, "msg": "voice_not_initialized"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let options = TtsOptions {
        policy: fast_policy(Duration::from_secs(5)),
        ..TtsOptions::default()
    };
    match synthesize(&client(&server), &context(), "hello", &options).await {
        Err(TreeholeError::Voice(msg)) => assert_eq!(msg, "voice_not_initialized"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_synthesize_create_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice_clone/tts/create"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "msg": "no reference voice"})),
        )
        .mount(&server)
        .await;

    let result = synthesize(&client(&server), &context(), "hello", &TtsOptions::default()).await;
    assert!(matches!(result, Err(TreeholeError::Voice(msg)) if msg == "no reference voice"));
}

#[tokio::test]
async fn test_audio_with_json_body_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/voice_clone/tts/audio"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"ok": false, "msg": "expired link"})),
        )
        .mount(&server)
        .await;

    match fetch_audio(&client(&server), "https://cdn.example/old.mp3").await {
        Err(TreeholeError::Voice(msg)) => assert_eq!(msg, "expired link"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_client_log_sink_posts_record() {
    use treehole_core::api::ClientLogRecord;
    use treehole_core::utils::{HttpLogSink, LogSink};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/client_log"))
        .and(body_partial_json(json!({"level": "warn", "page": "terminal"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpLogSink::new(client(&server));
    sink.send(ClientLogRecord {
        level: "warn".to_string(),
        message: "Chat turn failed".to_string(),
        page: "terminal".to_string(),
        user_id: Some(USER.to_string()),
        character_id: None,
        extra: Default::default(),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_upload_avatar_updates_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/avatar_upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "avatar_url": "/static/avatars/u_1.png?v=2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("me.png");
    std::fs::write(&image, [0x89, b'P', b'N', b'G']).unwrap();

    let mut ctx = context();
    let url = upload_avatar(&client(&server), &mut ctx, &image).await.unwrap();
    assert_eq!(url, "/static/avatars/u_1.png?v=2");
    assert_eq!(ctx.avatar_url, url);
}

#[tokio::test]
async fn test_upload_avatar_rejects_non_images() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "hello").unwrap();

    let mut ctx = context();
    let result = upload_avatar(&client(&server), &mut ctx, &notes).await;
    assert!(matches!(result, Err(TreeholeError::Validation(_))));
    assert_eq!(ctx.avatar_url, session::DEFAULT_AVATAR_URL);
}

#[tokio::test]
async fn test_upload_reference_voice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/voice_clone/reference/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "data": {"audioId": "a-77", "name": "evening", "describe": ""}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let clip = dir.path().join("evening.wav");
    std::fs::write(&clip, b"RIFF....WAVE").unwrap();

    let voice = upload_reference(&client(&server), &context(), &clip, "evening", "")
        .await
        .unwrap();
    assert_eq!(voice.audio_id, "a-77");
    assert_eq!(voice.name, "evening");
}
