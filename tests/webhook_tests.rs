mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use mockito::Matcher;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use common::{state, Call, RecordingClient};
use telegrify::build_router;
use telegrify::webhook::Route;

fn config(forward_url: &str) -> String {
    format!(
        r#"
bot:
  token: "123:test"
  webhook_url: https://bot.example/tg
  webhook_path: /tg
callbacks:
  - data: approve
    response: Approved
    url: {forward_url}
  - data: approve
    response: Shadowed
  - data: silent
commands:
  - command: /start
    response: "Hello {{{{ first_name }}}}!"
    buttons:
      - - text: Profile
          url: "https://t.me/{{{{ username }}}}"
  - command: /quiet
"#
    )
}

async fn deliver(app: axum::Router, update: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tg")
                .body(Body::from(update.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn callback(data: &str) -> Value {
    json!({
        "update_id": 1,
        "callback_query": {
            "id": "cb-1",
            "data": data,
            "from": {"id": 77, "first_name": "Ann"},
            "message": {"message_id": 5, "chat": {"id": 9}}
        }
    })
}

fn command(text: &str) -> Value {
    json!({
        "update_id": 2,
        "message": {
            "message_id": 6,
            "chat": {"id": -100},
            "from": {"id": 77, "first_name": "Ann", "username": "ann"},
            "text": text
        }
    })
}

#[tokio::test]
async fn callback_is_answered_and_forwarded() {
    let mut server = mockito::Server::new_async().await;
    let forward = server
        .mock("POST", "/callbacks")
        .match_body(Matcher::PartialJson(json!({
            "callback_data": "approve",
            "user": {"id": 77},
            "message": {"message_id": 5}
        })))
        .with_status(200)
        .create_async()
        .await;

    let client = Arc::new(RecordingClient::default());
    let yaml = config(&format!("{}/callbacks", server.url()));
    let app = build_router(state(&yaml, client.clone()));

    let (status, body) = deliver(app, callback("approve")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(
        client.calls(),
        vec![Call::Answer {
            id: "cb-1".to_string(),
            text: Some("Approved".to_string()),
        }]
    );

    // Forwarding runs in the background
    let mut forwarded = false;
    for _ in 0..50 {
        if forward.matched_async().await {
            forwarded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(forwarded, "callback was not forwarded");
}

#[tokio::test]
async fn failing_forward_does_not_fail_the_update() {
    let mut server = mockito::Server::new_async().await;
    let forward = server
        .mock("POST", "/callbacks")
        .with_status(500)
        .create_async()
        .await;

    let client = Arc::new(RecordingClient::default());
    let yaml = config(&format!("{}/callbacks", server.url()));
    let app = build_router(state(&yaml, client.clone()));

    let (status, body) = deliver(app, callback("approve")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(
        client.calls(),
        vec![Call::Answer {
            id: "cb-1".to_string(),
            text: Some("Approved".to_string()),
        }]
    );

    let mut attempted = false;
    for _ in 0..50 {
        if forward.matched_async().await {
            attempted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(attempted, "callback forward was not attempted");
}

#[tokio::test]
async fn failed_callback_answer_is_reported_in_body() {
    let client = Arc::new(RecordingClient::failing_answers());
    let app = build_router(state(&config("http://127.0.0.1:9/unused"), client.clone()));

    let (status, body) = deliver(app, callback("silent")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("query is too old"));
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn failed_command_reply_is_reported_in_body() {
    let client = Arc::new(RecordingClient::failing_for(&["-100"]));
    let app = build_router(state(&config("http://127.0.0.1:9/unused"), client.clone()));

    let (status, body) = deliver(app, command("/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("chat not found"));
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn unmatched_callback_still_acknowledged() {
    let client = Arc::new(RecordingClient::default());
    let app = build_router(state(&config("http://127.0.0.1:9/unused"), client.clone()));

    let (status, body) = deliver(app, callback("unknown")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));
    assert_eq!(
        client.calls(),
        vec![Call::Answer {
            id: "cb-1".to_string(),
            text: None,
        }]
    );
}

#[tokio::test]
async fn command_with_bot_suffix_gets_reply_and_keyboard() {
    let client = Arc::new(RecordingClient::default());
    let app = build_router(state(&config("http://127.0.0.1:9/unused"), client.clone()));

    let (status, body) = deliver(app, command("/start@shopbot now")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    match client.calls().as_slice() {
        [Call::Message {
            chat_id,
            text,
            markup,
            ..
        }] => {
            assert_eq!(chat_id, "-100");
            assert_eq!(text, "Hello Ann!");
            let button = &markup.as_ref().unwrap().inline_keyboard[0][0];
            assert_eq!(button.url.as_deref(), Some("https://t.me/ann"));
        }
        other => panic!("unexpected calls {:?}", other),
    }
}

#[tokio::test]
async fn commands_without_reply_and_plain_text_send_nothing() {
    let client = Arc::new(RecordingClient::default());
    let app = build_router(state(&config("http://127.0.0.1:9/unused"), client.clone()));

    for text in ["/quiet", "/unknown", "just chatting"] {
        let (status, body) = deliver(app.clone(), command(text)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn malformed_update_is_acknowledged_with_error() {
    let app = build_router(state(
        &config("http://127.0.0.1:9/unused"),
        Arc::new(RecordingClient::default()),
    ));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/tg")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn router_classifies_updates() {
    let client = Arc::new(RecordingClient::default());
    let state = state(&config("http://127.0.0.1:9/unused"), client);
    let router = state.webhook.clone();

    assert_eq!(router.route(b"{}").await.unwrap(), Route::Ignored);
    assert_eq!(
        router
            .route(callback("silent").to_string().as_bytes())
            .await
            .unwrap(),
        Route::Callback {
            data: "silent".to_string(),
            handler: Some(2),
        }
    );
    assert_eq!(
        router
            .route(command("/start").to_string().as_bytes())
            .await
            .unwrap(),
        Route::Command {
            command: "/start".to_string(),
            replied: true,
        }
    );
    assert_eq!(
        router.route(command("hi").to_string().as_bytes()).await.unwrap(),
        Route::Text
    );
}
