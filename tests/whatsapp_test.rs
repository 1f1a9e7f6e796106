mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use bomflow_api::notifications::signature::{sign_payload, SIGNATURE_HEADER};
use common::{id_of, response_bytes, response_json, TestApp};
use serde_json::json;

const APP_SECRET: &str = "webhook-app-secret";
const VERIFY_TOKEN: &str = "verify-me";

async fn webhook_app() -> TestApp {
    TestApp::with_config(|cfg| {
        cfg.whatsapp_verify_token = Some(VERIFY_TOKEN.into());
        cfg.whatsapp_app_secret = Some(APP_SECRET.into());
    })
    .await
}

fn status_payload(message_id: &str, status: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "102290129340398",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "statuses": [{ "id": message_id, "status": status, "recipient_id": "15551234567" }]
                }
            }]
        }]
    }))
    .unwrap()
}

async fn post_webhook(app: &TestApp, body: Vec<u8>, signature: Option<String>) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/webhooks/whatsapp")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    app.send(builder.body(Body::from(body)).unwrap()).await
}

#[tokio::test]
async fn sends_to_opted_in_clients_only() {
    let app = TestApp::new().await;
    let opted_in = app.client("Jane Builder", Some("+1 (555) 123-4567"), true).await;
    let opted_out = app.client("Sam Owner", Some("+15559876543"), false).await;

    let res = app
        .post(
            "/api/v1/notifications/whatsapp",
            json!({ "client_id": opted_in, "message": "Your quote is ready" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = response_json(res).await;
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(body["data"]["recipient"], "+15551234567");
    assert_eq!(
        app.sender.messages(),
        vec![("+15551234567".to_string(), "Your quote is ready".to_string())]
    );

    let res = app
        .post(
            "/api/v1/notifications/whatsapp",
            json!({ "client_id": opted_out, "message": "Hello" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = response_json(
        app.get(&format!("/api/v1/notifications?client_id={}", opted_in))
            .await,
    )
    .await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
}

#[tokio::test]
async fn webhook_verification_echoes_the_challenge() {
    let app = webhook_app().await;

    let res = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token={}&hub.challenge=1158201444",
                VERIFY_TOKEN
            ),
            None,
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(response_bytes(res).await, b"1158201444");

    let res = app
        .request(
            Method::GET,
            "/api/v1/webhooks/whatsapp?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1",
            None,
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unsigned_webhooks_are_rejected() {
    let app = webhook_app().await;
    let body = status_payload("wamid.test.1", "delivered");

    let res = post_webhook(&app, body.clone(), None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = sign_payload("some-other-secret", &body);
    let res = post_webhook(&app, body, forged).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn delivery_statuses_only_move_forward() {
    let app = webhook_app().await;
    let client = app.client("Jane Builder", Some("+15551234567"), true).await;
    let res = app
        .post(
            "/api/v1/notifications/whatsapp",
            json!({ "client_id": client, "message": "Crew arrives Monday" }),
        )
        .await;
    let body = response_json(res).await;
    let message_id = body["data"]["provider_message_id"].as_str().unwrap().to_string();
    let notification = id_of(&body);

    let read = status_payload(&message_id, "read");
    let res = post_webhook(&app, read.clone(), sign_payload(APP_SECRET, &read)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(response_json(res).await["data"]["updated"], 1);

    let delivered = status_payload(&message_id, "delivered");
    let res = post_webhook(&app, delivered.clone(), sign_payload(APP_SECRET, &delivered)).await;
    assert_eq!(response_json(res).await["data"]["updated"], 0);

    let body = response_json(app.get("/api/v1/notifications").await).await;
    let item = &body["data"]["items"][0];
    assert_eq!(item["id"], notification.to_string());
    assert_eq!(item["status"], "read");
}

#[tokio::test]
async fn malformed_webhook_is_a_bad_request() {
    let app = webhook_app().await;
    let body = b"not json".to_vec();
    let res = post_webhook(&app, body.clone(), sign_payload(APP_SECRET, &body)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn project_status_changes_message_the_client() {
    let app = TestApp::with_config(|cfg| cfg.notify_on_project_events = true).await;
    let client = app.client("Jane Builder", Some("+15551234567"), true).await;
    let res = app
        .post(
            "/api/v1/projects",
            json!({ "name": "Backyard Shed", "client_id": client }),
        )
        .await;
    let project = id_of(&response_json(res).await);

    let res = app
        .post(
            &format!("/api/v1/projects/{}/status", project),
            json!({ "status": "active" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // delivered by the background event loop
    let mut messages = Vec::new();
    for _ in 0..50 {
        messages = app.sender.messages();
        if !messages.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(
        messages,
        vec![(
            "+15551234567".to_string(),
            "Your project \"Backyard Shed\" is now active.".to_string()
        )]
    );
}
