mod common;

use axum::http::{header, Method, StatusCode};
use bomflow_api::entities::user::UserRole;
use common::{id_of, response_json, TestApp, ADMIN_PASSWORD};
use serde_json::json;

async fn login(app: &TestApp, email: &str, password: &str) -> axum::response::Response {
    app.request(
        Method::POST,
        "/api/v1/auth/login",
        Some(json!({ "email": email, "password": password })),
        None,
    )
    .await
}

#[tokio::test]
async fn login_issues_token_and_session_cookie() {
    let app = TestApp::new().await;
    let res = login(&app, "admin@example.com", ADMIN_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::OK);

    let cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("bomflow_session="));
    assert!(cookie.contains("HttpOnly"));

    let body = response_json(res).await;
    assert_eq!(body["data"]["token_type"], "Bearer");
    assert_eq!(body["data"]["user"]["email"], "admin@example.com");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let token = body["data"]["access_token"].as_str().unwrap();
    let res = app
        .request(Method::GET, "/api/v1/auth/me", None, Some(token))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(response_json(res).await["data"]["role"], "admin");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;
    let res = login(&app, "admin@example.com", "not-the-password").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = TestApp::new().await;
    let res = app
        .request(Method::GET, "/api/v1/materials", None, None)
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .request(Method::GET, "/api/v1/materials", None, Some("not.a.jwt"))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let app = TestApp::new().await;
    let body = response_json(login(&app, "admin@example.com", ADMIN_PASSWORD).await).await;
    let token = body["data"]["access_token"].as_str().unwrap().to_string();

    let res = app
        .request(Method::POST, "/api/v1/auth/logout", None, Some(&token))
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = app
        .request(Method::GET, "/api/v1/auth/me", None, Some(&token))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewers_can_read_but_not_write() {
    let app = TestApp::new().await;
    app.material("2x4 Stud", "pcs", "2.25").await;
    let viewer = app.token_for(UserRole::Viewer).await;

    let res = app
        .request(Method::GET, "/api/v1/materials", None, Some(&viewer))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .request(
            Method::POST,
            "/api/v1/materials",
            Some(json!({ "name": "Nail", "unit": "pcs", "unit_price": "0.05" })),
            Some(&viewer),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn managers_cannot_manage_users() {
    let app = TestApp::new().await;
    let manager = app.token_for(UserRole::Manager).await;

    let res = app
        .request(
            Method::POST,
            "/api/v1/materials",
            Some(json!({ "name": "Nail", "unit": "pcs", "unit_price": "0.05" })),
            Some(&manager),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .request(Method::GET, "/api/v1/users", None, Some(&manager))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_manage_users() {
    let app = TestApp::new().await;
    let res = app
        .post(
            "/api/v1/users",
            json!({
                "name": "Site Lead",
                "email": "lead@example.com",
                "password": "lead-password",
                "role": "manager"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let lead = id_of(&response_json(res).await);

    let res = app
        .post(
            "/api/v1/users",
            json!({
                "name": "Duplicate",
                "email": "lead@example.com",
                "password": "lead-password",
                "role": "viewer"
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let body = response_json(app.get("/api/v1/users").await).await;
    assert_eq!(body["data"]["pagination"]["total"], 2);

    let res = app
        .post(
            &format!("/api/v1/users/{}/change-password", lead),
            json!({ "new_password": "reset-password" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = login(&app, "lead@example.com", "reset-password").await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .put(
            &format!("/api/v1/users/{}", app.admin_id),
            json!({ "role": "viewer" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.delete(&format!("/api/v1/users/{}", app.admin_id)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.delete(&format!("/api/v1/users/{}", lead)).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn own_password_change_requires_current_password() {
    let app = TestApp::new().await;

    let res = app
        .post(
            "/api/v1/auth/password",
            json!({ "current_password": "wrong-password", "new_password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .post(
            "/api/v1/auth/password",
            json!({ "current_password": ADMIN_PASSWORD, "new_password": "brand-new-pass" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = login(&app, "admin@example.com", "brand-new-pass").await;
    assert_eq!(res.status(), StatusCode::OK);
}
