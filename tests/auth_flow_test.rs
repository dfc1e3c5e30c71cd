mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{body_json, TestApp, TEST_PASSWORD};

#[tokio::test]
async fn registration_creates_member_account() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "username": "newuser",
                "email": "newuser@example.com",
                "password": "a-decent-passphrase",
                "full_name": "New User"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["username"], "newuser");
    assert!(body.get("password_hash").is_none());

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({
                "username": "newuser",
                "password": "a-decent-passphrase"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["capability"], "member");
    assert!(body["token"].as_str().is_some());
}

#[tokio::test]
async fn duplicate_username_and_email_conflict() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "username": "reader",
                "email": "fresh@example.com",
                "password": "a-decent-passphrase"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "username": "someone-else",
                "email": "reader@example.com",
                "password": "a-decent-passphrase"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn weak_registration_input_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/register",
            Some(json!({
                "username": "x",
                "email": "not-an-email",
                "password": "short"
            })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "username": "reader", "password": "wrong" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn banned_user_cannot_login() {
    let app = TestApp::new().await;

    let uri = format!("/admin/users/{}/ban-toggle", app.member_id);
    let response = app.as_admin(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "username": "reader", "password": TEST_PASSWORD })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn me_reflects_the_token_owner() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/auth/me", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.as_member(Method::GET, "/auth/me", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "reader");
}

#[tokio::test]
async fn login_stamps_last_login() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/auth/login",
            Some(json!({ "username": "reader", "password": TEST_PASSWORD })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["user"]["last_login_at"].as_str().is_some());
}

#[tokio::test]
async fn profile_update_rechecks_email_uniqueness() {
    let app = TestApp::new().await;

    let response = app
        .as_member(
            Method::PUT,
            "/profile",
            Some(json!({ "email": "admin@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .as_member(
            Method::PUT,
            "/profile",
            Some(json!({ "phone": "555-0101", "address": "1 Test Lane" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["phone"], "555-0101");
    assert_eq!(body["email"], "reader@example.com");
}

#[tokio::test]
async fn logout_acknowledges() {
    let app = TestApp::new().await;

    let response = app.as_member(Method::POST, "/auth/logout", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("reader"));
}
