mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};

use common::{body_json, TestApp};

async fn buy(app: &TestApp, book_id: i32) -> (StatusCode, Value) {
    let uri = format!("/books/{}/buy", book_id);
    let response = app.as_member(Method::POST, &uri, Some(json!({}))).await;
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn purchase_creates_a_settled_order_in_one_step() {
    let app = TestApp::new().await;
    let book = app
        .seed_book("Checkout Book", Decimal::new(1999, 2), None)
        .await;

    let (status, body) = buy(&app, book.id).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["already_purchased"], false);
    assert_eq!(body["status"], "completed");
    let code = body["transaction_code"].as_str().unwrap();
    assert_eq!(code.len(), 12);
    assert!(code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

    let order_id = body["order_id"].as_i64().unwrap();
    let response = app
        .as_member(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["order"]["payment_settled"], true);
    assert_eq!(view["order"]["status"], "completed");
    assert_eq!(view["order"]["total_amount"], "19.99");
    let lines = view["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["price"], "19.99");
    assert_eq!(lines[0]["downloaded"], false);
    let transactions = view["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["status"], "success");
    assert_eq!(transactions[0]["code"], code);
}

#[tokio::test]
async fn repeat_purchase_is_idempotent() {
    let app = TestApp::new().await;
    let book = app
        .seed_book("One Copy Only", Decimal::new(500, 2), None)
        .await;

    let (status, _) = buy(&app, book.id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = buy(&app, book.id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["already_purchased"], true);
    assert!(body["order_detail_id"].as_i64().is_some());

    let response = app.as_member(Method::GET, "/orders", None).await;
    let orders = body_json(response).await;
    assert_eq!(orders.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_price_survives_repricing() {
    let app = TestApp::new().await;
    let book = app
        .seed_book("Repriced Book", Decimal::new(1999, 2), None)
        .await;

    let (_, body) = buy(&app, book.id).await;
    let order_id = body["order_id"].as_i64().unwrap();

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/books/{}", book.id),
            Some(json!({ "price": "29.99" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_member(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    let view = body_json(response).await;
    assert_eq!(view["lines"][0]["price"], "19.99");
}

#[tokio::test]
async fn purchase_of_missing_or_inactive_book_is_not_found() {
    let app = TestApp::new().await;
    let inactive = app
        .seed_book_with("Shelved", Decimal::new(100, 2), None, false)
        .await;

    let (status, _) = buy(&app, 9999).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = buy(&app, inactive.id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn purchase_requires_a_token() {
    let app = TestApp::new().await;
    let book = app.seed_book("No Guests", Decimal::new(100, 2), None).await;

    let response = app
        .request(
            Method::POST,
            &format!("/books/{}/buy", book.id),
            Some(json!({})),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

async fn first_line_id(app: &TestApp, order_id: i64) -> i64 {
    let response = app
        .as_member(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    let view = body_json(response).await;
    view["lines"][0]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn owner_download_redirects_and_marks_the_line() {
    let app = TestApp::new().await;
    let book = app
        .seed_book("Downloadable", Decimal::new(999, 2), None)
        .await;

    let (_, body) = buy(&app, book.id).await;
    let order_id = body["order_id"].as_i64().unwrap();
    let line_id = first_line_id(&app, order_id).await;

    let response = app
        .as_member(Method::GET, &format!("/downloads/{}", line_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get("location").unwrap(),
        book.file_url.as_str()
    );

    let response = app
        .as_member(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    let view = body_json(response).await;
    assert_eq!(view["lines"][0]["downloaded"], true);
    assert!(view["lines"][0]["download_date"].as_str().is_some());

    // Repeat downloads stay permitted.
    let response = app
        .as_member(Method::GET, &format!("/downloads/{}", line_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn download_is_gated_on_ownership_and_settlement() {
    let app = TestApp::new().await;
    let book = app.seed_book("Gated", Decimal::new(999, 2), None).await;

    let (_, body) = buy(&app, book.id).await;
    let order_id = body["order_id"].as_i64().unwrap();
    let line_id = first_line_id(&app, order_id).await;

    // A different customer cannot download someone else's purchase.
    let (_, intruder_token) = app.seed_member("intruder").await;
    let response = app
        .request(
            Method::GET,
            &format!("/downloads/{}", line_id),
            None,
            Some(&intruder_token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Admins may download on the owner's behalf.
    let response = app
        .as_admin(Method::GET, &format!("/downloads/{}", line_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    // Unsettled payment blocks even the owner.
    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/orders/{}/status", order_id),
            Some(json!({ "status": "pending_payment", "payment_settled": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .as_member(Method::GET, &format!("/downloads/{}", line_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // A line that does not exist is a plain 404.
    let response = app.as_member(Method::GET, "/downloads/9999", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_lists_recent_purchases() {
    let app = TestApp::new().await;
    let first = app.seed_book("First Buy", Decimal::new(500, 2), None).await;
    let second = app.seed_book("Second Buy", Decimal::new(600, 2), None).await;

    buy(&app, first.id).await;
    buy(&app, second.id).await;

    let response = app.as_member(Method::GET, "/profile/purchases", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let lines = body.as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["book_title"], "Second Buy");
    assert_eq!(lines[1]["book_title"], "First Buy");
}

#[tokio::test]
async fn order_view_is_owner_or_admin_only() {
    let app = TestApp::new().await;
    let book = app.seed_book("Private Order", Decimal::new(999, 2), None).await;

    let (_, body) = buy(&app, book.id).await;
    let order_id = body["order_id"].as_i64().unwrap();
    let uri = format!("/orders/{}", order_id);

    let (_, other_token) = app.seed_member("onlooker").await;
    let response = app
        .request(Method::GET, &uri, None, Some(&other_token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.as_admin(Method::GET, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
}
