mod common;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;

use common::{body_json, TestApp};

#[tokio::test]
async fn member_reviews_a_book_once() {
    let app = TestApp::new().await;
    let book = app.seed_book("Reviewed", Decimal::new(999, 2), None).await;
    let uri = format!("/books/{}/reviews", book.id);

    let response = app
        .as_member(
            Method::POST,
            &uri,
            Some(json!({ "rating": 5, "comment": "Loved it" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.request(Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let reviews = body.as_array().unwrap();
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0]["author"], "reader");
    assert_eq!(reviews[0]["rating"], 5);

    // A second review from the same account is refused.
    let response = app
        .as_member(Method::POST, &uri, Some(json!({ "rating": 1 })))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[rstest::rstest]
#[case(0)]
#[case(6)]
#[tokio::test]
async fn rating_must_be_one_to_five(#[case] rating: u8) {
    let app = TestApp::new().await;
    let book = app.seed_book("Rated", Decimal::new(999, 2), None).await;

    let response = app
        .as_member(
            Method::POST,
            &format!("/books/{}/reviews", book.id),
            Some(json!({ "rating": rating })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn anonymous_review_is_unauthorized() {
    let app = TestApp::new().await;
    let book = app.seed_book("No Guests", Decimal::new(999, 2), None).await;

    let response = app
        .request(
            Method::POST,
            &format!("/books/{}/reviews", book.id),
            Some(json!({ "rating": 4 })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn review_on_missing_book_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .as_member(
            Method::POST,
            "/books/9999/reviews",
            Some(json!({ "rating": 3 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hidden_review_disappears_from_public_listings() {
    let app = TestApp::new().await;
    let book = app.seed_book("Moderated", Decimal::new(999, 2), None).await;
    let uri = format!("/books/{}/reviews", book.id);

    let response = app
        .as_member(
            Method::POST,
            &uri,
            Some(json!({ "rating": 1, "comment": "spam spam spam" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let review = body_json(response).await;
    let review_id = review["id"].as_i64().unwrap();

    let response = app
        .as_admin(
            Method::POST,
            &format!("/admin/reviews/{}/toggle", review_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let toggled = body_json(response).await;
    assert_eq!(toggled["is_visible"], false);

    // Gone from the public page and the book detail.
    let response = app.request(Method::GET, &uri, None, None).await;
    let body = body_json(response).await;
    assert!(body.as_array().unwrap().is_empty());

    let response = app
        .request(Method::GET, &format!("/books/{}", book.id), None, None)
        .await;
    let detail = body_json(response).await;
    assert!(detail["reviews"].as_array().unwrap().is_empty());

    // Still present for moderators.
    let response = app.as_admin(Method::GET, "/admin/reviews", None).await;
    let all = body_json(response).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}
