mod common;

use axum::http::{Method, StatusCode};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use common::{body_json, TestApp};

#[tokio::test]
async fn admin_namespace_requires_the_admin_capability() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/admin/dashboard", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.as_member(Method::GET, "/admin/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.as_admin(Method::GET, "/admin/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn book_crud_roundtrip() {
    let app = TestApp::new().await;
    let category = app.seed_category("Science", None).await;

    let response = app
        .as_admin(
            Method::POST,
            "/admin/books",
            Some(json!({
                "title": "A Brief History",
                "author": "S. Hawking",
                "price": "21.50",
                "file_url": "https://cdn.example.com/files/brief-history.pdf",
                "category_id": category.id
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let book = body_json(response).await;
    let book_id = book["id"].as_i64().unwrap();
    assert_eq!(book["is_active"], true);

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/books/{}", book_id),
            Some(json!({ "title": "A Briefer History", "price": "18.00" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["title"], "A Briefer History");
    assert_eq!(updated["price"], "18.00");

    let response = app
        .as_admin(Method::DELETE, &format!("/admin/books/{}", book_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, &format!("/books/{}", book_id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn money_keeps_two_decimal_places_through_the_database() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::POST,
            "/admin/books",
            Some(json!({
                "title": "Round Numbers",
                "price": "7.5",
                "file_url": "https://cdn.example.com/files/round-numbers.pdf"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let book = body_json(response).await;
    assert_eq!(book["price"], "7.50");
    let book_id = book["id"].as_i64().unwrap();

    // Whole prices come back padded too, on the admin and public sides.
    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/books/{}", book_id),
            Some(json!({ "price": "18" })),
        )
        .await;
    let updated = body_json(response).await;
    assert_eq!(updated["price"], "18.00");

    let response = app
        .request(Method::GET, &format!("/books/{}", book_id), None, None)
        .await;
    let detail = body_json(response).await;
    assert_eq!(detail["price"], "18.00");
}

#[tokio::test]
async fn purchased_book_cannot_be_deleted() {
    let app = TestApp::new().await;
    let book = app.seed_book("Kept Forever", Decimal::new(900, 2), None).await;

    let response = app
        .as_member(Method::POST, &format!("/books/{}/buy", book.id), Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .as_admin(Method::DELETE, &format!("/admin/books/{}", book.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn bulk_status_deactivates_listed_books() {
    let app = TestApp::new().await;
    let mut ids = Vec::new();
    for i in 0..3 {
        let book = app
            .seed_book(&format!("Batch {}", i), Decimal::new(500, 2), None)
            .await;
        ids.push(book.id.to_string());
    }

    let response = app
        .as_admin(
            Method::POST,
            "/admin/books/bulk-status",
            Some(json!({ "ids": ids.join(","), "is_active": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["affected"], 3);

    let response = app.request(Method::GET, "/books/new", None, None).await;
    let listing = body_json(response).await;
    assert!(listing.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_id_list_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::POST,
            "/admin/books/bulk-status",
            Some(json!({ "ids": "1,zebra,3", "is_active": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_delete_is_all_or_nothing() {
    let app = TestApp::new().await;
    let sold = app.seed_book("Sold Once", Decimal::new(700, 2), None).await;
    let fresh_a = app.seed_book("Fresh A", Decimal::new(700, 2), None).await;
    let fresh_b = app.seed_book("Fresh B", Decimal::new(700, 2), None).await;

    let response = app
        .as_member(Method::POST, &format!("/books/{}/buy", sold.id), Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // One purchased book in the batch blocks the whole delete.
    let response = app
        .as_admin(
            Method::POST,
            "/admin/books/bulk-delete",
            Some(json!({ "ids": format!("{},{},{}", sold.id, fresh_a.id, fresh_b.id) })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.request(Method::GET, "/books/new", None, None).await;
    let listing = body_json(response).await;
    assert_eq!(listing.as_array().unwrap().len(), 3);

    // Without the sold book the rest go away.
    let response = app
        .as_admin(
            Method::POST,
            "/admin/books/bulk-delete",
            Some(json!({ "ids": format!("{},{}", fresh_a.id, fresh_b.id) })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["affected"], 2);
}

#[tokio::test]
async fn eligible_parents_exclude_the_subtree() {
    let app = TestApp::new().await;
    let root = app.seed_category("Root", None).await;
    let child = app.seed_category("Child", Some(root.id)).await;
    let grandchild = app.seed_category("Grandchild", Some(child.id)).await;
    app.seed_category("Other Root", None).await;

    let response = app
        .as_admin(
            Method::GET,
            &format!("/admin/categories/{}/eligible-parents", root.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Other Root"]);

    // Re-parenting under a descendant is refused outright.
    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/categories/{}", root.id),
            Some(json!({ "parent_id": grandchild.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn parent_id_zero_promotes_to_root() {
    let app = TestApp::new().await;
    let root = app.seed_category("Top", None).await;
    let child = app.seed_category("Nested", Some(root.id)).await;

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/categories/{}", child.id),
            Some(json!({ "parent_id": 0 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["parent_id"].is_null());
}

#[tokio::test]
async fn occupied_category_cannot_be_deleted() {
    let app = TestApp::new().await;
    let with_child = app.seed_category("Parent", None).await;
    app.seed_category("Leaf", Some(with_child.id)).await;
    let with_book = app.seed_category("Stocked", None).await;
    app.seed_book("Stocked Title", Decimal::new(100, 2), Some(with_book.id))
        .await;
    let empty = app.seed_category("Empty", None).await;

    for id in [with_child.id, with_book.id] {
        let response = app
            .as_admin(Method::DELETE, &format!("/admin/categories/{}", id), None)
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    let response = app
        .as_admin(Method::DELETE, &format!("/admin/categories/{}", empty.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_user_update_rechecks_uniqueness() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/users/{}", app.member_id),
            Some(json!({ "email": "admin@example.com" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/users/{}", app.member_id),
            Some(json!({ "full_name": "Renamed Reader" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["full_name"], "Renamed Reader");
}

#[tokio::test]
async fn admins_cannot_ban_themselves() {
    let app = TestApp::new().await;

    let uri = format!("/admin/users/{}/ban-toggle", app.admin_id);
    let response = app.as_admin(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Banning someone else flips the flag both ways.
    let uri = format!("/admin/users/{}/ban-toggle", app.member_id);
    let response = app.as_admin(Method::POST, &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], false);

    let response = app.as_admin(Method::POST, &uri, None).await;
    let body = body_json(response).await;
    assert_eq!(body["is_active"], true);
}

#[tokio::test]
async fn order_status_override_validates_the_label() {
    let app = TestApp::new().await;
    let book = app.seed_book("Refundable", Decimal::new(400, 2), None).await;

    let response = app
        .as_member(Method::POST, &format!("/books/{}/buy", book.id), Some(json!({})))
        .await;
    let purchase = body_json(response).await;
    let order_id = purchase["order_id"].as_i64().unwrap();

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/orders/{}/status", order_id),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/admin/orders/{}/status", order_id),
            Some(json!({ "status": "pending_payment", "payment_settled": false })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending_payment");
    assert_eq!(body["payment_settled"], false);
}

#[tokio::test]
async fn asset_delete_is_acknowledged_even_when_the_store_is_down() {
    let app = TestApp::new().await;

    // No gateway is running in tests; the cleanup is best-effort.
    let response = app
        .as_admin(
            Method::DELETE,
            "/admin/assets",
            Some(json!({ "public_id": "covers/stale" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .as_member(
            Method::DELETE,
            "/admin/assets",
            Some(json!({ "public_id": "covers/stale" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn dashboard_aggregates_store_activity() {
    let app = TestApp::new().await;
    let fiction = app.seed_category("Fiction", None).await;
    app.seed_category("Poetry", None).await;
    let book = app
        .seed_book("Bestseller", Decimal::new(1500, 2), Some(fiction.id))
        .await;
    app.seed_book("Runner Up", Decimal::new(900, 2), Some(fiction.id))
        .await;
    app.seed_book("Uncategorized", Decimal::new(900, 2), None)
        .await;

    let response = app
        .as_member(Method::POST, &format!("/books/{}/buy", book.id), Some(json!({})))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let purchase = body_json(response).await;
    let order_id = purchase["order_id"].as_i64().unwrap();

    let response = app
        .as_member(Method::GET, &format!("/orders/{}", order_id), None)
        .await;
    let view = body_json(response).await;
    let line_id = view["lines"][0]["id"].as_i64().unwrap();
    let response = app
        .as_member(Method::GET, &format!("/downloads/{}", line_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app.as_admin(Method::GET, "/admin/dashboard", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    assert_eq!(body["total_books"], 3);
    assert_eq!(body["total_orders"], 1);
    assert_eq!(body["total_downloads"], 1);
    assert!(body["total_users"].as_u64().unwrap() >= 2);

    let top = body["top_categories"].as_array().unwrap();
    assert_eq!(top[0]["name"], "Fiction");
    assert_eq!(top[0]["book_count"], 2);

    let recent = body["recent_orders"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["id"].as_i64().unwrap(), order_id);

    let monthly = body["monthly_downloads"].as_array().unwrap();
    assert_eq!(monthly.len(), 12);
    let this_month = Utc::now().month0() as usize;
    assert_eq!(monthly[this_month], 1);
}
