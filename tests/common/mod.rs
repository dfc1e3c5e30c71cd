use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use bookshelf_api::auth::{hash_password, Capability};
use bookshelf_api::config::AppConfig;
use bookshelf_api::entities::{book, category, role, user};
use bookshelf_api::events::{self, EventSender};
use bookshelf_api::{api_routes, db, AppState};

pub const TEST_PASSWORD: &str = "reading-is-fun-42";

/// Harness spinning up the full router against a fresh in-memory SQLite
/// database, with one admin and one member account seeded.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub admin_id: i32,
    pub member_id: i32,
    pub member_role_id: i32,
    admin_token: String,
    member_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_signing_material_for_tests_only_32chars".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps every query on the same
        // in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db_arc.clone(), cfg, event_sender);

        let admin_role = role::ActiveModel {
            name: Set("admin".to_string()),
            description: Set(Some("Full back-office access".to_string())),
            ..Default::default()
        }
        .insert(db_arc.as_ref())
        .await
        .expect("seed admin role");
        let member_role = role::ActiveModel {
            name: Set("member".to_string()),
            description: Set(Some("Regular customer".to_string())),
            ..Default::default()
        }
        .insert(db_arc.as_ref())
        .await
        .expect("seed member role");

        let password_hash = hash_password(TEST_PASSWORD).expect("hash test password");
        let admin = user::ActiveModel {
            username: Set("admin".to_string()),
            password_hash: Set(password_hash.clone()),
            email: Set("admin@example.com".to_string()),
            full_name: Set(Some("Admin".to_string())),
            phone: Set(None),
            address: Set(None),
            role_id: Set(admin_role.id),
            registered_at: Set(Utc::now()),
            last_login_at: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db_arc.as_ref())
        .await
        .expect("seed admin user");
        let member = user::ActiveModel {
            username: Set("reader".to_string()),
            password_hash: Set(password_hash),
            email: Set("reader@example.com".to_string()),
            full_name: Set(Some("Reader".to_string())),
            phone: Set(None),
            address: Set(None),
            role_id: Set(member_role.id),
            registered_at: Set(Utc::now()),
            last_login_at: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db_arc.as_ref())
        .await
        .expect("seed member user");

        let admin_token = state
            .auth
            .issue_token(admin.id, &admin.username, Capability::Admin, false)
            .expect("mint admin token");
        let member_token = state
            .auth
            .issue_token(member.id, &member.username, Capability::Member, false)
            .expect("mint member token");

        let router = api_routes(state.clone());

        Self {
            router,
            state,
            admin_id: admin.id,
            member_id: member.id,
            member_role_id: member_role.id,
            admin_token,
            member_token,
            _event_task: event_task,
        }
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    pub fn member_token(&self) -> &str {
        &self.member_token
    }

    /// Sends a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_member(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.member_token()))
            .await
    }

    pub async fn as_admin(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        self.request(method, uri, body, Some(self.admin_token()))
            .await
    }

    /// Registers an extra member account directly against the database
    /// and returns (user_id, token).
    pub async fn seed_member(&self, username: &str) -> (i32, String) {
        let password_hash = hash_password(TEST_PASSWORD).expect("hash test password");
        let created = user::ActiveModel {
            username: Set(username.to_string()),
            password_hash: Set(password_hash),
            email: Set(format!("{}@example.com", username)),
            full_name: Set(None),
            phone: Set(None),
            address: Set(None),
            role_id: Set(self.member_role_id),
            registered_at: Set(Utc::now()),
            last_login_at: Set(None),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed extra member");

        let token = self
            .state
            .auth
            .issue_token(created.id, username, Capability::Member, false)
            .expect("mint member token");
        (created.id, token)
    }

    pub async fn seed_category(&self, name: &str, parent_id: Option<i32>) -> category::Model {
        category::ActiveModel {
            name: Set(name.to_string()),
            description: Set(None),
            parent_id: Set(parent_id),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed category")
    }

    pub async fn seed_book(
        &self,
        title: &str,
        price: Decimal,
        category_id: Option<i32>,
    ) -> book::Model {
        self.seed_book_with(title, price, category_id, true).await
    }

    pub async fn seed_book_with(
        &self,
        title: &str,
        price: Decimal,
        category_id: Option<i32>,
        is_active: bool,
    ) -> book::Model {
        use std::sync::atomic::{AtomicI64, Ordering};
        // Later-seeded books get a strictly later added_at so that
        // newest-first assertions are deterministic.
        static BOOK_CLOCK: AtomicI64 = AtomicI64::new(0);
        let offset = BOOK_CLOCK.fetch_add(1, Ordering::Relaxed);

        book::ActiveModel {
            title: Set(title.to_string()),
            author: Set(Some("Test Author".to_string())),
            publisher: Set(None),
            publish_year: Set(Some(2020)),
            category_id: Set(category_id),
            description: Set(Some(format!("All about {}", title))),
            price: Set(price),
            cover_url: Set(None),
            file_url: Set(format!(
                "https://cdn.example.com/files/{}.pdf",
                title.to_lowercase().replace(' ', "-")
            )),
            page_count: Set(Some(200)),
            added_at: Set(Utc::now() + chrono::Duration::seconds(offset)),
            updated_at: Set(None),
            is_active: Set(is_active),
            ..Default::default()
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed book")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a JSON response body.
pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
