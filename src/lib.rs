pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use sea_orm::DatabaseConnection;
use serde_json::json;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService};
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{
    AccountService, AdminService, CatalogService, OrderService, ReviewService, StorageService,
};

/// Shared application state: the connection pool, configuration and one
/// instance of each service.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub auth: Arc<AuthService>,
    pub accounts: AccountService,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub reviews: ReviewService,
    pub admin: AdminService,
    pub storage: StorageService,
    pub event_sender: EventSender,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: AppConfig, event_sender: EventSender) -> Self {
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let orders = OrderService::new(db.clone(), event_sender.clone());

        Self {
            accounts: AccountService::new(db.clone(), auth.clone(), event_sender.clone()),
            catalog: CatalogService::new(db.clone()),
            reviews: ReviewService::new(db.clone(), event_sender.clone()),
            admin: AdminService::new(db.clone(), orders.clone(), event_sender.clone()),
            storage: StorageService::new(&config),
            orders,
            auth,
            db,
            config,
            event_sender,
        }
    }
}

async fn liveness() -> impl IntoResponse {
    "Bookshelf API is running"
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match db::check_connection(state.db.as_ref()).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "unreachable" })),
        ),
    }
}

/// The complete HTTP surface in three tiers: public storefront routes
/// (token optional), customer routes (token required) and the admin
/// back office (admin capability required).
pub fn api_routes(state: AppState) -> Router {
    let auth_service = state.auth.clone();

    let public = Router::new()
        .merge(handlers::catalog::routes())
        .merge(handlers::reviews::routes())
        .merge(handlers::auth::public_routes())
        .with_optional_auth(auth_service.clone());

    let customer = Router::new()
        .merge(handlers::orders::routes())
        .merge(handlers::auth::authenticated_routes())
        .with_auth(auth_service.clone());

    let admin = handlers::admin::routes().with_admin(auth_service);

    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health))
        .merge(public)
        .merge(customer)
        .nest("/admin", admin)
        .merge(openapi::swagger_ui())
        .with_state(state)
}
