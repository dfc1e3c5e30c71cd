use std::str::FromStr;

use axum::{
    extract::{Multipart, Path, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::errors::{ApiError, ErrorResponse};
use crate::handlers::auth::UserResponse;
use crate::handlers::common::{created, no_content, parse_id_list, success};
use crate::handlers::orders::{OrderResponse, OrderViewResponse};
use crate::services::admin::{
    AdminUpdateUserInput, CategoryBookCount, CreateBookInput, CreateCategoryInput,
    DashboardStats, UpdateBookInput, UpdateCategoryInput, UpdateOrderStatusInput,
};
use crate::services::storage::AssetKind;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkStatusRequest {
    /// Comma-separated book ids, e.g. "3,17,20"
    pub ids: String,
    pub is_active: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    /// Comma-separated book ids
    pub ids: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkResult {
    pub affected: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssetResponse {
    pub secure_url: String,
    pub public_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteAssetRequest {
    /// The `public_id` returned by the upload.
    pub public_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub total_books: u64,
    pub total_users: u64,
    pub total_orders: u64,
    pub total_downloads: u64,
    pub top_categories: Vec<CategoryBookCount>,
    pub recent_orders: Vec<OrderResponse>,
    /// Downloads per calendar month of the current year, January first.
    pub monthly_downloads: Vec<i64>,
}

impl From<DashboardStats> for DashboardResponse {
    fn from(stats: DashboardStats) -> Self {
        Self {
            total_books: stats.total_books,
            total_users: stats.total_users,
            total_orders: stats.total_orders,
            total_downloads: stats.total_downloads,
            top_categories: stats.top_categories,
            recent_orders: stats.recent_orders.into_iter().map(Into::into).collect(),
            monthly_downloads: stats.monthly_downloads,
        }
    }
}

// Dashboard

#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses((status = 200, description = "Back-office overview", body = DashboardResponse)),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn dashboard(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.admin.dashboard().await?;
    Ok(success(DashboardResponse::from(stats)))
}

// Books

#[utoipa::path(
    get,
    path = "/admin/books",
    responses((status = 200, description = "All books, inactive included")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn list_books(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(success(state.admin.list_books().await?))
}

#[utoipa::path(
    post,
    path = "/admin/books",
    request_body = CreateBookInput,
    responses((status = 201, description = "Book created")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn create_book(
    State(state): State<AppState>,
    Json(input): Json<CreateBookInput>,
) -> Result<Response, ApiError> {
    Ok(created(state.admin.create_book(input).await?))
}

#[utoipa::path(
    put,
    path = "/admin/books/{id}",
    params(("id" = i32, Path, description = "Book id")),
    request_body = UpdateBookInput,
    responses(
        (status = 200, description = "Book updated"),
        (status = 404, description = "Book not found", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<UpdateBookInput>,
) -> Result<Response, ApiError> {
    Ok(success(state.admin.update_book(id, input).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/books/{id}",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 409, description = "Book has order history", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    state.admin.delete_book(id).await?;
    Ok(no_content())
}

#[utoipa::path(
    post,
    path = "/admin/books/bulk-status",
    request_body = BulkStatusRequest,
    responses((status = 200, description = "Rows touched", body = BulkResult)),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn bulk_status(
    State(state): State<AppState>,
    Json(request): Json<BulkStatusRequest>,
) -> Result<Response, ApiError> {
    let ids = parse_id_list(&request.ids)?;
    let affected = state.admin.bulk_set_status(ids, request.is_active).await?;
    Ok(success(BulkResult { affected }))
}

#[utoipa::path(
    post,
    path = "/admin/books/bulk-delete",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Rows deleted", body = BulkResult),
        (status = 409, description = "A targeted book has order history; nothing deleted", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Response, ApiError> {
    let ids = parse_id_list(&request.ids)?;
    let affected = state.admin.bulk_delete(ids).await?;
    Ok(success(BulkResult { affected }))
}

// Categories

#[utoipa::path(
    get,
    path = "/admin/categories",
    responses((status = 200, description = "All categories")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn list_categories(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(success(state.admin.list_categories().await?))
}

#[utoipa::path(
    post,
    path = "/admin/categories",
    request_body = CreateCategoryInput,
    responses((status = 201, description = "Category created")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<Response, ApiError> {
    Ok(created(state.admin.create_category(input).await?))
}

#[utoipa::path(
    put,
    path = "/admin/categories/{id}",
    params(("id" = i32, Path, description = "Category id")),
    request_body = UpdateCategoryInput,
    responses(
        (status = 200, description = "Category updated"),
        (status = 400, description = "Parent would create a cycle", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Response, ApiError> {
    Ok(success(state.admin.update_category(id, input).await?))
}

#[utoipa::path(
    get,
    path = "/admin/categories/{id}/eligible-parents",
    params(("id" = i32, Path, description = "Category id")),
    responses((status = 200, description = "Categories that may become the parent")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn eligible_parents(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    Ok(success(state.admin.eligible_parents(id).await?))
}

#[utoipa::path(
    delete,
    path = "/admin/categories/{id}",
    params(("id" = i32, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 409, description = "Category still has books or children", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    state.admin.delete_category(id).await?;
    Ok(no_content())
}

// Users

#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "All users", body = [UserResponse])),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn list_users(State(state): State<AppState>) -> Result<Response, ApiError> {
    let users = state.admin.list_users().await?;
    Ok(success(
        users
            .into_iter()
            .map(UserResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    put,
    path = "/admin/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = AdminUpdateUserInput,
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<AdminUpdateUserInput>,
) -> Result<Response, ApiError> {
    let user = state.admin.update_user(id, input).await?;
    Ok(success(UserResponse::from(user)))
}

#[utoipa::path(
    post,
    path = "/admin/users/{id}/ban-toggle",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "Active flag flipped", body = UserResponse),
        (status = 400, description = "Admins cannot ban themselves", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn toggle_ban(
    State(state): State<AppState>,
    AuthenticatedUser(admin): AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let user = state.admin.toggle_ban(id, admin.user_id).await?;
    Ok(success(UserResponse::from(user)))
}

// Orders

#[utoipa::path(
    get,
    path = "/admin/orders",
    responses((status = 200, description = "All orders, newest first", body = [OrderResponse])),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn list_orders(State(state): State<AppState>) -> Result<Response, ApiError> {
    let orders = state.admin.list_orders().await?;
    Ok(success(
        orders
            .into_iter()
            .map(OrderResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    get,
    path = "/admin/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with lines and transactions", body = OrderViewResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn order_detail(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let view = state.admin.order_detail(id).await?;
    Ok(success(OrderViewResponse::from(view)))
}

#[utoipa::path(
    put,
    path = "/admin/orders/{id}/status",
    params(("id" = i32, Path, description = "Order id")),
    request_body = UpdateOrderStatusInput,
    responses(
        (status = 200, description = "Order status updated", body = OrderResponse),
        (status = 400, description = "Unknown status label", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(input): Json<UpdateOrderStatusInput>,
) -> Result<Response, ApiError> {
    let order = state.admin.update_order_status(id, input).await?;
    Ok(success(OrderResponse::from(order)))
}

// Reviews

#[utoipa::path(
    get,
    path = "/admin/reviews",
    responses((status = 200, description = "All reviews, hidden included")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn list_reviews(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(success(state.admin.list_reviews().await?))
}

#[utoipa::path(
    post,
    path = "/admin/reviews/{id}/toggle",
    params(("id" = i32, Path, description = "Review id")),
    responses(
        (status = 200, description = "Visibility flipped"),
        (status = 404, description = "Review not found", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn toggle_review(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    Ok(success(state.admin.toggle_review_visibility(id).await?))
}

// Assets

/// Multipart upload: a `kind` text field (`cover` or `book`) and a
/// `file` field. The returned URL goes into a later book create/update.
#[utoipa::path(
    post,
    path = "/admin/assets",
    request_body(content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Asset stored", body = AssetResponse),
        (status = 400, description = "Missing file, bad extension or too large", body = ErrorResponse),
        (status = 502, description = "Asset store unreachable", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut kind: Option<AssetKind> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("kind") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                kind = Some(AssetKind::from_str(&raw).map_err(|_| {
                    ApiError::BadRequest(format!("Unknown asset kind '{}'", raw))
                })?);
            }
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(ToString::to_string)
                    .ok_or_else(|| ApiError::BadRequest("File part needs a filename".into()))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                file = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| ApiError::BadRequest("Missing 'kind' field".into()))?;
    let (filename, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".into()))?;

    let asset = state.storage.upload(kind, &filename, bytes).await?;
    Ok(created(AssetResponse {
        secure_url: asset.secure_url,
        public_id: asset.public_id,
    }))
}

/// Orphaned-asset cleanup after a book edit replaces its files.
#[utoipa::path(
    delete,
    path = "/admin/assets",
    request_body = DeleteAssetRequest,
    responses((status = 204, description = "Delete requested; store failures are logged, not surfaced")),
    security(("bearer_token" = [])),
    tag = "admin"
)]
pub async fn delete_asset(
    State(state): State<AppState>,
    Json(request): Json<DeleteAssetRequest>,
) -> Response {
    state.storage.delete(&request.public_id).await;
    no_content()
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/books", get(list_books).post(create_book))
        .route("/books/bulk-status", post(bulk_status))
        .route("/books/bulk-delete", post(bulk_delete))
        .route("/books/:id", put(update_book).delete(delete_book))
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/:id",
            put(update_category).delete(delete_category),
        )
        .route("/categories/:id/eligible-parents", get(eligible_parents))
        .route("/users", get(list_users))
        .route("/users/:id", put(update_user))
        .route("/users/:id/ban-toggle", post(toggle_ban))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(order_detail))
        .route("/orders/:id/status", put(update_order_status))
        .route("/reviews", get(list_reviews))
        .route("/reviews/:id/toggle", post(toggle_review))
        .route("/assets", post(upload_asset).delete(delete_asset))
}
