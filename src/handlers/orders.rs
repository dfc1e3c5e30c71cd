use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::entities::{book, order, order_detail, payment_transaction};
use crate::errors::{ApiError, ErrorResponse};
use crate::handlers::common::{created, success};
use crate::services::orders::{OrderView, PurchaseOutcome};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PurchaseRequest {
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseResponse {
    pub already_purchased: bool,
    pub order_id: Option<i32>,
    pub order_detail_id: Option<i32>,
    pub transaction_code: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: i32,
    pub order_date: DateTime<Utc>,
    #[serde(serialize_with = "crate::entities::money::serialize")]
    pub total_amount: Decimal,
    pub payment_method: Option<String>,
    pub payment_settled: bool,
    pub status: String,
}

impl From<order::Model> for OrderResponse {
    fn from(order: order::Model) -> Self {
        Self {
            id: order.id,
            order_date: order.order_date,
            total_amount: order.total_amount,
            payment_method: order.payment_method,
            payment_settled: order.payment_settled,
            status: order.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderLineResponse {
    pub id: i32,
    pub book_id: i32,
    pub book_title: Option<String>,
    #[serde(serialize_with = "crate::entities::money::serialize")]
    pub price: Decimal,
    pub downloaded: bool,
    pub download_date: Option<DateTime<Utc>>,
}

impl From<(order_detail::Model, Option<book::Model>)> for OrderLineResponse {
    fn from((line, book): (order_detail::Model, Option<book::Model>)) -> Self {
        Self {
            id: line.id,
            book_id: line.book_id,
            book_title: book.map(|b| b.title),
            price: line.price,
            downloaded: line.downloaded,
            download_date: line.download_date,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: i32,
    #[serde(serialize_with = "crate::entities::money::serialize")]
    pub amount: Decimal,
    pub method: String,
    pub transaction_date: DateTime<Utc>,
    pub code: String,
    pub status: String,
}

impl From<payment_transaction::Model> for TransactionResponse {
    fn from(txn: payment_transaction::Model) -> Self {
        Self {
            id: txn.id,
            amount: txn.amount,
            method: txn.method,
            transaction_date: txn.transaction_date,
            code: txn.code,
            status: txn.status,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderViewResponse {
    pub order: OrderResponse,
    pub lines: Vec<OrderLineResponse>,
    pub transactions: Vec<TransactionResponse>,
}

impl From<OrderView> for OrderViewResponse {
    fn from(view: OrderView) -> Self {
        Self {
            order: view.order.into(),
            lines: view.lines.into_iter().map(Into::into).collect(),
            transactions: view.transactions.into_iter().map(Into::into).collect(),
        }
    }
}

#[utoipa::path(
    post,
    path = "/books/{id}/buy",
    params(("id" = i32, Path, description = "Book id")),
    request_body = PurchaseRequest,
    responses(
        (status = 201, description = "Order created and settled", body = PurchaseResponse),
        (status = 200, description = "Already owned; nothing written", body = PurchaseResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "orders"
)]
pub async fn buy_book(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .orders
        .purchase(user.user_id, book_id, request.payment_method)
        .await?;

    Ok(match outcome {
        PurchaseOutcome::Completed {
            order,
            transaction_code,
        } => created(PurchaseResponse {
            already_purchased: false,
            order_id: Some(order.id),
            order_detail_id: None,
            transaction_code: Some(transaction_code),
            status: Some(order.status),
        }),
        PurchaseOutcome::AlreadyPurchased { order_detail_id } => success(PurchaseResponse {
            already_purchased: true,
            order_id: None,
            order_detail_id: Some(order_detail_id),
            transaction_code: None,
            status: None,
        }),
    })
}

/// Answers with a redirect to the stored asset URL, the JSON-era shape
/// of the original "send the file" route.
#[utoipa::path(
    get,
    path = "/downloads/{order_detail_id}",
    params(("order_detail_id" = i32, Path, description = "Order line id")),
    responses(
        (status = 303, description = "Redirect to the book file"),
        (status = 403, description = "Not the owner, or payment not settled", body = ErrorResponse),
        (status = 404, description = "Order line not found", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "orders"
)]
pub async fn download(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(order_detail_id): Path<i32>,
) -> Result<Response, ApiError> {
    let file_url = state
        .orders
        .download(order_detail_id, user.user_id, user.is_admin())
        .await?;
    Ok(Redirect::to(&file_url).into_response())
}

#[utoipa::path(
    get,
    path = "/orders",
    responses((status = 200, description = "Caller's orders, newest first", body = [OrderResponse])),
    security(("bearer_token" = [])),
    tag = "orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, ApiError> {
    let orders = state.orders.user_orders(user.user_id).await?;
    Ok(success(
        orders
            .into_iter()
            .map(OrderResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with lines and transactions", body = OrderViewResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "orders"
)]
pub async fn order_detail(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(order_id): Path<i32>,
) -> Result<Response, ApiError> {
    let view = state
        .orders
        .order_with_lines(order_id, user.user_id, user.is_admin())
        .await?;
    Ok(success(OrderViewResponse::from(view)))
}

/// How many purchases the profile strip shows.
const RECENT_PURCHASES_LIMIT: u64 = 10;

#[utoipa::path(
    get,
    path = "/profile/purchases",
    responses((status = 200, description = "Caller's latest settled purchases", body = [OrderLineResponse])),
    security(("bearer_token" = [])),
    tag = "profile"
)]
pub async fn my_purchases(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Response, ApiError> {
    let lines = state
        .orders
        .recent_purchases(user.user_id, RECENT_PURCHASES_LIMIT)
        .await?;
    Ok(success(
        lines
            .into_iter()
            .map(OrderLineResponse::from)
            .collect::<Vec<_>>(),
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/books/:id/buy", post(buy_book))
        .route("/downloads/:order_detail_id", get(download))
        .route("/orders", get(my_orders))
        .route("/orders/:id", get(order_detail))
        .route("/profile/purchases", get(my_purchases))
}
