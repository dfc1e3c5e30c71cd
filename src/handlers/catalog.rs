use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::MaybeAuthUser;
use crate::entities::{book, category};
use crate::errors::{ApiError, ErrorResponse};
use crate::handlers::common::success;
use crate::services::catalog::{BookDetail, CategoryListing, ReviewWithAuthor};
use crate::AppState;

/// A book as it appears in listings. The downloadable file URL is
/// deliberately absent; it is only reachable through the download
/// endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct BookSummary {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    #[serde(serialize_with = "crate::entities::money::serialize")]
    pub price: Decimal,
    pub cover_url: Option<String>,
    pub category_id: Option<i32>,
    pub added_at: DateTime<Utc>,
}

impl From<book::Model> for BookSummary {
    fn from(book: book::Model) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            price: book.price,
            cover_url: book.cover_url,
            category_id: book.category_id,
            added_at: book.added_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    pub is_active: bool,
}

impl From<category::Model> for CategoryResponse {
    fn from(category: category::Model) -> Self {
        Self {
            id: category.id,
            name: category.name,
            description: category.description,
            parent_id: category.parent_id,
            is_active: category.is_active,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewResponse {
    pub id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
    pub author: String,
}

impl From<ReviewWithAuthor> for ReviewResponse {
    fn from(row: ReviewWithAuthor) -> Self {
        Self {
            id: row.review.id,
            rating: row.review.rating,
            comment: row.review.comment,
            review_date: row.review.review_date,
            author: row.author,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryBooksResponse {
    pub category: CategoryResponse,
    pub children: Vec<CategoryResponse>,
    pub books: Vec<BookSummary>,
}

impl From<CategoryListing> for CategoryBooksResponse {
    fn from(listing: CategoryListing) -> Self {
        Self {
            category: listing.category.into(),
            children: listing.children.into_iter().map(Into::into).collect(),
            books: listing.books.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BookDetailResponse {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub description: Option<String>,
    #[serde(serialize_with = "crate::entities::money::serialize")]
    pub price: Decimal,
    pub cover_url: Option<String>,
    pub page_count: Option<i32>,
    pub added_at: DateTime<Utc>,
    pub is_active: bool,
    pub category: Option<CategoryResponse>,
    pub related: Vec<BookSummary>,
    pub reviews: Vec<ReviewResponse>,
}

impl From<BookDetail> for BookDetailResponse {
    fn from(detail: BookDetail) -> Self {
        Self {
            id: detail.book.id,
            title: detail.book.title,
            author: detail.book.author,
            publisher: detail.book.publisher,
            publish_year: detail.book.publish_year,
            description: detail.book.description,
            price: detail.book.price,
            cover_url: detail.book.cover_url,
            page_count: detail.book.page_count,
            added_at: detail.book.added_at,
            is_active: detail.book.is_active,
            category: detail.category.map(Into::into),
            related: detail.related.into_iter().map(Into::into).collect(),
            reviews: detail.reviews.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Search term; blank falls back to the newest-books listing.
    pub q: Option<String>,
}

#[utoipa::path(
    get,
    path = "/books/new",
    responses((status = 200, description = "Newest active books", body = [BookSummary])),
    tag = "catalog"
)]
pub async fn new_books(State(state): State<AppState>) -> Result<Response, ApiError> {
    let books = state.catalog.new_books(None).await?;
    Ok(success(
        books.into_iter().map(BookSummary::from).collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "Active top-level categories", body = [CategoryResponse])),
    tag = "catalog"
)]
pub async fn root_categories(State(state): State<AppState>) -> Result<Response, ApiError> {
    let categories = state.catalog.root_categories().await?;
    Ok(success(
        categories
            .into_iter()
            .map(CategoryResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    get,
    path = "/categories/{id}/books",
    params(("id" = i32, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category with its direct children and their books", body = CategoryBooksResponse),
        (status = 404, description = "Category not found", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn category_books(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let listing = state.catalog.category_books(id).await?;
    Ok(success(CategoryBooksResponse::from(listing)))
}

#[utoipa::path(
    get,
    path = "/books/{id}",
    params(("id" = i32, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book detail with related titles and reviews", body = BookDetailResponse),
        (status = 404, description = "Book not found", body = ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn book_detail(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let viewer_is_admin = viewer.map(|u| u.is_admin()).unwrap_or(false);
    let detail = state.catalog.book_detail(id, viewer_is_admin).await?;
    Ok(success(BookDetailResponse::from(detail)))
}

#[utoipa::path(
    get,
    path = "/books/search",
    params(SearchParams),
    responses((status = 200, description = "Matching active books", body = [BookSummary])),
    tag = "catalog"
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let books = match params.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => state.catalog.search(q).await?,
        _ => state.catalog.new_books(None).await?,
    };
    Ok(success(
        books.into_iter().map(BookSummary::from).collect::<Vec<_>>(),
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/books/new", get(new_books))
        .route("/books/search", get(search))
        .route("/books/:id", get(book_detail))
        .route("/categories", get(root_categories))
        .route("/categories/:id/books", get(category_books))
}
