use axum::{
    extract::{Path, State},
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AuthenticatedUser;
use crate::entities::review;
use crate::errors::{ApiError, ErrorResponse};
use crate::handlers::catalog::ReviewResponse;
use crate::handlers::common::{created, success};
use crate::services::reviews::AddReviewInput;
use crate::AppState;

/// The caller's own freshly created review; no author lookup needed.
#[derive(Debug, Serialize, ToSchema)]
pub struct OwnReviewResponse {
    pub id: i32,
    pub book_id: i32,
    pub rating: i32,
    pub comment: Option<String>,
    pub review_date: DateTime<Utc>,
}

impl From<review::Model> for OwnReviewResponse {
    fn from(review: review::Model) -> Self {
        Self {
            id: review.id,
            book_id: review.book_id,
            rating: review.rating,
            comment: review.comment,
            review_date: review.review_date,
        }
    }
}

#[utoipa::path(
    get,
    path = "/books/{id}/reviews",
    params(("id" = i32, Path, description = "Book id")),
    responses((status = 200, description = "Visible reviews, newest first", body = [ReviewResponse])),
    tag = "reviews"
)]
pub async fn book_reviews(
    State(state): State<AppState>,
    Path(book_id): Path<i32>,
) -> Result<Response, ApiError> {
    let reviews = state.catalog.visible_reviews(book_id).await?;
    Ok(success(
        reviews
            .into_iter()
            .map(ReviewResponse::from)
            .collect::<Vec<_>>(),
    ))
}

#[utoipa::path(
    post,
    path = "/books/{id}/reviews",
    params(("id" = i32, Path, description = "Book id")),
    request_body = AddReviewInput,
    responses(
        (status = 201, description = "Review created", body = OwnReviewResponse),
        (status = 404, description = "Book not found", body = ErrorResponse),
        (status = 409, description = "Already reviewed", body = ErrorResponse)
    ),
    security(("bearer_token" = [])),
    tag = "reviews"
)]
pub async fn add_review(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(input): Json<AddReviewInput>,
) -> Result<Response, ApiError> {
    let review = state.reviews.add_review(user.user_id, book_id, input).await?;
    Ok(created(OwnReviewResponse::from(review)))
}

/// GET is public, POST requires a token. Both live on one path, so the
/// guard for POST is the [`AuthenticatedUser`] extractor rather than a
/// route layer.
pub fn routes() -> Router<AppState> {
    Router::new().route("/books/:id/reviews", get(book_reviews).post(add_review))
}
