use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::{book, review};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddReviewInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
}

/// Customer reviews on book detail pages.
#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// One review per user per book, regardless of visibility.
    #[instrument(skip(self, input))]
    pub async fn add_review(
        &self,
        user_id: i32,
        book_id: i32,
        input: AddReviewInput,
    ) -> Result<review::Model, ServiceError> {
        input.validate()?;

        book::Entity::find_by_id(book_id)
            .one(self.db.as_ref())
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", book_id)))?;

        let already_reviewed = review::Entity::find()
            .filter(review::Column::BookId.eq(book_id))
            .filter(review::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .is_some();
        if already_reviewed {
            return Err(ServiceError::Conflict(
                "You have already reviewed this book".into(),
            ));
        }

        let created = review::ActiveModel {
            book_id: Set(book_id),
            user_id: Set(user_id),
            rating: Set(input.rating),
            comment: Set(input.comment),
            review_date: Set(Utc::now()),
            is_visible: Set(true),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        self.event_sender
            .send_or_log(Event::ReviewSubmitted {
                review_id: created.id,
                book_id,
            })
            .await;

        Ok(created)
    }
}
