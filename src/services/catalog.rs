use std::sync::Arc;

use sea_orm::{
    sea_query::{Expr, Func},
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tracing::instrument;

use crate::entities::{book, category, review, user};
use crate::errors::ServiceError;

/// How many books the storefront's "new arrivals" listing shows.
pub const NEW_BOOKS_LIMIT: u64 = 9;
/// How many same-category books the detail page suggests.
pub const RELATED_BOOKS_LIMIT: u64 = 3;

#[derive(Debug)]
pub struct ReviewWithAuthor {
    pub review: review::Model,
    pub author: String,
}

#[derive(Debug)]
pub struct BookDetail {
    pub book: book::Model,
    pub category: Option<category::Model>,
    pub related: Vec<book::Model>,
    pub reviews: Vec<ReviewWithAuthor>,
}

#[derive(Debug)]
pub struct CategoryListing {
    pub category: category::Model,
    pub children: Vec<category::Model>,
    pub books: Vec<book::Model>,
}

/// Read-side of the storefront: listings, detail pages and search.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Newest active books, most recently added first.
    #[instrument(skip(self))]
    pub async fn new_books(&self, limit: Option<u64>) -> Result<Vec<book::Model>, ServiceError> {
        Ok(book::Entity::find()
            .filter(book::Column::IsActive.eq(true))
            .order_by_desc(book::Column::AddedAt)
            .limit(limit.unwrap_or(NEW_BOOKS_LIMIT))
            .all(self.db.as_ref())
            .await?)
    }

    /// Active top-level categories for the storefront navigation.
    #[instrument(skip(self))]
    pub async fn root_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .filter(category::Column::ParentId.is_null())
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    /// Books in a category and its direct children. The expansion stops
    /// at one level: grandchildren are not included.
    #[instrument(skip(self))]
    pub async fn category_books(&self, category_id: i32) -> Result<CategoryListing, ServiceError> {
        let category = category::Entity::find_by_id(category_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", category_id))
            })?;

        let children = category::Entity::find()
            .filter(category::Column::ParentId.eq(category_id))
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::Name)
            .all(self.db.as_ref())
            .await?;

        let mut category_ids: Vec<i32> = vec![category_id];
        category_ids.extend(children.iter().map(|c| c.id));

        let books = book::Entity::find()
            .filter(book::Column::CategoryId.is_in(category_ids))
            .filter(book::Column::IsActive.eq(true))
            .order_by_desc(book::Column::AddedAt)
            .all(self.db.as_ref())
            .await?;

        Ok(CategoryListing {
            category,
            children,
            books,
        })
    }

    /// Detail page data: the book, up to three related titles from the
    /// same category, and its visible reviews newest first. Inactive
    /// books 404 for everyone but admins.
    #[instrument(skip(self))]
    pub async fn book_detail(
        &self,
        book_id: i32,
        viewer_is_admin: bool,
    ) -> Result<BookDetail, ServiceError> {
        let book = book::Entity::find_by_id(book_id)
            .one(self.db.as_ref())
            .await?
            .filter(|b| b.is_active || viewer_is_admin)
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", book_id)))?;

        let category = match book.category_id {
            Some(id) => {
                category::Entity::find_by_id(id)
                    .one(self.db.as_ref())
                    .await?
            }
            None => None,
        };

        let related = match book.category_id {
            Some(id) => {
                book::Entity::find()
                    .filter(book::Column::CategoryId.eq(id))
                    .filter(book::Column::IsActive.eq(true))
                    .filter(book::Column::Id.ne(book.id))
                    .order_by_desc(book::Column::AddedAt)
                    .limit(RELATED_BOOKS_LIMIT)
                    .all(self.db.as_ref())
                    .await?
            }
            None => Vec::new(),
        };

        let reviews = self.visible_reviews(book.id).await?;

        Ok(BookDetail {
            book,
            category,
            related,
            reviews,
        })
    }

    pub async fn visible_reviews(
        &self,
        book_id: i32,
    ) -> Result<Vec<ReviewWithAuthor>, ServiceError> {
        let rows = review::Entity::find()
            .filter(review::Column::BookId.eq(book_id))
            .filter(review::Column::IsVisible.eq(true))
            .order_by_desc(review::Column::ReviewDate)
            .find_also_related(user::Entity)
            .all(self.db.as_ref())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(review, author)| ReviewWithAuthor {
                author: author
                    .map(|u| u.username)
                    .unwrap_or_else(|| "unknown".to_string()),
                review,
            })
            .collect())
    }

    /// Case-insensitive substring search over title, author and
    /// description. `lower(..) like` keeps this portable across
    /// Postgres and SQLite.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<book::Model>, ServiceError> {
        let pattern = format!("%{}%", query.trim().to_lowercase());

        Ok(book::Entity::find()
            .filter(book::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            book::Entity,
                            book::Column::Title,
                        ))))
                        .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            book::Entity,
                            book::Column::Author,
                        ))))
                        .like(pattern.clone()),
                    )
                    .add(
                        Expr::expr(Func::lower(Expr::col((
                            book::Entity,
                            book::Column::Description,
                        ))))
                        .like(pattern),
                    ),
            )
            .order_by_desc(book::Column::AddedAt)
            .all(self.db.as_ref())
            .await?)
    }
}
