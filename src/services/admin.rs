use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    FromQueryResult, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::entities::{book, category, order, order_detail, review, role, user};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::orders::{order_status, OrderService, OrderView};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBookInput {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub category_id: Option<i32>,
    pub description: Option<String>,
    pub price: Decimal,
    pub cover_url: Option<String>,
    #[validate(length(min = 1))]
    pub file_url: String,
    pub page_count: Option<i32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBookInput {
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub publish_year: Option<i32>,
    pub category_id: Option<i32>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub cover_url: Option<String>,
    pub file_url: Option<String>,
    pub page_count: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryInput {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
}

/// `parent_id` of 0 moves the category to the top level; absent leaves
/// the parent untouched.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct AdminUpdateUserInput {
    #[validate(length(min = 3, max = 64))]
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role_id: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusInput {
    pub status: String,
    pub payment_settled: Option<bool>,
}

#[derive(Debug, FromQueryResult, Serialize, ToSchema)]
pub struct CategoryBookCount {
    pub category_id: i32,
    pub name: String,
    pub book_count: i64,
}

#[derive(Debug)]
pub struct DashboardStats {
    pub total_books: u64,
    pub total_users: u64,
    pub total_orders: u64,
    pub total_downloads: u64,
    pub top_categories: Vec<CategoryBookCount>,
    pub recent_orders: Vec<order::Model>,
    /// Downloads per calendar month of the current year, January first.
    pub monthly_downloads: Vec<i64>,
}

const TOP_CATEGORIES_LIMIT: usize = 5;
const RECENT_ORDERS_LIMIT: u64 = 5;

/// Back-office operations. Every method assumes the caller already
/// passed the admin capability guard.
#[derive(Clone)]
pub struct AdminService {
    db: Arc<DatabaseConnection>,
    orders: OrderService,
    event_sender: EventSender,
}

impl AdminService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        orders: OrderService,
        event_sender: EventSender,
    ) -> Self {
        Self {
            db,
            orders,
            event_sender,
        }
    }

    // Books

    #[instrument(skip(self))]
    pub async fn list_books(&self) -> Result<Vec<book::Model>, ServiceError> {
        Ok(book::Entity::find()
            .order_by_desc(book::Column::AddedAt)
            .all(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_book(&self, input: CreateBookInput) -> Result<book::Model, ServiceError> {
        input.validate()?;

        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price must not be negative".into(),
            ));
        }
        if let Some(category_id) = input.category_id {
            self.require_category(category_id).await?;
        }

        let created = book::ActiveModel {
            title: Set(input.title),
            author: Set(input.author),
            publisher: Set(input.publisher),
            publish_year: Set(input.publish_year),
            category_id: Set(input.category_id),
            description: Set(input.description),
            price: Set(input.price),
            cover_url: Set(input.cover_url),
            file_url: Set(input.file_url),
            page_count: Set(input.page_count),
            added_at: Set(Utc::now()),
            updated_at: Set(None),
            is_active: Set(input.is_active),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        self.event_sender
            .send_or_log(Event::BookCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_book(
        &self,
        book_id: i32,
        input: UpdateBookInput,
    ) -> Result<book::Model, ServiceError> {
        input.validate()?;

        let book = self.require_book(book_id).await?;

        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price must not be negative".into(),
                ));
            }
        }
        if let Some(category_id) = input.category_id {
            self.require_category(category_id).await?;
        }

        let mut active: book::ActiveModel = book.into();
        if let Some(title) = input.title {
            active.title = Set(title);
        }
        if let Some(author) = input.author {
            active.author = Set(Some(author));
        }
        if let Some(publisher) = input.publisher {
            active.publisher = Set(Some(publisher));
        }
        if let Some(publish_year) = input.publish_year {
            active.publish_year = Set(Some(publish_year));
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(cover_url) = input.cover_url {
            active.cover_url = Set(Some(cover_url));
        }
        if let Some(file_url) = input.file_url {
            active.file_url = Set(file_url);
        }
        if let Some(page_count) = input.page_count {
            active.page_count = Set(Some(page_count));
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Some(Utc::now()));

        let updated = active.update(self.db.as_ref()).await?;
        self.event_sender
            .send_or_log(Event::BookUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Delete is blocked while any purchase references the book; its
    /// reviews are removed alongside it.
    #[instrument(skip(self))]
    pub async fn delete_book(&self, book_id: i32) -> Result<(), ServiceError> {
        self.require_book(book_id).await?;

        let ordered = order_detail::Entity::find()
            .filter(order_detail::Column::BookId.eq(book_id))
            .count(self.db.as_ref())
            .await?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(
                "Book has order history and cannot be deleted".into(),
            ));
        }

        let txn = self.db.begin().await?;
        review::Entity::delete_many()
            .filter(review::Column::BookId.eq(book_id))
            .exec(&txn)
            .await?;
        book::Entity::delete_by_id(book_id).exec(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::BookDeleted(book_id))
            .await;
        Ok(())
    }

    /// Flips the active flag on every listed book; returns the number of
    /// rows touched.
    #[instrument(skip(self))]
    pub async fn bulk_set_status(
        &self,
        ids: Vec<i32>,
        is_active: bool,
    ) -> Result<u64, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::ValidationError("No book ids given".into()));
        }

        let result = book::Entity::update_many()
            .col_expr(book::Column::IsActive, Expr::value(is_active))
            .col_expr(book::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(book::Column::Id.is_in(ids.clone()))
            .exec(self.db.as_ref())
            .await?;

        info!(count = result.rows_affected, is_active, "bulk status update");
        self.event_sender
            .send_or_log(Event::BooksBulkUpdated { ids, is_active })
            .await;
        Ok(result.rows_affected)
    }

    /// All-or-nothing: if any targeted book has order history the whole
    /// batch is rejected and nothing is deleted.
    #[instrument(skip(self))]
    pub async fn bulk_delete(&self, ids: Vec<i32>) -> Result<u64, ServiceError> {
        if ids.is_empty() {
            return Err(ServiceError::ValidationError("No book ids given".into()));
        }

        let txn = self.db.begin().await?;

        let ordered = order_detail::Entity::find()
            .filter(order_detail::Column::BookId.is_in(ids.clone()))
            .count(&txn)
            .await?;
        if ordered > 0 {
            return Err(ServiceError::Conflict(
                "One or more books have order history; nothing was deleted".into(),
            ));
        }

        review::Entity::delete_many()
            .filter(review::Column::BookId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let result = book::Entity::delete_many()
            .filter(book::Column::Id.is_in(ids.clone()))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(count = result.rows_affected, "bulk delete");
        self.event_sender
            .send_or_log(Event::BooksBulkDeleted(ids))
            .await;
        Ok(result.rows_affected)
    }

    // Categories

    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<category::Model>, ServiceError> {
        Ok(category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        if let Some(parent_id) = input.parent_id {
            self.require_category(parent_id).await?;
        }

        let created = category::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            parent_id: Set(input.parent_id),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        self.event_sender
            .send_or_log(Event::CategoryCreated(created.id))
            .await;
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        category_id: i32,
        input: UpdateCategoryInput,
    ) -> Result<category::Model, ServiceError> {
        input.validate()?;

        let existing = self.require_category(category_id).await?;

        let new_parent = match input.parent_id {
            Some(0) => Some(None),
            Some(parent_id) => {
                let eligible = self.eligible_parents(category_id).await?;
                if !eligible.iter().any(|c| c.id == parent_id) {
                    return Err(ServiceError::InvalidOperation(
                        "Parent would create a cycle or does not exist".into(),
                    ));
                }
                Some(Some(parent_id))
            }
            None => None,
        };

        let mut active: category::ActiveModel = existing.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(parent) = new_parent {
            active.parent_id = Set(parent);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(self.db.as_ref()).await?;
        self.event_sender
            .send_or_log(Event::CategoryUpdated(updated.id))
            .await;
        Ok(updated)
    }

    /// Categories that may become the parent of `category_id`: everything
    /// except the category itself and its descendants, walked to full
    /// depth over the in-memory adjacency list.
    #[instrument(skip(self))]
    pub async fn eligible_parents(
        &self,
        category_id: i32,
    ) -> Result<Vec<category::Model>, ServiceError> {
        self.require_category(category_id).await?;

        let all = category::Entity::find().all(self.db.as_ref()).await?;

        let mut children_of: HashMap<i32, Vec<i32>> = HashMap::new();
        for c in &all {
            if let Some(parent_id) = c.parent_id {
                children_of.entry(parent_id).or_default().push(c.id);
            }
        }

        let mut excluded: HashSet<i32> = HashSet::new();
        let mut stack = vec![category_id];
        while let Some(id) = stack.pop() {
            if excluded.insert(id) {
                if let Some(children) = children_of.get(&id) {
                    stack.extend(children);
                }
            }
        }

        Ok(all
            .into_iter()
            .filter(|c| !excluded.contains(&c.id))
            .collect())
    }

    /// Delete is blocked while books or child categories still point at
    /// the category.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: i32) -> Result<(), ServiceError> {
        self.require_category(category_id).await?;

        let child_count = category::Entity::find()
            .filter(category::Column::ParentId.eq(category_id))
            .count(self.db.as_ref())
            .await?;
        if child_count > 0 {
            return Err(ServiceError::Conflict(
                "Category has child categories and cannot be deleted".into(),
            ));
        }

        let book_count = book::Entity::find()
            .filter(book::Column::CategoryId.eq(category_id))
            .count(self.db.as_ref())
            .await?;
        if book_count > 0 {
            return Err(ServiceError::Conflict(
                "Category still contains books and cannot be deleted".into(),
            ));
        }

        category::Entity::delete_by_id(category_id)
            .exec(self.db.as_ref())
            .await?;
        self.event_sender
            .send_or_log(Event::CategoryDeleted(category_id))
            .await;
        Ok(())
    }

    // Users

    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(user::Entity::find()
            .order_by_desc(user::Column::RegisteredAt)
            .all(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self, input))]
    pub async fn update_user(
        &self,
        user_id: i32,
        input: AdminUpdateUserInput,
    ) -> Result<user::Model, ServiceError> {
        input.validate()?;

        let existing = self.require_user(user_id).await?;

        if let Some(username) = &input.username {
            let taken = user::Entity::find()
                .filter(user::Column::Username.eq(username))
                .filter(user::Column::Id.ne(user_id))
                .one(self.db.as_ref())
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Conflict("Username already taken".into()));
            }
        }
        if let Some(email) = &input.email {
            let taken = user::Entity::find()
                .filter(user::Column::Email.eq(email))
                .filter(user::Column::Id.ne(user_id))
                .one(self.db.as_ref())
                .await?
                .is_some();
            if taken {
                return Err(ServiceError::Conflict("Email already registered".into()));
            }
        }
        if let Some(role_id) = input.role_id {
            role::Entity::find_by_id(role_id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Role {} not found", role_id)))?;
        }

        let mut active: user::ActiveModel = existing.into();
        if let Some(username) = input.username {
            active.username = Set(username);
        }
        if let Some(email) = input.email {
            active.email = Set(email);
        }
        if let Some(full_name) = input.full_name {
            active.full_name = Set(Some(full_name));
        }
        if let Some(phone) = input.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(address) = input.address {
            active.address = Set(Some(address));
        }
        if let Some(role_id) = input.role_id {
            active.role_id = Set(role_id);
        }

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Flips the active flag. Admins cannot ban their own account.
    #[instrument(skip(self))]
    pub async fn toggle_ban(
        &self,
        user_id: i32,
        acting_admin_id: i32,
    ) -> Result<user::Model, ServiceError> {
        if user_id == acting_admin_id {
            return Err(ServiceError::InvalidOperation(
                "You cannot ban your own account".into(),
            ));
        }

        let existing = self.require_user(user_id).await?;
        let next_state = !existing.is_active;

        let mut active: user::ActiveModel = existing.into();
        active.is_active = Set(next_state);
        let updated = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::UserBanToggled {
                user_id: updated.id,
                is_active: updated.is_active,
            })
            .await;
        Ok(updated)
    }

    // Orders

    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .order_by_desc(order::Column::OrderDate)
            .all(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn order_detail(&self, order_id: i32) -> Result<OrderView, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        self.orders.order_view(order).await
    }

    #[instrument(skip(self, input))]
    pub async fn update_order_status(
        &self,
        order_id: i32,
        input: UpdateOrderStatusInput,
    ) -> Result<order::Model, ServiceError> {
        let valid = [order_status::PENDING_PAYMENT, order_status::COMPLETED];
        if !valid.contains(&input.status.as_str()) {
            return Err(ServiceError::ValidationError(format!(
                "Unknown order status '{}'",
                input.status
            )));
        }

        let order = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(input.status);
        if let Some(settled) = input.payment_settled {
            active.payment_settled = Set(settled);
        }
        Ok(active.update(self.db.as_ref()).await?)
    }

    // Reviews

    #[instrument(skip(self))]
    pub async fn list_reviews(&self) -> Result<Vec<review::Model>, ServiceError> {
        Ok(review::Entity::find()
            .order_by_desc(review::Column::ReviewDate)
            .all(self.db.as_ref())
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn toggle_review_visibility(
        &self,
        review_id: i32,
    ) -> Result<review::Model, ServiceError> {
        let existing = review::Entity::find_by_id(review_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Review {} not found", review_id)))?;

        let next_state = !existing.is_visible;
        let mut active: review::ActiveModel = existing.into();
        active.is_visible = Set(next_state);
        let updated = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::ReviewVisibilityToggled(updated.id))
            .await;
        Ok(updated)
    }

    // Dashboard

    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<DashboardStats, ServiceError> {
        let total_books = book::Entity::find().count(self.db.as_ref()).await?;
        let total_users = user::Entity::find().count(self.db.as_ref()).await?;
        let total_orders = order::Entity::find().count(self.db.as_ref()).await?;
        let total_downloads = order_detail::Entity::find()
            .filter(order_detail::Column::Downloaded.eq(true))
            .count(self.db.as_ref())
            .await?;

        let mut top_categories: Vec<CategoryBookCount> = category::Entity::find()
            .select_only()
            .column_as(category::Column::Id, "category_id")
            .column(category::Column::Name)
            .column_as(book::Column::Id.count(), "book_count")
            .join(JoinType::LeftJoin, category::Relation::Books.def())
            .group_by(category::Column::Id)
            .group_by(category::Column::Name)
            .into_model::<CategoryBookCount>()
            .all(self.db.as_ref())
            .await?;
        top_categories.sort_by(|a, b| b.book_count.cmp(&a.book_count));
        top_categories.truncate(TOP_CATEGORIES_LIMIT);

        let recent_orders = order::Entity::find()
            .order_by_desc(order::Column::OrderDate)
            .limit(RECENT_ORDERS_LIMIT)
            .all(self.db.as_ref())
            .await?;

        // Month bucketing happens here rather than in SQL so the same
        // query runs on Postgres and SQLite.
        let year = Utc::now().year();
        let downloaded = order_detail::Entity::find()
            .filter(order_detail::Column::Downloaded.eq(true))
            .all(self.db.as_ref())
            .await?;
        let mut monthly_downloads = vec![0i64; 12];
        for line in downloaded {
            if let Some(at) = line.download_date {
                if at.year() == year {
                    monthly_downloads[at.month0() as usize] += 1;
                }
            }
        }

        Ok(DashboardStats {
            total_books,
            total_users,
            total_orders,
            total_downloads,
            top_categories,
            recent_orders,
            monthly_downloads,
        })
    }

    // Lookup helpers

    async fn require_book(&self, book_id: i32) -> Result<book::Model, ServiceError> {
        book::Entity::find_by_id(book_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", book_id)))
    }

    async fn require_category(&self, category_id: i32) -> Result<category::Model, ServiceError> {
        category::Entity::find_by_id(category_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    async fn require_user(&self, user_id: i32) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }
}
