use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use tracing::{info, instrument};

use crate::entities::{book, order, order_detail, payment_transaction};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Order status labels. An order is created `pending_payment` and moves
/// to `completed` once the (stub) payment settles.
pub mod order_status {
    pub const PENDING_PAYMENT: &str = "pending_payment";
    pub const COMPLETED: &str = "completed";
}

/// Payment transaction status labels.
pub mod transaction_status {
    pub const PROCESSING: &str = "processing";
    pub const SUCCESS: &str = "success";
}

const CODE_LENGTH: usize = 12;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Customer-facing payment reference, 12 uppercase alphanumerics.
pub fn transaction_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug)]
pub enum PurchaseOutcome {
    /// A new order was created and settled.
    Completed {
        order: order::Model,
        transaction_code: String,
    },
    /// The caller already holds a settled copy; nothing was written.
    AlreadyPurchased { order_detail_id: i32 },
}

#[derive(Debug)]
pub struct OrderView {
    pub order: order::Model,
    pub lines: Vec<(order_detail::Model, Option<book::Model>)>,
    pub transactions: Vec<payment_transaction::Model>,
}

/// Checkout, download gating and order history.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Buys a single book. All rows for a purchase are written inside one
    /// transaction, so an order is either fully settled or absent.
    ///
    /// The payment step is a stub that always succeeds synchronously;
    /// the `pending_payment`/`processing` rows exist so a real gateway
    /// can be slotted in without a schema change.
    #[instrument(skip(self))]
    pub async fn purchase(
        &self,
        user_id: i32,
        book_id: i32,
        payment_method: Option<String>,
    ) -> Result<PurchaseOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let book = book::Entity::find_by_id(book_id)
            .one(&txn)
            .await?
            .filter(|b| b.is_active)
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", book_id)))?;

        if let Some(existing) = settled_line(&txn, user_id, book_id).await? {
            txn.commit().await?;
            return Ok(PurchaseOutcome::AlreadyPurchased {
                order_detail_id: existing.id,
            });
        }

        let method = payment_method.unwrap_or_else(|| "balance".to_string());
        let now = Utc::now();

        let new_order = order::ActiveModel {
            user_id: Set(user_id),
            order_date: Set(now),
            total_amount: Set(book.price),
            payment_method: Set(Some(method.clone())),
            payment_settled: Set(false),
            status: Set(order_status::PENDING_PAYMENT.to_string()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        order_detail::ActiveModel {
            order_id: Set(new_order.id),
            book_id: Set(book.id),
            price: Set(book.price),
            downloaded: Set(false),
            download_date: Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let code = transaction_code();
        let txn_row = payment_transaction::ActiveModel {
            order_id: Set(new_order.id),
            amount: Set(book.price),
            method: Set(method),
            transaction_date: Set(now),
            code: Set(code.clone()),
            status: Set(transaction_status::PROCESSING.to_string()),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        // Stub gateway settles immediately.
        let mut settle_order: order::ActiveModel = new_order.into();
        settle_order.payment_settled = Set(true);
        settle_order.status = Set(order_status::COMPLETED.to_string());
        let order = settle_order.update(&txn).await?;

        let mut settle_txn: payment_transaction::ActiveModel = txn_row.into();
        settle_txn.status = Set(transaction_status::SUCCESS.to_string());
        settle_txn.update(&txn).await?;

        txn.commit().await?;

        info!(order_id = order.id, user_id, book_id, "purchase completed");
        self.event_sender
            .send_or_log(Event::OrderCompleted {
                order_id: order.id,
                user_id,
            })
            .await;

        Ok(PurchaseOutcome::Completed {
            order,
            transaction_code: code,
        })
    }

    /// Resolves a line item to its downloadable file URL. Only the order's
    /// owner or an admin may download, and only once payment has settled.
    /// Repeat downloads are allowed; the timestamp is overwritten.
    #[instrument(skip(self))]
    pub async fn download(
        &self,
        order_detail_id: i32,
        requester_id: i32,
        requester_is_admin: bool,
    ) -> Result<String, ServiceError> {
        let detail = order_detail::Entity::find_by_id(order_detail_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order line {} not found", order_detail_id))
            })?;

        let order = order::Entity::find_by_id(detail.order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", detail.order_id))
            })?;

        if order.user_id != requester_id && !requester_is_admin {
            return Err(ServiceError::Forbidden(
                "You do not own this purchase".into(),
            ));
        }
        if !order.payment_settled {
            return Err(ServiceError::Forbidden(
                "Payment has not settled for this order".into(),
            ));
        }

        let book = book::Entity::find_by_id(detail.book_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Book {} not found", detail.book_id)))?;

        let book_id = detail.book_id;
        let mut active: order_detail::ActiveModel = detail.into();
        active.downloaded = Set(true);
        active.download_date = Set(Some(Utc::now()));
        let detail = active.update(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::BookDownloaded {
                order_detail_id: detail.id,
                book_id,
            })
            .await;

        Ok(book.file_url)
    }

    /// The caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn user_orders(&self, user_id: i32) -> Result<Vec<order::Model>, ServiceError> {
        Ok(order::Entity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::OrderDate)
            .all(self.db.as_ref())
            .await?)
    }

    /// Full order view with lines and payment transactions. Owner or
    /// admin only.
    #[instrument(skip(self))]
    pub async fn order_with_lines(
        &self,
        order_id: i32,
        requester_id: i32,
        requester_is_admin: bool,
    ) -> Result<OrderView, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.user_id != requester_id && !requester_is_admin {
            return Err(ServiceError::Forbidden(
                "You do not own this order".into(),
            ));
        }

        self.order_view(order).await
    }

    pub(crate) async fn order_view(&self, order: order::Model) -> Result<OrderView, ServiceError> {
        let lines = order_detail::Entity::find()
            .filter(order_detail::Column::OrderId.eq(order.id))
            .find_also_related(book::Entity)
            .all(self.db.as_ref())
            .await?;

        let transactions = payment_transaction::Entity::find()
            .filter(payment_transaction::Column::OrderId.eq(order.id))
            .order_by_desc(payment_transaction::Column::TransactionDate)
            .all(self.db.as_ref())
            .await?;

        Ok(OrderView {
            order,
            lines,
            transactions,
        })
    }

    /// Settled line items for the caller's profile page, newest order
    /// first.
    #[instrument(skip(self))]
    pub async fn recent_purchases(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<(order_detail::Model, Option<book::Model>)>, ServiceError> {
        Ok(order_detail::Entity::find()
            .join(JoinType::InnerJoin, order_detail::Relation::Order.def())
            .filter(order::Column::UserId.eq(user_id))
            .filter(order::Column::PaymentSettled.eq(true))
            .order_by_desc(order::Column::OrderDate)
            .limit(limit)
            .find_also_related(book::Entity)
            .all(self.db.as_ref())
            .await?)
    }
}

/// Finds the caller's settled line item for a book, if any.
async fn settled_line<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    book_id: i32,
) -> Result<Option<order_detail::Model>, ServiceError> {
    Ok(order_detail::Entity::find()
        .join(JoinType::InnerJoin, order_detail::Relation::Order.def())
        .filter(order::Column::UserId.eq(user_id))
        .filter(order::Column::PaymentSettled.eq(true))
        .filter(order_detail::Column::BookId.eq(book_id))
        .one(conn)
        .await?)
}
