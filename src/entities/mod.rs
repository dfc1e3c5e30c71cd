pub mod book;
pub mod category;
pub mod order;
pub mod order_detail;
pub mod payment_transaction;
pub mod review;
pub mod role;
pub mod user;

/// Serializer for money fields. SQLite round-trips drop trailing
/// zeros, so values are rendered at the DECIMAL(10,2) scale the
/// columns declare ("18" becomes "18.00").
pub mod money {
    use rust_decimal::Decimal;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        let mut rounded = value.round_dp(2);
        rounded.rescale(2);
        serializer.serialize_str(&rounded.to_string())
    }

}

pub use book::Entity as Book;
pub use category::Entity as Category;
pub use order::Entity as Order;
pub use order_detail::Entity as OrderDetail;
pub use payment_transaction::Entity as PaymentTransaction;
pub use review::Entity as Review;
pub use role::Entity as Role;
pub use user::Entity as User;
