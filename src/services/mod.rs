pub mod accounts;
pub mod admin;
pub mod catalog;
pub mod orders;
pub mod reviews;
pub mod storage;

pub use accounts::AccountService;
pub use admin::AdminService;
pub use catalog::CatalogService;
pub use orders::OrderService;
pub use reviews::ReviewService;
pub use storage::StorageService;
