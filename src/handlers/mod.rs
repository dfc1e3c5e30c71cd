pub mod admin;
pub mod auth;
pub mod catalog;
pub mod common;
pub mod orders;
pub mod reviews;
