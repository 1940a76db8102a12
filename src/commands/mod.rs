pub mod activity;
pub mod analytics;
pub mod auth;
pub mod boxes;
pub mod product;
pub mod user;
