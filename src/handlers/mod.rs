//! HTTP handlers. Each module exposes a `*_routes()` builder that `crate::api_routes` nests.

pub mod common;
pub mod edit_logs;
pub mod health;
pub mod items;
pub mod neighbors;
pub mod purchases;
pub mod reports;
