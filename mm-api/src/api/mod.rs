//! HTTP API handlers for mm-api

pub mod health;
pub mod products;
pub mod webhook;

pub use health::health_routes;
pub use products::product_routes;
pub use webhook::webhook_routes;
