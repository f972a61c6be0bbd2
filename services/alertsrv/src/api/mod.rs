//! HTTP surface of the alert service
//!
//! `/iot/webhook` for devices, `/api/*` for operators and `/health`.

pub mod handlers;
pub mod models;
pub mod routes;

pub use routes::create_router;
