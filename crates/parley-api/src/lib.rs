//! Parley API crate - axum HTTP front end for the conversational router.
//!
//! Exposes `converse`, the read-only template and subject lookups, and a
//! health check over every configured data source.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
