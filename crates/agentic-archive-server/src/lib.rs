//! AgenticArchive HTTP server: rate-limited snapshot creation and metadata lookup.

pub mod config;
pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{router, serve, AppState};
