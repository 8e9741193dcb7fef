//! AgenticArchive: snapshot submission, retrieval, metadata extraction, and caching.

pub mod cache;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod http_client;
pub mod link;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod service;
pub mod store;
pub mod submit;
pub mod types;
pub mod worker;

pub use cache::ResultCache;
pub use config::ArchiveConfig;
pub use extract::{extract_source_id, parse_date, MetadataExtractor};
pub use link::{is_archive_url, ArchiveLink};
pub use orchestrator::Orchestrator;
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use retry::RetryPolicy;
pub use service::{ArchiveService, CreatedArchive, ServiceStatus};
pub use store::{JsonlStore, MemoryStore, OutcomeStore};
pub use worker::{BatchItem, BatchStatus, WorkerPool};
pub use types::*;
