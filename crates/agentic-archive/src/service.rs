//! The two public operations in front of the pool.
//!
//! Admission is checked separately through [`ArchiveService::admit`] so a
//! transport can reject a client before it reads the request body.

use std::sync::Arc;

use serde::Serialize;

use crate::cache::ResultCache;
use crate::config::ArchiveConfig;
use crate::orchestrator::Orchestrator;
use crate::rate_limit::RateLimiter;
use crate::store::OutcomeStore;
use crate::types::{AcquisitionRequest, ArchiveResult, ExtractedRecord};
use crate::worker::{BatchItem, WorkerPool};

/// Result of a successful `create_archive`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedArchive {
    pub archive_id: String,
    pub archive_url: String,
    /// The URL the caller submitted.
    pub submitted_url: String,
    pub record: ExtractedRecord,
}

/// Point-in-time service counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub cached_records: usize,
    pub in_flight: usize,
    pub tracked_clients: usize,
    pub concurrency: usize,
}

pub struct ArchiveService {
    config: ArchiveConfig,
    limiter: RateLimiter,
    cache: Arc<ResultCache>,
    pool: WorkerPool,
}

impl ArchiveService {
    pub fn new(config: ArchiveConfig, store: Arc<dyn OutcomeStore>) -> ArchiveResult<Self> {
        let cache = Arc::new(ResultCache::from_config(&config.cache));
        let orchestrator = Orchestrator::new(&config, Arc::clone(&cache), store)?;
        let pool = WorkerPool::new(Arc::new(orchestrator));
        tracing::info!(
            submit_endpoint = %config.upstream.submit_endpoint,
            result_base = %config.upstream.result_base,
            concurrency = config.worker.concurrency,
            "archive service ready"
        );
        Ok(Self {
            limiter: RateLimiter::from_config(&config.rate_limit),
            config,
            cache,
            pool,
        })
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Count one request against `client`'s window.
    pub fn admit(&self, client: &str) -> ArchiveResult<()> {
        self.limiter.check(client)
    }

    /// Snapshot `url`, then fetch and extract the result.
    pub async fn create_archive(&self, url: &str) -> ArchiveResult<CreatedArchive> {
        let record = self.pool.run(AcquisitionRequest::for_url(url)).await?;
        Ok(CreatedArchive {
            archive_url: self.config.upstream.result_url(&record.archive_id),
            archive_id: record.archive_id.clone(),
            submitted_url: url.trim().to_string(),
            record,
        })
    }

    /// Metadata for an existing snapshot, from cache unless `refresh` is set.
    pub async fn archive_metadata(
        &self,
        archive_id: &str,
        refresh: bool,
    ) -> ArchiveResult<ExtractedRecord> {
        if !refresh {
            if let Some(record) = self.cache.get(archive_id) {
                tracing::debug!(archive_id, "metadata cache hit");
                return Ok(record);
            }
        }
        self.pool
            .run(AcquisitionRequest::for_archive(archive_id).with_refresh(refresh))
            .await
    }

    /// Queue `urls` for archiving.
    pub fn submit_batch(&self, urls: &[String]) -> Vec<BatchItem> {
        let items = self.pool.submit_batch(urls);
        tracing::info!(count = items.len(), "batch queued");
        items
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            cached_records: self.cache.len(),
            in_flight: self.pool.in_flight(),
            tracked_clients: self.limiter.tracked_clients(),
            concurrency: self.pool.concurrency(),
        }
    }
}
