//! The acquisition state machine.
//!
//! ```text
//! Validating ─► Submitting ─► Fetching ─► Extracting ─► Succeeded
//!     │              │            │            │
//!     └──────────────┴────────────┴────────────┴──────► Failed
//! ```
//!
//! Submitting and Fetching retry transient upstream failures under their own
//! [`RetryPolicy`](crate::retry::RetryPolicy); Extracting runs once. The
//! whole run is bounded by a wall-clock ceiling. Whatever the outcome, the
//! request reaches the [`OutcomeStore`] exactly once.
//!
//! Upstream requests from all runs share one concurrency gate sized by
//! `worker.concurrency`. A run only holds a slot while a request is in
//! flight, never while it sleeps between attempts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::cache::ResultCache;
use crate::config::ArchiveConfig;
use crate::extract::MetadataExtractor;
use crate::fetch::ArchiveFetcher;
use crate::http_client::UpstreamClient;
use crate::store::OutcomeStore;
use crate::submit::ArchiveSubmitter;
use crate::types::{
    is_valid_archive_id, parse_target_url, AcquisitionRequest, ArchiveError, ArchiveResult,
    ExtractedRecord, FailureRecord, Stage, Target,
};

/// Drives one [`AcquisitionRequest`] to a terminal state.
pub struct Orchestrator {
    submitter: ArchiveSubmitter,
    fetcher: ArchiveFetcher,
    extractor: MetadataExtractor,
    cache: Arc<ResultCache>,
    store: Arc<dyn OutcomeStore>,
    task_ceiling: Duration,
    concurrency: usize,
}

/// How a successful run obtained its record.
struct Success {
    record: ExtractedRecord,
    from_cache: bool,
}

impl Orchestrator {
    pub fn new(
        config: &ArchiveConfig,
        cache: Arc<ResultCache>,
        store: Arc<dyn OutcomeStore>,
    ) -> ArchiveResult<Self> {
        config.validate()?;
        let client = UpstreamClient::from_config(&config.upstream);
        let concurrency = config.worker.concurrency.max(1);
        let gate = Arc::new(Semaphore::new(concurrency));
        Ok(Self {
            submitter: ArchiveSubmitter::new(
                client.clone(),
                &config.upstream,
                config.retry.clone(),
            )?
            .with_gate(gate.clone()),
            fetcher: ArchiveFetcher::new(client, config.upstream.clone(), config.retry.clone())
                .with_gate(gate),
            extractor: MetadataExtractor::from_config(&config.extraction),
            cache,
            store,
            task_ceiling: config.worker.task_ceiling(),
            concurrency,
        })
    }

    /// Maximum number of upstream requests in flight at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Override the wall-clock ceiling.
    pub fn with_task_ceiling(mut self, ceiling: Duration) -> Self {
        self.task_ceiling = ceiling;
        self
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Run `request` to completion and report its single terminal outcome.
    pub async fn run(&self, mut request: AcquisitionRequest) -> ArchiveResult<ExtractedRecord> {
        let timed = tokio::time::timeout(self.task_ceiling, self.drive(&mut request)).await;
        let outcome = match timed {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    target_key = %request.target.dedup_key(),
                    stage = %request.stage,
                    ceiling_secs = self.task_ceiling.as_secs(),
                    "acquisition exceeded wall-clock ceiling"
                );
                Err(ArchiveError::Timeout {
                    stage: request.stage,
                    elapsed: self.task_ceiling,
                })
            }
        };
        self.finish(request, outcome).await
    }

    async fn drive(&self, request: &mut AcquisitionRequest) -> ArchiveResult<Success> {
        loop {
            match request.stage {
                Stage::Validating => {
                    let next = self.validate(request)?;
                    transition(request, next);
                }
                Stage::Submitting => {
                    let url = request.url().unwrap_or_default().to_string();
                    let outcome = self
                        .submitter
                        .submit(&url)
                        .await
                        .inspect_err(|e| count_attempts(request, e))?;
                    request.attempts += outcome.attempts;
                    request.archive_id = Some(outcome.archive_id);
                    transition(request, Stage::Fetching);
                }
                Stage::Fetching => {
                    let archive_id = self.archive_id(request)?;
                    if !request.refresh {
                        if let Some(record) = self.cache.get(&archive_id) {
                            tracing::debug!(archive_id, "served from cache");
                            transition(request, Stage::Succeeded);
                            return Ok(Success {
                                record,
                                from_cache: true,
                            });
                        }
                    }
                    let document = self
                        .fetcher
                        .fetch(&archive_id)
                        .await
                        .inspect_err(|e| count_attempts(request, e))?;
                    request.attempts += document.attempts;
                    transition(request, Stage::Extracting);

                    let record = self.extractor.extract(&archive_id, &document.body)?;
                    self.cache.insert(&archive_id, record.clone());
                    transition(request, Stage::Succeeded);
                    return Ok(Success {
                        record,
                        from_cache: false,
                    });
                }
                Stage::Extracting | Stage::Succeeded | Stage::Failed => {
                    return Err(ArchiveError::Internal(format!(
                        "acquisition resumed in unexpected stage {}",
                        request.stage
                    )));
                }
            }
        }
    }

    /// Decide where a fresh request starts.
    fn validate(&self, request: &AcquisitionRequest) -> ArchiveResult<Stage> {
        match &request.target {
            Target::Url(url) => {
                parse_target_url(url)?;
                Ok(Stage::Submitting)
            }
            Target::Archive(id) if is_valid_archive_id(id) => Ok(Stage::Fetching),
            Target::Archive(id) => Err(ArchiveError::Validation(format!(
                "invalid archive identifier: {id:?}"
            ))),
        }
    }

    fn archive_id(&self, request: &AcquisitionRequest) -> ArchiveResult<String> {
        request
            .archive_id
            .clone()
            .ok_or_else(|| ArchiveError::Internal("fetching without an archive identifier".into()))
    }

    async fn finish(
        &self,
        mut request: AcquisitionRequest,
        outcome: ArchiveResult<Success>,
    ) -> ArchiveResult<ExtractedRecord> {
        match outcome {
            Ok(Success { record, from_cache }) => {
                request.stage = Stage::Succeeded;
                tracing::info!(
                    archive_id = %record.archive_id,
                    attempts = request.attempts,
                    from_cache,
                    elapsed_ms = request.created_at.elapsed().as_millis() as u64,
                    "acquisition succeeded"
                );
                if !from_cache {
                    if let Err(e) = self.store.record_success(&record).await {
                        tracing::error!("failed to record success: {e}");
                    }
                }
                Ok(record)
            }
            Err(err) => {
                let failed_stage = err.stage().unwrap_or(request.stage);
                request.stage = Stage::Failed;
                let failure = FailureRecord {
                    target: match &request.target {
                        Target::Url(url) => url.clone(),
                        Target::Archive(id) => id.clone(),
                    },
                    archive_id: request.archive_id.clone(),
                    kind: err.kind(),
                    stage: Some(failed_stage),
                    attempts: request.attempts,
                    error_message: err.to_string(),
                    failed_at: Utc::now(),
                };
                tracing::error!(
                    target_key = %request.target.dedup_key(),
                    stage = %failed_stage,
                    kind = %failure.kind,
                    attempts = request.attempts,
                    "acquisition failed: {err}"
                );
                if let Err(e) = self.store.record_failure(&failure).await {
                    tracing::error!("failed to record failure: {e}");
                }
                Err(err)
            }
        }
    }
}

fn transition(request: &mut AcquisitionRequest, next: Stage) {
    tracing::debug!(from = %request.stage, to = %next, "stage transition");
    request.stage = next;
}

fn count_attempts(request: &mut AcquisitionRequest, err: &ArchiveError) {
    if let ArchiveError::UpstreamUnavailable { attempts, .. } = err {
        request.attempts += attempts;
    }
}
