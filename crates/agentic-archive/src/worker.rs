//! Bounded worker pool with in-flight deduplication.
//!
//! Every accepted request runs on its own tokio task, so a caller going away
//! never cancels work already started. The [`Orchestrator`] bounds how many
//! upstream requests are in flight at once; a run backing off between
//! attempts does not count against that bound. Requests with the same
//! [`Target::dedup_key`](crate::types::Target::dedup_key) share one run
//! while it is in flight.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;

use crate::orchestrator::Orchestrator;
use crate::types::{parse_target_url, AcquisitionRequest, ArchiveError, ArchiveResult, ExtractedRecord};

type SharedRun = Shared<BoxFuture<'static, ArchiveResult<ExtractedRecord>>>;

/// What happened to one URL of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Dispatched to the pool.
    Queued,
    /// Already in flight; no new work started.
    Duplicate,
    /// Failed validation.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub url: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct WorkerPool {
    orchestrator: Arc<Orchestrator>,
    in_flight: Arc<Mutex<HashMap<String, SharedRun>>>,
}

impl WorkerPool {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.orchestrator.concurrency()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Number of distinct requests currently queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run `request` and wait for its outcome.
    pub async fn run(&self, request: AcquisitionRequest) -> ArchiveResult<ExtractedRecord> {
        self.dispatch(request).0.await
    }

    /// Dispatch every valid URL without waiting for the results.
    pub fn submit_batch(&self, urls: &[String]) -> Vec<BatchItem> {
        let mut seen = HashSet::new();
        urls.iter()
            .map(|url| {
                if let Err(e) = parse_target_url(url) {
                    return BatchItem {
                        url: url.clone(),
                        status: BatchStatus::Rejected,
                        error: Some(e.to_string()),
                    };
                }
                let (_, joined) = self.dispatch(AcquisitionRequest::for_url(url.as_str()));
                let status = if joined || !seen.insert(url.as_str()) {
                    BatchStatus::Duplicate
                } else {
                    BatchStatus::Queued
                };
                BatchItem {
                    url: url.clone(),
                    status,
                    error: None,
                }
            })
            .collect()
    }

    /// Start `request`, or join the identical run already in flight.
    ///
    /// Returns the shared outcome and whether an existing run was joined.
    fn dispatch(&self, request: AcquisitionRequest) -> (SharedRun, bool) {
        let key = request.target.dedup_key();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = in_flight.get(&key) {
            tracing::debug!(key, "joining in-flight request");
            return (existing.clone(), true);
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let registry = Arc::clone(&self.in_flight);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let outcome = orchestrator.run(request).await;
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&task_key);
            outcome
        });

        let run: SharedRun = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(ArchiveError::Internal(format!("worker task failed: {e}"))),
            }
        }
        .boxed()
        .shared();
        in_flight.insert(key, run.clone());
        (run, false)
    }
}
