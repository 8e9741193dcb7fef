//! Snapshot creation: post a URL to the service and read the redirect.
//!
//! Success is signalled only by the redirect chain ending on a snapshot URL
//! (`{resultBase}/{id}` or `{resultBase}/wip/{id}`). Anything else counts as
//! a transient failure and is retried under the stage's [`RetryPolicy`].

use std::sync::Arc;

use tokio::sync::Semaphore;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http_client::{describe_transport_error, UpstreamClient};
use crate::link::ArchiveLink;
use crate::retry::{run_with_retry_gated, Attempt, RetryPolicy};
use crate::types::{parse_target_url, ArchiveError, ArchiveResult, Stage};

/// A snapshot the service agreed to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub archive_id: String,
    pub archive_url: String,
    /// Redirected to the work-in-progress page; the snapshot may not be
    /// servable yet.
    pub pending: bool,
    /// Attempts spent in this stage.
    pub attempts: u32,
}

pub struct ArchiveSubmitter {
    client: UpstreamClient,
    submit_endpoint: Url,
    result_base: Url,
    policy: RetryPolicy,
    preflight: bool,
    gate: Option<Arc<Semaphore>>,
}

impl ArchiveSubmitter {
    pub fn new(
        client: UpstreamClient,
        upstream: &UpstreamConfig,
        policy: RetryPolicy,
    ) -> ArchiveResult<Self> {
        Ok(Self {
            client,
            submit_endpoint: upstream.submit_url()?,
            result_base: upstream.result_base_url()?,
            policy,
            preflight: upstream.preflight,
            gate: None,
        })
    }

    /// Share an upstream concurrency limit; a slot is held per request, not
    /// across backoff.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Submit `url` and return the identifier of the created snapshot.
    pub async fn submit(&self, url: &str) -> ArchiveResult<SubmitOutcome> {
        let target = parse_target_url(url)?;
        if self.preflight {
            self.preflight_check(&target).await?;
        }

        let target = target.as_str();
        let (result, state) = run_with_retry_gated(
            &self.policy,
            Stage::Submitting,
            self.gate.as_deref(),
            move |attempt| async move {
                tracing::debug!(url = target, attempt, "submitting to snapshot service");
                self.attempt(target).await
            },
        )
        .await;

        let (link, attempts) = (result?, state.attempts);
        tracing::info!(
            archive_id = %link.archive_id,
            pending = link.is_wip,
            attempts,
            "snapshot created"
        );
        Ok(SubmitOutcome {
            archive_id: link.archive_id,
            archive_url: link.url,
            pending: link.is_wip,
            attempts,
        })
    }

    async fn attempt(&self, target: &str) -> Attempt<ArchiveLink> {
        let resp = match self
            .client
            .post_form(self.submit_endpoint.as_str(), &[("url", target)])
            .await
        {
            Ok(resp) => resp,
            Err(e) => return Attempt::Transient(describe_transport_error(&e)),
        };

        // Landing on a snapshot URL is success even if that page itself errors.
        if let Some(link) = ArchiveLink::parse(&resp.final_url, &self.result_base) {
            return Attempt::Done(link);
        }
        if !resp.is_success() {
            return Attempt::Transient(format!("HTTP {} from submit endpoint", resp.status));
        }
        if same_location(&resp.final_url, self.submit_endpoint.as_str()) {
            return Attempt::Transient("no redirect after submission".to_string());
        }
        Attempt::Transient(format!(
            "redirected to {} which is not a snapshot URL",
            resp.final_url
        ))
    }

    /// Probe the target itself before asking the service to archive it.
    async fn preflight_check(&self, target: &Url) -> ArchiveResult<()> {
        let _permit = match &self.gate {
            Some(gate) => gate.acquire().await.ok(),
            None => None,
        };
        match self.client.head(target.as_str()).await {
            Ok(status) if (200..400).contains(&status) => Ok(()),
            Ok(status) => Err(ArchiveError::Validation(format!(
                "{target}: preflight returned HTTP {status}"
            ))),
            Err(e) => Err(ArchiveError::Validation(format!(
                "{target}: preflight failed: {}",
                describe_transport_error(&e)
            ))),
        }
    }
}

fn same_location(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}
