//! Snapshot retrieval by identifier.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::UpstreamConfig;
use crate::http_client::{describe_transport_error, UpstreamClient};
use crate::retry::{run_with_retry_gated, Attempt, RetryPolicy};
use crate::types::{is_valid_archive_id, ArchiveError, ArchiveResult, Stage};

/// A retrieved snapshot document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub archive_id: String,
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
    /// Attempts spent in this stage.
    pub attempts: u32,
}

pub struct ArchiveFetcher {
    client: UpstreamClient,
    upstream: UpstreamConfig,
    policy: RetryPolicy,
    gate: Option<Arc<Semaphore>>,
}

impl ArchiveFetcher {
    pub fn new(client: UpstreamClient, upstream: UpstreamConfig, policy: RetryPolicy) -> Self {
        Self {
            client,
            upstream,
            policy,
            gate: None,
        }
    }

    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// GET `{resultBase}/{archive_id}`, retrying non-2xx and transport errors.
    pub async fn fetch(&self, archive_id: &str) -> ArchiveResult<FetchedDocument> {
        if !is_valid_archive_id(archive_id) {
            return Err(ArchiveError::Validation(format!(
                "invalid archive identifier: {archive_id:?}"
            )));
        }
        let url = self.upstream.result_url(archive_id);
        let target = url.as_str();

        let (result, state) = run_with_retry_gated(
            &self.policy,
            Stage::Fetching,
            self.gate.as_deref(),
            move |attempt| async move {
                tracing::debug!(url = target, attempt, "fetching snapshot");
                match self.client.get(target).await {
                    Ok(resp) if resp.is_success() => Attempt::Done(resp),
                    Ok(resp) => Attempt::Transient(format!("HTTP {} from {}", resp.status, target)),
                    Err(e) => Attempt::Transient(describe_transport_error(&e)),
                }
            },
        )
        .await;

        let resp = result?;
        tracing::debug!(
            archive_id,
            bytes = resp.body.len(),
            attempts = state.attempts,
            "snapshot fetched"
        );
        Ok(FetchedDocument {
            archive_id: archive_id.to_string(),
            url: resp.final_url,
            status: resp.status,
            body: resp.body,
            attempts: state.attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer, max_attempts: u32) -> ArchiveFetcher {
        let upstream = UpstreamConfig {
            result_base: server.uri(),
            timeout_secs: 5,
            ..UpstreamConfig::default()
        };
        ArchiveFetcher::new(
            UpstreamClient::from_config(&upstream),
            upstream,
            RetryPolicy::new(max_attempts, Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>snap</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let doc = fetcher_for(&server, 3).fetch("abc123").await.unwrap();
        assert_eq!(doc.archive_id, "abc123");
        assert_eq!(doc.body, b"<html>snap</html>");
        assert_eq!(doc.attempts, 1);
    }

    #[tokio::test]
    async fn test_fetch_gives_up_on_persistent_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 3).fetch("gone").await.unwrap_err();
        match err {
            ArchiveError::UpstreamUnavailable {
                stage,
                attempts,
                last_error,
            } => {
                assert_eq!(stage, Stage::Fetching);
                assert_eq!(attempts, 3);
                assert!(last_error.contains("HTTP 502"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_recovers_after_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let doc = fetcher_for(&server, 3).fetch("flaky").await.unwrap();
        assert_eq!(doc.attempts, 2);
        assert_eq!(doc.body, b"ok");
    }

    #[tokio::test]
    async fn test_fetch_rejects_path_traversal() {
        let server = MockServer::start().await;
        let err = fetcher_for(&server, 3).fetch("../admin").await.unwrap_err();
        assert!(matches!(err, ArchiveError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fetch_unreachable_upstream_is_retried() {
        // A released server either refuses the connection or answers 404;
        // both must be retried.
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let upstream = UpstreamConfig {
            result_base: uri,
            timeout_secs: 1,
            ..UpstreamConfig::default()
        };
        let fetcher = ArchiveFetcher::new(
            UpstreamClient::from_config(&upstream),
            upstream,
            RetryPolicy::new(2, Duration::from_millis(1)),
        );
        let err = fetcher.fetch("abc").await.unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::UpstreamUnavailable { attempts: 2, .. }
        ));
    }
}
