//! Bounded retry with linear backoff.
//!
//! A stage hands [`run_with_retry`] a closure that performs one attempt and
//! classifies the result as [`Attempt::Done`], [`Attempt::Transient`], or
//! [`Attempt::Fatal`]. Transient outcomes are retried until the policy's
//! attempt cap; the backoff before attempt `n + 1` is `n × base_delay`.
//!
//! [`run_with_retry_gated`] additionally takes a slot from a shared
//! [`Semaphore`] for each attempt and gives it back before backing off, so
//! a request that is only waiting does not hold up the others.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::types::{ArchiveError, ArchiveResult, ErrorKind, Stage};

/// Attempt cap and backoff for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay().saturating_mul(attempt)
    }
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Worth trying again; carries a description of what went wrong.
    Transient(String),
    /// Stop immediately.
    Fatal(ArchiveError),
}

/// Book-keeping for one stage of one request.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_error_kind: Option<ErrorKind>,
    pub next_eligible: Option<Instant>,
}

impl RetryState {
    fn record_transient(&mut self, error: String, policy: &RetryPolicy) -> Duration {
        let delay = policy.delay_for(self.attempts);
        self.last_error = Some(error);
        self.last_error_kind = Some(ErrorKind::UpstreamUnavailable);
        self.next_eligible = Instant::now().checked_add(delay);
        delay
    }

    fn exhausted(&self, policy: &RetryPolicy) -> bool {
        self.attempts >= policy.max_attempts
    }
}

/// Drive `attempt` until it succeeds, fails fatally, or runs out of attempts.
///
/// The closure receives the 1-based attempt number. Exhaustion surfaces as
/// [`ArchiveError::UpstreamUnavailable`] tagged with `stage`.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    stage: Stage,
    attempt: F,
) -> (ArchiveResult<T>, RetryState)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    run_with_retry_gated(policy, stage, None, attempt).await
}

/// Like [`run_with_retry`], holding a `gate` permit only while an attempt
/// is in progress.
pub async fn run_with_retry_gated<T, F, Fut>(
    policy: &RetryPolicy,
    stage: Stage,
    gate: Option<&Semaphore>,
    mut attempt: F,
) -> (ArchiveResult<T>, RetryState)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    let mut state = RetryState::default();

    loop {
        state.attempts += 1;
        let outcome = {
            // The gate is never closed.
            let _permit = match gate {
                Some(gate) => gate.acquire().await.ok(),
                None => None,
            };
            attempt(state.attempts).await
        };
        match outcome {
            Attempt::Done(value) => return (Ok(value), state),
            Attempt::Fatal(err) => {
                state.last_error_kind = Some(err.kind());
                state.last_error = Some(err.to_string());
                return (Err(err), state);
            }
            Attempt::Transient(error) => {
                tracing::debug!(%stage, attempt = state.attempts, %error, "transient upstream failure");
                let exhausted = state.exhausted(policy);
                let delay = state.record_transient(error, policy);
                if exhausted {
                    let err = ArchiveError::UpstreamUnavailable {
                        stage,
                        attempts: state.attempts,
                        last_error: state.last_error.clone().unwrap_or_default(),
                    };
                    return (Err(err), state);
                }
                tracing::warn!(
                    %stage,
                    attempt = state.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
