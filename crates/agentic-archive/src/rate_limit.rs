//! Per-client sliding-window admission control.
//!
//! Each client keeps a log of admitted timestamps. Purge, count and record
//! happen under one lock so two concurrent requests from the same client
//! can never both observe spare budget.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::types::{ArchiveError, ArchiveResult};

/// Result of one admission check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Admitted requests inside the window after this check.
    pub current_count: u32,
    pub limit: u32,
    /// Set on rejection: how long the caller should back off.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

struct Windows {
    clients: HashMap<String, VecDeque<Instant>>,
    last_sweep: Option<Instant>,
}

/// Sliding-window rate limiter shared by every worker and route handler.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    state: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            state: Mutex::new(Windows {
                clients: HashMap::new(),
                last_sweep: None,
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.window(), config.max_requests)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Admit or reject a request from `client` now.
    pub fn admit(&self, client: &str) -> bool {
        self.decide_at(client, Instant::now()).allowed
    }

    /// Like [`admit`](Self::admit), surfacing rejection as an error.
    pub fn check(&self, client: &str) -> ArchiveResult<()> {
        let decision = self.decide_at(client, Instant::now());
        if decision.allowed {
            Ok(())
        } else {
            tracing::warn!(client, limit = self.max_requests, "rate limit exceeded");
            Err(ArchiveError::RateLimited {
                retry_after: self.window,
            })
        }
    }

    /// Admission check against an explicit clock reading.
    pub fn decide_at(&self, client: &str, now: Instant) -> RateLimitDecision {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        self.sweep_stale(&mut state, now);

        let cutoff = now.checked_sub(self.window);
        let log = state.clients.entry(client.to_string()).or_default();
        if let Some(cutoff) = cutoff {
            while log.front().is_some_and(|t| *t <= cutoff) {
                log.pop_front();
            }
        }

        let count = log.len() as u32;
        if count >= self.max_requests {
            return RateLimitDecision {
                allowed: false,
                current_count: count,
                limit: self.max_requests,
                retry_after: Some(self.window),
            };
        }

        log.push_back(now);
        RateLimitDecision {
            allowed: true,
            current_count: count + 1,
            limit: self.max_requests,
            retry_after: None,
        }
    }

    /// Drop clients whose newest admission is a full window old.
    ///
    /// Runs at most once per window.
    fn sweep_stale(&self, state: &mut Windows, now: Instant) {
        let due = state
            .last_sweep
            .map_or(true, |last| now.saturating_duration_since(last) >= self.window);
        if !due {
            return;
        }
        state.last_sweep = Some(now);

        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        let before = state.clients.len();
        state
            .clients
            .retain(|_, log| log.back().is_some_and(|t| *t > cutoff));
        let removed = before - state.clients.len();
        if removed > 0 {
            tracing::debug!(removed, "purged idle rate-limit windows");
        }
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        match self.state.lock() {
            Ok(guard) => guard.clients.len(),
            Err(poisoned) => poisoned.into_inner().clients.len(),
        }
    }
}
