//! Pipeline configuration with built-in defaults.
//!
//! Durations are stored as plain integers (`*_secs` / `*_ms`) so a config
//! file stays readable; accessors hand out [`Duration`]s.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::retry::RetryPolicy;
use crate::types::{ArchiveError, ArchiveResult};

/// Identity headers rotated across upstream attempts.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
];

/// Longest accepted cache TTL (ten years).
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 86_400;

/// Longest accepted base retry delay (one hour).
pub const MAX_BASE_DELAY_MS: u64 = 3_600_000;

/// Top-level configuration for the acquisition pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub upstream: UpstreamConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub extraction: ExtractionConfig,
    pub worker: WorkerConfig,
}

impl ArchiveConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> ArchiveResult<()> {
        self.upstream.submit_url()?;
        self.upstream.result_base_url()?;
        if self.upstream.user_agents.is_empty() {
            return Err(invalid("upstream.user_agents must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.base_delay_ms > MAX_BASE_DELAY_MS {
            return Err(invalid("retry.base_delay_ms must be at most one hour"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit.window_secs must be at least 1"));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(invalid("rate_limit.max_requests must be at least 1"));
        }
        if self.cache.max_entries == 0 {
            return Err(invalid("cache.max_entries must be at least 1"));
        }
        if self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(invalid("cache.ttl_secs must be at most ten years"));
        }
        if self.worker.concurrency == 0 {
            return Err(invalid("worker.concurrency must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ArchiveError {
    ArchiveError::Internal(format!("invalid configuration: {msg}"))
}

/// Where the snapshot service lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Form endpoint that accepts `url=` submissions.
    pub submit_endpoint: String,
    /// Base URL that snapshots are served under (`{base}/{id}`).
    pub result_base: String,
    pub timeout_secs: u64,
    pub user_agents: Vec<String>,
    /// Probe the target with `HEAD` before submitting it.
    pub preflight: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            submit_endpoint: "https://archive.ph/submit/".to_string(),
            result_base: "https://archive.ph".to_string(),
            timeout_secs: 30,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            preflight: false,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn submit_url(&self) -> ArchiveResult<Url> {
        Url::parse(&self.submit_endpoint)
            .map_err(|e| invalid(&format!("upstream.submit_endpoint: {e}")))
    }

    pub fn result_base_url(&self) -> ArchiveResult<Url> {
        let url = Url::parse(&self.result_base)
            .map_err(|e| invalid(&format!("upstream.result_base: {e}")))?;
        if url.host_str().is_none() {
            return Err(invalid("upstream.result_base has no host"));
        }
        Ok(url)
    }

    /// URL a snapshot with this identifier is served from.
    pub fn result_url(&self, archive_id: &str) -> String {
        format!("{}/{}", self.result_base.trim_end_matches('/'), archive_id)
    }
}

/// Sliding-window admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Hosts an original URL may belong to. Empty accepts any http(s) URL.
    pub allowed_domains: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["twitter.com".to_string(), "x.com".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Requests running at once.
    pub concurrency: usize,
    /// Absolute wall-clock ceiling per request.
    pub task_ceiling_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            task_ceiling_secs: 60 * 60,
        }
    }
}

impl WorkerConfig {
    pub fn task_ceiling(&self) -> Duration {
        Duration::from_secs(self.task_ceiling_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limit.max_requests, 30);
        assert_eq!(config.cache.ttl(), Duration::from_secs(86_400));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.upstream.timeout(), Duration::from_secs(30));
        assert_eq!(config.worker.task_ceiling(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ArchiveConfig =
            serde_json::from_str(r#"{"rate_limit": {"max_requests": 5}}"#).unwrap();
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.upstream.result_base, "https://archive.ph");
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut config = ArchiveConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ArchiveConfig::default();
        config.upstream.result_base = "not a url".into();
        assert!(config.validate().is_err());

        let mut config = ArchiveConfig::default();
        config.worker.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_durations() {
        let mut config = ArchiveConfig::default();
        config.cache.ttl_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = ArchiveConfig::default();
        config.retry.base_delay_ms = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = ArchiveConfig::default();
        config.cache.ttl_secs = MAX_CACHE_TTL_SECS;
        config.retry.base_delay_ms = MAX_BASE_DELAY_MS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_result_url_trims_slash() {
        let mut upstream = UpstreamConfig::default();
        upstream.result_base = "https://archive.example/".into();
        assert_eq!(upstream.result_url("abc123"), "https://archive.example/abc123");
    }
}
