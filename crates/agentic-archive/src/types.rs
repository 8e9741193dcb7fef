//! Core data types for acquisition requests, extracted records, and errors.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Display format used for the human-readable date fields.
pub const DISPLAY_DATE_FORMAT: &str = "%d %b %Y";

/// Stage of the acquisition state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validating,
    Submitting,
    Fetching,
    Extracting,
    Succeeded,
    Failed,
}

impl Stage {
    /// Whether the state machine stops here.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Succeeded | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Submitting => "submitting",
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an acquisition starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Submit a page to the snapshot service, then fetch and extract.
    Url(String),
    /// The snapshot already exists; fetch and extract only.
    Archive(String),
}

impl Target {
    /// Key used to deduplicate concurrent requests for the same work.
    pub fn dedup_key(&self) -> String {
        match self {
            Target::Url(url) => format!("url:{url}"),
            Target::Archive(id) => format!("archive:{id}"),
        }
    }
}

/// One request travelling through the pipeline.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub target: Target,
    /// Set once submission succeeds, or up front for [`Target::Archive`].
    pub archive_id: Option<String>,
    /// Total network attempts made across all stages.
    pub attempts: u32,
    pub stage: Stage,
    pub created_at: Instant,
    /// Bypass the cache lookup and overwrite the entry.
    pub refresh: bool,
}

impl AcquisitionRequest {
    /// Request a new snapshot of `url`.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self::new(Target::Url(url.into()), None)
    }

    /// Request metadata for an existing snapshot.
    pub fn for_archive(archive_id: impl Into<String>) -> Self {
        let id = archive_id.into();
        Self::new(Target::Archive(id.clone()), Some(id))
    }

    fn new(target: Target, archive_id: Option<String>) -> Self {
        Self {
            target,
            archive_id,
            attempts: 0,
            stage: Stage::Validating,
            created_at: Instant::now(),
            refresh: false,
        }
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// The URL as submitted, when the request started from one.
    pub fn url(&self) -> Option<&str> {
        match &self.target {
            Target::Url(url) => Some(url),
            Target::Archive(_) => None,
        }
    }
}

/// Metadata extracted from a retrieved snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    pub archive_id: String,
    pub original_url: String,
    /// When the snapshot was taken.
    pub archived_at: Option<DateTime<Utc>>,
    /// When the archived content itself was published.
    pub content_published_at: Option<DateTime<Utc>>,
    /// Identifier of the archived item at its source (e.g. a status id).
    pub source_id: Option<String>,
    pub extracted_at: DateTime<Utc>,
    /// Hex SHA-256 of the raw document.
    pub document_hash: String,
}

impl ExtractedRecord {
    /// `archived_at` rendered for display.
    pub fn archive_date(&self) -> Option<String> {
        self.archived_at
            .map(|d| d.format(DISPLAY_DATE_FORMAT).to_string())
    }

    /// `content_published_at` rendered for display.
    pub fn content_date(&self) -> Option<String> {
        self.content_published_at
            .map(|d| d.format(DISPLAY_DATE_FORMAT).to_string())
    }

    pub fn is_source_url(&self) -> bool {
        self.source_id.is_some()
    }
}

/// A terminal failure, as handed to the outcome store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub target: String,
    pub archive_id: Option<String>,
    pub kind: ErrorKind,
    pub stage: Option<Stage>,
    pub attempts: u32,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

/// Serializable classification of [`ArchiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    RateLimitExceeded,
    UpstreamUnavailable,
    ExtractionFailure,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::RateLimitExceeded => "rate_limit_exceeded",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::ExtractionFailure => "extraction_failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the acquisition pipeline.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ArchiveError {
    #[error("Invalid URL: {0}")]
    Validation(String),

    #[error("Rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Upstream unavailable while {stage} after {attempts} attempts: {last_error}")]
    UpstreamUnavailable {
        stage: Stage,
        attempts: u32,
        last_error: String,
    },

    #[error("Could not extract metadata from {archive_id}: {reason}")]
    Extraction { archive_id: String, reason: String },

    #[error("Timed out while {stage} after {}s", elapsed.as_secs())]
    Timeout { stage: Stage, elapsed: Duration },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Validation(_) => ErrorKind::ValidationError,
            ArchiveError::RateLimited { .. } => ErrorKind::RateLimitExceeded,
            ArchiveError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            ArchiveError::Extraction { .. } => ErrorKind::ExtractionFailure,
            ArchiveError::Timeout { .. } => ErrorKind::Timeout,
            ArchiveError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// The pipeline stage the error surfaced from, where one applies.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ArchiveError::Validation(_) => Some(Stage::Validating),
            ArchiveError::UpstreamUnavailable { stage, .. } => Some(*stage),
            ArchiveError::Extraction { .. } => Some(Stage::Extracting),
            ArchiveError::Timeout { stage, .. } => Some(*stage),
            ArchiveError::RateLimited { .. } | ArchiveError::Internal(_) => None,
        }
    }

    /// Whether the orchestrator may try the same stage again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ArchiveError::UpstreamUnavailable { .. })
    }
}

/// Convenience result type.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Parse `raw` as an absolute URL with a scheme and host.
pub fn parse_target_url(raw: &str) -> ArchiveResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ArchiveError::Validation("URL is empty".into()));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| ArchiveError::Validation(format!("{trimmed}: {e}")))?;
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(ArchiveError::Validation(format!("{trimmed}: missing host"))),
    }
}

/// Whether `id` can name a snapshot (a single non-empty path segment).
pub fn is_valid_archive_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_url_rejects_garbage() {
        assert!(matches!(
            parse_target_url("not a url"),
            Err(ArchiveError::Validation(_))
        ));
        assert!(matches!(parse_target_url(""), Err(ArchiveError::Validation(_))));
        assert!(matches!(
            parse_target_url("mailto:someone@example.com"),
            Err(ArchiveError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_target_url_accepts_absolute() {
        let url = parse_target_url("  https://x.com/jack/status/20 ").unwrap();
        assert_eq!(url.host_str(), Some("x.com"));
    }

    #[test]
    fn test_archive_id_shape() {
        assert!(is_valid_archive_id("abc123"));
        assert!(is_valid_archive_id("Xy-z_9"));
        assert!(!is_valid_archive_id(""));
        assert!(!is_valid_archive_id("../etc"));
        assert!(!is_valid_archive_id("a/b"));
    }

    #[test]
    fn test_error_kind_and_stage() {
        let err = ArchiveError::UpstreamUnavailable {
            stage: Stage::Fetching,
            attempts: 3,
            last_error: "HTTP 502".into(),
        };
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert_eq!(err.stage(), Some(Stage::Fetching));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("fetching"));

        let limited = ArchiveError::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        assert_eq!(limited.kind().as_str(), "rate_limit_exceeded");
        assert_eq!(limited.stage(), None);
        assert!(!limited.is_retryable());
    }

    #[test]
    fn test_display_dates() {
        let record = ExtractedRecord {
            archive_id: "abc".into(),
            original_url: "https://x.com/a/status/1".into(),
            archived_at: Some("2024-03-05T10:00:00Z".parse().unwrap()),
            content_published_at: None,
            source_id: Some("1".into()),
            extracted_at: Utc::now(),
            document_hash: String::new(),
        };
        assert_eq!(record.archive_date().as_deref(), Some("05 Mar 2024"));
        assert_eq!(record.content_date(), None);
        assert!(record.is_source_url());
    }

    #[test]
    fn test_request_constructors() {
        let req = AcquisitionRequest::for_archive("abc");
        assert_eq!(req.archive_id.as_deref(), Some("abc"));
        assert_eq!(req.url(), None);
        assert_eq!(req.stage, Stage::Validating);
        assert_eq!(req.target.dedup_key(), "archive:abc");

        let req = AcquisitionRequest::for_url("https://x.com").with_refresh(true);
        assert!(req.refresh);
        assert_eq!(req.url(), Some("https://x.com"));
    }
}
