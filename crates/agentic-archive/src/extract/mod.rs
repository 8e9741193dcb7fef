//! Metadata extraction from retrieved snapshot pages.
//!
//! The document is parsed once with `scraper`. Each field is then resolved
//! by running its ordered [`Strategy`] list until one yields a well-formed
//! value. Only the original URL is mandatory.

pub mod dates;
pub mod source_id;
pub mod strategies;

use chrono::Utc;
use scraper::Html;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::ExtractionConfig;
use crate::types::{ArchiveError, ArchiveResult, ExtractedRecord};

pub use dates::parse_date;
pub use source_id::extract_source_id;
pub use strategies::{
    first_match, Strategy, CONTENT_DATE_STRATEGIES, ORIGINAL_URL_STRATEGIES,
    SNAPSHOT_DATE_STRATEGIES,
};

/// Extracts an [`ExtractedRecord`] from snapshot HTML.
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    allowed_domains: Vec<String>,
}

impl MetadataExtractor {
    /// Accept original URLs on `allowed_domains` (or any http(s) URL when empty).
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().trim_start_matches("www.").to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.allowed_domains.clone())
    }

    /// Extract metadata for `archive_id` from the raw document.
    pub fn extract(&self, archive_id: &str, document: &[u8]) -> ArchiveResult<ExtractedRecord> {
        let html = String::from_utf8_lossy(document);
        let doc = Html::parse_document(&html);

        let (url_strategy, original_url) =
            first_match(ORIGINAL_URL_STRATEGIES, &doc, |raw| self.accept_original_url(raw))
                .ok_or_else(|| ArchiveError::Extraction {
                    archive_id: archive_id.to_string(),
                    reason: "no strategy found an original URL on an allowed domain".to_string(),
                })?;

        let archived = first_match(SNAPSHOT_DATE_STRATEGIES, &doc, parse_date);
        let published = first_match(CONTENT_DATE_STRATEGIES, &doc, parse_date);
        let source_id = extract_source_id(&original_url);

        tracing::debug!(
            archive_id,
            url_strategy,
            archived_strategy = archived.map(|(name, _)| name),
            published_strategy = published.map(|(name, _)| name),
            has_source_id = source_id.is_some(),
            "extracted snapshot metadata"
        );

        Ok(ExtractedRecord {
            archive_id: archive_id.to_string(),
            original_url,
            archived_at: archived.map(|(_, dt)| dt),
            content_published_at: published.map(|(_, dt)| dt),
            source_id,
            extracted_at: Utc::now(),
            document_hash: document_hash(document),
        })
    }

    /// Keep `raw` when it is an absolute http(s) URL on an allowed domain.
    fn accept_original_url(&self, raw: &str) -> Option<String> {
        let url = Url::parse(raw).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        let allowed = self.allowed_domains.is_empty()
            || self
                .allowed_domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{d}")));
        allowed.then(|| raw.to_string())
    }
}

/// Hex SHA-256 of a raw document.
pub fn document_hash(document: &[u8]) -> String {
    hex::encode(Sha256::digest(document))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> MetadataExtractor {
        MetadataExtractor::from_config(&ExtractionConfig::default())
    }

    #[test]
    fn test_full_page() {
        let page = br#"<html><head>
            <meta property="og:url" content="https://twitter.com/jack/status/20">
            <meta property="article:modified_time" content="2024-03-05T10:00:00Z">
        </head><body>
            <time datetime="2006-03-21T20:50:14.000Z">Mar 21, 2006</time>
        </body></html>"#;

        let record = extractor().extract("abc123", page).unwrap();
        assert_eq!(record.archive_id, "abc123");
        assert_eq!(record.original_url, "https://twitter.com/jack/status/20");
        assert_eq!(record.source_id.as_deref(), Some("20"));
        assert_eq!(record.archive_date().as_deref(), Some("05 Mar 2024"));
        assert_eq!(record.content_date().as_deref(), Some("21 Mar 2006"));
        assert_eq!(record.document_hash, document_hash(page));
        assert_eq!(record.document_hash.len(), 64);
    }

    #[test]
    fn test_third_strategy_alone() {
        let page = br#"<html><body>
            <form><input id="originalUrl" value="https://x.com/i/status/777"></form>
        </body></html>"#;
        let record = extractor().extract("q", page).unwrap();
        assert_eq!(record.original_url, "https://x.com/i/status/777");
        assert_eq!(record.source_id.as_deref(), Some("777"));
        assert_eq!(record.archived_at, None);
        assert_eq!(record.content_published_at, None);
    }

    #[test]
    fn test_off_domain_candidate_is_skipped() {
        let page = br#"<html><head>
            <meta property="og:url" content="https://archive.ph/abc123">
            <link rel="canonical" href="https://archive.ph/abc123">
            <meta name="original-url" content="https://x.com/jack/status/20">
        </head></html>"#;
        let record = extractor().extract("abc123", page).unwrap();
        assert_eq!(record.original_url, "https://x.com/jack/status/20");
    }

    #[test]
    fn test_missing_original_url_fails() {
        let page = br#"<html><head>
            <meta property="og:url" content="https://example.com/story">
            <meta name="archive-date" content="2024-01-01T00:00:00Z">
        </head></html>"#;
        let err = extractor().extract("abc", page).unwrap_err();
        match err {
            ArchiveError::Extraction { archive_id, .. } => assert_eq!(archive_id, "abc"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_allow_list_accepts_any_http_url() {
        let page = br#"<link rel="canonical" href="https://example.com/story">"#;
        let record = MetadataExtractor::new(Vec::new()).extract("abc", page).unwrap();
        assert_eq!(record.original_url, "https://example.com/story");
        assert_eq!(record.source_id, None);

        let page = br#"<link rel="canonical" href="javascript:alert(1)">"#;
        assert!(MetadataExtractor::new(Vec::new()).extract("abc", page).is_err());
    }

    #[test]
    fn test_unparseable_date_falls_through() {
        let page = br#"<html><head>
            <meta property="og:url" content="https://x.com/a/status/1">
            <meta property="article:modified_time" content="last tuesday">
            <meta name="archive-date" content="2024-02-03 04:05:06 +0000">
        </head></html>"#;
        let record = extractor().extract("abc", page).unwrap();
        assert_eq!(record.archive_date().as_deref(), Some("03 Feb 2024"));
    }

    #[test]
    fn test_subdomains_of_allowed_hosts() {
        let page = br#"<meta property="og:url" content="https://mobile.twitter.com/a/status/9">"#;
        let record = extractor().extract("abc", page).unwrap();
        assert_eq!(record.source_id.as_deref(), Some("9"));

        let page = br#"<meta property="og:url" content="https://notx.com/a/status/9">"#;
        assert!(extractor().extract("abc", page).is_err());
    }
}
