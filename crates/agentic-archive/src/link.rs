//! Recognizing and splitting snapshot URLs.

use url::Url;

use crate::types::is_valid_archive_id;

/// Public mirrors of the default snapshot service.
pub const KNOWN_ARCHIVE_HOSTS: &[&str] = &["archive.ph", "archive.is", "archive.today", "archive.fo"];

/// A snapshot URL split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLink {
    pub archive_id: String,
    pub host: String,
    /// The service is still producing the snapshot (`/wip/{id}`).
    pub is_wip: bool,
    pub url: String,
}

impl ArchiveLink {
    /// Parse `candidate` as a snapshot URL served under `result_base`.
    ///
    /// The candidate must share the base's host and port, and its path below
    /// the base must be `{id}` or `wip/{id}`. The identifier is the final
    /// path segment.
    pub fn parse(candidate: &str, result_base: &Url) -> Option<Self> {
        let url = Url::parse(candidate).ok()?;
        let host = url.host_str()?;
        if !host.eq_ignore_ascii_case(result_base.host_str()?)
            || url.port_or_known_default() != result_base.port_or_known_default()
        {
            return None;
        }

        let base_path = result_base.path().trim_end_matches('/');
        let rest = url.path().strip_prefix(base_path)?.trim_matches('/');
        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();

        let (archive_id, is_wip) = match segments.as_slice() {
            [id] => (*id, false),
            ["wip", id] => (*id, true),
            _ => return None,
        };
        if archive_id == "submit" || archive_id == "wip" || !is_valid_archive_id(archive_id) {
            return None;
        }

        Some(Self {
            archive_id: archive_id.to_string(),
            host: host.to_string(),
            is_wip,
            url: url.to_string(),
        })
    }
}

/// Whether `url` points at a snapshot service, either a known mirror or one
/// of `extra_hosts`.
pub fn is_archive_url(url: &str, extra_hosts: &[&str]) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    KNOWN_ARCHIVE_HOSTS
        .iter()
        .chain(extra_hosts.iter())
        .any(|known| host == *known || host.ends_with(&format!(".{known}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_plain_identifier() {
        let link = ArchiveLink::parse("https://archive.example/abc123", &base("https://archive.example"))
            .unwrap();
        assert_eq!(link.archive_id, "abc123");
        assert_eq!(link.host, "archive.example");
        assert!(!link.is_wip);
    }

    #[test]
    fn test_parse_wip_identifier() {
        let link =
            ArchiveLink::parse("https://archive.ph/wip/Zx9Q1", &base("https://archive.ph")).unwrap();
        assert_eq!(link.archive_id, "Zx9Q1");
        assert!(link.is_wip);
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        let b = base("https://archive.ph");
        assert!(ArchiveLink::parse("https://archive.ph/", &b).is_none());
        assert!(ArchiveLink::parse("https://archive.ph/submit/", &b).is_none());
        assert!(ArchiveLink::parse("https://archive.ph/a/b/c", &b).is_none());
        assert!(ArchiveLink::parse("https://elsewhere.example/abc", &b).is_none());
        assert!(ArchiveLink::parse("http://archive.ph:8080/abc", &b).is_none());
    }

    #[test]
    fn test_parse_respects_base_path() {
        let b = base("http://127.0.0.1:4000/snapshots");
        let link = ArchiveLink::parse("http://127.0.0.1:4000/snapshots/abc", &b).unwrap();
        assert_eq!(link.archive_id, "abc");
        assert!(ArchiveLink::parse("http://127.0.0.1:4000/abc", &b).is_none());
    }

    #[test]
    fn test_is_archive_url() {
        assert!(is_archive_url("https://archive.today/abc", &[]));
        assert!(is_archive_url("https://www.archive.is/abc", &[]));
        assert!(is_archive_url("https://snap.example/abc", &["snap.example"]));
        assert!(!is_archive_url("https://x.com/jack/status/20", &[]));
        assert!(!is_archive_url("garbage", &[]));
    }
}
