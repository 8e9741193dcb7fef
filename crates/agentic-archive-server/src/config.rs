//! Configuration loading and resolution.
//!
//! Each setting resolves as: explicit CLI value > `ARCHIVE_*` environment
//! variable > JSON config file > built-in default.

use std::path::{Path, PathBuf};

use anyhow::Context;

use agentic_archive::ArchiveConfig;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Resolve the listen address.
pub fn resolve_addr(explicit: Option<&str>) -> String {
    if let Some(addr) = explicit {
        return addr.to_string();
    }
    std::env::var("ARCHIVE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string())
}

/// Resolve the outcome ledger path. `None` keeps outcomes in memory.
pub fn resolve_ledger_path(explicit: Option<&str>) -> Option<PathBuf> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var("ARCHIVE_LEDGER").ok())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Load the pipeline configuration: file layer, then environment overrides.
pub fn load_archive_config(explicit_file: Option<&str>) -> anyhow::Result<ArchiveConfig> {
    let file = explicit_file
        .map(str::to_string)
        .or_else(|| std::env::var("ARCHIVE_CONFIG").ok());

    let mut config = match file {
        Some(path) => read_config_file(Path::new(&path))?,
        None => ArchiveConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    Ok(config)
}

pub fn read_config_file(path: &Path) -> anyhow::Result<ArchiveConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

/// Apply `ARCHIVE_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ArchiveConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("ARCHIVE_SUBMIT_ENDPOINT") {
        config.upstream.submit_endpoint = v;
    }
    if let Some(v) = lookup("ARCHIVE_RESULT_BASE") {
        config.upstream.result_base = v;
    }
    if let Some(v) = lookup("ARCHIVE_USER_AGENTS") {
        config.upstream.user_agents = split_list(&v, '|');
    }
    if let Some(v) = lookup("ARCHIVE_ALLOWED_DOMAINS") {
        config.extraction.allowed_domains = split_list(&v, ',');
    }

    override_parsed(&lookup, "ARCHIVE_TIMEOUT_SECS", &mut config.upstream.timeout_secs)?;
    override_parsed(&lookup, "ARCHIVE_PREFLIGHT", &mut config.upstream.preflight)?;
    override_parsed(&lookup, "ARCHIVE_MAX_ATTEMPTS", &mut config.retry.max_attempts)?;
    override_parsed(&lookup, "ARCHIVE_BASE_DELAY_MS", &mut config.retry.base_delay_ms)?;
    override_parsed(&lookup, "ARCHIVE_RATE_WINDOW_SECS", &mut config.rate_limit.window_secs)?;
    override_parsed(&lookup, "ARCHIVE_RATE_MAX_REQUESTS", &mut config.rate_limit.max_requests)?;
    override_parsed(&lookup, "ARCHIVE_CACHE_TTL_SECS", &mut config.cache.ttl_secs)?;
    override_parsed(&lookup, "ARCHIVE_CACHE_MAX_ENTRIES", &mut config.cache.max_entries)?;
    override_parsed(&lookup, "ARCHIVE_CONCURRENCY", &mut config.worker.concurrency)?;
    override_parsed(&lookup, "ARCHIVE_TASK_CEILING_SECS", &mut config.worker.task_ceiling_secs)?;
    Ok(())
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={raw:?}: {e}"))?;
    }
    Ok(())
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
