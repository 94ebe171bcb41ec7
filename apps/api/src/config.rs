use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::ANTHROPIC_API_URL;
use crate::screening::archive::ArchiveLimits;
use crate::screening::evaluator::{RetryPolicy, DEFAULT_MAX_DOCUMENT_CHARS};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub anthropic_api_key: String,
    pub evaluation_api_url: String,
    pub port: u16,
    pub rust_log: String,
    pub evaluation_max_attempts: u32,
    pub evaluation_backoff_ms: u64,
    pub evaluation_concurrency: usize,
    pub evaluation_timeout_secs: u64,
    /// CV text beyond this many characters is cut before evaluation.
    pub evaluation_max_document_chars: usize,
    pub archive_max_entries: usize,
    pub archive_max_uncompressed_bytes: u64,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Config {
            anthropic_api_key: lookup("ANTHROPIC_API_KEY").with_context(|| {
                "Required environment variable 'ANTHROPIC_API_KEY' is not set".to_string()
            })?,
            evaluation_api_url: lookup("EVALUATION_API_URL")
                .unwrap_or_else(|| ANTHROPIC_API_URL.to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            evaluation_max_attempts: parse_or(&lookup, "EVALUATION_MAX_ATTEMPTS", 3)?,
            evaluation_backoff_ms: parse_or(&lookup, "EVALUATION_BACKOFF_MS", 1000)?,
            evaluation_concurrency: parse_or(&lookup, "EVALUATION_CONCURRENCY", 5)?,
            evaluation_timeout_secs: parse_or(&lookup, "EVALUATION_TIMEOUT_SECS", 120)?,
            evaluation_max_document_chars: parse_or(
                &lookup,
                "EVALUATION_MAX_DOCUMENT_CHARS",
                DEFAULT_MAX_DOCUMENT_CHARS,
            )?,
            archive_max_entries: parse_or(&lookup, "ARCHIVE_MAX_ENTRIES", 500)?,
            archive_max_uncompressed_bytes: parse_or(
                &lookup,
                "ARCHIVE_MAX_UNCOMPRESSED_BYTES",
                200 * 1024 * 1024,
            )?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?,
        };

        if config.evaluation_max_attempts == 0 {
            bail!("EVALUATION_MAX_ATTEMPTS must be at least 1");
        }
        if config.evaluation_max_document_chars == 0 {
            bail!("EVALUATION_MAX_DOCUMENT_CHARS must be at least 1");
        }
        if config.evaluation_concurrency == 0 {
            bail!("EVALUATION_CONCURRENCY must be at least 1");
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.evaluation_max_attempts,
            base_delay: Duration::from_millis(self.evaluation_backoff_ms),
        }
    }

    pub fn archive_limits(&self) -> ArchiveLimits {
        ArchiveLimits {
            max_entries: self.archive_max_entries,
            max_uncompressed_bytes: self.archive_max_uncompressed_bytes,
        }
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
