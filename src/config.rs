// ⚙️ Import Configuration
//
// All knobs have defaults; a JSON file can override any subset of them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// RETRY POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles afterwards
    pub initial_backoff_ms: u64,

    /// Upper bound for a single delay
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryPolicy {
    /// Policy without sleeping, handy for tests
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

// ============================================================================
// IMPORT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub retry: RetryPolicy,

    /// Report progress every N rows
    pub progress_interval: usize,

    /// Bytes inspected by the delimiter sniffer
    pub sniff_sample_bytes: usize,

    /// Bytes searched for a tab when sniffing is inconclusive
    pub sniff_fallback_bytes: usize,

    /// Cap on warnings kept by the dry-run diagnostic
    pub max_diagnostic_warnings: usize,

    /// SQLite busy_timeout for the worker connection (0 = fail fast into the retry loop)
    pub busy_timeout_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            retry: RetryPolicy::default(),
            progress_interval: 25,
            sniff_sample_bytes: 4096,
            sniff_fallback_bytes: 65536,
            max_diagnostic_warnings: 50,
            busy_timeout_ms: 0,
        }
    }
}

impl ImportConfig {
    /// Load from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ImportConfig = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(10), Duration::from_millis(2000));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"progress_interval": 10, "retry": {"max_attempts": 2}}"#).unwrap();

        let config = ImportConfig::load(&path).unwrap();

        assert_eq!(config.progress_interval, 10);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 100);
        assert_eq!(config.sniff_sample_bytes, 4096);
    }
}
