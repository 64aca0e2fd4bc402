//! Timing configuration shared by the schedulers.
//!
//! [`TimingConfig`] controls how long a worker thread may block in a single
//! wait before it re-checks its cancellation and pause flags, and how worker
//! threads are named.  Defaults are provided via [`Default`]; a builder-style
//! API and TOML loading are available for callers that need to override them.
//!
//! ```toml
//! wait_slice_ms = 25
//! thread_name = "billing"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{KernelError, Result};

/// Default wait slice, in milliseconds.
pub const DEFAULT_WAIT_SLICE_MS: u64 = 50;

/// Timing knobs for scheduler worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Longest single blocking wait inside a worker.
    ///
    /// This bounds the latency of `cancel()`, `pause()` and `resume()` even
    /// if a wake-up notification is missed.
    ///
    /// Default: **50 ms**.
    pub wait_slice: Duration,

    /// Prefix for worker thread names (`"{thread_name}-{scheduler}"`).
    ///
    /// Default: **"cadence"**.
    pub thread_name: String,
}

/// On-disk representation; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTimingConfig {
    wait_slice_ms: Option<u64>,
    thread_name: Option<String>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            wait_slice: Duration::from_millis(DEFAULT_WAIT_SLICE_MS),
            thread_name: "cadence".to_string(),
        }
    }
}

impl TimingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wait slice.
    pub fn with_wait_slice(mut self, slice: Duration) -> Self {
        self.wait_slice = slice;
        self
    }

    /// Set the worker thread name prefix.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Parse a TOML document, filling missing keys with defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: RawTimingConfig =
            toml::from_str(source).map_err(|e| KernelError::InvalidConfig {
                reason: format!("malformed timing config: {e}"),
            })?;

        let mut config = Self::default();
        if let Some(ms) = raw.wait_slice_ms {
            config.wait_slice = Duration::from_millis(ms);
        }
        if let Some(name) = raw.thread_name {
            config.thread_name = name;
        }
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| KernelError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), ?config, "timing config loaded");
        Ok(config)
    }

    /// Reject values that would turn the worker wait into a busy loop.
    pub fn validate(&self) -> Result<()> {
        if self.wait_slice.is_zero() {
            return Err(KernelError::InvalidConfig {
                reason: "wait_slice must be greater than zero".into(),
            });
        }
        if self.thread_name.is_empty() {
            return Err(KernelError::InvalidConfig {
                reason: "thread_name must not be empty".into(),
            });
        }
        Ok(())
    }
}
