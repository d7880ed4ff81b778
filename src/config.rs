//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for screentest, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults matching the reference tool's behaviour
//! - A process-wide cached instance read once at startup
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SCREENTEST_OUTPUT_DIR` | Root for baseline/current/diff artifacts | `./screentest` |
//! | `SCREENTEST_CONCURRENCY` | Maximum actors in flight | `1` |
//! | `SCREENTEST_THRESHOLD` | Per-pixel colour distance threshold (0.0-1.0) | `0.2` |
//! | `SCREENTEST_CAPTURE_TIMEOUT` | Per-capture timeout in seconds (0 disables) | `30` |
//! | `SCREENTEST_RUN_TIMEOUT` | Whole-run deadline in seconds | unset |
//! | `SCREENTEST_LOG` | `tracing` filter directive | `info` |
//!
//! # Example
//!
//! ```bash
//! export SCREENTEST_OUTPUT_DIR="/var/tmp/dailies"
//! export SCREENTEST_CONCURRENCY=4
//! export SCREENTEST_LOG="screentest=debug"
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default artifact root
pub const DEFAULT_OUTPUT_DIR: &str = "./screentest";

/// Default number of actors in flight
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Default per-pixel threshold; high enough to ignore anti-aliasing noise
pub const DEFAULT_THRESHOLD: f64 = 0.2;

/// Default per-capture timeout (seconds)
pub const DEFAULT_CAPTURE_TIMEOUT: u64 = 30;

/// Default log filter
pub const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the artifact root
pub const ENV_OUTPUT_DIR: &str = "SCREENTEST_OUTPUT_DIR";

/// Environment variable for the concurrency limit
pub const ENV_CONCURRENCY: &str = "SCREENTEST_CONCURRENCY";

/// Environment variable for the diff threshold
pub const ENV_THRESHOLD: &str = "SCREENTEST_THRESHOLD";

/// Environment variable for the per-capture timeout
pub const ENV_CAPTURE_TIMEOUT: &str = "SCREENTEST_CAPTURE_TIMEOUT";

/// Environment variable for the run deadline
pub const ENV_RUN_TIMEOUT: &str = "SCREENTEST_RUN_TIMEOUT";

/// Environment variable for the log filter
pub const ENV_LOG: &str = "SCREENTEST_LOG";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for screentest
#[derive(Debug, Clone)]
pub struct Config {
    /// Run scheduling settings
    pub run: RunSettings,
    /// Diff engine settings
    pub diff: DiffSettings,
    /// Logging settings
    pub log: LogSettings,
}

/// Settings that shape a run
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Artifact root directory
    pub output_dir: PathBuf,
    /// Maximum actors in flight (always >= 1)
    pub concurrency: usize,
    /// Per-capture timeout
    pub capture_timeout: Option<Duration>,
    /// Whole-run deadline
    pub run_timeout: Option<Duration>,
}

/// Diff engine settings
#[derive(Debug, Clone)]
pub struct DiffSettings {
    /// Normalized colour distance threshold
    pub threshold: f64,
}

/// Logging settings
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Filter directive handed to `tracing_subscriber::EnvFilter`
    pub filter: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            run: RunSettings::from_env(),
            diff: DiffSettings::from_env(),
            log: LogSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            run: RunSettings::defaults(),
            diff: DiffSettings::defaults(),
            log: LogSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RunSettings {
    /// Create run settings from environment variables
    pub fn from_env() -> Self {
        Self {
            output_dir: env::var(ENV_OUTPUT_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            concurrency: env::var(ENV_CONCURRENCY)
                .ok()
                .and_then(|s| parse_concurrency(&s))
                .unwrap_or(DEFAULT_CONCURRENCY),
            capture_timeout: match env::var(ENV_CAPTURE_TIMEOUT) {
                Ok(raw) => parse_timeout(&raw).unwrap_or(Some(Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT))),
                Err(_) => Some(Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT)),
            },
            run_timeout: env::var(ENV_RUN_TIMEOUT)
                .ok()
                .and_then(|s| parse_timeout(&s))
                .flatten(),
        }
    }

    /// Create run settings with defaults
    pub fn defaults() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            concurrency: DEFAULT_CONCURRENCY,
            capture_timeout: Some(Duration::from_secs(DEFAULT_CAPTURE_TIMEOUT)),
            run_timeout: None,
        }
    }
}

impl DiffSettings {
    /// Create diff settings from environment variables
    pub fn from_env() -> Self {
        Self {
            threshold: env::var(ENV_THRESHOLD)
                .ok()
                .and_then(|s| parse_threshold(&s))
                .unwrap_or(DEFAULT_THRESHOLD),
        }
    }

    /// Create diff settings with defaults
    pub fn defaults() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl LogSettings {
    /// Create log settings from environment variables
    pub fn from_env() -> Self {
        Self {
            filter: env::var(ENV_LOG).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }

    /// Create log settings with defaults
    pub fn defaults() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a concurrency limit; zero is rejected
fn parse_concurrency(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Parse a threshold on the normalized 0.0-1.0 scale
fn parse_threshold(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|t| (0.0..=1.0).contains(t))
}

/// Parse a timeout in seconds. `0` means "no timeout" (`Some(None)`),
/// anything unparseable yields `None`.
fn parse_timeout(raw: &str) -> Option<Option<Duration>> {
    let secs = raw.trim().parse::<f64>().ok().filter(|s| s.is_finite() && *s >= 0.0)?;
    if secs == 0.0 {
        Some(None)
    } else {
        Duration::try_from_secs_f64(secs).ok().map(Some)
    }
}

/// Get the artifact root (convenience function)
pub fn output_dir() -> PathBuf {
    get().run.output_dir.clone()
}

/// Get the log filter directive (convenience function)
pub fn log_filter() -> String {
    get().log.filter.clone()
}
