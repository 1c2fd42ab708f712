//! Configuration types for feedsnap

use crate::error::{Error, Result};
use crate::types::SourceList;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted episode window, in days
pub const MAX_WINDOW_DAYS: u32 = 36_500;

/// Main configuration for a harvest run
///
/// Every section is defaulted, so a file containing only `sources` is valid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output directory layout
    #[serde(default)]
    pub output: OutputConfig,

    /// Conditional fetch settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry policy for failed fetches
    #[serde(default)]
    pub retry: RetryConfig,

    /// Chunking and derivation settings
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Social-data enrichment settings
    #[serde(default)]
    pub social: SocialConfig,

    /// Feed sources, in input order
    #[serde(default)]
    pub sources: SourceList,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("invalid configuration in {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.aggregation.chunk_size == 0 {
            return Err(Error::config(
                "chunk size must be at least 1",
                "aggregation.chunk_size",
            ));
        }
        if self.aggregation.window_days > MAX_WINDOW_DAYS {
            return Err(Error::config(
                format!("episode window must be at most {MAX_WINDOW_DAYS} days"),
                "aggregation.window_days",
            ));
        }
        if self.fetch.timeout.is_zero() {
            return Err(Error::config(
                "fetch timeout must be greater than zero",
                "fetch.timeout_ms",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        for source in self.sources.iter() {
            if source.feed.trim().is_empty() {
                return Err(Error::config(
                    format!("source '{}' has an empty feed URL", source.key),
                    format!("sources.{}.feed", source.key),
                ));
            }
        }
        Ok(())
    }
}

/// Output directory layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Published output directory (default: "static/downloads")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Raw feed payload directory, relative to `output_dir` (default: "rss")
    #[serde(default = "default_rss_dir")]
    pub rss_dir: PathBuf,

    /// Cover image directory, relative to `output_dir` (default: "cover")
    #[serde(default = "default_cover_dir")]
    pub cover_dir: PathBuf,

    /// Snapshot file name inside `output_dir` (default: "build_info.json")
    ///
    /// Its presence marks the output directory as a completed snapshot.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,

    /// Cache validator file name inside `output_dir` (default: "validators.json")
    #[serde(default = "default_validators_file")]
    pub validators_file: PathBuf,

    /// Leading path segment stripped from published cover paths (default: "static")
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            rss_dir: default_rss_dir(),
            cover_dir: default_cover_dir(),
            snapshot_file: default_snapshot_file(),
            validators_file: default_validators_file(),
            public_prefix: default_public_prefix(),
        }
    }
}

impl OutputConfig {
    /// Resolve the configured names into concrete paths
    pub fn layout(&self) -> OutputLayout {
        OutputLayout {
            output_dir: self.output_dir.clone(),
            rss_dir: self.output_dir.join(&self.rss_dir),
            cover_dir: self.output_dir.join(&self.cover_dir),
            snapshot_path: self.output_dir.join(&self.snapshot_file),
            validators_path: self.output_dir.join(&self.validators_file),
        }
    }
}

/// Concrete output paths for one run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    /// Published output directory
    pub output_dir: PathBuf,
    /// Raw payload directory
    pub rss_dir: PathBuf,
    /// Cover image directory
    pub cover_dir: PathBuf,
    /// Snapshot document (completion marker)
    pub snapshot_path: PathBuf,
    /// Persisted cache validators
    pub validators_path: PathBuf,
}

impl OutputLayout {
    /// Working directories created empty at the start of a run
    pub fn working_dirs(&self) -> [&Path; 2] {
        [self.rss_dir.as_path(), self.cover_dir.as_path()]
    }
}

/// Conditional fetch configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Wall-clock timeout for one attempt, redirects included (default: 10 seconds)
    #[serde(
        rename = "timeout_ms",
        default = "default_fetch_timeout",
        with = "duration_ms_serde"
    )]
    pub timeout: Duration,

    /// Maximum number of redirects followed (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// User-Agent header (default: "rss-parser")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Accept header (default: "application/rss+xml")
    #[serde(default = "default_accept")]
    pub accept: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
            accept: default_accept(),
        }
    }
}

/// Retry configuration for failed fetches
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Number of retries after the first attempt (default: 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 2 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 2 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each retry (default: 1.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_retry_delay(),
            max_delay: default_retry_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Chunking and per-feed derivation settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Sources fetched concurrently per chunk (default: 20)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Episodes kept in each record's recent list (default: 5)
    #[serde(default = "default_recent_episodes")]
    pub recent_episodes: usize,

    /// Length of the trailing episode window in days (default: 14)
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            recent_episodes: default_recent_episodes(),
            window_days: default_window_days(),
        }
    }
}

/// Social-data enrichment configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SocialConfig {
    /// Run the enrichment phase (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("static/downloads")
}

fn default_rss_dir() -> PathBuf {
    PathBuf::from("rss")
}

fn default_cover_dir() -> PathBuf {
    PathBuf::from("cover")
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("build_info.json")
}

fn default_validators_file() -> PathBuf {
    PathBuf::from("validators.json")
}

fn default_public_prefix() -> String {
    "static".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_redirects() -> u32 {
    5
}

fn default_user_agent() -> String {
    "rss-parser".to_string()
}

fn default_accept() -> String {
    "application/rss+xml".to_string()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_chunk_size() -> usize {
    20
}

fn default_recent_episodes() -> usize {
    5
}

fn default_window_days() -> u32 {
    14
}

fn default_true() -> bool {
    true
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
