//! Configuration types for tea-dl
//!
//! The persisted shape is a flat key/value map with camelCase keys. Loading and
//! saving it is left to the embedding application; this module only owns the
//! values, their defaults, and their validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ValidationError;
use crate::types::QualityProfile;

/// Smallest accepted worker count
pub const MIN_CONCURRENCY: usize = 1;
/// Largest accepted worker count
pub const MAX_CONCURRENCY: usize = 5;

/// Accepted audio bitrates (kbps) for audio extraction
pub const AUDIO_QUALITIES: [&str; 4] = ["128", "192", "256", "320"];

/// Download behavior configuration (quality, destination, concurrency, duplicates)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadConfig {
    /// Default quality preset (default: 1080p); unknown keys fall back to the default
    #[serde(default, deserialize_with = "lenient_quality::deserialize")]
    pub default_quality: QualityProfile,

    /// Default output directory (default: "./downloads")
    #[serde(default = "default_output_path")]
    pub default_output_path: PathBuf,

    /// Number of concurrent downloads, 1-5 (default: 3)
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    /// Embed thumbnails into downloaded files (default: true)
    #[serde(default = "default_true")]
    pub thumbnail_embed: bool,

    /// Audio extraction bitrate in kbps (default: "320")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// What to do with URLs already in the history ledger (default: ask)
    #[serde(default)]
    pub duplicate_action: DuplicateAction,

    /// Attempt a best-effort fetch for URLs of unrecognized shape (default: true)
    #[serde(default = "default_true")]
    pub fetch_unknown: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            default_quality: QualityProfile::default(),
            default_output_path: default_output_path(),
            concurrent_downloads: default_concurrent_downloads(),
            thumbnail_embed: true,
            audio_quality: default_audio_quality(),
            duplicate_action: DuplicateAction::default(),
            fetch_unknown: true,
        }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Total attempts per job, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles per attempt (default: 2 seconds)
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Upper bound for any single backoff delay (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: false,
        }
    }
}

/// External tool paths (yt-dlp, ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub yt_dlp_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: None,
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

/// History ledger location
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceConfig {
    /// History file path (default: "./tea-history.json")
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
        }
    }
}

/// Main configuration
///
/// All sub-configs are flattened, so the serialized form is a single flat map:
///
/// ```
/// let json = r#"{ "defaultQuality": "720p", "concurrentDownloads": 2, "duplicateAction": "skip" }"#;
/// let config: tea_dl::Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.download.concurrent_downloads, 2);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry and backoff settings
    #[serde(flatten)]
    pub retry: RetryConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// History ledger location
    #[serde(flatten)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Check every value against its accepted range
    ///
    /// Returns the first offending key.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let concurrency = self.download.concurrent_downloads;
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(ValidationError::Config {
                key: "concurrentDownloads".to_string(),
                message: format!(
                    "must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}, got {concurrency}"
                ),
            });
        }

        if !AUDIO_QUALITIES.contains(&self.download.audio_quality.as_str()) {
            return Err(ValidationError::Config {
                key: "audioQuality".to_string(),
                message: format!(
                    "must be one of {}, got '{}'",
                    AUDIO_QUALITIES.join(", "),
                    self.download.audio_quality
                ),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ValidationError::Config {
                key: "maxAttempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(ValidationError::Config {
                key: "baseDelay".to_string(),
                message: "must not exceed maxDelay".to_string(),
            });
        }

        Ok(())
    }

    /// Copy of this config with every invalid value replaced by its default
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        let defaults = Config::default();

        while let Err(ValidationError::Config { key, message }) = config.validate() {
            tracing::warn!(key = %key, reason = %message, "Invalid configuration value, using default");
            match key.as_str() {
                "concurrentDownloads" => {
                    config.download.concurrent_downloads = defaults.download.concurrent_downloads
                }
                "audioQuality" => {
                    config.download.audio_quality = defaults.download.audio_quality.clone()
                }
                "maxAttempts" => config.retry.max_attempts = defaults.retry.max_attempts,
                "baseDelay" => {
                    config.retry.base_delay = defaults.retry.base_delay;
                    config.retry.max_delay = config.retry.max_delay.max(defaults.retry.base_delay);
                }
                _ => break,
            }
        }

        config
    }
}

/// Action to take when a URL is already in the history ledger
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    /// Skip the URL
    Skip,
    /// Download again and replace the ledger entry
    #[serde(alias = "download")]
    Overwrite,
    /// Defer to a [`DuplicateResolver`](crate::downloader::DuplicateResolver) (default)
    #[default]
    Ask,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("./tea-history.json")
}

fn default_concurrent_downloads() -> usize {
    3
}

fn default_audio_quality() -> String {
    "320".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
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

// Unknown or mistyped quality keys load as the default instead of failing the whole file
mod lenient_quality {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    use crate::types::QualityProfile;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawQuality {
        Key(String),
        Index(u64),
        Other(IgnoredAny),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<QualityProfile, D::Error>
    where
        D: Deserializer<'de>,
    {
        let key = match RawQuality::deserialize(deserializer)? {
            RawQuality::Key(key) => key,
            RawQuality::Index(index) => index.to_string(),
            RawQuality::Other(_) => String::new(),
        };
        Ok(key.parse().unwrap_or_else(|_| {
            let fallback = QualityProfile::default();
            tracing::warn!(
                key = "defaultQuality",
                value = %key,
                fallback = %fallback,
                "Invalid configuration value, using default"
            );
            fallback
        }))
    }
}
