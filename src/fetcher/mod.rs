//! External media fetching
//!
//! The orchestrator never downloads anything itself. It assembles a fully
//! resolved [`FetchRequest`] and hands it to a [`MediaFetcher`]. The fetcher
//! either produces files on disk and reports what it fetched, or fails with a
//! [`FetchError`] tagged transient or permanent so the retry policy can decide
//! what happens next.
//!
//! ## Implementations
//!
//! - [`YtDlpFetcher`]: runs the external `yt-dlp` binary
//!
//! Tests and embedders can provide their own implementation of the trait.
//!
//! ## Usage
//!
//! ```no_run
//! use tea_dl::fetcher::{FetchRequest, MediaFetcher, YtDlpFetcher};
//! use tea_dl::types::{Category, QualityProfile};
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
//! let request = FetchRequest::new(
//!     "https://youtu.be/dQw4w9WgXcQ",
//!     QualityProfile::P720,
//!     Category::Single,
//!     Path::new("downloads"),
//! );
//! let media = fetcher.fetch(&request).await?;
//! println!("fetched {} ({} item(s))", media.title, media.item_count);
//! # Ok(())
//! # }
//! ```

mod parser;
mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FetchError;
use crate::timestamps::Clip;
use crate::types::{Category, QualityProfile};

pub use parser::{ExitStatus, parse_fetch_output};
pub use ytdlp::YtDlpFetcher;

/// Audio extraction settings for audio-only fetches
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioExtraction {
    /// Target codec (e.g. "mp3")
    pub codec: String,
    /// Target bitrate in kbps (e.g. "320")
    pub bitrate: String,
}

impl AudioExtraction {
    /// MP3 extraction at the given bitrate
    pub fn mp3(bitrate: impl Into<String>) -> Self {
        Self {
            codec: "mp3".to_string(),
            bitrate: bitrate.into(),
        }
    }
}

/// Retry counts passed through to the fetch tool for its own internal retries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryHints {
    /// Whole-request retries
    pub retries: u32,
    /// Per-fragment retries for segmented streams
    pub fragment_retries: u32,
}

impl Default for RetryHints {
    fn default() -> Self {
        Self {
            retries: 3,
            fragment_retries: 3,
        }
    }
}

/// Fully resolved fetch options for one attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// URL to fetch
    pub url: String,
    /// Format selector in the fetch tool's syntax
    pub format_selector: String,
    /// Output path template (output root joined with the category template)
    pub output_template: PathBuf,
    /// Audio extraction, when the job is audio-only
    pub audio: Option<AudioExtraction>,
    /// Embed the thumbnail into the output file
    pub embed_thumbnail: bool,
    /// Tool-level retry counts
    pub retry_hints: RetryHints,
}

impl FetchRequest {
    /// Build a request from a quality preset and category
    ///
    /// Audio-only presets get MP3 extraction at 320 kbps; use [`FetchRequest::with_audio`]
    /// to change the bitrate or force extraction.
    pub fn new(
        url: impl Into<String>,
        quality: QualityProfile,
        category: Category,
        output_root: &Path,
    ) -> Self {
        Self {
            url: url.into(),
            format_selector: quality.format_selector().to_string(),
            output_template: output_root.join(category.output_template()),
            audio: quality.is_audio_only().then(|| AudioExtraction::mp3("320")),
            embed_thumbnail: true,
            retry_hints: RetryHints::default(),
        }
    }

    /// Extract audio with the given settings, selecting the best audio stream
    pub fn with_audio(mut self, audio: AudioExtraction) -> Self {
        self.format_selector = QualityProfile::Audio.format_selector().to_string();
        self.audio = Some(audio);
        self
    }

    /// Set thumbnail embedding
    pub fn with_thumbnail(mut self, embed: bool) -> Self {
        self.embed_thumbnail = embed;
        self
    }

    /// Set tool-level retry counts
    pub fn with_retry_hints(mut self, hints: RetryHints) -> Self {
        self.retry_hints = hints;
        self
    }
}

/// What a successful fetch produced
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedMedia {
    /// Resolved title (collection title for multi-item fetches)
    pub title: String,
    /// Number of items written
    pub item_count: usize,
    /// Output file, when the fetch produced exactly one known file
    pub output_path: Option<PathBuf>,
    /// Media duration, when known
    pub duration: Option<Duration>,
    /// Chapter list reported by the tool, in source order
    pub chapters: Vec<Clip>,
    /// Item description, when reported
    pub description: Option<String>,
}

/// Trait for external media fetching
///
/// Implementations must be safe to call from several workers at once.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the media described by `request`
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] tagged [`Transient`](crate::error::FetchErrorKind::Transient)
    /// for network, timeout and rate-limit failures, and
    /// [`Permanent`](crate::error::FetchErrorKind::Permanent) for removed, private or
    /// unsupported content and for a tool that cannot be executed.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedMedia, FetchError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
