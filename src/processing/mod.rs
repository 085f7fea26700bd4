//! External media processing (clip cutting)
//!
//! One [`ClipRequest`] describes one output file cut from a fetched source. The
//! [`MediaProcessor`] is invoked once per clip and never batched, so a failure
//! affects only the clip it belongs to.

mod ffmpeg;

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::ProcessingError;
use crate::timestamps::Offset;

pub use ffmpeg::FfmpegProcessor;

/// Metadata embedded into a clip (already sanitized)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipMetadata {
    /// Clip title
    pub title: String,
    /// 1-based track number
    pub track: usize,
    /// Total clips cut from the source
    pub total: usize,
    /// Album name (source title), written for audio clips
    pub album: Option<String>,
}

/// One clip to cut
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipRequest {
    /// Source media file
    pub source: PathBuf,
    /// Clip start
    pub start: Offset,
    /// Clip end (exclusive)
    pub end: Offset,
    /// Output file to create (overwritten if present)
    pub output: PathBuf,
    /// Embedded metadata
    pub metadata: ClipMetadata,
    /// Re-encode to MP3 without video instead of stream-copying
    pub audio_only: bool,
}

/// Trait for external clip cutting
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    /// Cut one clip and return the path of the produced file
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::Spawn`] if the tool cannot be run and
    /// [`ProcessingError::Failed`] if it ran and reported failure.
    async fn cut(&self, request: &ClipRequest) -> Result<PathBuf, ProcessingError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
