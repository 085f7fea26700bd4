//! CLI-based clip cutting using the external ffmpeg binary

use super::{ClipRequest, MediaProcessor};
use crate::config::ToolsConfig;
use crate::error::{Error, ProcessingError, Result};
use async_trait::async_trait;
use chrono::Datelike;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

/// Longest tool message carried in an error
const MAX_REASON_LEN: usize = 200;

/// CLI-based processor using the external ffmpeg binary
///
/// Video clips are stream-copied (`-c copy`); audio clips are re-encoded to MP3
/// with `libmp3lame` at VBR quality 2.
#[derive(Debug, Clone)]
pub struct FfmpegProcessor {
    binary_path: PathBuf,
}

impl FfmpegProcessor {
    /// Create a new processor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Resolve the binary from configuration: explicit path first, then PATH if allowed
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] when no binary can be located.
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        if let Some(path) = &tools.ffmpeg_path {
            return Ok(Self::new(path.clone()));
        }
        if tools.search_path
            && let Some(processor) = Self::from_path()
        {
            return Ok(processor);
        }
        Err(Error::NotSupported(
            "ffmpeg binary not configured and not found in PATH".to_string(),
        ))
    }

    pub(crate) fn build_args(request: &ClipRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            request.source.clone().into_os_string(),
            "-ss".into(),
            request.start.as_secs().to_string().into(),
            "-to".into(),
            request.end.as_secs().to_string().into(),
        ];

        if request.audio_only {
            args.extend([
                "-vn".into(),
                "-acodec".into(),
                "libmp3lame".into(),
                "-q:a".into(),
                "2".into(),
            ]);
        } else {
            args.extend(["-c".into(), "copy".into()]);
        }

        args.extend(["-avoid_negative_ts".into(), "1".into()]);

        let meta = &request.metadata;
        let mut tags = vec![
            format!("title={}", meta.title),
            format!("track={}/{}", meta.track, meta.total),
        ];
        if request.audio_only {
            if let Some(album) = &meta.album {
                tags.push(format!("album={album}"));
            }
            tags.push(format!("date={}", chrono::Utc::now().year()));
        }
        for tag in tags {
            args.push("-metadata".into());
            args.push(tag.into());
        }

        args.push("-y".into());
        args.push(request.output.clone().into_os_string());
        args
    }
}

#[async_trait]
impl MediaProcessor for FfmpegProcessor {
    async fn cut(&self, request: &ClipRequest) -> std::result::Result<PathBuf, ProcessingError> {
        let args = Self::build_args(request);
        tracing::debug!(
            output = %request.output.display(),
            start = %request.start,
            end = %request.end,
            "Running ffmpeg"
        );

        let output = Command::new(&self.binary_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| ProcessingError::Spawn(format!("{}: {e}", self.binary_path.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason: String = stderr.trim().chars().take(MAX_REASON_LEN).collect();
            return Err(ProcessingError::Failed {
                output: request.output.clone(),
                reason: if reason.is_empty() {
                    format!("ffmpeg exited with {}", output.status)
                } else {
                    reason
                },
            });
        }

        Ok(request.output.clone())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
