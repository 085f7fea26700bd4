//! CLI-based fetcher using the external yt-dlp binary

use super::parser::{ExitStatus, parse_fetch_output};
use super::{FetchRequest, FetchedMedia, MediaFetcher};
use crate::config::ToolsConfig;
use crate::error::{Error, FetchError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;

/// CLI-based fetcher using the external yt-dlp binary
///
/// Every fetch is one `yt-dlp` process. The tool prints its info JSON on stdout
/// (`--dump-single-json`) after downloading, which is parsed into a
/// [`FetchedMedia`].
///
/// # Examples
///
/// ```no_run
/// use tea_dl::fetcher::YtDlpFetcher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let fetcher = YtDlpFetcher::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary_path: PathBuf,
}

impl YtDlpFetcher {
    /// Create a new fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Resolve the binary from configuration: explicit path first, then PATH if allowed
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] when no binary can be located.
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        if let Some(path) = &tools.yt_dlp_path {
            return Ok(Self::new(path.clone()));
        }
        if tools.search_path
            && let Some(fetcher) = Self::from_path()
        {
            tracing::debug!(path = %fetcher.binary_path.display(), "Found yt-dlp in PATH");
            return Ok(fetcher);
        }
        Err(Error::NotSupported(
            "yt-dlp binary not configured and not found in PATH".to_string(),
        ))
    }

    /// Command-line arguments for one fetch
    pub(crate) fn build_args(request: &FetchRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-simulate".into(),
            "--dump-single-json".into(),
            "--no-progress".into(),
            "--no-mtime".into(),
            "-f".into(),
            request.format_selector.clone().into(),
            "-o".into(),
            request.output_template.clone().into_os_string(),
            "--retries".into(),
            request.retry_hints.retries.to_string().into(),
            "--fragment-retries".into(),
            request.retry_hints.fragment_retries.to_string().into(),
            "--embed-metadata".into(),
        ];

        if request.embed_thumbnail {
            args.push("--embed-thumbnail".into());
        }

        match &request.audio {
            Some(audio) => {
                args.extend([
                    "-x".into(),
                    "--audio-format".into(),
                    audio.codec.clone().into(),
                    "--audio-quality".into(),
                    format!("{}K", audio.bitrate).into(),
                ]);
            }
            None => {
                args.extend(["--merge-output-format".into(), "mp4".into()]);
            }
        }

        // End of options: the URL is never interpreted as a flag
        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchedMedia, FetchError> {
        let args = Self::build_args(request);
        tracing::debug!(url = %request.url, binary = %self.binary_path.display(), "Running yt-dlp");

        let output = Command::new(&self.binary_path)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                let message = format!("failed to execute yt-dlp: {e}");
                match e.kind() {
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                        FetchError::permanent(message)
                    }
                    _ => FetchError::transient(message),
                }
            })?;

        parse_fetch_output(
            &output.stdout,
            &output.stderr,
            ExitStatus::from(output.status.success()),
        )
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
