//! Parser for yt-dlp `--dump-single-json` output

use super::FetchedMedia;
use crate::error::FetchError;
use crate::timestamps::{Clip, Offset};
use serde::Deserialize;
use std::path::PathBuf;
use std::str;
use std::time::Duration;

/// Longest tool message carried in an error
const MAX_ERROR_LEN: usize = 500;

/// Exit status of an external command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The command exited successfully (exit code 0)
    Success,
    /// The command exited with a non-zero exit code
    Failure,
}

impl ExitStatus {
    /// Returns `true` if the exit status represents success
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<bool> for ExitStatus {
    fn from(success: bool) -> Self {
        if success { Self::Success } else { Self::Failure }
    }
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, rename = "_type")]
    kind: Option<String>,
    #[serde(default)]
    entries: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    requested_downloads: Vec<RequestedDownload>,
    #[serde(default, rename = "_filename")]
    filename: Option<PathBuf>,
    #[serde(default)]
    chapters: Option<Vec<RawChapter>>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    #[serde(default)]
    start_time: f64,
    #[serde(default)]
    end_time: f64,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestedDownload {
    #[serde(default)]
    filepath: Option<PathBuf>,
}

/// Parse the output of one yt-dlp run
///
/// A failed run is classified from its stderr (falling back to stdout). A
/// successful run must have printed the info JSON on stdout; multi-item results
/// with no entries are reported as a permanent failure.
pub fn parse_fetch_output(
    stdout: &[u8],
    stderr: &[u8],
    exit_status: ExitStatus,
) -> Result<FetchedMedia, FetchError> {
    let output = str::from_utf8(stdout).unwrap_or_default();
    let error_output = String::from_utf8_lossy(stderr);

    if !exit_status.is_success() {
        let source = if error_output.trim().is_empty() {
            output
        } else {
            error_output.as_ref()
        };
        return Err(FetchError::classify(&error_summary(source)));
    }

    let json_line = output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| line.starts_with('{'))
        .ok_or_else(|| FetchError::permanent("fetch tool produced no metadata"))?;

    let info: InfoJson = serde_json::from_str(json_line)
        .map_err(|e| FetchError::permanent(format!("unreadable fetch tool metadata: {e}")))?;

    let title = info
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| "Untitled".to_string());

    let duration = info
        .duration
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(Duration::from_secs_f64);

    if info.kind.as_deref() == Some("playlist") {
        let item_count = info
            .entries
            .map(|entries| entries.iter().filter(|e| !e.is_null()).count())
            .unwrap_or(0);
        if item_count == 0 {
            return Err(FetchError::permanent(format!(
                "'{title}' contains no downloadable items"
            )));
        }
        return Ok(FetchedMedia {
            title,
            item_count,
            ..FetchedMedia::default()
        });
    }

    let output_path = info
        .requested_downloads
        .into_iter()
        .find_map(|d| d.filepath)
        .or(info.filename);

    Ok(FetchedMedia {
        title,
        item_count: 1,
        output_path,
        duration,
        chapters: chapters(info.chapters.unwrap_or_default()),
        description: info.description.filter(|d| !d.trim().is_empty()),
    })
}

/// Clips from the tool's chapter list, rounded to whole seconds; empty entries are dropped
fn chapters(raw: Vec<RawChapter>) -> Vec<Clip> {
    raw.into_iter()
        .enumerate()
        .filter(|(_, c)| {
            c.start_time.is_finite() && c.end_time.is_finite() && c.start_time >= 0.0
        })
        .filter_map(|(i, c)| {
            // Shared boundaries round alike, so adjacent chapters never overlap
            let start = Offset::from_secs(c.start_time.round() as u64);
            let end = Offset::from_secs(c.end_time.max(0.0).round() as u64);
            let title = c
                .title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Chapter {}", i + 1));
            (end > start).then(|| Clip::new(start, end, title))
        })
        .collect()
}

/// Reduce tool output to its error lines, truncated
fn error_summary(output: &str) -> String {
    let errors: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR"))
        .collect();

    let summary = if errors.is_empty() {
        output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or("fetch tool failed without output")
            .to_string()
    } else {
        errors.join("\n")
    };

    summary.chars().take(MAX_ERROR_LEN).collect()
}
