//! Clip boundaries taken from the fetched item itself
//!
//! The tool's chapter list wins. Without one, the description is scanned for
//! timestamp lines; each found start runs to the next start (or media end).

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use super::{Clip, Offset};

/// Longest title kept from a description line
const MAX_DESCRIPTION_TITLE: usize = 100;

/// Lines shorter than this never carry a timestamp and a title
const MIN_DESCRIPTION_LINE: usize = 5;

// Tried in order; the first that yields a usable title wins
#[allow(clippy::expect_used)]
static DESCRIPTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(\d+:\d+(?::\d+)?)\s*[-–—]\s*(.+)",
        r"\[(\d+:\d+(?::\d+)?)\]\s*(.+)",
        r"\((\d+:\d+(?::\d+)?)\)\s*(.+)",
        r"(\d+:\d+(?::\d+)?)\s+(.+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("description timestamp pattern"))
    .collect()
});

/// Clips for the fetched item: its chapters, else its description timestamps
///
/// Returns an empty list when neither source yields anything.
pub fn detect_chapters(
    chapters: &[Clip],
    description: Option<&str>,
    duration: Option<Duration>,
) -> Vec<Clip> {
    if !chapters.is_empty() {
        tracing::debug!(chapters = chapters.len(), "Using chapter list from fetch metadata");
        return chapters.to_vec();
    }

    match (description, duration) {
        (Some(text), Some(duration)) if !text.trim().is_empty() => {
            let clips = description_clips(text, duration);
            tracing::debug!(clips = clips.len(), "Scanned description for timestamps");
            clips
        }
        _ => Vec::new(),
    }
}

/// Timestamp lines found in a description, deduplicated by start
pub fn description_clips(text: &str, duration: Duration) -> Vec<Clip> {
    let media_end = Offset::from_duration_ceil(duration);

    let mut found: Vec<(Offset, String)> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= MIN_DESCRIPTION_LINE)
        .filter_map(|line| description_entry(line, media_end))
        .collect();

    // Stable: the first line naming a time keeps its title
    found.sort_by_key(|(start, _)| *start);
    found.dedup_by_key(|(start, _)| *start);

    let ends: Vec<Offset> = found
        .iter()
        .skip(1)
        .map(|(start, _)| *start)
        .chain(std::iter::once(media_end))
        .collect();

    found
        .into_iter()
        .zip(ends)
        .filter(|((start, _), end)| end > start)
        .map(|((start, title), end)| Clip::new(start, end, title))
        .collect()
}

fn description_entry(line: &str, media_end: Offset) -> Option<(Offset, String)> {
    for pattern in DESCRIPTION_PATTERNS.iter() {
        let Some(caps) = pattern.captures(line) else {
            continue;
        };
        let title = caps[2].trim();
        if title.chars().count() < 2 || is_link_text(title) {
            continue;
        }
        let Some(start) = lenient_offset(&caps[1]) else {
            continue;
        };
        if start > media_end {
            continue;
        }
        return Some((start, title.chars().take(MAX_DESCRIPTION_TITLE).collect()));
    }
    None
}

fn is_link_text(title: &str) -> bool {
    let lower = title.to_lowercase();
    ["http", "www", "channel"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

// Accepts non-canonical offsets such as `75:00` and `1:5:03`
fn lenient_offset(value: &str) -> Option<Offset> {
    let fields: Vec<u64> = value
        .split(':')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    let secs = match fields.as_slice() {
        [m, s] => m.checked_mul(60)?.checked_add(*s)?,
        [h, m, s] => h
            .checked_mul(3600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*s)?,
        _ => return None,
    };
    Some(Offset::from_secs(secs))
}
