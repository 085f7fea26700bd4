//! Clip boundary parsing and splitting
//!
//! Clip boundaries arrive in one of four shapes ([`ClipInput`]) and are parsed
//! into a validated [`ClipSet`]: sorted by start, non-overlapping, non-empty,
//! and within the media duration once that is known. The
//! [`TimestampSplitter`] then cuts each clip through a
//! [`MediaProcessor`](crate::processing::MediaProcessor).
//!
//! ```
//! use std::time::Duration;
//! use tea_dl::timestamps::{ClipInput, parse};
//!
//! let input = ClipInput::Paste("0:00 Intro\n1:30 Body\n3:00 Outro".to_string());
//! let clips = parse(&input, Some(Duration::from_secs(240))).unwrap();
//!
//! assert_eq!(clips.len(), 3);
//! assert_eq!(clips.clips()[2].end.to_string(), "4:00");
//! ```

mod chapters;
mod offset;
mod splitter;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{Result, TimestampError};

pub use chapters::{description_clips, detect_chapters};
pub use offset::Offset;
pub use splitter::{SplitTarget, TimestampSplitter};

const OFFSET_PATTERN: &str = r"\d{1,3}:\d{2}(?::\d{2})?";

// Literal patterns; compilation cannot fail at runtime
#[allow(clippy::expect_used)]
static RANGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*({OFFSET_PATTERN})\s*-\s*({OFFSET_PATTERN})\s*(.*)$"))
        .expect("range line pattern")
});

#[allow(clippy::expect_used)]
static START_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^\s*[\[(]?({OFFSET_PATTERN})[\])]?\s*[-–—]?\s+(\S.*)$"))
        .expect("start line pattern")
});

/// One time range to cut out of the source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    /// Inclusive start
    pub start: Offset,
    /// Exclusive end, strictly after `start`
    pub end: Offset,
    /// Title used for the filename and embedded metadata
    pub title: String,
}

impl Clip {
    /// Create a clip
    pub fn new(start: Offset, end: Offset, title: impl Into<String>) -> Self {
        Self {
            start,
            end,
            title: title.into(),
        }
    }

    /// Clip length
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.end.as_secs().saturating_sub(self.start.as_secs()))
    }
}

/// Validated, ordered, non-overlapping clips
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClipSet {
    clips: Vec<Clip>,
}

impl ClipSet {
    /// Clips in ascending start order
    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// Number of clips
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether there are no clips (never true for a parsed set)
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Iterate in ascending start order
    pub fn iter(&self) -> std::slice::Iter<'_, Clip> {
        self.clips.iter()
    }

    /// Re-serialize as a structured clip file
    pub fn to_file(&self, title: impl Into<String>) -> ClipFile {
        ClipFile {
            title: Some(title.into()),
            clips: self
                .clips
                .iter()
                .map(|c| ClipFileEntry {
                    start: c.start.to_string(),
                    end: c.end.to_string(),
                    title: c.title.clone(),
                })
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ClipSet {
    type Item = &'a Clip;
    type IntoIter = std::slice::Iter<'a, Clip>;

    fn into_iter(self) -> Self::IntoIter {
        self.clips.iter()
    }
}

/// Structured clip file: `{ "title": ..., "clips": [ {start, end, title} ] }`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFile {
    /// Source title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Clip entries with `M:SS` / `H:MM:SS` offsets
    pub clips: Vec<ClipFileEntry>,
}

/// One entry of a [`ClipFile`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFileEntry {
    /// Start offset
    pub start: String,
    /// End offset
    pub end: String,
    /// Clip title
    pub title: String,
}

// Loose decoding shape: missing fields are reported per clip rather than as a decode error
#[derive(Deserialize)]
#[serde(untagged)]
enum RawClipDocument {
    Object { clips: Vec<RawClip> },
    List(Vec<RawClip>),
}

#[derive(Deserialize)]
struct RawClip {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

/// Clip boundaries in one of the accepted shapes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClipInput {
    /// Clips supplied directly; only validated and sorted
    Structured(Vec<Clip>),
    /// Free text, one `<offset> <title>` or `<start>-<end> <title>` per line
    Paste(String),
    /// Contents of a structured clip file (JSON)
    File(String),
    /// Detect from the fetched item: its chapter list, else timestamps in its description
    Chapters,
}

impl ClipInput {
    /// Read a structured clip file from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ClipInput::File(contents))
    }

    /// Short name of the input shape, for logging
    pub fn mode(&self) -> &'static str {
        match self {
            ClipInput::Structured(_) => "structured",
            ClipInput::Paste(_) => "paste",
            ClipInput::File(_) => "file",
            ClipInput::Chapters => "chapters",
        }
    }

    /// Check the input as far as possible without knowing the media duration
    ///
    /// Structured lists and files are fully parsed. Pasted text must contain at
    /// least one parsable line, since its last clip may end at end-of-media.
    /// Chapter detection can only be checked after the fetch.
    pub fn preflight(&self) -> std::result::Result<(), TimestampError> {
        match self {
            ClipInput::Chapters => Ok(()),
            ClipInput::Paste(text) => {
                if paste_entries(text).is_empty() {
                    Err(TimestampError::NoClips)
                } else {
                    Ok(())
                }
            }
            _ => parse(self, None).map(|_| ()),
        }
    }
}

/// What the fetched item reports about itself
#[derive(Clone, Copy, Debug, Default)]
pub struct SourceMetadata<'a> {
    /// Media duration, when known
    pub duration: Option<Duration>,
    /// Chapter list reported by the fetch tool
    pub chapters: &'a [Clip],
    /// Item description
    pub description: Option<&'a str>,
}

/// Parse and validate clip input
///
/// `duration` is the source media duration when known. It supplies the end of
/// a pasted list's last clip and bounds every clip. [`ClipInput::Chapters`]
/// needs the fetched item's metadata; use [`parse_for_source`] for it.
///
/// # Errors
///
/// Fails with [`TimestampError`] naming the 1-based clip index where one
/// applies. A structured file is atomic: any bad clip fails the whole parse.
pub fn parse(
    input: &ClipInput,
    duration: Option<Duration>,
) -> std::result::Result<ClipSet, TimestampError> {
    parse_for_source(
        input,
        SourceMetadata {
            duration,
            ..SourceMetadata::default()
        },
    )
}

/// Parse and validate clip input against a fetched item
///
/// # Errors
///
/// As [`parse`]; chapter detection that finds nothing fails with
/// [`TimestampError::NoClips`].
pub fn parse_for_source(
    input: &ClipInput,
    source: SourceMetadata<'_>,
) -> std::result::Result<ClipSet, TimestampError> {
    let duration = source.duration;
    let clips = match input {
        ClipInput::Structured(clips) => clips.clone(),
        ClipInput::Paste(text) => resolve_paste(paste_entries(text), duration),
        ClipInput::File(contents) => parse_file(contents)?,
        ClipInput::Chapters => detect_chapters(source.chapters, source.description, duration),
    };
    validate(clips, duration)
}

fn parse_file(contents: &str) -> std::result::Result<Vec<Clip>, TimestampError> {
    let document: RawClipDocument =
        serde_json::from_str(contents).map_err(|e| TimestampError::Malformed(e.to_string()))?;
    let raw = match document {
        RawClipDocument::Object { clips } | RawClipDocument::List(clips) => clips,
    };

    raw.into_iter()
        .enumerate()
        .map(|(i, clip)| {
            let index = i + 1;
            let start = clip.start.ok_or(TimestampError::MissingField {
                index,
                field: "start",
            })?;
            let end = clip
                .end
                .ok_or(TimestampError::MissingField { index, field: "end" })?;
            let title = clip.title.ok_or(TimestampError::MissingField {
                index,
                field: "title",
            })?;

            let start = Offset::parse(&start)?;
            let end = Offset::parse(&end)?;
            if end <= start {
                return Err(TimestampError::EmptyRange { index });
            }
            Ok(Clip::new(start, end, title.trim()))
        })
        .collect()
}

/// One parsed paste line; `end` is absent for `<offset> <title>` lines
struct PasteEntry {
    start: Offset,
    end: Option<Offset>,
    title: String,
}

fn paste_entries(text: &str) -> Vec<PasteEntry> {
    // A single line of comma-separated ranges: "0:00-1:00 A, 1:00-2:00 B"
    let single_line = !text.trim().contains('\n');
    let lines: Vec<&str> = if single_line && is_range_list(text) {
        text.split(',').collect()
    } else {
        text.lines().collect()
    };

    let mut entries = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(caps) = RANGE_LINE.captures(line) {
            let start = Offset::parse(&caps[1]);
            let end = Offset::parse(&caps[2]);
            if let (Ok(start), Ok(end)) = (start, end) {
                let title = caps[3].trim();
                let title = if title.is_empty() {
                    format!("Clip {}", entries.len() + 1)
                } else {
                    title.to_string()
                };
                entries.push(PasteEntry {
                    start,
                    end: Some(end),
                    title,
                });
                continue;
            }
        }

        if let Some(caps) = START_LINE.captures(line)
            && let Ok(start) = Offset::parse(&caps[1])
        {
            entries.push(PasteEntry {
                start,
                end: None,
                title: caps[2].trim().to_string(),
            });
            continue;
        }

        tracing::warn!(line = i + 1, text = %line, "Skipping unparsable timestamp line");
    }
    entries
}

fn is_range_list(text: &str) -> bool {
    text.contains(',')
        && text
            .split(',')
            .filter(|piece| !piece.trim().is_empty())
            .all(|piece| RANGE_LINE.is_match(piece))
}

fn resolve_paste(entries: Vec<PasteEntry>, duration: Option<Duration>) -> Vec<Clip> {
    let media_end = duration.map(Offset::from_duration_ceil);
    let next_starts: Vec<Option<Offset>> = entries
        .iter()
        .skip(1)
        .map(|e| Some(e.start))
        .chain(std::iter::once(None))
        .collect();

    let mut clips = Vec::with_capacity(entries.len());
    for (entry, next_start) in entries.into_iter().zip(next_starts) {
        match entry.end.or(next_start).or(media_end) {
            Some(end) => clips.push(Clip::new(entry.start, end, entry.title)),
            None => {
                tracing::warn!(
                    title = %entry.title,
                    "Dropping last clip: media duration unknown, cannot infer its end"
                );
            }
        }
    }
    clips
}

fn validate(
    mut clips: Vec<Clip>,
    duration: Option<Duration>,
) -> std::result::Result<ClipSet, TimestampError> {
    if clips.is_empty() {
        return Err(TimestampError::NoClips);
    }

    clips.sort_by_key(|c| c.start);
    let media_end = duration.map(Offset::from_duration_ceil);

    let mut previous_end = Offset::ZERO;
    for (i, clip) in clips.iter().enumerate() {
        let index = i + 1;
        if let Some(limit) = media_end
            && clip.start >= limit
        {
            return Err(TimestampError::BeyondDuration { index });
        }
        if clip.end <= clip.start {
            return Err(TimestampError::EmptyRange { index });
        }
        if i > 0 && clip.start < previous_end {
            return Err(TimestampError::Overlap { index });
        }
        if let Some(limit) = media_end
            && clip.end > limit
        {
            return Err(TimestampError::BeyondDuration { index });
        }
        previous_end = clip.end;
    }

    Ok(ClipSet { clips })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Offset {
        Offset::from_secs(n)
    }

    fn spans(set: &ClipSet) -> Vec<(u64, u64, &str)> {
        set.iter()
            .map(|c| (c.start.as_secs(), c.end.as_secs(), c.title.as_str()))
            .collect()
    }

    #[test]
    fn paste_infers_ends_from_next_line_and_media_end() {
        let input = ClipInput::Paste("0:00 Intro\n1:30 Body\n3:00 Outro".into());
        let set = parse(&input, Some(Duration::from_secs(240))).unwrap();
        assert_eq!(
            spans(&set),
            vec![(0, 90, "Intro"), (90, 180, "Body"), (180, 240, "Outro")]
        );
    }

    #[test]
    fn paste_skips_unparsable_lines() {
        let input = ClipInput::Paste("Tracklist:\n0:00 Intro\n\nnot a time\n2:00 End".into());
        let set = parse(&input, Some(Duration::from_secs(300))).unwrap();
        assert_eq!(spans(&set), vec![(0, 120, "Intro"), (120, 300, "End")]);
    }

    #[test]
    fn paste_with_no_parsable_line_fails() {
        let input = ClipInput::Paste("hello\nworld".into());
        assert_eq!(
            parse(&input, Some(Duration::from_secs(60))),
            Err(TimestampError::NoClips)
        );
        assert_eq!(input.preflight(), Err(TimestampError::NoClips));
    }

    #[test]
    fn paste_accepts_range_lines() {
        let input = ClipInput::Paste("0:00-5:30 First\n5:30 - 10:00 Second".into());
        let set = parse(&input, None).unwrap();
        assert_eq!(spans(&set), vec![(0, 330, "First"), (330, 600, "Second")]);
    }

    #[test]
    fn paste_accepts_comma_separated_ranges() {
        let input = ClipInput::Paste("0:00-1:00, 1:00-2:00 B".into());
        let set = parse(&input, None).unwrap();
        assert_eq!(spans(&set), vec![(0, 60, "Clip 1"), (60, 120, "B")]);
    }

    #[test]
    fn paste_single_line_keeps_commas_in_title() {
        let input = ClipInput::Paste("0:00 Hello, World".into());
        let set = parse(&input, Some(Duration::from_secs(240))).unwrap();
        assert_eq!(spans(&set), vec![(0, 240, "Hello, World")]);
    }

    #[test]
    fn paste_range_line_keeps_commas_unless_every_piece_is_a_range() {
        let input = ClipInput::Paste("0:00-1:00 Tea, Coffee".into());
        let set = parse(&input, None).unwrap();
        assert_eq!(spans(&set), vec![(0, 60, "Tea, Coffee")]);
    }

    #[test]
    fn paste_line_starting_past_media_end_is_beyond_duration() {
        let input = ClipInput::Paste("0:00 Main\n5:00 Bonus".into());
        assert_eq!(
            parse(&input, Some(Duration::from_secs(240))),
            Err(TimestampError::BeyondDuration { index: 1 })
        );

        let input = ClipInput::Paste("5:00 Bonus".into());
        assert_eq!(
            parse(&input, Some(Duration::from_secs(240))),
            Err(TimestampError::BeyondDuration { index: 1 })
        );
    }

    #[test]
    fn chapters_input_uses_source_chapters_then_description() {
        let chapters = vec![
            Clip::new(secs(0), secs(100), "Part 1"),
            Clip::new(secs(100), secs(240), "Part 2"),
        ];
        let set = parse_for_source(
            &ClipInput::Chapters,
            SourceMetadata {
                duration: Some(Duration::from_secs(240)),
                chapters: &chapters,
                description: None,
            },
        )
        .unwrap();
        assert_eq!(spans(&set), vec![(0, 100, "Part 1"), (100, 240, "Part 2")]);

        let set = parse_for_source(
            &ClipInput::Chapters,
            SourceMetadata {
                duration: Some(Duration::from_secs(240)),
                chapters: &[],
                description: Some("Tracklist\n0:00 Opening\n2:00 Closing"),
            },
        )
        .unwrap();
        assert_eq!(spans(&set), vec![(0, 120, "Opening"), (120, 240, "Closing")]);
    }

    #[test]
    fn chapters_input_without_metadata_has_no_clips() {
        assert!(ClipInput::Chapters.preflight().is_ok());
        assert_eq!(
            parse(&ClipInput::Chapters, Some(Duration::from_secs(60))),
            Err(TimestampError::NoClips)
        );
    }

    #[test]
    fn paste_accepts_bracketed_and_dashed_lines() {
        let input = ClipInput::Paste("[0:00] Intro\n(1:00) Verse\n2:00 - Chorus".into());
        let set = parse(&input, Some(Duration::from_secs(200))).unwrap();
        assert_eq!(
            spans(&set),
            vec![(0, 60, "Intro"), (60, 120, "Verse"), (120, 200, "Chorus")]
        );
    }

    #[test]
    fn paste_without_duration_drops_open_last_clip() {
        let input = ClipInput::Paste("0:00 Intro\n1:30 Body".into());
        let set = parse(&input, None).unwrap();
        assert_eq!(spans(&set), vec![(0, 90, "Intro")]);
        assert!(input.preflight().is_ok());
    }

    #[test]
    fn structured_file_parses_and_round_trips() {
        let doc = r#"{"title":"Mix","clips":[{"start":"0:30","end":"1:00","title":"B"},{"start":"0:00","end":"0:30","title":"A"}]}"#;
        let set = parse(&ClipInput::File(doc.into()), None).unwrap();
        assert_eq!(spans(&set), vec![(0, 30, "A"), (30, 60, "B")]);

        let file = set.to_file("Mix");
        assert_eq!(file.clips[0].start, "0:00");
        assert_eq!(file.clips[0].end, "0:30");
        assert_eq!(file.clips[1].end, "1:00");

        let json = serde_json::to_string(&file).unwrap();
        let reparsed = parse(&ClipInput::File(json), None).unwrap();
        assert_eq!(reparsed, set);
    }

    #[test]
    fn structured_file_accepts_bare_list() {
        let doc = r#"[{"start":"0:00","end":"0:10","title":"Only"}]"#;
        let set = parse(&ClipInput::File(doc.into()), None).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn structured_file_is_atomic_on_empty_range() {
        let doc = r#"{"clips":[{"start":"0:00","end":"0:30","title":"ok"},{"start":"1:00","end":"1:00","title":"bad"}]}"#;
        let err = parse(&ClipInput::File(doc.into()), None).unwrap_err();
        assert_eq!(err, TimestampError::EmptyRange { index: 2 });
    }

    #[test]
    fn structured_file_reports_missing_field() {
        let doc = r#"{"clips":[{"start":"0:00","title":"no end"}]}"#;
        let err = parse(&ClipInput::File(doc.into()), None).unwrap_err();
        assert_eq!(err, TimestampError::MissingField { index: 1, field: "end" });
    }

    #[test]
    fn structured_file_rejects_bad_offset_and_bad_json() {
        let doc = r#"{"clips":[{"start":"0:00","end":"0:7","title":"x"}]}"#;
        assert!(matches!(
            parse(&ClipInput::File(doc.into()), None),
            Err(TimestampError::InvalidOffset { .. })
        ));
        assert!(matches!(
            parse(&ClipInput::File("{ nope".into()), None),
            Err(TimestampError::Malformed(_))
        ));
    }

    #[test]
    fn structured_list_is_sorted_and_checked_for_overlap() {
        let clips = vec![
            Clip::new(secs(60), secs(120), "second"),
            Clip::new(secs(0), secs(60), "first"),
        ];
        let set = parse(&ClipInput::Structured(clips), None).unwrap();
        assert_eq!(set.clips()[0].title, "first");

        let overlapping = vec![
            Clip::new(secs(0), secs(70), "a"),
            Clip::new(secs(60), secs(120), "b"),
        ];
        assert_eq!(
            parse(&ClipInput::Structured(overlapping), None),
            Err(TimestampError::Overlap { index: 2 })
        );
    }

    #[test]
    fn clips_beyond_duration_are_rejected() {
        let clips = vec![Clip::new(secs(0), secs(300), "long")];
        assert_eq!(
            parse(&ClipInput::Structured(clips), Some(Duration::from_secs(240))),
            Err(TimestampError::BeyondDuration { index: 1 })
        );
    }

    #[test]
    fn empty_structured_list_has_no_clips() {
        assert_eq!(
            parse(&ClipInput::Structured(vec![]), None),
            Err(TimestampError::NoClips)
        );
    }

    #[test]
    fn from_path_reads_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clips.json");
        std::fs::write(&path, r#"[{"start":"0:00","end":"0:05","title":"x"}]"#).unwrap();
        let input = ClipInput::from_path(&path).unwrap();
        assert_eq!(input.mode(), "file");
        assert!(input.preflight().is_ok());
    }
}
