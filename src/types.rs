//! Core types for tea-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{ErrorKind, ValidationError};

/// Content category assigned by the URL classifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// One video
    Single,
    /// A playlist
    Collection,
    /// A channel or user feed
    Channel,
    /// Supported host, unrecognized shape
    Unknown,
}

/// Per-category dispatch row: where files land and whether splitting applies
struct CategoryRow {
    output_template: &'static str,
    allows_split: bool,
    label: &'static str,
}

const SINGLE_ROW: CategoryRow = CategoryRow {
    output_template: "%(title)s.%(ext)s",
    allows_split: true,
    label: "single",
};

const COLLECTION_ROW: CategoryRow = CategoryRow {
    output_template: "%(playlist_title)s/%(playlist_index)s-%(title)s.%(ext)s",
    allows_split: false,
    label: "collection",
};

const CHANNEL_ROW: CategoryRow = CategoryRow {
    output_template: "%(uploader)s/%(upload_date)s-%(title)s.%(ext)s",
    allows_split: false,
    label: "channel",
};

const UNKNOWN_ROW: CategoryRow = CategoryRow {
    output_template: "%(title)s.%(ext)s",
    allows_split: true,
    label: "unknown",
};

impl Category {
    fn row(&self) -> &'static CategoryRow {
        match self {
            Category::Single => &SINGLE_ROW,
            Category::Collection => &COLLECTION_ROW,
            Category::Channel => &CHANNEL_ROW,
            Category::Unknown => &UNKNOWN_ROW,
        }
    }

    /// Output template (relative to the output root) in the fetch tool's syntax
    pub fn output_template(&self) -> &'static str {
        self.row().output_template
    }

    /// Whether timestamp splitting may be applied to a fetch of this category
    pub fn allows_split(&self) -> bool {
        self.row().allows_split
    }

    /// Whether a fetch of this category can produce many items
    pub fn is_multi_item(&self) -> bool {
        matches!(self, Category::Collection | Category::Channel)
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        self.row().label
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality preset, a key into a fixed table of format selectors
///
/// Accepts both the named keys (`best`, `1080p`, ..., `audio`) and the legacy
/// numeric menu keys (`1` = best, `2` = 1080p, `3` = 720p, `4` = 480p, `5` = audio).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QualityProfile {
    /// Best available video and audio
    Best,
    /// Up to 1080p
    #[default]
    P1080,
    /// Up to 720p
    P720,
    /// Up to 480p
    P480,
    /// Up to 360p
    P360,
    /// Best available audio only
    Audio,
}

impl QualityProfile {
    /// Every preset, in menu order
    pub const ALL: [QualityProfile; 6] = [
        QualityProfile::Best,
        QualityProfile::P1080,
        QualityProfile::P720,
        QualityProfile::P480,
        QualityProfile::P360,
        QualityProfile::Audio,
    ];

    /// Format selector passed to the fetch tool
    pub fn format_selector(&self) -> &'static str {
        match self {
            QualityProfile::Best => "bestvideo+bestaudio/best",
            QualityProfile::P1080 => "bestvideo[height<=1080]+bestaudio/best[height<=1080]/best",
            QualityProfile::P720 => "bestvideo[height<=720]+bestaudio/best[height<=720]/best",
            QualityProfile::P480 => "bestvideo[height<=480]+bestaudio/best[height<=480]/best",
            QualityProfile::P360 => "bestvideo[height<=360]+bestaudio/best[height<=360]/best",
            QualityProfile::Audio => "bestaudio/best",
        }
    }

    /// Whether this preset implies audio extraction
    pub fn is_audio_only(&self) -> bool {
        matches!(self, QualityProfile::Audio)
    }

    /// Canonical key
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityProfile::Best => "best",
            QualityProfile::P1080 => "1080p",
            QualityProfile::P720 => "720p",
            QualityProfile::P480 => "480p",
            QualityProfile::P360 => "360p",
            QualityProfile::Audio => "audio",
        }
    }
}

impl FromStr for QualityProfile {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" | "1" => Ok(QualityProfile::Best),
            "1080p" | "2" => Ok(QualityProfile::P1080),
            "720p" | "3" => Ok(QualityProfile::P720),
            "480p" | "4" => Ok(QualityProfile::P480),
            "360p" => Ok(QualityProfile::P360),
            "audio" | "5" => Ok(QualityProfile::Audio),
            _ => Err(ValidationError::UnknownQuality { key: s.to_string() }),
        }
    }
}

impl TryFrom<String> for QualityProfile {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualityProfile> for String {
    fn from(q: QualityProfile) -> Self {
        q.as_str().to_string()
    }
}

impl std::fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a fetch job
///
/// ```text
/// Pending -> Classifying -> DuplicateSkipped
///                        -> Fetching -> Succeeded
///                                    -> Retrying -> Fetching
///                                    -> Failed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Enqueued, not yet picked up by a worker
    Pending,
    /// Running the URL classifier and pre-flight checks
    Classifying,
    /// Already in the ledger and the duplicate policy said skip (terminal)
    DuplicateSkipped,
    /// An attempt is in flight
    Fetching,
    /// Sleeping out a backoff delay before the next attempt
    Retrying,
    /// Fetched successfully (terminal)
    Succeeded,
    /// Gave up (terminal)
    Failed,
    /// Stopped by batch cancellation before finishing (terminal)
    Cancelled,
}

impl JobState {
    /// Whether the job has finished
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::DuplicateSkipped | JobState::Succeeded | JobState::Failed | JobState::Cancelled
        )
    }
}

/// One completed download, as persisted in the history ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Source URL (ledger key)
    #[serde(skip)]
    pub url: String,
    /// Resolved title
    pub title: String,
    /// Where the download landed
    pub output_path: PathBuf,
    /// Classified category
    pub category: Category,
    /// Quality preset used
    pub quality: QualityProfile,
    /// When the download completed
    pub timestamp: DateTime<Utc>,
}

/// Final status of one submitted URL
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Fetched
    Succeeded,
    /// Gave up
    Failed,
    /// Skipped because it was already in the history ledger
    DuplicateSkipped,
    /// Not finished because the batch was cancelled
    Cancelled,
}

/// Error detail attached to a failed outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Taxonomy bucket
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

/// Result of cutting one clip
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipOutcome {
    /// 1-based clip position
    pub index: usize,
    /// Sanitized clip title
    pub title: String,
    /// Output file, when processing succeeded
    pub path: Option<PathBuf>,
    /// Error message, when processing failed
    pub error: Option<String>,
}

impl ClipOutcome {
    /// Whether this clip was produced
    pub fn is_success(&self) -> bool {
        self.path.is_some() && self.error.is_none()
    }
}

/// Outcome of one submitted URL
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// The submitted URL
    pub url: String,
    /// Final status
    pub status: OutcomeStatus,
    /// Classified category, when classification succeeded
    pub category: Option<Category>,
    /// Resolved title, on success
    pub title: Option<String>,
    /// Number of items fetched (1 for a single video)
    pub item_count: usize,
    /// Final output path, on success
    pub output_path: Option<PathBuf>,
    /// Number of fetch attempts made
    pub attempts: u32,
    /// Error detail, on failure or cancellation
    ///
    /// A succeeded job also carries one when the requested split could not
    /// start (clip boundaries beyond the fetched duration, file not found).
    pub error: Option<FailureDetail>,
    /// Clip processing results, when splitting was requested
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clips: Vec<ClipOutcome>,
}

impl JobOutcome {
    /// Whether the URL was fetched
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Aggregate result of one orchestrator run
///
/// Contains exactly one outcome per submitted URL, in completion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Per-URL outcomes
    pub outcomes: Vec<JobOutcome>,
    /// Number of succeeded jobs
    pub succeeded: usize,
    /// Number of failed jobs
    pub failed: usize,
    /// Number of jobs skipped as duplicates
    pub skipped: usize,
    /// Number of jobs cancelled before completion
    pub cancelled: usize,
}

impl BatchReport {
    /// Fold one outcome into the report
    pub fn push(&mut self, outcome: JobOutcome) {
        match outcome.status {
            OutcomeStatus::Succeeded => self.succeeded += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::DuplicateSkipped => self.skipped += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Total number of outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the report has no outcomes
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of fetched items across all successful jobs
    pub fn total_items(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.item_count)
            .sum()
    }

    /// Failed outcomes
    pub fn failures(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
    }

    /// Outcome for a given URL
    pub fn outcome_for(&self, url: &str) -> Option<&JobOutcome> {
        self.outcomes.iter().find(|o| o.url == url)
    }

    /// Whether every job either succeeded or was skipped as a duplicate
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

/// Event emitted during a batch
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Batch accepted and workers starting
    BatchStarted {
        /// Number of submitted URLs
        total: usize,
        /// Worker count
        concurrency: usize,
    },

    /// A worker picked up a job and classified it
    JobStarted {
        /// Job URL
        url: String,
        /// Classified category
        category: Category,
    },

    /// A fetch attempt failed
    AttemptFailed {
        /// Job URL
        url: String,
        /// 1-based attempt number
        attempt: u32,
        /// Attempt budget
        max_attempts: u32,
        /// Error message
        error: String,
        /// Backoff before the next attempt, if one will be made
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_in_ms: Option<u64>,
    },

    /// Job skipped because the URL is already in the history ledger
    DuplicateSkipped {
        /// Job URL
        url: String,
    },

    /// Job fetched successfully
    JobSucceeded {
        /// Job URL
        url: String,
        /// Resolved title
        title: String,
        /// Number of items fetched
        item_count: usize,
    },

    /// Job gave up
    JobFailed {
        /// Job URL
        url: String,
        /// Taxonomy bucket
        kind: ErrorKind,
        /// Error message
        error: String,
    },

    /// One clip was processed
    ClipProcessed {
        /// Job URL
        url: String,
        /// 1-based clip position
        index: usize,
        /// Whether the clip was produced
        success: bool,
    },

    /// A history write failed; the record is kept in memory
    HistoryPersistFailed {
        /// Error message
        error: String,
    },

    /// Cancellation requested; no new jobs will start
    BatchCancelled,

    /// Batch finished
    BatchFinished {
        /// Succeeded jobs
        succeeded: usize,
        /// Failed jobs
        failed: usize,
        /// Duplicate-skipped jobs
        skipped: usize,
        /// Cancelled jobs
        cancelled: usize,
    },
}
