//! Fetch job state machine
//!
//! One [`FetchJob`] carries one submitted URL from `Pending` to a terminal
//! state. Each call to [`FetchJob::step`] performs exactly one transition, so a
//! job's states are strictly sequential and the only suspension points are the
//! fetch itself and the backoff sleep:
//!
//! ```text
//! Pending -> Classifying -> DuplicateSkipped
//!                        -> Failed (validation)
//!                        -> Fetching -> Succeeded
//!                                    -> Failed
//!                                    -> Retrying -> Fetching
//!                                                -> Cancelled
//! ```
//!
//! A running attempt is never interrupted. Cancellation is observed before an
//! attempt starts and while sleeping out a backoff delay.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{DuplicateResolver, JobRequest, ResolvedOptions};
use crate::classifier::{Classification, UrlClassifier};
use crate::config::{Config, DuplicateAction};
use crate::error::{ErrorKind, ValidationError};
use crate::fetcher::{AudioExtraction, FetchRequest, FetchedMedia, MediaFetcher, RetryHints};
use crate::history::{HistoryLedger, LedgerHandle};
use crate::retry::{self, RetryDecision};
use crate::timestamps::{self, ClipInput, SourceMetadata, SplitTarget, TimestampSplitter};
use crate::types::{
    Category, ClipOutcome, Event, FailureDetail, HistoryRecord, JobOutcome, JobState,
    OutcomeStatus,
};
use crate::utils::find_downloaded_media;

/// Directory, next to the fetched file, that receives split clips
const CLIPS_DIR: &str = "clips";

/// Everything a job needs from its batch, shared by all workers
pub(crate) struct JobContext {
    pub(crate) config: Arc<Config>,
    pub(crate) options: ResolvedOptions,
    /// Read side of the ledger, for duplicate checks
    pub(crate) ledger: Arc<HistoryLedger>,
    /// Write side of the ledger; completions go through the single writer
    pub(crate) history: LedgerHandle,
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) splitter: TimestampSplitter,
    pub(crate) classifier: Arc<UrlClassifier>,
    pub(crate) resolver: Option<Arc<dyn DuplicateResolver>>,
    pub(crate) events: broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
    /// No other job writes into `options.output_root` while this one runs
    pub(crate) exclusive_root: bool,
}

impl JobContext {
    fn emit(&self, event: Event) {
        self.events.send(event).ok();
    }
}

/// One submitted URL and its progress
#[derive(Debug)]
pub(crate) struct FetchJob {
    /// Submission index, unique within the batch
    id: usize,
    request: JobRequest,
    state: JobState,
    classification: Option<Classification>,
    attempts: u32,
    /// Delay to sleep out in `Retrying`
    backoff: Duration,
    media: Option<FetchedMedia>,
    output_path: Option<PathBuf>,
    clips: Vec<ClipOutcome>,
    error: Option<FailureDetail>,
}

impl FetchJob {
    pub(crate) fn new(id: usize, request: JobRequest) -> Self {
        Self {
            id,
            request,
            state: JobState::Pending,
            classification: None,
            attempts: 0,
            backoff: Duration::ZERO,
            media: None,
            output_path: None,
            clips: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn url(&self) -> &str {
        &self.request.url
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Drive the job to a terminal state and produce its outcome
    pub(crate) async fn run(mut self, ctx: &JobContext) -> JobOutcome {
        while !self.state.is_terminal() {
            self.step(ctx).await;
        }
        self.into_outcome()
    }

    /// Perform one transition; terminal states are left unchanged
    pub(crate) async fn step(&mut self, ctx: &JobContext) {
        let next = match self.state {
            JobState::Pending => JobState::Classifying,
            JobState::Classifying => self.classify(ctx),
            JobState::Fetching => self.attempt(ctx).await,
            JobState::Retrying => self.back_off(ctx).await,
            JobState::DuplicateSkipped
            | JobState::Succeeded
            | JobState::Failed
            | JobState::Cancelled => return,
        };

        tracing::debug!(
            url = %self.request.url,
            from = ?self.state,
            to = ?next,
            "Job state transition"
        );
        self.state = next;
    }

    /// Outcome for a job that never left the queue because the batch was cancelled
    pub(crate) fn cancel_unstarted(mut self) -> JobOutcome {
        self.error = Some(FailureDetail {
            kind: ErrorKind::Cancelled,
            message: "batch cancelled before the job started".to_string(),
        });
        self.state = JobState::Cancelled;
        self.into_outcome()
    }

    fn classify(&mut self, ctx: &JobContext) -> JobState {
        let classification = match ctx.classifier.classify(&self.request.url) {
            Ok(c) => c,
            Err(e) => return self.reject(ctx, e),
        };
        let category = classification.category;
        self.classification = Some(classification);

        if category == Category::Unknown && !ctx.config.download.fetch_unknown {
            let url = self.request.url.clone();
            return self.reject(ctx, ValidationError::UnrecognizedUrl { url });
        }

        let split_rejection = match &self.request.split {
            Some(_) if !category.allows_split() => {
                Some(ValidationError::SplitNotAllowed { category })
            }
            Some(input) => input
                .preflight()
                .err()
                .map(|e| ValidationError::ClipInput(e.to_string())),
            None => None,
        };
        if let Some(e) = split_rejection {
            return self.reject(ctx, e);
        }

        tracing::info!(url = %self.request.url, category = %category, "Job started");
        ctx.emit(Event::JobStarted {
            url: self.request.url.clone(),
            category,
        });

        if let Some(existing) = ctx.ledger.get(&self.request.url) {
            match duplicate_action(&existing, ctx) {
                DuplicateAction::Overwrite => {
                    tracing::info!(url = %self.request.url, "Already downloaded, fetching again");
                }
                DuplicateAction::Skip | DuplicateAction::Ask => {
                    tracing::info!(
                        url = %self.request.url,
                        title = %existing.title,
                        "Already downloaded, skipping"
                    );
                    ctx.emit(Event::DuplicateSkipped {
                        url: self.request.url.clone(),
                    });
                    return JobState::DuplicateSkipped;
                }
            }
        }

        JobState::Fetching
    }

    async fn attempt(&mut self, ctx: &JobContext) -> JobState {
        if ctx.cancel.is_cancelled() {
            return self.cancelled();
        }

        let category = self
            .classification
            .as_ref()
            .map(|c| c.category)
            .unwrap_or(Category::Unknown);
        let request = fetch_request(&self.request.url, category, ctx);
        let max_attempts = ctx.config.retry.max_attempts;

        self.attempts += 1;
        tracing::info!(
            url = %self.request.url,
            attempt = self.attempts,
            max_attempts,
            fetcher = ctx.fetcher.name(),
            "Fetching"
        );

        let started = SystemTime::now();
        let error = match ctx.fetcher.fetch(&request).await {
            Ok(media) => {
                self.complete(category, media, started, ctx).await;
                return JobState::Succeeded;
            }
            Err(e) => e,
        };

        match retry::decide(self.attempts, max_attempts, &error, &ctx.config.retry) {
            RetryDecision::Retry { after } => {
                let delay_ms = after.as_millis() as u64;
                tracing::warn!(
                    url = %self.request.url,
                    error = %error,
                    attempt = self.attempts,
                    max_attempts,
                    delay_ms,
                    "Fetch attempt failed, retrying"
                );
                ctx.emit(Event::AttemptFailed {
                    url: self.request.url.clone(),
                    attempt: self.attempts,
                    max_attempts,
                    error: error.to_string(),
                    retry_in_ms: Some(delay_ms),
                });
                self.backoff = after;
                JobState::Retrying
            }
            RetryDecision::GiveUp => {
                ctx.emit(Event::AttemptFailed {
                    url: self.request.url.clone(),
                    attempt: self.attempts,
                    max_attempts,
                    error: error.to_string(),
                    retry_in_ms: None,
                });
                self.fail(ctx, error.kind.into(), error.to_string())
            }
        }
    }

    async fn back_off(&mut self, ctx: &JobContext) -> JobState {
        tokio::select! {
            _ = tokio::time::sleep(self.backoff) => JobState::Fetching,
            _ = ctx.cancel.cancelled() => self.cancelled(),
        }
    }

    /// Record the fetch in the ledger and run the split, if one was requested
    async fn complete(
        &mut self,
        category: Category,
        media: FetchedMedia,
        started: SystemTime,
        ctx: &JobContext,
    ) {
        let output_path = match &media.output_path {
            Some(path) => Some(path.clone()),
            None if !category.is_multi_item() => {
                // Another job's file may share the root; only a title match is trusted then
                let fresh_since = ctx.exclusive_root.then_some(started);
                find_downloaded_media(&ctx.options.output_root, &media.title, fresh_since).await
            }
            None => None,
        };

        let record = HistoryRecord {
            url: self.request.url.clone(),
            title: media.title.clone(),
            output_path: output_path
                .clone()
                .unwrap_or_else(|| ctx.options.output_root.clone()),
            category,
            quality: ctx.options.quality,
            timestamp: Utc::now(),
        };
        if let Err(e) = ctx.history.record(record).await {
            tracing::warn!(url = %self.request.url, error = %e, "Could not queue history record");
            ctx.emit(Event::HistoryPersistFailed {
                error: e.to_string(),
            });
        }

        tracing::info!(
            url = %self.request.url,
            title = %media.title,
            items = media.item_count,
            attempts = self.attempts,
            "Fetch succeeded"
        );
        ctx.emit(Event::JobSucceeded {
            url: self.request.url.clone(),
            title: media.title.clone(),
            item_count: media.item_count,
        });

        if let Some(input) = &self.request.split {
            match split(input, &media, output_path.as_deref(), &self.request.url, ctx).await {
                Ok(clips) => self.clips = clips,
                Err(detail) => {
                    tracing::warn!(
                        url = %self.request.url,
                        error = %detail.message,
                        "Fetched, but splitting could not start"
                    );
                    self.error = Some(detail);
                }
            }
        }

        self.output_path = output_path;
        self.media = Some(media);
    }

    fn reject(&mut self, ctx: &JobContext, error: ValidationError) -> JobState {
        self.fail(ctx, ErrorKind::Validation, error.to_string())
    }

    fn fail(&mut self, ctx: &JobContext, kind: ErrorKind, message: String) -> JobState {
        tracing::error!(
            url = %self.request.url,
            kind = %kind,
            attempts = self.attempts,
            error = %message,
            "Job failed"
        );
        ctx.emit(Event::JobFailed {
            url: self.request.url.clone(),
            kind,
            error: message.clone(),
        });
        self.error = Some(FailureDetail { kind, message });
        JobState::Failed
    }

    fn cancelled(&mut self) -> JobState {
        tracing::info!(url = %self.request.url, attempts = self.attempts, "Job cancelled");
        self.error = Some(FailureDetail {
            kind: ErrorKind::Cancelled,
            message: "batch cancelled before the job finished".to_string(),
        });
        JobState::Cancelled
    }

    fn into_outcome(self) -> JobOutcome {
        let status = match self.state {
            JobState::Succeeded => OutcomeStatus::Succeeded,
            JobState::DuplicateSkipped => OutcomeStatus::DuplicateSkipped,
            JobState::Cancelled => OutcomeStatus::Cancelled,
            _ => OutcomeStatus::Failed,
        };

        JobOutcome {
            url: self.request.url,
            status,
            category: self.classification.map(|c| c.category),
            title: self.media.as_ref().map(|m| m.title.clone()),
            item_count: self.media.as_ref().map_or(0, |m| m.item_count),
            output_path: self.output_path,
            attempts: self.attempts,
            error: self.error,
            clips: self.clips,
        }
    }
}

/// Outcome for a job whose worker stopped without reporting it
pub(crate) fn lost_outcome(url: String) -> JobOutcome {
    JobOutcome {
        url,
        status: OutcomeStatus::Failed,
        category: None,
        title: None,
        item_count: 0,
        output_path: None,
        attempts: 0,
        error: Some(FailureDetail {
            kind: ErrorKind::Permanent,
            message: "worker stopped before reporting an outcome".to_string(),
        }),
        clips: Vec::new(),
    }
}

/// Resolve the duplicate policy for a URL already in the ledger
fn duplicate_action(existing: &HistoryRecord, ctx: &JobContext) -> DuplicateAction {
    match ctx.options.duplicate_action {
        DuplicateAction::Ask => match &ctx.resolver {
            Some(resolver) => match resolver.resolve(existing) {
                DuplicateAction::Ask => DuplicateAction::Skip,
                action => action,
            },
            None => DuplicateAction::Skip,
        },
        action => action,
    }
}

/// Assemble the fully resolved fetch options for one attempt
pub(crate) fn fetch_request(url: &str, category: Category, ctx: &JobContext) -> FetchRequest {
    let request = FetchRequest::new(url, ctx.options.quality, category, &ctx.options.output_root)
        .with_thumbnail(ctx.config.download.thumbnail_embed)
        .with_retry_hints(RetryHints::default());

    if ctx.options.audio_only {
        request.with_audio(AudioExtraction::mp3(
            ctx.config.download.audio_quality.clone(),
        ))
    } else {
        request
    }
}

/// Parse the clip input against the fetched duration and cut every clip
async fn split(
    input: &ClipInput,
    media: &FetchedMedia,
    source: Option<&Path>,
    url: &str,
    ctx: &JobContext,
) -> Result<Vec<ClipOutcome>, FailureDetail> {
    let Some(source) = source else {
        return Err(FailureDetail {
            kind: ErrorKind::Processing,
            message: "downloaded file not found, cannot split".to_string(),
        });
    };

    let metadata = SourceMetadata {
        duration: media.duration,
        chapters: &media.chapters,
        description: media.description.as_deref(),
    };
    let clips = timestamps::parse_for_source(input, metadata).map_err(|e| FailureDetail {
        kind: ErrorKind::Validation,
        message: e.to_string(),
    })?;

    let target = SplitTarget {
        source: source.to_path_buf(),
        output_dir: source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CLIPS_DIR),
        audio_only: ctx.options.audio_only,
        album: Some(media.title.clone()),
    };

    tracing::info!(url, mode = input.mode(), clips = clips.len(), "Splitting fetched media");
    let outcomes = ctx.splitter.apply(&clips, &target).await;
    for outcome in &outcomes {
        ctx.emit(Event::ClipProcessed {
            url: url.to_string(),
            index: outcome.index,
            success: outcome.is_success(),
        });
    }

    Ok(outcomes)
}
