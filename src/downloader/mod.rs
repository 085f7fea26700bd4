//! Batch orchestration split into focused submodules.
//!
//! The [`BatchDownloader`] owns the long-lived collaborators (history ledger,
//! fetcher, splitter, classifier) and runs one batch at a time:
//! - [`job`] - The per-URL fetch job state machine
//! - [`pool`] - Bounded worker pool draining the shared job queue
//!
//! A batch is validated up front (non-empty, concurrency within
//! [`MIN_CONCURRENCY`]..=[`MAX_CONCURRENCY`]); after that no single job can fail
//! the batch. Every submitted URL appears exactly once in the [`BatchReport`].

mod job;
mod pool;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::classifier::UrlClassifier;
use crate::config::{Config, DuplicateAction, MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::error::{Result, ValidationError};
use crate::fetcher::MediaFetcher;
use crate::history::{HistoryLedger, LedgerWriter};
use crate::processing::MediaProcessor;
use crate::timestamps::{ClipInput, TimestampSplitter};
use crate::types::{BatchReport, Event, HistoryRecord, QualityProfile};

use job::{FetchJob, JobContext};

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Answers the duplicate prompt for [`DuplicateAction::Ask`]
///
/// Called synchronously, once per job, from the worker running that job. Other
/// workers keep going while it blocks. Returning [`DuplicateAction::Ask`] again
/// is treated as [`DuplicateAction::Skip`].
pub trait DuplicateResolver: Send + Sync {
    /// Decide what to do with a URL that already has a ledger record
    fn resolve(&self, existing: &HistoryRecord) -> DuplicateAction;
}

/// Per-batch overrides of the configured defaults
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Quality preset (default: `defaultQuality`)
    pub quality: Option<QualityProfile>,
    /// Output root (default: `defaultOutputPath`)
    pub output_root: Option<PathBuf>,
    /// Extract audio only
    pub audio_only: bool,
    /// Duplicate policy (default: `duplicateAction`)
    pub duplicate_action: Option<DuplicateAction>,
}

/// One submitted URL, optionally with clip boundaries to split the result by
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    /// URL to fetch
    pub url: String,
    /// Clip boundaries, when the fetched item should be split
    pub split: Option<ClipInput>,
}

impl JobRequest {
    /// Plain fetch of `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            split: None,
        }
    }

    /// Split the fetched item by `clips`
    pub fn with_split(mut self, clips: ClipInput) -> Self {
        self.split = Some(clips);
        self
    }
}

impl From<&str> for JobRequest {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for JobRequest {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

/// Batch options with every default filled in from [`Config`]
#[derive(Clone, Debug)]
pub(crate) struct ResolvedOptions {
    pub(crate) quality: QualityProfile,
    pub(crate) output_root: PathBuf,
    pub(crate) audio_only: bool,
    pub(crate) duplicate_action: DuplicateAction,
}

impl ResolvedOptions {
    fn resolve(options: BatchOptions, config: &Config) -> Self {
        let quality = options.quality.unwrap_or(config.download.default_quality);
        Self {
            quality,
            output_root: options
                .output_root
                .unwrap_or_else(|| config.download.default_output_path.clone()),
            audio_only: options.audio_only || quality.is_audio_only(),
            duplicate_action: options
                .duplicate_action
                .unwrap_or(config.download.duplicate_action),
        }
    }
}

/// Bulk media downloader (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct BatchDownloader {
    config: Arc<Config>,
    ledger: Arc<HistoryLedger>,
    fetcher: Arc<dyn MediaFetcher>,
    splitter: TimestampSplitter,
    classifier: Arc<UrlClassifier>,
    resolver: Option<Arc<dyn DuplicateResolver>>,
    event_tx: broadcast::Sender<Event>,
    /// Parent of every batch token; cancelling it stops the running batch
    cancel: CancellationToken,
}

impl std::fmt::Debug for BatchDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchDownloader")
            .field("fetcher", &self.fetcher.name())
            .field("splitter", &self.splitter)
            .field("history", &self.ledger.path())
            .field("resolver", &self.resolver.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl BatchDownloader {
    /// Create a downloader from its collaborators
    ///
    /// Invalid configuration values are replaced by their defaults (see
    /// [`Config::sanitized`]).
    pub fn new(
        config: Config,
        ledger: Arc<HistoryLedger>,
        fetcher: Arc<dyn MediaFetcher>,
        processor: Arc<dyn MediaProcessor>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tracing::info!(
            fetcher = fetcher.name(),
            processor = processor.name(),
            history_records = ledger.len(),
            "Batch downloader initialized"
        );

        Self {
            config: Arc::new(config.sanitized()),
            ledger,
            fetcher,
            splitter: TimestampSplitter::new(processor),
            classifier: Arc::new(UrlClassifier::default()),
            resolver: None,
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Install the collaborator that answers [`DuplicateAction::Ask`]
    pub fn with_duplicate_resolver(mut self, resolver: Arc<dyn DuplicateResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Share a classifier (and its cache) with other components
    pub fn with_classifier(mut self, classifier: Arc<UrlClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The history ledger consulted for duplicates
    pub fn ledger(&self) -> &Arc<HistoryLedger> {
        &self.ledger
    }

    /// Subscribe to batch events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// A subscriber that falls more than 1000 events behind receives `RecvError::Lagged`.
    ///
    /// ```no_run
    /// # use tea_dl::BatchDownloader;
    /// # async fn example(downloader: BatchDownloader) {
    /// let mut events = downloader.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "batch event");
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the running batch when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop dispatching new jobs
    ///
    /// In-flight attempts run to completion; jobs still queued, or waiting out a
    /// backoff delay, are reported as cancelled. The downloader does not accept
    /// further batches afterwards: every later run reports all jobs cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run a batch with the configured worker count (`concurrentDownloads`)
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyBatch`] for an empty request list.
    pub async fn run_configured<I, R>(
        &self,
        requests: I,
        options: BatchOptions,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = R>,
        R: Into<JobRequest>,
    {
        self.run(requests, self.config.download.concurrent_downloads, options)
            .await
    }

    /// Run a batch with the given worker count
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyBatch`] or [`ValidationError::Concurrency`]
    /// before any job starts. Individual job failures never fail the batch; they
    /// are reported in the [`BatchReport`].
    pub async fn run<I, R>(
        &self,
        requests: I,
        concurrency: usize,
        options: BatchOptions,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = R>,
        R: Into<JobRequest>,
    {
        self.run_until_cancelled(requests, concurrency, options, CancellationToken::new())
            .await
    }

    /// Run a batch that also stops when `token` is cancelled
    ///
    /// See [`crate::cancel_on_signal`] for wiring the token to Ctrl+C.
    pub async fn run_until_cancelled<I, R>(
        &self,
        requests: I,
        concurrency: usize,
        options: BatchOptions,
        token: CancellationToken,
    ) -> Result<BatchReport>
    where
        I: IntoIterator<Item = R>,
        R: Into<JobRequest>,
    {
        let requests: Vec<JobRequest> = requests.into_iter().map(Into::into).collect();

        if requests.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(ValidationError::Concurrency {
                value: concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            }
            .into());
        }

        let options = ResolvedOptions::resolve(options, &self.config);
        tracing::info!(
            total = requests.len(),
            concurrency,
            quality = %options.quality,
            output_root = %options.output_root.display(),
            audio_only = options.audio_only,
            duplicate_action = ?options.duplicate_action,
            "Starting batch"
        );
        self.emit_event(Event::BatchStarted {
            total: requests.len(),
            concurrency,
        });

        let batch_token = self.cancel.child_token();
        let cancel_link = self.link_cancellation(token, batch_token.clone());
        let writer = LedgerWriter::spawn(self.ledger.clone(), Some(self.event_tx.clone()));

        let ctx = Arc::new(JobContext {
            config: self.config.clone(),
            options,
            ledger: self.ledger.clone(),
            history: writer.handle(),
            fetcher: self.fetcher.clone(),
            splitter: self.splitter.clone(),
            classifier: self.classifier.clone(),
            resolver: self.resolver.clone(),
            events: self.event_tx.clone(),
            cancel: batch_token.clone(),
            exclusive_root: requests.len() == 1 || concurrency == 1,
        });

        let jobs: Vec<FetchJob> = requests
            .into_iter()
            .enumerate()
            .map(|(id, request)| FetchJob::new(id, request))
            .collect();

        let report = pool::run_pool(jobs, concurrency, ctx).await;

        cancel_link.abort();

        // Every worker has exited, so the writer holds the last handle
        let persist_errors = writer.finish().await;
        if !persist_errors.is_empty() {
            tracing::warn!(
                failures = persist_errors.len(),
                "Some history writes failed during the batch"
            );
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            "Batch finished"
        );
        self.emit_event(Event::BatchFinished {
            succeeded: report.succeeded,
            failed: report.failed,
            skipped: report.skipped,
            cancelled: report.cancelled,
        });

        Ok(report)
    }

    /// Forward `external` into the batch token and announce cancellation once
    fn link_cancellation(
        &self,
        external: CancellationToken,
        batch: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = external.cancelled() => batch.cancel(),
                _ = batch.cancelled() => {}
            }
            tracing::warn!("Batch cancelled, no new jobs will start");
            event_tx.send(Event::BatchCancelled).ok();
        })
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
