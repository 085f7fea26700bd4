//! Shared test helpers: scripted collaborators and batch contexts.

use crate::config::Config;
use crate::downloader::job::JobContext;
use crate::downloader::{BatchDownloader, BatchOptions, ResolvedOptions};
use crate::error::{FetchError, ProcessingError};
use crate::fetcher::{FetchRequest, FetchedMedia, MediaFetcher};
use crate::history::{HistoryLedger, LedgerWriter};
use crate::processing::{ClipRequest, MediaProcessor};
use crate::timestamps::TimestampSplitter;
use crate::classifier::UrlClassifier;
use crate::types::Event;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::{TempDir, tempdir};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Fetcher that replays scripted results per URL
///
/// URLs without a script (or whose script ran out) succeed with a single item
/// of four minutes. A URL containing `panic` makes the fetch panic.
#[derive(Default)]
pub(crate) struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Result<FetchedMedia, FetchError>>>>,
    requests: Mutex<Vec<FetchRequest>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hold every fetch for `delay` before answering
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue results for `url`, consumed one per attempt
    pub(crate) fn script(&self, url: &str, results: Vec<Result<FetchedMedia, FetchError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), results.into());
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedMedia, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        if request.url.contains("panic") {
            panic!("scripted fetcher panic for {}", request.url);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|results| results.pop_front());
        scripted.unwrap_or_else(|| Ok(media("Fetched Video", None)))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Successful single-item fetch result, four minutes long
pub(crate) fn media(title: &str, output_path: Option<PathBuf>) -> FetchedMedia {
    FetchedMedia {
        title: title.to_string(),
        item_count: 1,
        output_path,
        duration: Some(Duration::from_secs(240)),
        ..FetchedMedia::default()
    }
}

/// Processor that records every cut and reports the requested output path
#[derive(Default)]
pub(crate) struct RecordingProcessor {
    pub(crate) requests: Mutex<Vec<ClipRequest>>,
}

#[async_trait]
impl MediaProcessor for RecordingProcessor {
    async fn cut(&self, request: &ClipRequest) -> Result<PathBuf, ProcessingError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(request.output.clone())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Config rooted in `dir` with millisecond backoff
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.default_output_path = dir.join("downloads");
    config.persistence.history_path = dir.join("history.json");
    config.retry.base_delay = Duration::from_millis(10);
    config
}

/// A job context wired to scripted collaborators
pub(crate) struct TestContext {
    pub(crate) ctx: JobContext,
    pub(crate) writer: LedgerWriter,
    pub(crate) ledger: Arc<HistoryLedger>,
    pub(crate) fetcher: Arc<ScriptedFetcher>,
    pub(crate) processor: Arc<RecordingProcessor>,
    pub(crate) events: broadcast::Receiver<Event>,
    pub(crate) dir: TempDir,
}

impl TestContext {
    /// Drain all events emitted so far
    pub(crate) fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Build a job context; must be called inside a tokio runtime
pub(crate) fn create_test_context(
    configure: impl FnOnce(&mut Config),
    options: BatchOptions,
) -> TestContext {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let ledger = Arc::new(HistoryLedger::in_memory());
    let fetcher = Arc::new(ScriptedFetcher::new());
    let processor = Arc::new(RecordingProcessor::default());
    let (event_tx, events) = broadcast::channel(1000);
    let writer = LedgerWriter::spawn(ledger.clone(), Some(event_tx.clone()));

    let ctx = JobContext {
        options: ResolvedOptions::resolve(options, &config),
        config: Arc::new(config),
        ledger: ledger.clone(),
        history: writer.handle(),
        fetcher: fetcher.clone(),
        splitter: TimestampSplitter::new(processor.clone()),
        classifier: Arc::new(UrlClassifier::default()),
        resolver: None,
        events: event_tx,
        cancel: CancellationToken::new(),
        exclusive_root: true,
    };

    TestContext {
        ctx,
        writer,
        ledger,
        fetcher,
        processor,
        events,
        dir,
    }
}

/// Helper to create a test BatchDownloader with an in-memory ledger.
/// Returns the downloader, its fetcher, and the tempdir (which must be kept alive).
pub(crate) fn create_test_downloader(
    fetcher: ScriptedFetcher,
) -> (BatchDownloader, Arc<ScriptedFetcher>, TempDir) {
    let dir = tempdir().unwrap();
    let fetcher = Arc::new(fetcher);
    let downloader = BatchDownloader::new(
        test_config(dir.path()),
        Arc::new(HistoryLedger::in_memory()),
        fetcher.clone(),
        Arc::new(RecordingProcessor::default()),
    );
    (downloader, fetcher, dir)
}
