//! Scripted stand-ins for the external fetch and processing tools

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tea_dl::error::{FetchError, ProcessingError};
use tea_dl::fetcher::{FetchRequest, FetchedMedia, MediaFetcher};
use tea_dl::processing::{ClipRequest, MediaProcessor};
use tea_dl::{BatchDownloader, Config, HistoryLedger};
use tempfile::TempDir;

/// What the fake fetcher does for one attempt
#[derive(Clone, Debug)]
pub enum Scripted {
    /// Write `<title>.mp4` under the output root and report it
    Succeed {
        /// Title to report
        title: String,
        /// Duration to report
        duration: Duration,
    },
    /// Report a collection of `items` entries without writing anything
    Collection {
        /// Title to report
        title: String,
        /// Number of entries
        items: usize,
    },
    /// Fail with this error
    Fail(FetchError),
}

impl Scripted {
    pub fn video(title: &str) -> Self {
        Scripted::Succeed {
            title: title.to_string(),
            duration: Duration::from_secs(240),
        }
    }

    pub fn transient(message: &str) -> Self {
        Scripted::Fail(FetchError::transient(message))
    }

    pub fn permanent(message: &str) -> Self {
        Scripted::Fail(FetchError::permanent(message))
    }
}

/// Fetcher that replays a script per URL
///
/// Unscripted URLs (or URLs whose script ran out) succeed as a four minute
/// video titled after the last path segment.
#[derive(Default)]
pub struct FakeFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every attempt for `delay`
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn script(&self, url: &str, steps: impl IntoIterator<Item = Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), steps.into_iter().collect());
    }

    /// Attempts made for `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of attempts observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Scripted {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(|steps| steps.pop_front());
        scripted.unwrap_or_else(|| {
            let tail = url.rsplit(['/', '=']).next().unwrap_or("video");
            Scripted::video(&format!("Video {tail}"))
        })
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedMedia, FetchError> {
        self.calls.lock().unwrap().push(request.url.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.next_step(&request.url) {
            Scripted::Succeed { title, duration } => {
                let root = request
                    .output_template
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .to_path_buf();
                std::fs::create_dir_all(&root).unwrap();
                let path = root.join(format!("{title}.mp4"));
                std::fs::write(&path, b"fake media").unwrap();
                Ok(FetchedMedia {
                    title,
                    item_count: 1,
                    output_path: Some(path),
                    duration: Some(duration),
                    ..FetchedMedia::default()
                })
            }
            Scripted::Collection { title, items } => Ok(FetchedMedia {
                title,
                item_count: items,
                ..FetchedMedia::default()
            }),
            Scripted::Fail(error) => Err(error),
        }
    }

    fn name(&self) -> &'static str {
        "fake-fetcher"
    }
}

/// Processor that writes a small file per clip and records every request
#[derive(Default)]
pub struct FakeProcessor {
    pub requests: Mutex<Vec<ClipRequest>>,
}

#[async_trait]
impl MediaProcessor for FakeProcessor {
    async fn cut(&self, request: &ClipRequest) -> Result<PathBuf, ProcessingError> {
        self.requests.lock().unwrap().push(request.clone());
        tokio::fs::write(&request.output, request.metadata.title.as_bytes())
            .await
            .map_err(|e| ProcessingError::Failed {
                output: request.output.clone(),
                reason: e.to_string(),
            })?;
        Ok(request.output.clone())
    }

    fn name(&self) -> &'static str {
        "fake-processor"
    }
}

/// A downloader wired to fakes inside a temp directory
pub struct Harness {
    pub downloader: BatchDownloader,
    pub fetcher: Arc<FakeFetcher>,
    pub processor: Arc<FakeProcessor>,
    pub ledger: Arc<HistoryLedger>,
    pub dir: TempDir,
}

impl Harness {
    pub fn downloads(&self) -> PathBuf {
        self.dir.path().join("downloads")
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.path().join("history.json")
    }
}

/// Config rooted in `dir` with short backoff
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.default_output_path = dir.join("downloads");
    config.persistence.history_path = dir.join("history.json");
    config.retry.base_delay = Duration::from_millis(20);
    config
}

/// Build a harness with a file-backed ledger
pub async fn harness(fetcher: FakeFetcher, configure: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);

    let ledger = Arc::new(
        HistoryLedger::open(&config.persistence.history_path)
            .await
            .unwrap(),
    );
    let fetcher = Arc::new(fetcher);
    let processor = Arc::new(FakeProcessor::default());
    let downloader = BatchDownloader::new(config, ledger.clone(), fetcher.clone(), processor.clone());

    Harness {
        downloader,
        fetcher,
        processor,
        ledger,
        dir,
    }
}
