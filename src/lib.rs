//! # tea-dl
//!
//! Resilient bulk media download orchestration on top of yt-dlp and ffmpeg.
//!
//! ## Design Philosophy
//!
//! tea-dl owns the hard part of bulk downloading and delegates the rest:
//! - **Classification** - URLs are tagged single, collection, channel or unknown before anything runs
//! - **Bounded concurrency** - 1 to 5 workers drain a shared queue; one failure never affects another job
//! - **Retry with backoff** - transient failures back off exponentially, permanent ones fail at once
//! - **Duplicate avoidance** - a persisted history ledger answers "already fetched?"
//! - **Splitting** - a fetched video can be cut into clips from pasted or structured timestamps
//! - **Library-first** - No CLI or UI; consumers subscribe to events instead of polling
//!
//! Extraction and encoding are delegated to [`fetcher::MediaFetcher`] and
//! [`processing::MediaProcessor`] implementations (yt-dlp and ffmpeg by default).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tea_dl::{BatchDownloader, BatchOptions, Config, FfmpegProcessor, HistoryLedger, YtDlpFetcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let ledger = Arc::new(HistoryLedger::open(&config.persistence.history_path).await?);
//!     let fetcher = Arc::new(YtDlpFetcher::from_config(&config.tools)?);
//!     let processor = Arc::new(FfmpegProcessor::from_config(&config.tools)?);
//!
//!     let downloader = BatchDownloader::new(config, ledger, fetcher, processor);
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = downloader
//!         .run(
//!             [
//!                 "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!                 "https://www.youtube.com/playlist?list=PL59FEE129ADFF2B12",
//!             ],
//!             3,
//!             BatchOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{} succeeded, {} failed", report.succeeded, report.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// URL classification
pub mod classifier;
/// Configuration types
pub mod config;
/// Batch orchestration (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// External media fetching
pub mod fetcher;
/// Download history ledger
pub mod history;
/// External media processing
pub mod processing;
/// Retry logic with exponential backoff
pub mod retry;
/// Clip boundary parsing and splitting
pub mod timestamps;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use classifier::{Classification, UrlClassifier};
pub use config::{Config, DuplicateAction};
pub use downloader::{BatchDownloader, BatchOptions, DuplicateResolver, JobRequest};
pub use error::{Error, ErrorKind, FetchError, Result, ValidationError};
pub use fetcher::{MediaFetcher, YtDlpFetcher};
pub use history::HistoryLedger;
pub use processing::{FfmpegProcessor, MediaProcessor};
pub use timestamps::{Clip, ClipInput, ClipSet, Offset, TimestampSplitter};
pub use types::{
    BatchReport, Category, ClipOutcome, Event, HistoryRecord, JobOutcome, JobState,
    OutcomeStatus, QualityProfile,
};

/// Cancel `token` when a termination signal arrives.
///
/// Pair with [`BatchDownloader::run_until_cancelled`]: queued jobs are not
/// started, running attempts finish, and the report still lists every URL.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use tea_dl::{BatchDownloader, BatchOptions, cancel_on_signal};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(downloader: BatchDownloader, urls: Vec<String>) -> tea_dl::Result<()> {
/// let token = CancellationToken::new();
/// tokio::spawn(cancel_on_signal(token.clone()));
///
/// let report = downloader
///     .run_until_cancelled(urls, 3, BatchOptions::default(), token)
///     .await?;
/// println!("{} cancelled", report.cancelled);
/// # Ok(())
/// # }
/// ```
pub async fn cancel_on_signal(token: tokio_util::sync::CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => {
            tracing::info!("Cancelling batch after termination signal");
            token.cancel();
        }
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
