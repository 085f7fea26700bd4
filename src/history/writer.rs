//! Single-writer task for the history ledger
//!
//! Workers never write the ledger themselves. They send completed records over
//! a channel to one spawned task, which applies them in arrival order. A failed
//! save is reported as an [`Event::HistoryPersistFailed`] and retried on the
//! next record or at [`LedgerWriter::finish`]; it never stops the batch.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::HistoryLedger;
use crate::error::PersistenceError;
use crate::types::{Event, HistoryRecord};

/// Records buffered before senders wait
const CHANNEL_CAPACITY: usize = 64;

/// Cloneable sending side of a [`LedgerWriter`]
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    tx: mpsc::Sender<HistoryRecord>,
}

impl LedgerHandle {
    /// Queue a record for writing
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WriterClosed`] if the writer task has stopped.
    pub async fn record(&self, record: HistoryRecord) -> Result<(), PersistenceError> {
        self.tx
            .send(record)
            .await
            .map_err(|_| PersistenceError::WriterClosed)
    }
}

/// The task that owns all ledger writes during a batch
#[derive(Debug)]
pub struct LedgerWriter {
    handle: LedgerHandle,
    task: JoinHandle<Vec<PersistenceError>>,
}

impl LedgerWriter {
    /// Spawn the writer task for `ledger`
    ///
    /// Save failures are published on `events` when given.
    pub fn spawn(ledger: Arc<HistoryLedger>, events: Option<broadcast::Sender<Event>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<HistoryRecord>(CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut errors = Vec::new();
            let report = |e: &PersistenceError| {
                if let Some(events) = &events {
                    events
                        .send(Event::HistoryPersistFailed {
                            error: e.to_string(),
                        })
                        .ok();
                }
            };

            while let Some(record) = rx.recv().await {
                let url = record.url.clone();
                if let Err(e) = ledger.record(record).await {
                    tracing::warn!(url = %url, error = %e, "History write failed, will retry on next save");
                    report(&e);
                    errors.push(e);
                }
            }

            // Channel closed: one last attempt for anything still unsaved
            if let Err(e) = ledger.flush().await {
                tracing::error!(error = %e, "History could not be saved; records remain in memory only");
                report(&e);
                errors.push(e);
            }

            errors
        });

        Self {
            handle: LedgerHandle { tx },
            task,
        }
    }

    /// A sender workers can clone
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Close the channel, wait for every queued record, and return the save
    /// failures seen along the way
    ///
    /// Outstanding [`LedgerHandle`] clones must be dropped first or this waits for them.
    pub async fn finish(self) -> Vec<PersistenceError> {
        drop(self.handle);
        match self.task.await {
            Ok(errors) => errors,
            Err(e) => {
                tracing::error!(error = %e, "History writer task panicked");
                vec![PersistenceError::WriterClosed]
            }
        }
    }
}
