//! Worker pool - drains the shared job queue with a fixed number of workers.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use super::job::{FetchJob, JobContext, lost_outcome};
use crate::types::{BatchReport, JobOutcome};

/// Run every job on `concurrency` workers and collect one outcome per job
///
/// Each worker pulls the next pending job from the shared queue, runs it to a
/// terminal state, and reports the outcome before pulling again. A job's retry
/// delay only occupies its own worker. Once the batch token is cancelled no
/// worker pulls another job; whatever is left in the queue is reported as
/// cancelled.
///
/// The report lists outcomes in completion order. A worker that panics loses
/// only the job it was running, which is reported as failed.
pub(crate) async fn run_pool(
    jobs: Vec<FetchJob>,
    concurrency: usize,
    ctx: Arc<JobContext>,
) -> BatchReport {
    let total = jobs.len();
    let urls: Vec<String> = jobs.iter().map(|job| job.url().to_string()).collect();
    let queue = Arc::new(Mutex::new(jobs.into_iter().collect::<VecDeque<_>>()));
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<(usize, JobOutcome)>();

    let worker_count = concurrency.min(total);
    let mut workers = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        workers.push(tokio::spawn(worker(
            worker_id,
            queue.clone(),
            ctx.clone(),
            outcome_tx.clone(),
        )));
    }
    drop(outcome_tx);

    let mut report = BatchReport::default();
    let mut reported = vec![false; total];

    // Closes once every worker has exited, panicked ones included
    while let Some((id, outcome)) = outcome_rx.recv().await {
        reported[id] = true;
        report.push(outcome);
    }

    for (worker_id, handle) in workers.into_iter().enumerate() {
        if let Err(e) = handle.await {
            tracing::error!(worker_id, error = %e, "Worker task panicked");
        }
    }

    let leftover: Vec<FetchJob> = queue.lock().await.drain(..).collect();
    let cancelled = ctx.cancel.is_cancelled();
    for job in leftover {
        reported[job.id()] = true;
        if cancelled {
            report.push(job.cancel_unstarted());
        } else {
            // Every worker died before the queue drained
            report.push(lost_outcome(job.url().to_string()));
        }
    }

    for (id, url) in urls.into_iter().enumerate() {
        if !reported[id] {
            tracing::error!(url = %url, "Job lost by a failed worker");
            report.push(lost_outcome(url));
        }
    }

    report
}

async fn worker(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<FetchJob>>>,
    ctx: Arc<JobContext>,
    outcomes: mpsc::UnboundedSender<(usize, JobOutcome)>,
) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        if ctx.cancel.is_cancelled() {
            tracing::debug!(worker_id, "Batch cancelled, worker stopping");
            break;
        }

        let job = {
            let mut queue_guard = queue.lock().await;
            queue_guard.pop_front()
        };
        let Some(job) = job else {
            break;
        };

        let id = job.id();
        let outcome = job.run(&ctx).await;
        if outcomes.send((id, outcome)).is_err() {
            break;
        }
    }

    tracing::debug!(worker_id, "Worker finished");
}
