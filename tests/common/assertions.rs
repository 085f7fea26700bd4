//! Custom assertions for batch reports and event streams

use std::collections::HashMap;
use tea_dl::{BatchReport, Event};
use tokio::sync::broadcast;

/// Assert the report lists every submitted URL exactly as often as it was submitted
pub fn assert_reported_exactly_once(report: &BatchReport, submitted: &[&str]) {
    let mut expected: HashMap<&str, usize> = HashMap::new();
    for url in submitted {
        *expected.entry(url).or_default() += 1;
    }

    let mut seen: HashMap<&str, usize> = HashMap::new();
    for outcome in &report.outcomes {
        *seen.entry(outcome.url.as_str()).or_default() += 1;
    }

    assert_eq!(seen, expected, "every URL must be reported exactly once");
    assert_eq!(
        report.succeeded + report.failed + report.skipped + report.cancelled,
        submitted.len(),
        "aggregate counts must cover every outcome"
    );
}

/// Drain every event already buffered on `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Backoff delays announced for `url`, in order (`None` for the final give-up)
pub fn retry_delays(events: &[Event], url: &str) -> Vec<Option<u64>> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::AttemptFailed {
                url: event_url,
                retry_in_ms,
                ..
            } if event_url == url => Some(*retry_in_ms),
            _ => None,
        })
        .collect()
}
