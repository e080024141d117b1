//! Retry of queued records against the backends they still owe

use crate::dispatcher::Dispatcher;
use hooktrace_store::{DurableQueue, QueueEntry, StoreError, ATTEMPTS_WARN_EVERY};
use std::collections::BTreeSet;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Entries fully delivered and removed
    pub delivered: usize,
    /// Entries still owed to at least one backend
    pub pending: usize,
    /// Individual backend deliveries made
    pub deliveries: usize,
    /// Entries left untouched because the deadline passed
    pub skipped: usize,
}

/// Drain the queue oldest-first
///
/// Each entry is offered only to the backends it still owes; whatever those
/// backends accept is removed from its owed set, so a backend that already has
/// the record never sees it again. Owed backends that are not configured in
/// this run are left owed.
pub async fn drain_queue(
    queue: &DurableQueue,
    dispatcher: &Dispatcher,
    deadline: Option<Instant>,
) -> Result<DrainReport, StoreError> {
    let batch = queue.claim()?;
    if batch.is_empty() {
        queue.release(batch, &[])?;
        return Ok(DrainReport::default());
    }

    let configured = dispatcher.backend_ids();
    let mut report = DrainReport::default();
    let mut remaining: Vec<QueueEntry> = Vec::new();

    for entry in &batch.entries {
        let mut entry = entry.clone();

        if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
            report.skipped += 1;
            remaining.push(entry);
            continue;
        }

        let targets: BTreeSet<String> = entry
            .owed_backends
            .intersection(&configured)
            .cloned()
            .collect();
        if !targets.is_empty() {
            let dispatch = dispatcher.send_to(&entry.record, Some(&targets)).await;
            for (id, outcome) in &dispatch.outcomes {
                if outcome.is_delivered() {
                    entry.owed_backends.remove(id);
                    report.deliveries += 1;
                }
            }
            entry.attempts += 1;
        }

        if entry.is_settled() {
            tracing::debug!(trace_id = %entry.record.trace_id, "queued record delivered");
            report.delivered += 1;
        } else {
            if !targets.is_empty() && entry.attempts % ATTEMPTS_WARN_EVERY == 0 {
                tracing::warn!(
                    trace_id = %entry.record.trace_id,
                    attempts = entry.attempts,
                    owed = ?entry.owed_backends,
                    "queued record keeps failing"
                );
            }
            remaining.push(entry);
        }
    }

    report.pending = remaining.len();
    queue.release(batch, &remaining)?;

    tracing::info!(
        delivered = report.delivered,
        pending = report.pending,
        deliveries = report.deliveries,
        skipped = report.skipped,
        "queue drained"
    );
    Ok(report)
}
