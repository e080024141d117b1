//! One invocation: drain the queue, then trace new turns of modified sessions

use hooktrace_backends::{drain_queue, Dispatcher, DrainReport};
use hooktrace_core::{
    discover_sessions, locate_modified, Checkpoint, Config, LocatedSession, RecordBuilder, Redactor,
    TurnAssembler,
};
use hooktrace_store::{
    CheckpointStore, CheckpointWrite, DurableQueue, Paths, QueueEntry, QUEUE_WARN_DEPTH,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Counters reported at the end of every invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub sessions_found: usize,
    pub sessions_modified: usize,
    pub sessions_processed: usize,
    /// Modified sessions beyond the per-run cap
    pub sessions_deferred: usize,
    /// Located sessions left for later because the time budget ran out
    pub sessions_skipped: usize,
    pub turns: usize,
    pub records_delivered: usize,
    pub records_queued: usize,
    pub malformed_lines: usize,
    pub drain_delivered: usize,
    pub drain_pending: usize,
    pub queue_depth: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct SessionOutcome {
    turns: usize,
    delivered: usize,
    queued: usize,
    malformed: usize,
}

pub struct Orchestrator {
    checkpoints: CheckpointStore,
    queue: DurableQueue,
    dispatcher: Dispatcher,
    builder: RecordBuilder,
    projects_dir: PathBuf,
    max_sessions: usize,
    time_budget: Duration,
}

impl Orchestrator {
    pub fn new(config: &Config, paths: &Paths, dispatcher: Dispatcher) -> Self {
        let redactor = if config.redact {
            Redactor::new()
        } else {
            Redactor::disabled()
        };
        Self {
            checkpoints: CheckpointStore::new(paths),
            queue: DurableQueue::new(paths),
            dispatcher,
            builder: RecordBuilder::new(redactor),
            projects_dir: paths.projects_dir.clone(),
            max_sessions: config.max_sessions_per_run,
            time_budget: config.time_budget,
        }
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Retry queued records; store failures are logged, never raised
    pub async fn drain(&self, deadline: Option<Instant>) -> DrainReport {
        match drain_queue(&self.queue, &self.dispatcher, deadline).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "queue drain failed");
                DrainReport::default()
            }
        }
    }

    /// Run one full invocation
    ///
    /// The time budget is checked between sessions only; the first located
    /// session is always processed so a slow drain cannot starve new work.
    pub async fn run(&self) -> RunSummary {
        let started = Instant::now();
        let deadline = started + self.time_budget;
        let mut summary = RunSummary::default();

        let drain = self.drain(Some(deadline)).await;
        summary.drain_delivered = drain.delivered;
        summary.drain_pending = drain.pending;

        let sessions = discover_sessions(&self.projects_dir);
        summary.sessions_found = sessions.len();
        let (located, deferred) = locate_modified(sessions, &self.checkpoints, self.max_sessions);
        summary.sessions_modified = located.len() + deferred;
        summary.sessions_deferred = deferred;
        if deferred > 0 {
            tracing::info!(deferred, cap = self.max_sessions, "session cap reached, deferring the rest");
        }

        for (index, session) in located.iter().enumerate() {
            if index > 0 && Instant::now() >= deadline {
                summary.sessions_skipped = located.len() - index;
                tracing::info!(
                    skipped = summary.sessions_skipped,
                    "time budget reached, stopping before next session"
                );
                break;
            }

            let span = tracing::info_span!(
                "session",
                id = %session.session.id,
                project = %session.session.project
            );
            let outcome = self.process_session(session).instrument(span).await;
            summary.sessions_processed += 1;
            summary.turns += outcome.turns;
            summary.records_delivered += outcome.delivered;
            summary.records_queued += outcome.queued;
            summary.malformed_lines += outcome.malformed;
        }

        summary.queue_depth = self.queue.len();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        self.report(&summary);
        summary
    }

    /// Assemble, build, dispatch, then advance the checkpoint
    ///
    /// The checkpoint only moves past turns whose record was delivered to every
    /// backend or durably queued for the ones that still need it.
    async fn process_session(&self, located: &LocatedSession) -> SessionOutcome {
        let session = &located.session;
        let mut outcome = SessionOutcome::default();
        let stored = self.checkpoints.get(&session.id);

        match std::fs::metadata(&session.log_path) {
            Ok(meta) if meta.len() < stored.offset => {
                tracing::warn!(
                    len = meta.len(),
                    offset = stored.offset,
                    "log is shorter than its checkpoint, skipping"
                );
                return outcome;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "session log unreadable");
                return outcome;
            }
        }

        let mut assembler = match TurnAssembler::open(&session.log_path, stored.offset) {
            Ok(assembler) => assembler,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open session log");
                return outcome;
            }
        };

        let mut next = stored;
        let mut handed_off_all = true;
        for assembled in assembler.by_ref() {
            let ordinal = next.turn_count + 1;
            let record = self.builder.build(session, ordinal, &assembled.turn);
            let dispatch = self.dispatcher.send(&record).await;
            let owed = dispatch.owed();

            if owed.is_empty() {
                outcome.delivered += 1;
            } else {
                let trace_id = record.trace_id.clone();
                if let Err(e) = self.queue.enqueue(&QueueEntry::new(record, owed)) {
                    tracing::error!(
                        trace_id = %trace_id,
                        error = %e,
                        "failed to queue undelivered record, stopping session here"
                    );
                    handed_off_all = false;
                    break;
                }
                outcome.queued += 1;
            }

            next.offset = assembled.end_offset;
            next.turn_count = ordinal;
            outcome.turns += 1;
        }
        outcome.malformed = assembler.malformed_lines();

        // The observed mtime is only recorded once everything readable was handed
        // off; otherwise the locator must pick the session up again next run.
        if handed_off_all {
            next.last_updated_at = located.modified_at;
        }
        if next != stored {
            self.commit(&session.id, next);
        }

        tracing::debug!(
            turns = outcome.turns,
            delivered = outcome.delivered,
            queued = outcome.queued,
            offset = next.offset,
            "session processed"
        );
        outcome
    }

    fn commit(&self, session_id: &str, checkpoint: Checkpoint) {
        match self.checkpoints.set(session_id, checkpoint) {
            Ok(CheckpointWrite::Written) => {}
            Ok(CheckpointWrite::Rejected { stored }) => {
                tracing::debug!(stored_offset = stored.offset, "a concurrent run already advanced this session");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to write checkpoint");
            }
        }
    }

    fn report(&self, summary: &RunSummary) {
        tracing::info!(
            sessions_found = summary.sessions_found,
            sessions_processed = summary.sessions_processed,
            sessions_deferred = summary.sessions_deferred + summary.sessions_skipped,
            turns = summary.turns,
            delivered = summary.records_delivered,
            queued = summary.records_queued,
            drain_delivered = summary.drain_delivered,
            drain_pending = summary.drain_pending,
            queue_depth = summary.queue_depth,
            elapsed_ms = summary.elapsed_ms,
            "run complete"
        );
        if u128::from(summary.elapsed_ms) > self.time_budget.as_millis() {
            tracing::warn!(
                elapsed_ms = summary.elapsed_ms,
                budget_ms = self.time_budget.as_millis() as u64,
                "run exceeded its time budget"
            );
        }
        if summary.queue_depth > QUEUE_WARN_DEPTH {
            tracing::warn!(queue_depth = summary.queue_depth, "retry queue is growing");
        }
    }
}
