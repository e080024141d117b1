use std::collections::BTreeMap;

use hooktrace_core::Config;
use hooktrace_store::{CheckpointStore, DurableQueue, Paths, QueueEntry};

/// Queue and checkpoint state as a JSON value
pub fn status_json(config: &Config, paths: &Paths) -> anyhow::Result<serde_json::Value> {
    let queue = DurableQueue::new(paths);
    let checkpoints = CheckpointStore::new(paths);
    let entries = queue.snapshot()?;

    let mut enabled = Vec::new();
    if config.langfuse.is_some() {
        enabled.push(hooktrace_backends::LANGFUSE_BACKEND_ID);
    }
    if config.otlp.is_some() {
        enabled.push(hooktrace_backends::OTLP_BACKEND_ID);
    }

    Ok(serde_json::json!({
        "backends": enabled,
        "queue_depth": entries.len(),
        "owed": owed_per_backend(&entries),
        "oldest_enqueued_at": entries.iter().map(|e| e.enqueued_at).min(),
        "most_attempts": entries.iter().map(|e| e.attempts).max().unwrap_or(0),
        "stale_claims": queue.stale_claims(),
        "checkpoints": checkpoints.count(),
        "state_dir": paths.state_dir,
    }))
}

fn owed_per_backend(entries: &[QueueEntry]) -> BTreeMap<String, usize> {
    let mut owed = BTreeMap::new();
    for entry in entries {
        for backend in &entry.owed_backends {
            *owed.entry(backend.clone()).or_insert(0) += 1;
        }
    }
    owed
}

pub fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let paths = Paths::new(&config)?;
    println!("{}", status_json(&config, &paths)?);
    Ok(())
}
