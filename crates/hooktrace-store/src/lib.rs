//! Persistent state shared between invocations: checkpoints and the retry queue

mod checkpoint;
mod error;
mod io;
mod lock;
mod paths;
mod queue;

pub use checkpoint::{CheckpointStore, CheckpointWrite};
pub use error::StoreError;
pub use io::{append_jsonl, atomic_write, read_jsonl, JsonlContents};
pub use lock::LockGuard;
pub use paths::Paths;
pub use queue::{
    ClaimedBatch, DurableQueue, QueueEntry, ATTEMPTS_WARN_EVERY, QUEUE_WARN_DEPTH, STALE_CLAIM_AFTER,
};
