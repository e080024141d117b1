//! Durable queue of records still owed to one or more backends
//!
//! Entries live in `pending_traces.jsonl`. A drain claims the whole file under
//! the queue lock by moving its contents into a private claim file, works
//! through the claim without holding the lock, and finally puts the entries
//! that are still owed back in front of anything enqueued meanwhile.

use crate::error::StoreError;
use crate::io::{append_jsonl, atomic_write, read_jsonl, unique_sibling};
use crate::lock::LockGuard;
use crate::paths::Paths;
use chrono::{DateTime, Utc};
use hooktrace_core::TraceRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Claim files older than this belong to a crashed drain and are adopted
pub const STALE_CLAIM_AFTER: Duration = Duration::from_secs(10 * 60);

/// Queue depth above which each run logs a warning
pub const QUEUE_WARN_DEPTH: usize = 1000;

/// A record still owed after this many drain attempts, and every multiple of it, is logged
pub const ATTEMPTS_WARN_EVERY: u32 = 10;

const CLAIM_SUFFIX: &str = "claim";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub record: TraceRecord,
    /// Backend ids that have not yet accepted the record
    pub owed_backends: BTreeSet<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Drain passes that offered the record to at least one owed backend
    #[serde(default)]
    pub attempts: u32,
}

impl QueueEntry {
    pub fn new<I, S>(record: TraceRecord, owed_backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            record,
            owed_backends: owed_backends.into_iter().map(Into::into).collect(),
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.owed_backends.is_empty()
    }
}

/// Entries taken out of the live queue by one drain
#[derive(Debug)]
pub struct ClaimedBatch {
    claim_file: Option<PathBuf>,
    /// Oldest first
    pub entries: Vec<QueueEntry>,
}

impl ClaimedBatch {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct DurableQueue {
    queue_file: PathBuf,
    corrupt_file: PathBuf,
    lock_path: PathBuf,
}

impl DurableQueue {
    pub fn new(paths: &Paths) -> Self {
        Self {
            queue_file: paths.queue_file(),
            corrupt_file: paths.queue_corrupt_file(),
            lock_path: paths.queue_lock(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.queue_file
    }

    fn lock(&self) -> Result<LockGuard, StoreError> {
        LockGuard::acquire(&self.lock_path).map_err(StoreError::io(&self.lock_path))
    }

    /// Append one entry; the record is durable once this returns `Ok`
    pub fn enqueue(&self, entry: &QueueEntry) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        append_jsonl(&self.queue_file, entry).map_err(StoreError::io(&self.queue_file))
    }

    /// Take every live entry, plus any stale claims, for draining
    pub fn claim(&self) -> Result<ClaimedBatch, StoreError> {
        let claim_file = {
            let _lock = self.lock()?;

            let stale = self.claim_files(true);
            let mut pending = read_or_empty(&self.queue_file)?;
            for path in &stale {
                tracing::warn!(claim = %path.display(), "adopting claim left by an interrupted drain");
                pending.extend(read_or_empty(path)?);
            }

            if pending.is_empty() {
                None
            } else {
                let claim_file = unique_sibling(&self.queue_file, CLAIM_SUFFIX);
                atomic_write(&claim_file, &pending).map_err(StoreError::io(&claim_file))?;
                remove_if_exists(&self.queue_file)?;
                for path in &stale {
                    remove_if_exists(path)?;
                }
                Some(claim_file)
            }
        };

        let entries = match &claim_file {
            Some(path) => self.read_entries(path)?,
            None => Vec::new(),
        };

        Ok(ClaimedBatch { claim_file, entries })
    }

    /// Return still-owed entries ahead of anything enqueued since the claim,
    /// then discard the claim
    pub fn release(&self, batch: ClaimedBatch, remaining: &[QueueEntry]) -> Result<(), StoreError> {
        let Some(claim_file) = batch.claim_file else {
            return Ok(());
        };
        let _lock = self.lock()?;

        if !remaining.is_empty() {
            let mut data = Vec::new();
            for entry in remaining {
                serde_json::to_writer(&mut data, entry)?;
                data.push(b'\n');
            }
            data.extend(read_or_empty(&self.queue_file)?);
            atomic_write(&self.queue_file, &data).map_err(StoreError::io(&self.queue_file))?;
        }

        remove_if_exists(&claim_file)
    }

    /// Entries waiting for delivery, including any held by an in-flight or crashed drain
    pub fn len(&self) -> usize {
        std::iter::once(self.queue_file.clone())
            .chain(self.claim_files(false))
            .map(|path| count_lines(&path))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every queued entry without claiming anything
    pub fn snapshot(&self) -> Result<Vec<QueueEntry>, StoreError> {
        let mut entries = Vec::new();
        for path in std::iter::once(self.queue_file.clone()).chain(self.claim_files(false)) {
            let contents = read_jsonl::<QueueEntry>(&path).map_err(StoreError::io(&path))?;
            entries.extend(contents.records);
        }
        Ok(entries)
    }

    /// Claim files old enough to be adopted by the next drain
    pub fn stale_claims(&self) -> usize {
        self.claim_files(true).len()
    }

    fn claim_files(&self, stale_only: bool) -> Vec<PathBuf> {
        let (Some(dir), Some(prefix)) = (
            self.queue_file.parent(),
            self.queue_file.file_name().and_then(|n| n.to_str()),
        ) else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };

        let suffix = format!(".{}", CLAIM_SUFFIX);
        let now = SystemTime::now();
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(prefix) && name.len() > prefix.len() && name.ends_with(&suffix)
            })
            .filter(|entry| {
                !stale_only
                    || entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .ok()
                        .and_then(|modified| now.duration_since(modified).ok())
                        .map(|age| age >= STALE_CLAIM_AFTER)
                        .unwrap_or(false)
            })
            .map(|entry| entry.path())
            .collect();
        files.sort();
        files
    }

    fn read_entries(&self, path: &Path) -> Result<Vec<QueueEntry>, StoreError> {
        let contents = read_jsonl::<QueueEntry>(path).map_err(StoreError::io(path))?;
        if !contents.corrupt_lines.is_empty() {
            tracing::error!(
                count = contents.corrupt_lines.len(),
                sidecar = %self.corrupt_file.display(),
                "corrupt queue entries moved aside"
            );
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.corrupt_file)
                .map_err(StoreError::io(&self.corrupt_file))?;
            let mut data = contents.corrupt_lines.join("\n");
            data.push('\n');
            file.write_all(data.as_bytes())
                .map_err(StoreError::io(&self.corrupt_file))?;
        }

        let mut entries = contents.records;
        entries.sort_by_key(|e| e.enqueued_at);
        Ok(entries)
    }
}

fn read_or_empty(path: &Path) -> Result<Vec<u8>, StoreError> {
    match std::fs::read(path) {
        Ok(mut data) => {
            if !data.is_empty() && !data.ends_with(b"\n") {
                data.push(b'\n');
            }
            Ok(data)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StoreError::io(path)(e)),
    }
}

fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(path)(e)),
    }
}

fn count_lines(path: &Path) -> usize {
    match std::fs::File::open(path) {
        Ok(file) => BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|l| !l.trim().is_empty())
            .count(),
        Err(_) => 0,
    }
}
