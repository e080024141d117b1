//! Fan-out of records to every enabled backend with per-backend fencing

use crate::base::{Backend, BackendError};
use hooktrace_core::TraceRecord;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// What happened to one record at one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Failed(String),
    /// Not attempted because the backend was fenced earlier in this run
    Deferred,
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered)
    }
}

/// Per-backend outcomes for one record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub outcomes: BTreeMap<String, Outcome>,
}

impl Dispatch {
    /// Backends that still need this record
    pub fn owed(&self) -> BTreeSet<String> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_delivered())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn delivered(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_delivered()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(Outcome::is_delivered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Health {
    Healthy,
    Fenced(String),
}

/// Holds the configured backends and their health for the current invocation
pub struct Dispatcher {
    backends: Vec<Box<dyn Backend>>,
    call_timeout: Duration,
    health: Mutex<HashMap<String, Health>>,
}

impl Dispatcher {
    pub fn new(call_timeout: Duration) -> Self {
        Self {
            backends: Vec::new(),
            call_timeout,
            health: Mutex::new(HashMap::new()),
        }
    }

    /// Register a backend; disabled ones are kept out of every dispatch
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        if backend.is_enabled() {
            self.backends.push(backend);
        } else {
            tracing::debug!(backend = backend.id(), "backend disabled");
        }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_ids(&self) -> BTreeSet<String> {
        self.backends.iter().map(|b| b.id().to_string()).collect()
    }

    /// Backends fenced so far in this invocation
    pub fn fenced(&self) -> BTreeSet<String> {
        self.health_map()
            .iter()
            .filter(|(_, h)| matches!(h, Health::Fenced(_)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Send to every enabled backend
    pub async fn send(&self, record: &TraceRecord) -> Dispatch {
        self.send_to(record, None).await
    }

    /// Send to the enabled backends in `only`, or to all of them when `None`
    ///
    /// Each backend is called independently: a failure at one never stops the
    /// call to the next, and nothing is retried within this invocation.
    pub async fn send_to(&self, record: &TraceRecord, only: Option<&BTreeSet<String>>) -> Dispatch {
        let mut dispatch = Dispatch::default();

        for backend in &self.backends {
            let id = backend.id();
            if only.map(|set| !set.contains(id)).unwrap_or(false) {
                continue;
            }
            let outcome = self.send_one(backend.as_ref(), record).await;
            match &outcome {
                Outcome::Delivered => {
                    tracing::debug!(backend = id, trace_id = %record.trace_id, "delivered")
                }
                Outcome::Failed(reason) => {
                    tracing::warn!(backend = id, trace_id = %record.trace_id, %reason, "delivery failed")
                }
                Outcome::Deferred => {
                    tracing::debug!(backend = id, trace_id = %record.trace_id, "backend fenced, deferring")
                }
            }
            dispatch.outcomes.insert(id.to_string(), outcome);
        }

        dispatch
    }

    async fn send_one(&self, backend: &dyn Backend, record: &TraceRecord) -> Outcome {
        let id = backend.id();

        let health = self.health_map().get(id).cloned();
        match health {
            Some(Health::Fenced(_)) => return Outcome::Deferred,
            Some(Health::Healthy) => {}
            None => {
                let healthy = tokio::time::timeout(self.call_timeout, backend.health_check())
                    .await
                    .unwrap_or(false);
                if !healthy {
                    let reason = "health check failed".to_string();
                    self.fence(id, &reason);
                    return Outcome::Failed(reason);
                }
                self.mark_healthy(id);
            }
        }

        let result = match tokio::time::timeout(self.call_timeout, backend.submit(record)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Unreachable(format!(
                "timed out after {} ms",
                self.call_timeout.as_millis()
            ))),
        };

        match result {
            Ok(()) => Outcome::Delivered,
            Err(e) => {
                if e.is_unreachable() {
                    self.fence(id, &e.to_string());
                }
                Outcome::Failed(e.to_string())
            }
        }
    }

    fn fence(&self, id: &str, reason: &str) {
        tracing::warn!(backend = id, %reason, "fencing backend for the rest of this run");
        self.health_map()
            .insert(id.to_string(), Health::Fenced(reason.to_string()));
    }

    fn mark_healthy(&self, id: &str) {
        self.health_map().insert(id.to_string(), Health::Healthy);
    }

    fn health_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, Health>> {
        self.health.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
