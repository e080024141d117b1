//! Backend adapter trait and shared HTTP helpers

use async_trait::async_trait;
use hooktrace_core::TraceRecord;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Transport failure, timeout or server-side error; the backend is fenced
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The backend answered but refused the record
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl BackendError {
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status.is_client_error() => BackendError::Rejected {
                status: status.as_u16(),
                body: e.to_string(),
            },
            _ => BackendError::Unreachable(e.to_string()),
        }
    }
}

/// An export target for trace records
#[async_trait]
pub trait Backend: Send + Sync {
    /// Stable identifier stored in queue entries
    fn id(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Cheap reachability probe, run at most once per invocation
    async fn health_check(&self) -> bool;

    async fn submit(&self, record: &TraceRecord) -> Result<(), BackendError>;
}

/// HTTP client shared by the adapters of one invocation
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(concat!("hooktrace/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| BackendError::Unreachable(format!("failed to build http client: {}", e)))
}

/// Map a response status onto the adapter error taxonomy
///
/// Throttling and server errors count as unreachable so the record is retried
/// on a later run without being treated as a bad record.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() || status.as_u16() == 429 {
        return Err(BackendError::Unreachable(format!("status {}: {}", status.as_u16(), truncate(&body))));
    }
    Err(BackendError::Rejected {
        status: status.as_u16(),
        body: truncate(&body),
    })
}

fn truncate(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
