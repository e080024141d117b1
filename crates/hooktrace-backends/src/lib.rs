//! Backend adapters, dispatch with per-backend fencing, and queue draining

pub mod base;
pub mod dispatcher;
pub mod drain;
pub mod langfuse;
pub mod otlp;

pub use base::{http_client, Backend, BackendError};
pub use dispatcher::{Dispatch, Dispatcher, Outcome};
pub use drain::{drain_queue, DrainReport};
pub use langfuse::{LangfuseBackend, LANGFUSE_BACKEND_ID};
pub use otlp::{OtlpBackend, OTLP_BACKEND_ID};

use hooktrace_core::Config;

/// Dispatcher holding every backend enabled in `config`
pub fn from_config(config: &Config) -> Result<Dispatcher, BackendError> {
    let mut dispatcher = Dispatcher::new(config.backend_timeout);
    if config.langfuse.is_none() && config.otlp.is_none() {
        return Ok(dispatcher);
    }

    let client = http_client(config.backend_timeout)?;
    if let Some(langfuse) = &config.langfuse {
        dispatcher.register(Box::new(LangfuseBackend::new(client.clone(), langfuse.clone())));
    }
    if let Some(otlp) = &config.otlp {
        dispatcher.register(Box::new(OtlpBackend::new(client, otlp.clone())));
    }
    Ok(dispatcher)
}
