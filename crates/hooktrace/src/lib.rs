//! Turn-level tracing of assistant sessions, run as a Stop hook

pub mod logging;
pub mod orchestrator;

pub use orchestrator::{Orchestrator, RunSummary};
