pub mod drain;
pub mod hook;
pub mod status;
pub mod version;

use hooktrace::{logging, Orchestrator};
use hooktrace_core::{Config, ConfigError};
use hooktrace_store::Paths;
use std::path::PathBuf;

/// Everything an invocation needs once configuration has been read
pub struct Invocation {
    pub config: Config,
    pub orchestrator: Orchestrator,
    pub runtime: tokio::runtime::Runtime,
}

/// Load configuration, start logging and build the orchestrator
///
/// Returns `Ok(None)` when no backend is enabled; in that case nothing on disk
/// is touched.
pub fn prepare() -> anyhow::Result<Option<Invocation>> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log_config_error(&e);
            return Ok(None);
        }
    };
    if !config.any_backend_enabled() {
        return Ok(None);
    }

    let paths = Paths::new(&config)?;
    logging::init(&paths.log_file(), config.debug)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let dispatcher = hooktrace_backends::from_config(&config)?;
    let orchestrator = Orchestrator::new(&config, &paths, dispatcher);

    Ok(Some(Invocation {
        config,
        orchestrator,
        runtime,
    }))
}

/// Record a configuration error in the log file, if one can be opened at all
fn log_config_error(error: &ConfigError) {
    let mut fallback = Config::new();
    fallback.state_dir = std::env::var_os("HOOKTRACE_STATE_DIR").map(PathBuf::from);
    let Ok(paths) = Paths::new(&fallback) else {
        return;
    };
    if logging::init(&paths.log_file(), false).is_ok() {
        tracing::error!(error = %error, "invalid configuration, nothing to do");
    }
}
