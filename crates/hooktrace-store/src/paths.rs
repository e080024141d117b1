//! Path resolution for state files and session logs

use hooktrace_core::Config;
use std::path::PathBuf;

/// Resolves standard paths for state files
#[derive(Debug, Clone)]
pub struct Paths {
    pub state_dir: PathBuf,
    pub projects_dir: PathBuf,
}

impl Paths {
    /// Resolve paths under `~/.claude`, honouring config overrides
    pub fn new(config: &Config) -> std::io::Result<Self> {
        let home_claude = match (&config.state_dir, &config.projects_dir) {
            (Some(_), Some(_)) => PathBuf::new(),
            _ => dirs::home_dir()
                .ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "home directory not found")
                })?
                .join(".claude"),
        };

        Ok(Self {
            state_dir: config
                .state_dir
                .clone()
                .unwrap_or_else(|| home_claude.join("state")),
            projects_dir: config
                .projects_dir
                .clone()
                .unwrap_or_else(|| home_claude.join("projects")),
        })
    }

    /// Paths rooted at explicit directories
    pub fn at(state_dir: impl Into<PathBuf>, projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            projects_dir: projects_dir.into(),
        }
    }

    /// One checkpoint file per session lives here
    pub fn checkpoints_dir(&self) -> PathBuf {
        self.state_dir.join("checkpoints")
    }

    pub fn checkpoints_lock(&self) -> PathBuf {
        self.state_dir.join("checkpoints.lock")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.state_dir.join("pending_traces.jsonl")
    }

    /// Unparseable queue lines are moved here
    pub fn queue_corrupt_file(&self) -> PathBuf {
        self.state_dir.join("pending_traces.corrupt.jsonl")
    }

    pub fn queue_lock(&self) -> PathBuf {
        self.state_dir.join("queue.lock")
    }

    pub fn log_file(&self) -> PathBuf {
        self.state_dir.join("hooktrace.log")
    }
}
