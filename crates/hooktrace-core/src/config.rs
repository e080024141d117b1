//! Environment-driven configuration

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LANGFUSE_HOST: &str = "http://localhost:3050";
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";
pub const DEFAULT_MAX_SESSIONS: usize = 10;
pub const DEFAULT_TIME_BUDGET_MS: u64 = 5_000;
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{backend} is enabled but {variable} is not set")]
    MissingCredentials {
        backend: &'static str,
        variable: &'static str,
    },
    #[error("invalid value for {variable}: {value:?}")]
    Invalid { variable: &'static str, value: String },
}

/// Langfuse ingestion API settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LangfuseConfig {
    pub public_key: String,
    pub secret_key: String,
    pub host: String,
}

/// OTLP/HTTP exporter settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtlpConfig {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Langfuse backend, `None` when disabled
    pub langfuse: Option<LangfuseConfig>,

    /// OTLP backend, `None` when disabled
    pub otlp: Option<OtlpConfig>,

    /// Debug-level logging
    pub debug: bool,

    /// Redact secrets from payloads
    pub redact: bool,

    /// Max sessions processed per invocation
    pub max_sessions_per_run: usize,

    /// Soft budget checked between sessions
    pub time_budget: Duration,

    /// Per-call timeout for backend requests
    pub backend_timeout: Duration,

    /// Overrides `~/.claude/state`
    pub state_dir: Option<PathBuf>,

    /// Overrides `~/.claude/projects`
    pub projects_dir: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            langfuse: None,
            otlp: None,
            debug: false,
            redact: true,
            max_sessions_per_run: DEFAULT_MAX_SESSIONS,
            time_budget: Duration::from_millis(DEFAULT_TIME_BUDGET_MS),
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            state_dir: None,
            projects_dir: None,
        }
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::new();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if is_true(lookup("TRACE_TO_LANGFUSE")) {
            let public_key = non_empty("LANGFUSE_PUBLIC_KEY").ok_or(
                ConfigError::MissingCredentials {
                    backend: "langfuse",
                    variable: "LANGFUSE_PUBLIC_KEY",
                },
            )?;
            let secret_key = non_empty("LANGFUSE_SECRET_KEY").ok_or(
                ConfigError::MissingCredentials {
                    backend: "langfuse",
                    variable: "LANGFUSE_SECRET_KEY",
                },
            )?;
            let host = non_empty("LANGFUSE_HOST").unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.into());
            config.langfuse = Some(LangfuseConfig {
                public_key,
                secret_key,
                host: host.trim_end_matches('/').to_string(),
            });
        }

        if is_true(lookup("TRACE_TO_OTLP")) {
            let endpoint = non_empty("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_OTLP_ENDPOINT.into());
            let headers = match non_empty("OTEL_EXPORTER_OTLP_HEADERS") {
                Some(raw) => parse_headers(&raw)?,
                None => Vec::new(),
            };
            config.otlp = Some(OtlpConfig {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                headers,
            });
        }

        config.debug = is_true(lookup("CC_LANGFUSE_DEBUG")) || is_true(lookup("HOOKTRACE_DEBUG"));
        config.redact = lookup("CC_LANGFUSE_REDACT")
            .map(|v| v.trim().to_lowercase() != "false")
            .unwrap_or(true);

        if let Some(raw) = non_empty("HOOKTRACE_MAX_SESSIONS") {
            config.max_sessions_per_run = parse_positive("HOOKTRACE_MAX_SESSIONS", &raw)?;
        }
        if let Some(raw) = non_empty("HOOKTRACE_TIME_BUDGET_MS") {
            config.time_budget =
                Duration::from_millis(parse_number("HOOKTRACE_TIME_BUDGET_MS", &raw)?);
        }
        if let Some(raw) = non_empty("HOOKTRACE_BACKEND_TIMEOUT_MS") {
            config.backend_timeout =
                Duration::from_millis(parse_positive("HOOKTRACE_BACKEND_TIMEOUT_MS", &raw)?);
        }
        config.state_dir = non_empty("HOOKTRACE_STATE_DIR").map(PathBuf::from);
        config.projects_dir = non_empty("HOOKTRACE_PROJECTS_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// True when at least one backend is switched on
    pub fn any_backend_enabled(&self) -> bool {
        self.langfuse.is_some() || self.otlp.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn is_true(value: Option<String>) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_number<T: std::str::FromStr>(variable: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        variable,
        value: raw.to_string(),
    })
}

/// A count or duration of at least 1
fn parse_positive<T>(variable: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + Default + PartialEq,
{
    let value: T = parse_number(variable, raw)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            variable,
            value: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_headers(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => {
                Ok((k.trim().to_string(), v.trim().to_string()))
            }
            _ => Err(ConfigError::Invalid {
                variable: "OTEL_EXPORTER_OTLP_HEADERS",
                value: raw.to_string(),
            }),
        })
        .collect()
}
