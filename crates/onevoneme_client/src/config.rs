//! Client configuration.
//!
//! Every field has a default, so an empty TOML file (or no file at all) is
//! a working configuration against a local backend.

use crate::error::{ClientError, ClientErrorKind};
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Environment variable overriding [`ClientConfig::base_url`].
pub const BASE_URL_ENV: &str = "ONEVONEME_BASE_URL";

/// Environment variable overriding [`ClientConfig::session_file`].
pub const SESSION_FILE_ENV: &str = "ONEVONEME_SESSION_FILE";

/// How registration responses are interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct RegistrationPolicy {
    /// Non-2xx statuses that mean "name already exists, keep using it".
    /// Every other non-2xx status rejects the registration.
    #[serde(default = "default_proceed_statuses")]
    proceed_statuses: Vec<u16>,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            proceed_statuses: default_proceed_statuses(),
        }
    }
}

fn default_proceed_statuses() -> Vec<u16> {
    vec![409]
}

/// Configuration for the match client.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct ClientConfig {
    /// Backend API root, including any `/api` prefix.
    #[serde(default = "default_base_url")]
    #[setters(into)]
    base_url: String,

    /// Delay between queue polls.
    #[serde(default = "default_queue_interval_ms")]
    queue_interval_ms: u64,

    /// Delay between snapshot polls while waiting.
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,

    /// Spacing of the fast polls that follow a submission.
    #[serde(default = "default_burst_spacing_ms")]
    burst_spacing_ms: u64,

    /// Number of fast polls after a submission.
    #[serde(default = "default_burst_polls")]
    burst_polls: u32,

    /// Grace delay between seeing a resolved match vanish and tearing down.
    #[serde(default = "default_gone_grace_ms")]
    gone_grace_ms: u64,

    /// How long a resolved session lingers before tearing itself down.
    #[serde(default = "default_teardown_delay_ms")]
    teardown_delay_ms: u64,

    /// Unchanged polling cycles tolerated before giving up on the opponent.
    #[serde(default = "default_wait_timeout_cycles")]
    wait_timeout_cycles: u32,

    /// Extra attempts for a submission that failed in transport.
    #[serde(default = "default_submit_retries")]
    submit_retries: u32,

    /// Base backoff between submission attempts (doubles each retry).
    #[serde(default = "default_retry_backoff_ms")]
    retry_backoff_ms: u64,

    /// Polls after an accepted move that may still show the old board
    /// before the optimistic mark is dropped.
    #[serde(default = "default_confirm_polls")]
    confirm_polls: u32,

    /// Per-request timeout for the HTTP transport.
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,

    /// Opponent name used when neither the assignment nor a snapshot names one.
    #[serde(default = "default_opponent")]
    #[setters(into)]
    default_opponent: String,

    /// Where the CLI keeps the current username. `None` keeps it in memory.
    #[serde(default)]
    #[setters(strip_option)]
    session_file: Option<PathBuf>,

    /// Registration status policy.
    #[serde(default)]
    registration: RegistrationPolicy,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_queue_interval_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_burst_spacing_ms() -> u64 {
    200
}

fn default_burst_polls() -> u32 {
    3
}

fn default_gone_grace_ms() -> u64 {
    2000
}

fn default_teardown_delay_ms() -> u64 {
    10_000
}

fn default_wait_timeout_cycles() -> u32 {
    60
}

fn default_submit_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    150
}

fn default_confirm_polls() -> u32 {
    4
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_opponent() -> String {
    "opponent".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            queue_interval_ms: default_queue_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            burst_spacing_ms: default_burst_spacing_ms(),
            burst_polls: default_burst_polls(),
            gone_grace_ms: default_gone_grace_ms(),
            teardown_delay_ms: default_teardown_delay_ms(),
            wait_timeout_cycles: default_wait_timeout_cycles(),
            submit_retries: default_submit_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            confirm_polls: default_confirm_polls(),
            request_timeout_ms: default_request_timeout_ms(),
            default_opponent: default_opponent(),
            session_file: None,
            registration: RegistrationPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        info!(base_url = %config.base_url, "Config loaded successfully");
        Ok(config)
    }

    /// Loads the file if given (defaults otherwise), then applies
    /// environment overrides.
    #[instrument(skip(path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from an environment lookup.
    #[instrument(skip_all)]
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!(base_url = %url, "Base URL overridden from environment");
            self.base_url = url;
        }
        if let Some(file) = lookup(SESSION_FILE_ENV).filter(|v| !v.trim().is_empty()) {
            self.session_file = Some(PathBuf::from(file));
        }
        self
    }

    /// Checks values that would make the client misbehave.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if reqwest::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::new(format!(
                "base_url is not a valid URL: {}",
                self.base_url
            )));
        }
        if self.queue_interval_ms == 0 || self.poll_interval_ms == 0 || self.burst_spacing_ms == 0
        {
            return Err(ConfigError::new(
                "polling intervals must be greater than zero".to_string(),
            ));
        }
        if self.wait_timeout_cycles == 0 {
            return Err(ConfigError::new(
                "wait_timeout_cycles must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Queue poll interval.
    pub fn queue_interval(&self) -> Duration {
        Duration::from_millis(self.queue_interval_ms)
    }

    /// Snapshot poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Burst poll spacing.
    pub fn burst_spacing(&self) -> Duration {
        Duration::from_millis(self.burst_spacing_ms)
    }

    /// Grace delay after a resolved match vanishes.
    pub fn gone_grace(&self) -> Duration {
        Duration::from_millis(self.gone_grace_ms)
    }

    /// Linger time for a resolved session.
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms)
    }

    /// Backoff before submission retry number `attempt` (1-based).
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<ConfigError> for ClientError {
    #[track_caller]
    fn from(err: ConfigError) -> Self {
        ClientError::new(ClientErrorKind::Config {
            message: err.message,
        })
    }
}
