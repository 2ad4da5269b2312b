//! Client configuration.
//!
//! Defaults target the public Census Data API. Values can be overridden with
//! builder setters or from the environment.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::census::client::LoggingMode;
use crate::census::MAX_VARIABLES_PER_REQUEST;
use crate::error::CensusError;

/// Public Census Data API root.
pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// User agent string sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("census-stitch/", env!("CARGO_PKG_VERSION"));

/// Environment variable overriding the API root.
pub const ENV_BASE_URL: &str = "CENSUS_API_URL";

/// Environment variable overriding the request timeout (seconds).
pub const ENV_TIMEOUT_SECS: &str = "CENSUS_API_TIMEOUT_SECS";

/// Settings for [`CensusClient`](crate::census::CensusClient).
///
/// Deserializes from partial documents; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API root; the vintage and dataset path are appended to it.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Variables per request. Never more than the API ceiling of 50.
    pub chunk_size: usize,
    /// Controls URL sanitization for request logging.
    pub logging_mode: LoggingMode,
    /// Value of the `User-Agent` header.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            chunk_size: MAX_VARIABLES_PER_REQUEST,
            logging_mode: LoggingMode::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Builds a config from defaults, then applies `CENSUS_API_URL` and
    /// `CENSUS_API_TIMEOUT_SECS` when set.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` if the timeout is not a number.
    pub fn from_env() -> Result<Self, CensusError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, CensusError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.trim().is_empty()) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                CensusError::Configuration(format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))
            })?;
        }

        Ok(config)
    }

    /// Sets the API root.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the number of variables per request.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Sets the logging mode.
    pub fn logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Sets the user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Checks the config and returns the parsed base URL.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` when the chunk size is outside
    /// `1..=50`, the timeout is zero, or the base URL does not parse.
    pub fn validate(&self) -> Result<Url, CensusError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_VARIABLES_PER_REQUEST {
            return Err(CensusError::Configuration(format!(
                "chunk size must be between 1 and {}, got {}",
                MAX_VARIABLES_PER_REQUEST, self.chunk_size
            )));
        }

        if self.timeout_secs == 0 {
            return Err(CensusError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }

        let url = Url::parse(&self.base_url)
            .map_err(|_| CensusError::Configuration(format!("Invalid base URL: {}", self.base_url)))?;

        if url.cannot_be_a_base() {
            return Err(CensusError::Configuration(format!(
                "Base URL cannot hold a path: {}",
                self.base_url
            )));
        }

        Ok(url)
    }
}
