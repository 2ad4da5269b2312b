//! Census Data API HTTP client with key handling and safe logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::census::datasets::resolve_endpoint;
use crate::census::fetch::{fetch_chunked, Transport, TransportFuture};
use crate::census::query::Query;
use crate::config::ClientConfig;
use crate::error::{sanitize_message, CensusError};
use crate::results::ResultSet;
use crate::storage::key_store::ENV_API_KEY;
use crate::storage::{FileKeyStore, KeyStore, MemoryKeyStore};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &["key", "api_key"];

/// Markers the API uses when it bounces a request for a missing or bad key.
const KEY_FAILURE_MARKERS: &[&str] = &["missing_key", "invalid_key", "invalid key"];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    /// Example: `/data/2019/acs/acs5`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact the key.
    /// Example: `/data/2019/acs/acs5?key=***&for=state:*&get=NAME`
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status Mapping
// ─────────────────────────────────────────────────────────────────────────────

/// What came back from one HTTP exchange, before interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// `Location` header, present on redirects.
    pub location: Option<String>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

fn mentions_key_failure(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    KEY_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

fn key_failure(location: Option<&str>, body: &str) -> CensusError {
    let missing = location
        .map(|l| l.to_ascii_lowercase().contains("missing_key"))
        .unwrap_or(false)
        || body.to_ascii_lowercase().contains("missing_key");

    if missing {
        CensusError::InvalidKey("No API key was supplied".to_string())
    } else {
        CensusError::InvalidKey("The API key was rejected".to_string())
    }
}

/// Maps an HTTP response to the JSON body or the matching error.
///
/// | Status | Result |
/// |--------|--------|
/// | 200 | body (unless it is the invalid-key page) |
/// | 204 | `NoMatchingRecords` |
/// | 400 | `InvalidQuery` with the body text |
/// | 500 | `ServerSide` |
/// | 3xx pointing at a key page | `InvalidKey` |
/// | anything else | `Api { status, .. }` |
///
/// Body text copied into errors is dropped if it looks like it carries a key.
pub fn classify_response(response: RawResponse) -> Result<String, CensusError> {
    let RawResponse {
        status,
        body,
        location,
    } = response;

    match status {
        200 => {
            let trimmed = body.trim_start();
            let is_json = trimmed.starts_with('[') || trimmed.starts_with('{');
            if !is_json && mentions_key_failure(&body) {
                return Err(key_failure(location.as_deref(), &body));
            }
            Ok(body)
        }
        204 => Err(CensusError::NoMatchingRecords),
        400 => Err(CensusError::InvalidQuery(sanitize_message(
            &body,
            "The API rejected the query",
        ))),
        500 => Err(CensusError::ServerSide(sanitize_message(
            &body,
            "The API reported an internal error",
        ))),
        300..=399
            if location.as_deref().map(mentions_key_failure).unwrap_or(false)
                || mentions_key_failure(&body) =>
        {
            Err(key_failure(location.as_deref(), &body))
        }
        300..=399 => Err(CensusError::Api {
            status,
            message: "Unexpected redirect".to_string(),
        }),
        _ => Err(CensusError::Api {
            status,
            message: sanitize_message(&body, "Unexpected response"),
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CensusClient
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for the Census Data API.
///
/// Redirects are not followed: the API answers a missing or rejected key
/// with a redirect to an HTML page, which has to be seen to be reported as
/// `InvalidKey`.
///
/// Cloning is cheap; the connection pool and key store are shared.
#[derive(Clone)]
pub struct CensusClient {
    http: reqwest::Client,
    base: Url,
    config: ClientConfig,
    keys: Arc<dyn KeyStore>,
}

impl std::fmt::Debug for CensusClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CensusClient")
            .field("base", &self.base.as_str())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CensusClient {
    /// Creates a client from a validated config and a key store.
    ///
    /// # Errors
    ///
    /// - `CensusError::Configuration` if the config is invalid
    /// - `CensusError::Internal` if the HTTP client fails to initialize
    pub fn new(config: ClientConfig, keys: Arc<dyn KeyStore>) -> Result<Self, CensusError> {
        let base = config.validate()?;
        let http = build_http_client(&config)?;

        Ok(Self {
            http,
            base,
            config,
            keys,
        })
    }

    /// Creates a client from the environment.
    ///
    /// The key comes from `CENSUS_API_KEY` when set, otherwise from the key
    /// file in the user's config directory.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new), plus `CensusError::Configuration` if the
    /// environment holds invalid values or no config directory exists.
    pub fn from_env() -> Result<Self, CensusError> {
        let config = ClientConfig::from_env()?;

        let keys: Arc<dyn KeyStore> = if std::env::var_os(ENV_API_KEY).is_some() {
            Arc::new(MemoryKeyStore::from_env())
        } else {
            Arc::new(FileKeyStore::default_location()?)
        };

        Self::new(config, keys)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn key_store(&self) -> &dyn KeyStore {
        self.keys.as_ref()
    }

    /// Stores `key` as the installed key used by queries without their own.
    ///
    /// # Errors
    ///
    /// Propagates the key store's failure.
    pub fn install_key(&self, key: &str) -> Result<(), CensusError> {
        self.keys.write_installed_key(key)?;
        info!("[KEYS] API key installed");
        Ok(())
    }

    /// Binds the client to one dataset vintage.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` for an unknown dataset or year.
    pub fn endpoint(&self, dataset_id: &str, year: u16) -> Result<DatasetEndpoint<'_>, CensusError> {
        let url = resolve_endpoint(&self.base, dataset_id, year)?;
        Ok(DatasetEndpoint { client: self, url })
    }

    /// Fetches `query` from `dataset_id` for `year`, chunking and merging as
    /// needed.
    ///
    /// # Errors
    ///
    /// - `CensusError::Configuration` - unknown dataset/year or empty query
    /// - `CensusError::InvalidQuery` / `InvalidKey` / `NoMatchingRecords` /
    ///   `ServerSide` / `Api` - mapped from the HTTP response
    /// - `CensusError::MismatchedGeography` / `MismatchedRow` - chunks disagree
    /// - `CensusError::ConnectionFailed` - network error
    pub async fn query(
        &self,
        dataset_id: &str,
        year: u16,
        query: &Query,
    ) -> Result<ResultSet, CensusError> {
        let endpoint = self.endpoint(dataset_id, year)?;
        fetch_chunked(query, &endpoint, self.keys.as_ref(), self.config.chunk_size).await
    }

    /// Executes a GET with timing, logging, and status mapping.
    ///
    /// Never logs the body, and the raw `reqwest` error never leaves this
    /// function since it can carry the full URL including the key.
    async fn get_payload(&self, url: Url) -> Result<String, CensusError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.config.logging_mode);

        let result = self.http.get(url).send().await;
        let duration_ms = start.elapsed().as_millis();

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                info!("[CENSUS] GET {} FAILED {}ms", sanitized_url, duration_ms);
                return Err(CensusError::ConnectionFailed(
                    "Connection to the Census API failed".to_string(),
                ));
            }
        };

        let status = response.status().as_u16();
        info!(
            "[CENSUS] GET {} {} {}ms",
            sanitized_url, status, duration_ms
        );

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|_| {
            warn!("[CENSUS] Failed to read response body from {}", sanitized_url);
            CensusError::ConnectionFailed("Failed to read the API response".to_string())
        })?;

        classify_response(RawResponse {
            status,
            body,
            location,
        })
    }
}

/// Builds the configured HTTP client.
fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client, CensusError> {
    let mut headers = HeaderMap::new();
    let agent = HeaderValue::from_str(&config.user_agent)
        .map_err(|_| CensusError::Configuration("User agent is not a valid header value".into()))?;
    headers.insert(USER_AGENT, agent);

    reqwest::Client::builder()
        .default_headers(headers)
        .redirect(redirect::Policy::none())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CensusError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// DatasetEndpoint
// ─────────────────────────────────────────────────────────────────────────────

/// A client bound to one `{base}/{year}/{dataset}` URL.
#[derive(Debug, Clone)]
pub struct DatasetEndpoint<'a> {
    client: &'a CensusClient,
    url: Url,
}

impl DatasetEndpoint<'_> {
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for DatasetEndpoint<'_> {
    fn send<'a>(&'a self, request: &'a str) -> TransportFuture<'a> {
        Box::pin(async move {
            let mut url = self.url.clone();
            url.set_query(Some(request));
            self.client.get_payload(url).await
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
