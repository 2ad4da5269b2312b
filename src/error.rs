use thiserror::Error;

/// Patterns (lowercase) that indicate a message may carry the API key.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &["key=", "&key", "?key", "api_key"];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes free text (usually an upstream response body) before it is
/// embedded in an error. If sensitive content is detected, returns the
/// fallback instead.
pub(crate) fn sanitize_message(msg: &str, fallback: &str) -> String {
    let trimmed = msg.trim();
    if trimmed.is_empty() || contains_sensitive(trimmed) {
        fallback.into()
    } else {
        trimmed.to_string()
    }
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum CensusError {
    // ── Upstream API ──────────────────────────────────────────────────────────
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid API key: {0}")]
    InvalidKey(String),

    #[error("No matching records")]
    NoMatchingRecords,

    #[error("Server-side error: {0}")]
    ServerSide(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // ── Chunk merging ─────────────────────────────────────────────────────────
    #[error("Geography columns differ between chunks: expected {expected:?}, found {found:?}")]
    MismatchedGeography {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Row {row} geography differs between chunks: expected {expected:?}, found {found:?}")]
    MismatchedRow {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    // ── Local ─────────────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CensusError {
    /// Returns true for failures that may succeed if the same request is sent
    /// again. Nothing in this crate retries; this is for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CensusError::ServerSide(_) | CensusError::ConnectionFailed(_)
        )
    }

    /// Returns true for chunk-merge consistency failures, which point at the
    /// upstream returning rows in a different order between calls.
    pub fn is_merge_conflict(&self) -> bool {
        matches!(
            self,
            CensusError::MismatchedGeography { .. } | CensusError::MismatchedRow { .. }
        )
    }
}

pub type Result<T, E = CensusError> = std::result::Result<T, E>;
