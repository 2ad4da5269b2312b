//! Chunked fetch orchestration.
//!
//! The API accepts at most 50 variables per request. A larger [`Query`] is
//! split into consecutive slices, each slice is sent through a
//! [`Transport`], and the payloads are folded into one [`ResultSet`]: the
//! first chunk builds the table and every later chunk is merged into it.
//!
//! Chunks are requested one at a time in offset order. Merging relies on
//! every chunk listing its rows in the same order, so there is nothing to
//! gain from sending them concurrently.

use std::future::Future;
use std::ops::Range;
use std::pin::Pin;

use tracing::{debug, info};

use crate::census::query::Query;
use crate::census::MAX_VARIABLES_PER_REQUEST;
use crate::error::CensusError;
use crate::results::result_set::Payload;
use crate::results::ResultSet;
use crate::storage::KeyStore;

// ─────────────────────────────────────────────────────────────────────────────
// Transport Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<String, CensusError>> + Send + 'a>>;

/// Sends one serialized request and returns the raw JSON body.
///
/// Implementations translate HTTP statuses into `CensusError` before
/// returning (see [`classify_response`](crate::census::client::classify_response)),
/// so `Ok` always carries a success body. Tests provide in-memory fakes.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a str) -> TransportFuture<'a>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunking
// ─────────────────────────────────────────────────────────────────────────────

/// Splits `0..len` into consecutive windows of at most `chunk_size`.
///
/// The last window may be shorter. No empty window is produced, so a
/// length that is an exact multiple of `chunk_size` does not yield a
/// trailing empty request. A `chunk_size` of zero is treated as one.
pub fn chunk_ranges(len: usize, chunk_size: usize) -> Vec<Range<usize>> {
    let step = chunk_size.max(1);
    let mut ranges = Vec::with_capacity(len.div_ceil(step));
    let mut offset = 0;

    while offset < len {
        let end = (offset + step).min(len);
        ranges.push(offset..end);
        offset = end;
    }

    ranges
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches `query` in chunks of 50 variables and merges the results.
///
/// # Errors
///
/// Any error stops the fetch immediately and nothing partial is returned:
/// - `CensusError::Configuration` if the query has no variables
/// - `CensusError::InvalidQuery` if a chunk comes back as the API's error object
/// - `CensusError::MismatchedGeography` / `MismatchedRow` on merge conflicts
/// - whatever the transport or key store reports
pub async fn fetch(
    query: &Query,
    transport: &dyn Transport,
    keys: &dyn KeyStore,
) -> Result<ResultSet, CensusError> {
    fetch_chunked(query, transport, keys, MAX_VARIABLES_PER_REQUEST).await
}

/// Same as [`fetch`] with a smaller chunk size.
///
/// # Errors
///
/// Returns `CensusError::Configuration` if `chunk_size` is outside `1..=50`,
/// otherwise as [`fetch`].
pub async fn fetch_chunked(
    query: &Query,
    transport: &dyn Transport,
    keys: &dyn KeyStore,
    chunk_size: usize,
) -> Result<ResultSet, CensusError> {
    if chunk_size == 0 || chunk_size > MAX_VARIABLES_PER_REQUEST {
        return Err(CensusError::Configuration(format!(
            "chunk size must be between 1 and {}, got {}",
            MAX_VARIABLES_PER_REQUEST, chunk_size
        )));
    }

    if query.is_empty() {
        return Err(CensusError::Configuration(
            "A query needs at least one variable".to_string(),
        ));
    }

    let ranges = chunk_ranges(query.len(), chunk_size);
    let total = ranges.len();

    info!(
        "[FETCH] Starting: {} variables in {} chunk(s), geography {}",
        query.len(),
        total,
        query.geography().for_clause()
    );

    let mut result: Option<ResultSet> = None;

    for (n, range) in ranges.into_iter().enumerate() {
        let chunk = query.slice(range.clone());
        let request = chunk.serialize(keys)?;

        let body = transport.send(&request).await?;
        let payload = Payload::parse(&body)?;

        match result.as_mut() {
            Some(table) => {
                table.merge_parsed(payload)?;
            }
            None => result = Some(ResultSet::from_parsed(payload)),
        }

        debug!(
            "[FETCH] Chunk {}/{} merged (variables {}..{})",
            n + 1,
            total,
            range.start,
            range.end
        );
    }

    let table = result.ok_or_else(|| CensusError::Internal("No chunks were fetched".into()))?;

    info!(
        "[FETCH] Complete: {} rows x {} columns",
        table.len(),
        table.columns().len()
    );

    Ok(table)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyStore;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use url::form_urlencoded;

    // ─────────────────────────────────────────────────────────────────────────
    // Fake Transport
    // ─────────────────────────────────────────────────────────────────────────

    enum Failure {
        ErrorObject,
        Status(fn() -> CensusError),
        ShuffledRows,
        ExtraGeography,
    }

    /// Answers each request with one row per state for the requested
    /// variables, recording every request it sees.
    struct FakeTransport {
        states: Vec<&'static str>,
        requests: Mutex<Vec<String>>,
        fail_on: Option<(usize, Failure)>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                states: vec!["01", "02", "04"],
                requests: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(call: usize, failure: Failure) -> Self {
            Self {
                fail_on: Some((call, failure)),
                ..Self::new()
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }

        fn param(request: &str, name: &str) -> Option<String> {
            form_urlencoded::parse(request.as_bytes())
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        }

        fn requested_variables(request: &str) -> Vec<String> {
            Self::param(request, "get")
                .unwrap_or_default()
                .split(',')
                .map(str::to_string)
                .collect()
        }

        fn respond(&self, request: &str) -> Result<String, CensusError> {
            let call = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.to_string());
                requests.len()
            };

            let failure = match &self.fail_on {
                Some((n, failure)) if *n == call => Some(failure),
                _ => None,
            };

            if let Some(Failure::ErrorObject) = failure {
                return Ok(json!([{"error": "error: unknown variable 'BOGUS'"}]).to_string());
            }
            if let Some(Failure::Status(make)) = failure {
                return Err(make());
            }

            let variables = Self::requested_variables(request);
            let mut header: Vec<Value> = variables.iter().map(|v| json!(v)).collect();
            header.push(json!("state"));
            if let Some(Failure::ExtraGeography) = failure {
                header.push(json!("county"));
            }

            let mut states = self.states.clone();
            if let Some(Failure::ShuffledRows) = failure {
                states.reverse();
            }

            let mut rows = vec![Value::Array(header)];
            for state in states {
                let mut row: Vec<Value> =
                    variables.iter().map(|v| json!(format!("{}@{}", v, state))).collect();
                row.push(json!(state));
                if let Some(Failure::ExtraGeography) = failure {
                    row.push(json!("001"));
                }
                rows.push(Value::Array(row));
            }

            Ok(Value::Array(rows).to_string())
        }
    }

    impl Transport for FakeTransport {
        fn send<'a>(&'a self, request: &'a str) -> TransportFuture<'a> {
            Box::pin(async move { self.respond(request) })
        }
    }

    fn variables(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("V{:03}", i)).collect()
    }

    fn state_query(n: usize) -> Query {
        Query::new().get(variables(n)).for_level("states").unwrap().key("k")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Chunk Ranges
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn chunk_ranges_split_120_into_50_50_20() {
        let ranges = chunk_ranges(120, 50);
        assert_eq!(ranges, vec![0..50, 50..100, 100..120]);
    }

    #[test]
    fn chunk_ranges_exact_multiple_has_no_empty_tail() {
        assert_eq!(chunk_ranges(100, 50), vec![0..50, 50..100]);
        assert_eq!(chunk_ranges(50, 50), vec![0..50]);
    }

    #[test]
    fn chunk_ranges_edge_cases() {
        assert!(chunk_ranges(0, 50).is_empty());
        assert_eq!(chunk_ranges(1, 50), vec![0..1]);
        assert_eq!(chunk_ranges(3, 0), vec![0..1, 1..2, 2..3]);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Fetch
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn single_chunk_query_issues_one_request() {
        let transport = FakeTransport::new();
        let query = state_query(3);

        let table = fetch(&query, &transport, &MemoryKeyStore::new()).await.unwrap();

        assert_eq!(transport.requests().len(), 1);
        assert_eq!(table.columns(), &["V000", "V001", "V002", "state"]);
        assert_eq!(table.len(), 3);
    }

    #[tokio::test]
    async fn large_query_is_split_and_stitched() {
        let transport = FakeTransport::new();
        let query = state_query(120);

        let table = fetch(&query, &transport, &MemoryKeyStore::new()).await.unwrap();

        let sizes: Vec<usize> = transport
            .requests()
            .iter()
            .map(|r| FakeTransport::requested_variables(r).len())
            .collect();
        assert_eq!(sizes, vec![50, 50, 20]);

        assert_eq!(table.columns().len(), 121);
        assert_eq!(table.data_columns(), variables(120).as_slice());
        assert_eq!(table.geography_columns(), &["state"]);
        assert_eq!(table.columns()[50], "state");
        assert_eq!(table.len(), 3);

        let last = table.records().last().unwrap();
        assert_eq!(last.get("V119"), Some("V119@04"));
        assert_eq!(last.get("state"), Some("04"));
    }

    #[tokio::test]
    async fn every_chunk_carries_geography_and_key() {
        let transport = FakeTransport::new();
        let query = Query::new()
            .get(variables(60))
            .for_level("counties")
            .unwrap()
            .within([("state", "06")]);
        let keys = MemoryKeyStore::with_key("installed");

        fetch(&query, &transport, &keys).await.unwrap();

        for request in transport.requests() {
            assert_eq!(FakeTransport::param(&request, "key").as_deref(), Some("installed"));
            assert_eq!(FakeTransport::param(&request, "for").as_deref(), Some("county:*"));
            assert!(request.contains("&in=state%3A06&"));
        }
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn exact_multiple_of_fifty_sends_no_empty_request() {
        let transport = FakeTransport::new();

        fetch(&state_query(100), &transport, &MemoryKeyStore::new()).await.unwrap();

        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn custom_chunk_size_is_respected() {
        let transport = FakeTransport::new();

        let table = fetch_chunked(&state_query(45), &transport, &MemoryKeyStore::new(), 20)
            .await
            .unwrap();

        assert_eq!(transport.requests().len(), 3);
        assert_eq!(table.data_columns().len(), 45);
    }

    #[tokio::test]
    async fn chunk_size_outside_api_limit_is_rejected() {
        let transport = FakeTransport::new();

        for size in [0, 51] {
            let err = fetch_chunked(&state_query(10), &transport, &MemoryKeyStore::new(), size)
                .await
                .unwrap_err();
            assert!(matches!(err, CensusError::Configuration(_)));
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn empty_query_fails_without_requests() {
        let transport = FakeTransport::new();
        let query = Query::new().for_level("state").unwrap();

        let err = fetch(&query, &transport, &MemoryKeyStore::new()).await.unwrap_err();

        assert!(matches!(err, CensusError::Configuration(_)));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn error_object_stops_fetch_with_invalid_query() {
        let transport = FakeTransport::failing_on(2, Failure::ErrorObject);

        let err = fetch(&state_query(120), &transport, &MemoryKeyStore::new())
            .await
            .unwrap_err();

        match err {
            CensusError::InvalidQuery(msg) => assert!(msg.contains("BOGUS")),
            other => panic!("Expected InvalidQuery, got: {:?}", other),
        }
        assert_eq!(transport.requests().len(), 2, "third chunk must not be requested");
    }

    #[tokio::test]
    async fn error_object_on_first_chunk_is_invalid_query() {
        let transport = FakeTransport::failing_on(1, Failure::ErrorObject);

        let err = fetch(&state_query(10), &transport, &MemoryKeyStore::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CensusError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn transport_errors_propagate_immediately() {
        let transport =
            FakeTransport::failing_on(2, Failure::Status(|| CensusError::ServerSide("down".into())));

        let err = fetch(&state_query(150), &transport, &MemoryKeyStore::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CensusError::ServerSide(_)));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn reordered_rows_fail_the_fetch() {
        let transport = FakeTransport::failing_on(2, Failure::ShuffledRows);

        let err = fetch(&state_query(80), &transport, &MemoryKeyStore::new())
            .await
            .unwrap_err();

        match err {
            CensusError::MismatchedRow { row, expected, found } => {
                assert_eq!(row, 0);
                assert_eq!(expected, vec!["01"]);
                assert_eq!(found, vec!["04"]);
            }
            other => panic!("Expected MismatchedRow, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn changed_geography_columns_fail_the_fetch() {
        let transport = FakeTransport::failing_on(3, Failure::ExtraGeography);

        let err = fetch(&state_query(101), &transport, &MemoryKeyStore::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CensusError::MismatchedGeography { .. }));
        assert_eq!(transport.requests().len(), 3);
    }
}
