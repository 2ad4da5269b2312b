//! Census Data API access: query building, chunked fetching, and HTTP.

pub mod client;
pub mod datasets;
pub mod fetch;
pub mod geography;
pub mod query;

/// Most variables the API accepts in one `get` parameter.
pub const MAX_VARIABLES_PER_REQUEST: usize = 50;

pub use client::{classify_response, sanitize_url_for_logs, CensusClient, DatasetEndpoint, LoggingMode, RawResponse};
pub use datasets::{find_dataset, resolve_endpoint, Dataset, DATASETS};
pub use fetch::{chunk_ranges, fetch, fetch_chunked, Transport, TransportFuture};
pub use geography::{GeoCode, Geography, SummaryLevel, GEOGRAPHY_LEVELS};
pub use query::Query;
