//! Client for the U.S. Census Bureau Data API.
//!
//! Build a [`Query`], hand it to a [`CensusClient`], and get back one
//! [`ResultSet`]. Queries with more than 50 variables are split into
//! several requests and stitched back together column-wise on the
//! geography columns.
//!
//! ```ignore
//! let client = CensusClient::from_env()?;
//! let query = Query::new()
//!     .get(["NAME", "B01001_001E"])
//!     .for_level("county")?
//!     .within([("state", "06")]);
//! let table = client.query("acs5", 2019, &query).await?;
//! ```

pub mod census;
pub mod config;
pub mod error;
pub mod results;
pub mod storage;

pub use census::{fetch, CensusClient, GeoCode, Geography, Query, SummaryLevel, Transport};
pub use config::ClientConfig;
pub use error::{CensusError, Result};
pub use results::{Record, ResultSet};
pub use storage::{FileKeyStore, KeyStore, KeychainKeyStore, MemoryKeyStore};
