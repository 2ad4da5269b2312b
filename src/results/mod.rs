//! Result tables: chunk parsing, merging, and CSV export.

pub mod csv_export;
pub mod result_set;

pub use result_set::{Record, ResultSet};
