//! Tabular result of a Census Data API request, stitched across chunks.
//!
//! The API answers with a JSON 2D array: a header row of column names,
//! then one array of string cells per geography. A request with more than
//! 50 variables is split into several calls; each call returns the same
//! geography columns plus its own slice of data columns. [`ResultSet`]
//! absorbs the first payload and then merges the others column-wise.
//!
//! Rows are matched by position. Before appending, every row's geography
//! values are compared with the incoming row at the same position and the
//! merge fails hard on any difference: the API is expected, but not
//! guaranteed, to return rows in the same order for the same geography.

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::census::geography::is_geography_column;
use crate::error::{sanitize_message, CensusError};

// ─────────────────────────────────────────────────────────────────────────────
// Payload Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// One parsed response: header plus data rows, all as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Payload {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Payload {
    /// Parses a raw response body.
    pub(crate) fn parse(raw: &str) -> Result<Self, CensusError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CensusError::InvalidPayload(format!("Response is not JSON: {}", e)))?;
        Self::from_value(value)
    }

    /// Validates the 2D-array shape.
    ///
    /// The API reports a malformed column request with an object where the
    /// header row should be; that is surfaced as `InvalidQuery`.
    pub(crate) fn from_value(value: Value) -> Result<Self, CensusError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(map) => return Err(error_object(&map)),
            other => {
                return Err(CensusError::InvalidPayload(format!(
                    "Expected a JSON array, got {}",
                    json_kind(&other)
                )))
            }
        };

        let mut items = items.into_iter();

        let header = match items.next() {
            Some(Value::Array(cells)) => cells
                .into_iter()
                .map(|cell| match cell {
                    Value::String(name) => Ok(name),
                    other => Err(CensusError::InvalidPayload(format!(
                        "Header cells must be strings, got {}",
                        json_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Object(map)) => return Err(error_object(&map)),
            Some(other) => {
                return Err(CensusError::InvalidPayload(format!(
                    "Header must be an array, got {}",
                    json_kind(&other)
                )))
            }
            None => return Err(CensusError::InvalidPayload("Empty payload".to_string())),
        };

        let mut rows = Vec::with_capacity(items.len());
        for (i, item) in items.enumerate() {
            let cells = match item {
                Value::Array(cells) => cells,
                other => {
                    return Err(CensusError::InvalidPayload(format!(
                        "Row {} must be an array, got {}",
                        i,
                        json_kind(&other)
                    )))
                }
            };

            if cells.len() != header.len() {
                return Err(CensusError::InvalidPayload(format!(
                    "Row {} has {} cells, header has {}",
                    i,
                    cells.len(),
                    header.len()
                )));
            }

            let row = cells
                .into_iter()
                .map(cell_to_string)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|kind| {
                    CensusError::InvalidPayload(format!("Row {} holds a nested {}", i, kind))
                })?;
            rows.push(row);
        }

        Ok(Self { header, rows })
    }
}

/// Builds the `InvalidQuery` error for an error object in place of data.
fn error_object(map: &serde_json::Map<String, Value>) -> CensusError {
    let detail = match map.get("error") {
        Some(Value::String(msg)) => msg.clone(),
        _ => Value::Object(map.clone()).to_string(),
    };
    CensusError::InvalidQuery(sanitize_message(&detail, "The API rejected the requested columns."))
}

/// Converts a scalar cell. `null` becomes an empty string.
fn cell_to_string(cell: Value) -> Result<String, &'static str> {
    match cell {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) => Err("array"),
        Value::Object(_) => Err("object"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Positions of geography and data columns in a header.
struct ColumnSplit {
    geography: Vec<usize>,
    data: Vec<usize>,
}

fn split_columns(header: &[String]) -> ColumnSplit {
    let (geography, data): (Vec<usize>, Vec<usize>) =
        (0..header.len()).partition(|&i| is_geography_column(&header[i]));
    ColumnSplit { geography, data }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResultSet
// ─────────────────────────────────────────────────────────────────────────────

/// One logical result table.
///
/// Column order is the first payload's header order followed by the data
/// columns of each merged payload, in merge order.
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<String>,
    geography_columns: Vec<String>,
    geography_positions: Vec<usize>,
    data_columns: Vec<String>,
    rows: Vec<Vec<String>>,
    index: HashMap<String, usize>,
}

impl PartialEq for ResultSet {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.rows == other.rows
    }
}

impl Eq for ResultSet {}

impl ResultSet {
    /// Builds a table from a raw response body.
    ///
    /// # Errors
    ///
    /// - `CensusError::InvalidPayload` if the body is not a well-formed 2D array
    /// - `CensusError::InvalidQuery` if the body is the API's error object
    pub fn from_payload(raw: &str) -> Result<Self, CensusError> {
        Payload::parse(raw).map(Self::from_parsed)
    }

    /// Same as [`from_payload`](Self::from_payload) for an already-parsed value.
    pub fn from_value(value: Value) -> Result<Self, CensusError> {
        Payload::from_value(value).map(Self::from_parsed)
    }

    pub(crate) fn from_parsed(payload: Payload) -> Self {
        let split = split_columns(&payload.header);

        let geography_columns = split
            .geography
            .iter()
            .map(|&i| payload.header[i].clone())
            .collect();
        let data_columns = split.data.iter().map(|&i| payload.header[i].clone()).collect();

        let mut index = HashMap::with_capacity(payload.header.len());
        for (i, name) in payload.header.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }

        Self {
            columns: payload.header,
            geography_columns,
            geography_positions: split.geography,
            data_columns,
            rows: payload.rows,
            index,
        }
    }

    /// Merges another chunk's raw payload into this table.
    ///
    /// The merge is all-or-nothing: on error the table is left as it was.
    ///
    /// # Errors
    ///
    /// - `CensusError::MismatchedGeography` if the geography columns differ
    ///   in name or order
    /// - `CensusError::MismatchedRow` if any row's geography values differ
    ///   from the incoming row at the same position, or the row counts differ
    /// - Payload errors as in [`from_payload`](Self::from_payload)
    pub fn merge(&mut self, raw: &str) -> Result<&mut Self, CensusError> {
        let payload = Payload::parse(raw)?;
        self.merge_parsed(payload)
    }

    /// Same as [`merge`](Self::merge) for an already-parsed value.
    pub fn merge_value(&mut self, value: Value) -> Result<&mut Self, CensusError> {
        let payload = Payload::from_value(value)?;
        self.merge_parsed(payload)
    }

    pub(crate) fn merge_parsed(&mut self, payload: Payload) -> Result<&mut Self, CensusError> {
        let split = split_columns(&payload.header);

        let incoming_geography: Vec<String> = split
            .geography
            .iter()
            .map(|&i| payload.header[i].clone())
            .collect();

        if incoming_geography != self.geography_columns {
            return Err(CensusError::MismatchedGeography {
                expected: self.geography_columns.clone(),
                found: incoming_geography,
            });
        }

        self.check_row_alignment(&payload.rows, &split.geography)?;

        let start = self.columns.len();
        for (offset, &i) in split.data.iter().enumerate() {
            let name = payload.header[i].clone();
            self.index.entry(name.clone()).or_insert(start + offset);
            self.columns.push(name.clone());
            self.data_columns.push(name);
        }

        for (row, incoming) in self.rows.iter_mut().zip(payload.rows) {
            let mut incoming: Vec<Option<String>> = incoming.into_iter().map(Some).collect();
            row.extend(split.data.iter().filter_map(|&i| incoming[i].take()));
        }

        Ok(self)
    }

    /// Compares geography values row by row without mutating anything.
    fn check_row_alignment(
        &self,
        incoming: &[Vec<String>],
        incoming_positions: &[usize],
    ) -> Result<(), CensusError> {
        let pick = |row: &[String], positions: &[usize]| -> Vec<String> {
            positions.iter().map(|&i| row[i].clone()).collect()
        };

        for (i, (base, other)) in self.rows.iter().zip(incoming).enumerate() {
            let matches = self
                .geography_positions
                .iter()
                .zip(incoming_positions)
                .all(|(&a, &b)| base[a] == other[b]);

            if !matches {
                return Err(CensusError::MismatchedRow {
                    row: i,
                    expected: pick(base, &self.geography_positions),
                    found: pick(other, incoming_positions),
                });
            }
        }

        if self.rows.len() != incoming.len() {
            let row = self.rows.len().min(incoming.len());
            return Err(CensusError::MismatchedRow {
                row,
                expected: self
                    .rows
                    .get(row)
                    .map(|r| pick(r, &self.geography_positions))
                    .unwrap_or_default(),
                found: incoming
                    .get(row)
                    .map(|r| pick(r, incoming_positions))
                    .unwrap_or_default(),
            });
        }

        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn geography_columns(&self) -> &[String] {
        &self.geography_columns
    }

    pub fn data_columns(&self) -> &[String] {
        &self.data_columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the first column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Every value of column `name`, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let i = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[i].as_str()).collect())
    }

    /// One [`Record`] per row, in row order. Each call starts from the first row.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        self.rows.iter().map(move |row| Record {
            columns: &self.columns,
            values: row,
            index: &self.index,
        })
    }

    /// The table in the API's wire shape: header row, then data rows.
    pub fn to_payload(&self) -> Value {
        let mut out = Vec::with_capacity(self.rows.len() + 1);
        out.push(Value::from(self.columns.clone()));
        out.extend(self.rows.iter().map(|row| Value::from(row.clone())));
        Value::Array(out)
    }
}

impl Serialize for ResultSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(std::iter::once(&self.columns).chain(self.rows.iter()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// Borrowed view of one row as column name -> value.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [String],
    index: &'a HashMap<String, usize>,
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.index.get(column).map(|&i| self.values[i].as_str())
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn to_map(&self) -> HashMap<&'a str, &'a str> {
        self.iter().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn states_payload() -> String {
        json!([
            ["B00001_001E", "state"],
            ["372109", "01"],
            ["72384", "02"]
        ])
        .to_string()
    }

    fn county_chunk(columns: &[&str], rows: &[(&str, &str)]) -> String {
        let mut header: Vec<Value> = columns.iter().map(|c| json!(c)).collect();
        header.push(json!("state"));
        header.push(json!("county"));

        let mut out = vec![Value::Array(header)];
        for (state, county) in rows {
            let mut row: Vec<Value> = columns
                .iter()
                .map(|c| json!(format!("{}-{}{}", c, state, county)))
                .collect();
            row.push(json!(state));
            row.push(json!(county));
            out.push(Value::Array(row));
        }
        Value::Array(out).to_string()
    }

    const COUNTIES: &[(&str, &str)] = &[("06", "001"), ("06", "003"), ("06", "005")];

    #[test]
    fn from_payload_keeps_header_order_and_splits_columns() {
        let rs = ResultSet::from_payload(&states_payload()).unwrap();

        assert_eq!(rs.columns(), &["B00001_001E", "state"]);
        assert_eq!(rs.geography_columns(), &["state"]);
        assert_eq!(rs.data_columns(), &["B00001_001E"]);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs.column_index("state"), Some(1));
    }

    #[test]
    fn records_reproduce_header_zipped_with_rows() {
        let rs = ResultSet::from_payload(&states_payload()).unwrap();
        let records: Vec<HashMap<&str, &str>> = rs.records().map(|r| r.to_map()).collect();

        assert_eq!(
            records,
            vec![
                HashMap::from([("B00001_001E", "372109"), ("state", "01")]),
                HashMap::from([("B00001_001E", "72384"), ("state", "02")]),
            ]
        );

        // Restartable
        assert_eq!(rs.records().count(), 2);
        assert_eq!(rs.records().next().unwrap().get("state"), Some("01"));
    }

    #[test]
    fn record_iter_follows_column_order() {
        let rs = ResultSet::from_payload(&states_payload()).unwrap();
        let first = rs.records().next().unwrap();

        let pairs: Vec<_> = first.iter().collect();
        assert_eq!(pairs, vec![("B00001_001E", "372109"), ("state", "01")]);
        assert_eq!(first.get("missing"), None);
    }

    #[test]
    fn merge_appends_data_columns_in_incoming_order() {
        let mut rs = ResultSet::from_payload(&county_chunk(&["A", "B"], COUNTIES)).unwrap();

        rs.merge(&county_chunk(&["C", "D"], COUNTIES)).unwrap();

        assert_eq!(rs.columns(), &["A", "B", "state", "county", "C", "D"]);
        assert_eq!(rs.data_columns(), &["A", "B", "C", "D"]);
        assert_eq!(rs.geography_columns(), &["state", "county"]);
        assert_eq!(
            rs.rows()[1],
            vec!["A-06003", "B-06003", "06", "003", "C-06003", "D-06003"]
        );
        assert_eq!(rs.column_index("D"), Some(5));
        assert_eq!(rs.column("C").unwrap(), vec!["C-06001", "C-06003", "C-06005"]);
    }

    #[test]
    fn merge_is_chainable() {
        let mut rs = ResultSet::from_payload(&county_chunk(&["A"], COUNTIES)).unwrap();

        rs.merge(&county_chunk(&["B"], COUNTIES))
            .unwrap()
            .merge(&county_chunk(&["C"], COUNTIES))
            .unwrap();

        assert_eq!(rs.data_columns(), &["A", "B", "C"]);
    }

    #[test]
    fn merge_order_of_sub_chunks_does_not_change_result() {
        let mut whole = ResultSet::from_payload(&county_chunk(&["A"], COUNTIES)).unwrap();
        whole.merge(&county_chunk(&["B", "C", "D"], COUNTIES)).unwrap();

        let mut split = ResultSet::from_payload(&county_chunk(&["A"], COUNTIES)).unwrap();
        split.merge(&county_chunk(&["B"], COUNTIES)).unwrap();
        split.merge(&county_chunk(&["C", "D"], COUNTIES)).unwrap();

        assert_eq!(whole, split);
    }

    #[test]
    fn merge_rejects_different_geography_columns() {
        let mut rs = ResultSet::from_payload(&states_payload()).unwrap();
        let before = rs.clone();

        let err = rs.merge(&county_chunk(&["X"], COUNTIES)).unwrap_err();

        match err {
            CensusError::MismatchedGeography { expected, found } => {
                assert_eq!(expected, vec!["state"]);
                assert_eq!(found, vec!["state", "county"]);
            }
            other => panic!("Expected MismatchedGeography, got: {:?}", other),
        }
        assert_eq!(rs, before);
    }

    #[test]
    fn merge_rejects_reordered_geography_columns() {
        let mut rs = ResultSet::from_payload(
            &json!([["state", "county", "A"], ["06", "001", "1"]]).to_string(),
        )
        .unwrap();

        let err = rs
            .merge(&json!([["county", "state", "B"], ["001", "06", "2"]]).to_string())
            .unwrap_err();

        assert!(matches!(err, CensusError::MismatchedGeography { .. }));
    }

    #[test]
    fn merge_rejects_misaligned_rows_and_leaves_table_untouched() {
        let mut rs = ResultSet::from_payload(&county_chunk(&["A"], COUNTIES)).unwrap();
        let before = rs.clone();

        let shuffled = [("06", "001"), ("06", "005"), ("06", "003")];
        let err = rs.merge(&county_chunk(&["B"], &shuffled)).unwrap_err();

        match err {
            CensusError::MismatchedRow { row, expected, found } => {
                assert_eq!(row, 1);
                assert_eq!(expected, vec!["06", "003"]);
                assert_eq!(found, vec!["06", "005"]);
            }
            other => panic!("Expected MismatchedRow, got: {:?}", other),
        }
        assert_eq!(rs, before);
        assert_eq!(rs.columns().len(), 3);
    }

    #[test]
    fn merge_rejects_different_row_counts() {
        let mut rs = ResultSet::from_payload(&county_chunk(&["A"], COUNTIES)).unwrap();

        let err = rs.merge(&county_chunk(&["B"], &COUNTIES[..2])).unwrap_err();

        match err {
            CensusError::MismatchedRow { row, expected, found } => {
                assert_eq!(row, 2);
                assert_eq!(expected, vec!["06", "005"]);
                assert!(found.is_empty());
            }
            other => panic!("Expected MismatchedRow, got: {:?}", other),
        }
    }

    #[test]
    fn merge_aligns_geography_at_different_positions() {
        let mut rs = ResultSet::from_payload(
            &json!([["A", "state"], ["1", "01"], ["2", "02"]]).to_string(),
        )
        .unwrap();

        rs.merge(&json!([["state", "B", "C"], ["01", "x", "y"], ["02", "z", "w"]]).to_string())
            .unwrap();

        assert_eq!(rs.columns(), &["A", "state", "B", "C"]);
        assert_eq!(rs.rows()[1], vec!["2", "02", "z", "w"]);
    }

    #[test]
    fn error_object_is_invalid_query() {
        let err = ResultSet::from_payload(&json!([{"error": "unknown variable 'NOPE'"}]).to_string())
            .unwrap_err();
        match err {
            CensusError::InvalidQuery(msg) => assert!(msg.contains("NOPE")),
            other => panic!("Expected InvalidQuery, got: {:?}", other),
        }

        let err = ResultSet::from_payload(&json!({"error": "bad"}).to_string()).unwrap_err();
        assert!(matches!(err, CensusError::InvalidQuery(_)));
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let cases = [
            "not json",
            "[]",
            "\"text\"",
            "[[\"A\", 1]]",
            "[[\"A\", \"state\"], [\"1\"]]",
            "[[\"A\"], \"row\"]",
            "[[\"A\"], [[\"nested\"]]]",
        ];

        for raw in cases {
            let err = ResultSet::from_payload(raw).unwrap_err();
            assert!(matches!(err, CensusError::InvalidPayload(_)), "{} -> {:?}", raw, err);
        }
    }

    #[test]
    fn scalar_cells_are_stringified() {
        let rs = ResultSet::from_payload(&json!([["A", "B", "C", "state"], [null, 12, true, "01"]]).to_string())
            .unwrap();

        assert_eq!(rs.rows()[0], vec!["", "12", "true", "01"]);
    }

    #[test]
    fn header_only_payload_is_an_empty_table() {
        let mut rs = ResultSet::from_payload(&json!([["A", "state"]]).to_string()).unwrap();
        assert!(rs.is_empty());

        rs.merge(&json!([["B", "state"]]).to_string()).unwrap();
        assert_eq!(rs.columns(), &["A", "state", "B"]);
    }

    #[test]
    fn payload_and_serialize_use_wire_shape() {
        let rs = ResultSet::from_payload(&states_payload()).unwrap();
        let expected: Value = serde_json::from_str(&states_payload()).unwrap();

        assert_eq!(rs.to_payload(), expected);
        assert_eq!(serde_json::to_value(&rs).unwrap(), expected);
        assert_eq!(ResultSet::from_value(rs.to_payload()).unwrap(), rs);
    }

    #[test]
    fn equality_ignores_nothing_but_columns_and_rows() {
        let a = ResultSet::from_payload(&states_payload()).unwrap();
        let b = ResultSet::from_payload(&states_payload()).unwrap();
        let c = ResultSet::from_payload(&json!([["B00001_001E", "state"], ["372109", "01"]]).to_string())
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
