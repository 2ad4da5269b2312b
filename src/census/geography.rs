//! Geographic filter ("for"/"in") of a Census Data API request.
//!
//! A request selects one summary level (the granularity of returned rows)
//! and optionally scopes it to parent geographies:
//!
//! ```text
//! for=county:*&in=state:06
//! ```
//!
//! The `in` clause joins its parents with a literal `+`. That `+` is the
//! API's separator, not an encoded space, so it is never percent-encoded.

use std::fmt;
use std::str::FromStr;

use url::form_urlencoded;

use crate::error::CensusError;

// ─────────────────────────────────────────────────────────────────────────────
// Summary Levels
// ─────────────────────────────────────────────────────────────────────────────

/// Column names the API uses for geography identifiers in result headers.
pub const GEOGRAPHY_LEVELS: &[&str] = &["us", "region", "division", "state", "county", "tract"];

/// Geographic granularity of returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryLevel {
    Us,
    Region,
    Division,
    State,
    County,
    Tract,
}

/// Accepted spellings, plural forms included, and the level they map to.
const LEVEL_ALIASES: &[(&str, SummaryLevel)] = &[
    ("us", SummaryLevel::Us),
    ("region", SummaryLevel::Region),
    ("regions", SummaryLevel::Region),
    ("division", SummaryLevel::Division),
    ("divisions", SummaryLevel::Division),
    ("state", SummaryLevel::State),
    ("states", SummaryLevel::State),
    ("county", SummaryLevel::County),
    ("counties", SummaryLevel::County),
    ("tract", SummaryLevel::Tract),
    ("tracts", SummaryLevel::Tract),
];

impl SummaryLevel {
    /// The singular name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryLevel::Us => "us",
            SummaryLevel::Region => "region",
            SummaryLevel::Division => "division",
            SummaryLevel::State => "state",
            SummaryLevel::County => "county",
            SummaryLevel::Tract => "tract",
        }
    }
}

impl FromStr for SummaryLevel {
    type Err = CensusError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let trimmed = name.trim();
        LEVEL_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
            .map(|(_, level)| *level)
            .ok_or_else(|| CensusError::Configuration(format!("Unknown summary level: {}", name)))
    }
}

impl fmt::Display for SummaryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if a result column holds a geography identifier.
pub fn is_geography_column(name: &str) -> bool {
    GEOGRAPHY_LEVELS.contains(&name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Value selected at a summary level: a concrete code or every code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GeoCode {
    Wildcard,
    Code(String),
}

impl From<&str> for GeoCode {
    fn from(code: &str) -> Self {
        if code == "*" {
            GeoCode::Wildcard
        } else {
            GeoCode::Code(code.to_string())
        }
    }
}

impl From<String> for GeoCode {
    fn from(code: String) -> Self {
        if code == "*" {
            GeoCode::Wildcard
        } else {
            GeoCode::Code(code)
        }
    }
}

impl fmt::Display for GeoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoCode::Wildcard => f.write_str("*"),
            GeoCode::Code(code) => f.write_str(code),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Geography
// ─────────────────────────────────────────────────────────────────────────────

/// The `for`/`in` portion of a request.
///
/// Holds at most one summary level; when none was set, serialization
/// falls back to `us:*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Geography {
    summary_level: Option<(SummaryLevel, GeoCode)>,
    contained_in: Vec<(String, String)>,
}

impl Geography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects every code at `level`. Plural aliases are accepted and
    /// normalized. Replaces any previous summary level.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` for an unknown level name.
    pub fn set_summary_level(&mut self, level: &str) -> Result<(), CensusError> {
        self.set_summary_level_code(level, GeoCode::Wildcard)
    }

    /// Selects one code (or `*`) at `level`. Replaces any previous summary level.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` for an unknown level name.
    pub fn set_summary_level_code(
        &mut self,
        level: &str,
        code: impl Into<GeoCode>,
    ) -> Result<(), CensusError> {
        let level: SummaryLevel = level.parse()?;
        self.summary_level = Some((level, code.into()));
        Ok(())
    }

    /// Replaces the parent scope. Entries are kept verbatim and in order;
    /// level names are not checked here.
    pub fn set_contained_in<I, K, V>(&mut self, parents: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.contained_in = parents
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    /// The configured summary level, if any.
    pub fn summary_level(&self) -> Option<(SummaryLevel, &GeoCode)> {
        self.summary_level.as_ref().map(|(level, code)| (*level, code))
    }

    /// The parent scope in insertion order.
    pub fn contained_in(&self) -> &[(String, String)] {
        &self.contained_in
    }

    /// Unencoded value of the `for` parameter.
    pub fn for_clause(&self) -> String {
        match &self.summary_level {
            Some((level, code)) => format!("{}:{}", level, code),
            None => format!("{}:{}", SummaryLevel::Us, GeoCode::Wildcard),
        }
    }

    /// Unencoded value of the `in` parameter, or `None` without parents.
    pub fn in_clause(&self) -> Option<String> {
        if self.contained_in.is_empty() {
            return None;
        }

        let parts: Vec<String> = self
            .contained_in
            .iter()
            .map(|(level, code)| format!("{}:{}", level, code))
            .collect();
        Some(parts.join("+"))
    }

    /// The geography parameters as unencoded key/value pairs.
    pub fn serialize(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("for", self.for_clause())];
        if let Some(parents) = self.in_clause() {
            pairs.push(("in", parents));
        }
        pairs
    }

    /// The geography parameters, URL-form-encoded.
    ///
    /// Each `level:code` part is encoded on its own and the `in` parts are
    /// then joined with a raw `+`.
    pub fn encode(&self) -> String {
        let mut out = format!("for={}", encode_component(&self.for_clause()));

        if !self.contained_in.is_empty() {
            let parts: Vec<String> = self
                .contained_in
                .iter()
                .map(|(level, code)| encode_component(&format!("{}:{}", level, code)))
                .collect();
            out.push_str("&in=");
            out.push_str(&parts.join("+"));
        }

        out
    }
}

/// Form-encodes one query component.
pub(crate) fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
