//! One Census Data API request: variables, geography, and credential.
//!
//! # Geography sharing
//!
//! [`Query::slice`] hands out sub-queries that share the parent's
//! [`Geography`] through an `Arc` instead of cloning it. Mutating the
//! geography of any query goes through [`Query::geography_mut`], which
//! copies on write, so a slice can never change the filter of the query it
//! was taken from (or the other way round).

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::census::geography::{encode_component, GeoCode, Geography};
use crate::error::CensusError;
use crate::storage::KeyStore;

#[derive(Clone, Default)]
pub struct Query {
    variables: Vec<String>,
    geo: Arc<Geography>,
    api_key: Option<SecretString>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("variables", &self.variables)
            .field("geo", &self.geo)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builder ──────────────────────────────────────────────────────────────

    /// Sets the requested variables. Order is kept and decides the column
    /// order of the result; duplicates are passed through.
    pub fn get<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_variables(variables);
        self
    }

    /// Requests every geography at `level`.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` for an unknown level name.
    pub fn for_level(mut self, level: &str) -> Result<Self, CensusError> {
        self.geography_mut().set_summary_level(level)?;
        Ok(self)
    }

    /// Requests one geography (or `*`) at `level`.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::Configuration` for an unknown level name.
    pub fn for_code(mut self, level: &str, code: impl Into<GeoCode>) -> Result<Self, CensusError> {
        self.geography_mut().set_summary_level_code(level, code)?;
        Ok(self)
    }

    /// Scopes the summary level to parent geographies (the `in` clause).
    pub fn within<I, K, V>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.geography_mut().set_contained_in(parents);
        self
    }

    /// Uses an explicit API key instead of the installed one.
    pub fn key(mut self, api_key: &str) -> Self {
        self.api_key = Some(SecretString::from(api_key.to_string()));
        self
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn set_variables<I, S>(&mut self, variables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = variables.into_iter().map(Into::into).collect();
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn geography(&self) -> &Geography {
        &self.geo
    }

    /// Mutable access to the geography; detaches it from any slices first.
    pub fn geography_mut(&mut self) -> &mut Geography {
        Arc::make_mut(&mut self.geo)
    }

    /// Returns true if both queries point at the same geography value.
    pub fn shares_geography_with(&self, other: &Query) -> bool {
        Arc::ptr_eq(&self.geo, &other.geo)
    }

    pub fn has_explicit_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// The explicit key if one was set, else whatever `keys` has installed.
    ///
    /// # Errors
    ///
    /// Propagates key store failures.
    pub fn resolved_api_key(&self, keys: &dyn KeyStore) -> Result<Option<SecretString>, CensusError> {
        match &self.api_key {
            Some(key) => Ok(Some(key.clone())),
            None => keys.read_installed_key(),
        }
    }

    // ── Slicing ──────────────────────────────────────────────────────────────

    /// A query over `variables[range]` sharing this query's geography and key.
    ///
    /// Bounds past the end are clamped, so slicing never panics.
    pub fn slice(&self, range: Range<usize>) -> Query {
        let end = range.end.min(self.variables.len());
        let start = range.start.min(end);

        Query {
            variables: self.variables[start..end].to_vec(),
            geo: Arc::clone(&self.geo),
            api_key: self.api_key.clone(),
        }
    }

    // ── Serialization ────────────────────────────────────────────────────────

    /// The URL-form-encoded query string: `key`, then the geography
    /// parameters, then `get` with variables joined by `,`. The `key` pair
    /// is left out when no key can be resolved.
    ///
    /// # Errors
    ///
    /// - `CensusError::Configuration` if no variables were requested
    /// - Key store failures are propagated
    pub fn serialize(&self, keys: &dyn KeyStore) -> Result<String, CensusError> {
        if self.variables.is_empty() {
            return Err(CensusError::Configuration(
                "A query needs at least one variable".to_string(),
            ));
        }

        let mut parts: Vec<String> = Vec::with_capacity(4);

        if let Some(key) = self.resolved_api_key(keys)? {
            parts.push(format!("key={}", encode_component(key.expose_secret())));
        }

        parts.push(self.geo.encode());
        parts.push(format!("get={}", encode_component(&self.variables.join(","))));

        Ok(parts.join("&"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
