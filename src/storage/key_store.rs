//! Installed API key storage.
//!
//! The key is looked up through an explicit [`KeyStore`] handed to query
//! serialization and to the fetch orchestrator. Two stores live here: a
//! single-line file in the user's config directory and an in-memory store.
//! The OS keychain store is in [`keychain`](super::keychain).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use directories::ProjectDirs;
use secrecy::{ExposeSecret, SecretString};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::CensusError;

const APP_QUALIFIER: &str = "gov";
const APP_ORG: &str = "census";
const APP_NAME: &str = "census-stitch";
const KEY_FILENAME: &str = "api_key";

/// Environment variable read by [`MemoryKeyStore::from_env`].
pub const ENV_API_KEY: &str = "CENSUS_API_KEY";

/// Source of the installed API key.
pub trait KeyStore: Send + Sync {
    /// Returns the installed key, or `None` when no key has been installed.
    fn read_installed_key(&self) -> Result<Option<SecretString>, CensusError>;

    /// Installs `key`, replacing any previous key.
    fn write_installed_key(&self, key: &str) -> Result<(), CensusError>;
}

/// Normalizes a stored key: surrounding whitespace is dropped and an
/// empty value counts as no key.
fn normalize_key(raw: &str) -> Option<SecretString> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(SecretString::from(trimmed.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FileKeyStore
// ─────────────────────────────────────────────────────────────────────────────

/// Stores the key as a single line in a file.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    /// Uses an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses the platform config directory:
    /// - Linux: `~/.config/census-stitch/api_key`
    /// - macOS: `~/Library/Application Support/gov.census.census-stitch/api_key`
    /// - Windows: `%APPDATA%\census\census-stitch\config\api_key`
    ///
    /// # Errors
    ///
    /// Returns `CensusError::KeyStore` when no home directory can be found.
    pub fn default_location() -> Result<Self, CensusError> {
        default_key_path()
            .map(Self::new)
            .ok_or_else(|| CensusError::KeyStore("Could not determine config directory".into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Path of the key file in the platform config directory.
pub fn default_key_path() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join(KEY_FILENAME))
}

impl KeyStore for FileKeyStore {
    fn read_installed_key(&self) -> Result<Option<SecretString>, CensusError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(normalize_key(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[KEYS] No key file at {:?}", self.path);
                Ok(None)
            }
            Err(e) => Err(CensusError::KeyStore(format!(
                "Failed to read key file: {}",
                e
            ))),
        }
    }

    fn write_installed_key(&self, key: &str) -> Result<(), CensusError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CensusError::KeyStore("Refusing to install an empty key".into()));
        }

        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        fs::create_dir_all(parent)
            .map_err(|e| CensusError::KeyStore(format!("Failed to create key directory: {}", e)))?;

        // Temp file in the same directory so persist() is an atomic rename.
        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|e| CensusError::KeyStore(format!("Failed to create temporary file: {}", e)))?;

        writeln!(temp, "{}", key)
            .map_err(|e| CensusError::KeyStore(format!("Failed to write key: {}", e)))?;

        temp.persist(&self.path)
            .map_err(|e| CensusError::KeyStore(format!("Failed to persist key file: {}", e.error)))?;

        info!("[KEYS] Installed API key at {:?}", self.path);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryKeyStore
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps the key in process memory.
#[derive(Default)]
pub struct MemoryKeyStore {
    key: RwLock<Option<SecretString>>,
}

impl std::fmt::Debug for MemoryKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let installed = self.key.read().map(|k| k.is_some()).unwrap_or(false);
        f.debug_struct("MemoryKeyStore")
            .field("key", &installed.then_some("[REDACTED]"))
            .finish()
    }
}

impl MemoryKeyStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `key`.
    pub fn with_key(key: &str) -> Self {
        Self {
            key: RwLock::new(normalize_key(key)),
        }
    }

    /// A store seeded from `CENSUS_API_KEY`; empty when the variable is unset.
    pub fn from_env() -> Self {
        match std::env::var(ENV_API_KEY) {
            Ok(key) => Self::with_key(&key),
            Err(_) => Self::new(),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn read_installed_key(&self) -> Result<Option<SecretString>, CensusError> {
        let guard = self
            .key
            .read()
            .map_err(|_| CensusError::Internal("Key store lock poisoned".into()))?;
        Ok(guard.as_ref().map(|k| SecretString::from(k.expose_secret().to_string())))
    }

    fn write_installed_key(&self, key: &str) -> Result<(), CensusError> {
        let normalized = normalize_key(key)
            .ok_or_else(|| CensusError::KeyStore("Refusing to install an empty key".into()))?;

        let mut guard = self
            .key
            .write()
            .map_err(|_| CensusError::Internal("Key store lock poisoned".into()))?;
        *guard = Some(normalized);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
