//! Installed API key storage in the OS keychain.
//!
//! Uses the `keyring` crate. A missing entry reads as "no key installed".

use secrecy::SecretString;
use tracing::info;

use crate::error::CensusError;
use crate::storage::key_store::KeyStore;

/// The service name used for all keychain entries.
const SERVICE_NAME: &str = "census-stitch";

/// Default account name for the installed key.
const DEFAULT_ACCOUNT: &str = "api_key";

/// Keeps the API key in the platform keychain.
#[derive(Debug, Clone)]
pub struct KeychainKeyStore {
    service: String,
    account: String,
}

impl Default for KeychainKeyStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME, DEFAULT_ACCOUNT)
    }
}

impl KeychainKeyStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry, CensusError> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|_| CensusError::KeyStore("Failed to access keychain.".into()))
    }

    /// Removes the installed key. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `CensusError::KeyStore` for keychain access errors.
    pub fn delete_installed_key(&self) -> Result<(), CensusError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(_) => Err(CensusError::KeyStore("Failed to delete API key.".into())),
        }
    }
}

impl KeyStore for KeychainKeyStore {
    fn read_installed_key(&self) -> Result<Option<SecretString>, CensusError> {
        match self.entry()?.get_password() {
            Ok(key) if key.trim().is_empty() => Ok(None),
            Ok(key) => Ok(Some(SecretString::from(key.trim().to_string()))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(_) => Err(CensusError::KeyStore("Failed to retrieve API key.".into())),
        }
    }

    fn write_installed_key(&self, key: &str) -> Result<(), CensusError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CensusError::KeyStore("Refusing to install an empty key".into()));
        }

        self.entry()?
            .set_password(key)
            .map_err(|_| CensusError::KeyStore("Failed to store API key.".into()))?;

        info!("[KEYS] Installed API key in keychain service {}", self.service);
        Ok(())
    }
}
