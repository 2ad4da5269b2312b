//! Storage for the installed API key: file, in-memory, and OS keychain.

pub mod key_store;
pub mod keychain;

pub use key_store::{default_key_path, FileKeyStore, KeyStore, MemoryKeyStore};
pub use keychain::KeychainKeyStore;
