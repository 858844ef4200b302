//! Trait abstraction for key storage backends
//!
//! Parsers only need to look keys up and verify them, so they depend on
//! [`KeyProvider`] rather than on a concrete store.

use crate::error::CryptoError;
use crate::keys::{KeyStore, NamedKey, VerifyResult, verify_key};

/// Trait for key storage backends
pub trait KeyProvider {
    /// Get a key by name
    fn get_key(&self, name: &str) -> Result<Option<[u8; 16]>, CryptoError>;

    /// Add or replace a key
    fn add_key(&mut self, key: NamedKey) -> Result<(), CryptoError>;

    /// Remove a key, returning it if it existed
    fn remove_key(&mut self, name: &str) -> Result<Option<[u8; 16]>, CryptoError>;

    /// Number of keys in storage
    fn key_count(&self) -> Result<usize, CryptoError>;

    /// Check whether a key exists
    fn contains_key(&self, name: &str) -> Result<bool, CryptoError> {
        Ok(self.get_key(name)?.is_some())
    }

    /// Look up a key and check it against a pinned verification block
    fn get_and_verify(&self, name: &str, verify_data: &[u8; 16]) -> Result<[u8; 16], VerifyResult> {
        match self.get_key(name) {
            Ok(Some(key)) if verify_key(&key, verify_data) => Ok(key),
            Ok(Some(_)) => Err(VerifyResult::IncorrectKey),
            Ok(None) => Err(VerifyResult::KeyNotFound),
            Err(_) => Err(VerifyResult::KeyInvalid),
        }
    }
}

impl KeyProvider for KeyStore {
    fn get_key(&self, name: &str) -> Result<Option<[u8; 16]>, CryptoError> {
        Ok(self.get(name).copied())
    }

    fn add_key(&mut self, key: NamedKey) -> Result<(), CryptoError> {
        self.add(key);
        Ok(())
    }

    fn remove_key(&mut self, name: &str) -> Result<Option<[u8; 16]>, CryptoError> {
        Ok(self.remove(name))
    }

    fn key_count(&self) -> Result<usize, CryptoError> {
        Ok(self.len())
    }

    fn get_and_verify(&self, name: &str, verify_data: &[u8; 16]) -> Result<[u8; 16], VerifyResult> {
        KeyStore::get_and_verify(self, name, verify_data)
    }
}
