//! Named AES key management
//!
//! Keys are identified by a short name such as `xbox360-xex2` and loaded
//! from a `keys.conf` style text file. Because key material cannot ship
//! with the library, every key is checked against a pinned verification
//! block before it is used.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use tracing::debug;

use crate::aes128::{AES_128_KEY_SIZE, decrypt_ecb_block};
use crate::error::{CryptoError, CryptoResult};

/// Plaintext every verification block decrypts to with the correct key
pub const VERIFY_PLAINTEXT: &[u8; 16] = b"AES-128-ECB-TEST";

/// A named 16-byte AES key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedKey {
    /// Key name
    pub name: String,
    /// 16-byte encryption key
    pub key: [u8; AES_128_KEY_SIZE],
}

impl NamedKey {
    /// Create a new named key
    pub fn new(name: impl Into<String>, key: [u8; AES_128_KEY_SIZE]) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }

    /// Parse key from hex string
    pub fn from_hex(name: impl Into<String>, hex: &str) -> CryptoResult<Self> {
        let hex = hex.trim();
        let bytes = hex::decode(hex)
            .map_err(|e| CryptoError::InvalidKeyFormat(format!("invalid hex: {e}")))?;

        if bytes.len() != AES_128_KEY_SIZE {
            return Err(CryptoError::InvalidKeySize {
                expected: AES_128_KEY_SIZE,
                actual: bytes.len(),
            });
        }

        let mut key = [0u8; AES_128_KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self::new(name, key))
    }
}

impl fmt::Display for NamedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, hex::encode_upper(self.key))
    }
}

/// Outcome of checking a key against its verification block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyResult {
    /// Key decrypted the verification block correctly
    Ok,
    /// No key with that name is loaded
    KeyNotFound,
    /// Key exists but its stored value is malformed
    KeyInvalid,
    /// Key exists but does not match the verification block
    IncorrectKey,
}

impl VerifyResult {
    /// Whether the key can be used
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::KeyNotFound => "key not found",
            Self::KeyInvalid => "key is not valid",
            Self::IncorrectKey => "key is incorrect",
        };
        f.write_str(s)
    }
}

/// Check `key` against a pinned verification block
///
/// The block is the ECB encryption of [`VERIFY_PLAINTEXT`] under the
/// correct key.
pub fn verify_key(key: &[u8; AES_128_KEY_SIZE], verify_data: &[u8; 16]) -> bool {
    let mut block = *verify_data;
    decrypt_ecb_block(key, &mut block);
    &block == VERIFY_PLAINTEXT
}

/// Build the verification block for `key`
pub fn make_verify_data(key: &[u8; AES_128_KEY_SIZE]) -> [u8; 16] {
    let mut block = *VERIFY_PLAINTEXT;
    crate::aes128::encrypt_ecb_block(key, &mut block);
    block
}

/// Store for named encryption keys
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: HashMap<String, [u8; AES_128_KEY_SIZE]>,
    invalid: Vec<String>,
}

impl KeyStore {
    /// Create an empty key store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a key by name
    pub fn get(&self, name: &str) -> Option<&[u8; AES_128_KEY_SIZE]> {
        self.keys.get(name)
    }

    /// Add a key to the store
    pub fn add(&mut self, key: NamedKey) {
        self.invalid.retain(|n| n != &key.name);
        self.keys.insert(key.name, key.key);
    }

    /// Remove a key from the store
    pub fn remove(&mut self, name: &str) -> Option<[u8; AES_128_KEY_SIZE]> {
        self.keys.remove(name)
    }

    /// Get the number of keys in the store
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Look up a key and check it against `verify_data`
    pub fn get_and_verify(
        &self,
        name: &str,
        verify_data: &[u8; 16],
    ) -> Result<[u8; AES_128_KEY_SIZE], VerifyResult> {
        match self.keys.get(name) {
            Some(key) if verify_key(key, verify_data) => Ok(*key),
            Some(_) => Err(VerifyResult::IncorrectKey),
            None if self.invalid.iter().any(|n| n == name) => Err(VerifyResult::KeyInvalid),
            None => Err(VerifyResult::KeyNotFound),
        }
    }

    /// Load keys from `keys.conf` content
    ///
    /// Only the `[Keys]` section is read. Entries are `name=hex`; lines
    /// starting with `#` or `;` are comments. Entries whose value is not a
    /// 16-byte hex string are remembered as invalid so verification can
    /// report [`VerifyResult::KeyInvalid`]. Returns the number of keys loaded.
    ///
    /// # Example
    ///
    /// ```
    /// use romprops_crypto::keys::KeyStore;
    ///
    /// let conf = r#"
    /// ; Xbox 360 keys
    /// [Keys]
    /// xbox360-xex1=00112233445566778899AABBCCDDEEFF
    /// xbox360-xex2 = 0x00112233445566778899AABBCCDDEEFF
    /// "#;
    ///
    /// let mut store = KeyStore::new();
    /// assert_eq!(store.load_from_conf(conf), 2);
    /// ```
    pub fn load_from_conf(&mut self, content: &str) -> usize {
        let mut count = 0;
        let mut in_keys = false;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_keys = section.trim().eq_ignore_ascii_case("keys");
                continue;
            }
            if !in_keys {
                continue;
            }

            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            if self.insert_hex(name.trim(), value) {
                count += 1;
            }
        }

        debug!("loaded {count} key(s) from keys.conf content");
        count
    }

    /// Load keys from text content (format: `name key_hex` per line)
    ///
    /// Lines starting with `#` or `//` are treated as comments.
    /// Returns the number of keys successfully loaded.
    pub fn load_from_txt(&mut self, content: &str) -> usize {
        let mut count = 0;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }

            if self.insert_hex(parts[0], parts[1]) {
                count += 1;
            }
        }

        count
    }

    /// Load keys from a file on disk
    ///
    /// Files containing a `[Keys]` section header are parsed as `keys.conf`;
    /// anything else is parsed as whitespace-separated text.
    pub fn load_from_path(&mut self, path: impl AsRef<Path>) -> CryptoResult<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let count = if content
            .lines()
            .any(|l| l.trim().eq_ignore_ascii_case("[keys]"))
        {
            self.load_from_conf(&content)
        } else {
            self.load_from_txt(&content)
        };
        debug!("loaded {count} key(s) from {}", path.display());
        Ok(count)
    }

    /// Iterate over all keys
    pub fn iter(&self) -> impl Iterator<Item = NamedKey> + '_ {
        self.keys
            .iter()
            .map(|(name, &key)| NamedKey::new(name.clone(), key))
    }

    fn insert_hex(&mut self, name: &str, value: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let value = value.trim();
        let value = value
            .strip_prefix("0x")
            .or_else(|| value.strip_prefix("0X"))
            .unwrap_or(value);

        match NamedKey::from_hex(name, value) {
            Ok(key) => {
                self.add(key);
                true
            }
            Err(e) => {
                debug!("ignoring key {name}: {e}");
                self.keys.remove(name);
                if !self.invalid.iter().any(|n| n == name) {
                    self.invalid.push(name.to_string());
                }
                false
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_named_key_from_hex() {
        let key = NamedKey::from_hex("test", "0123456789ABCDEF0123456789ABCDEF")
            .expect("Valid key hex should parse");
        assert_eq!(key.name, "test");
        assert_eq!(key.key[0], 0x01);
        assert_eq!(key.key[15], 0xEF);
    }

    #[test]
    fn test_named_key_invalid_size() {
        let result = NamedKey::from_hex("short", "0123456789ABCDEF");
        assert!(matches!(result, Err(CryptoError::InvalidKeySize { .. })));
    }

    #[test]
    fn test_verify_key() {
        let key = [0x5Au8; 16];
        let verify = make_verify_data(&key);
        assert!(verify_key(&key, &verify));
        assert!(!verify_key(&[0u8; 16], &verify));
    }

    #[test]
    fn test_debug_key_verification_block() {
        // The all-zero debug key encrypts the verification plaintext to this block.
        let verify = make_verify_data(&[0u8; 16]);
        assert!(verify_key(&[0u8; 16], &verify));
    }

    #[test]
    fn test_load_from_conf() {
        let conf = "\
# comment
[Other]
xbox360-xex1=FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF
[Keys]
xbox360-xex1=00112233445566778899AABBCCDDEEFF
xbox360-xex2=nothex
";
        let mut store = KeyStore::new();
        assert_eq!(store.load_from_conf(conf), 1);
        assert_eq!(store.get("xbox360-xex1").expect("key loaded")[0], 0x00);
        assert!(store.get("xbox360-xex2").is_none());
    }

    #[test]
    fn test_get_and_verify() {
        let key = [0x11u8; 16];
        let verify = make_verify_data(&key);

        let mut store = KeyStore::new();
        assert_eq!(
            store.get_and_verify("k", &verify),
            Err(VerifyResult::KeyNotFound)
        );

        store.load_from_conf("[Keys]\nk=zz\n");
        assert_eq!(
            store.get_and_verify("k", &verify),
            Err(VerifyResult::KeyInvalid)
        );

        store.add(NamedKey::new("k", [0x22; 16]));
        assert_eq!(
            store.get_and_verify("k", &verify),
            Err(VerifyResult::IncorrectKey)
        );

        store.add(NamedKey::new("k", key));
        assert_eq!(store.get_and_verify("k", &verify), Ok(key));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().expect("Test operation should succeed");
        let path = dir.path().join("keys.conf");
        std::fs::write(&path, "[Keys]\na=000102030405060708090A0B0C0D0E0F\n")
            .expect("Test operation should succeed");

        let mut store = KeyStore::new();
        let count = store
            .load_from_path(&path)
            .expect("Test operation should succeed");
        assert_eq!(count, 1);

        let txt = dir.path().join("keys.txt");
        std::fs::write(&txt, "// text form\nb 000102030405060708090A0B0C0D0E0F\n")
            .expect("Test operation should succeed");
        assert_eq!(store.load_from_path(&txt).expect("load"), 1);
        assert_eq!(store.len(), 2);
    }
}
