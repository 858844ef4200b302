//! Cryptographic operations for console file formats
//!
//! This crate provides the AES primitives and key handling needed to read
//! encrypted Xbox 360 executables.
//!
//! # Components
//!
//! - **AES-128**: single-block ECB and unpadded CBC helpers
//! - **Stream decryption**: [`CbcReader`], a seekable decrypting view of a byte range
//! - **Key Management**: named key storage loaded from `keys.conf`, with
//!   verification against pinned test blocks
//!
//! # Key Storage
//!
//! - [`KeyStore`] - In-memory storage loaded from configuration files
//! - [`KeyProvider`] - Trait for implementing custom storage backends
//!
//! # Examples
//!
//! ## Verifying a key
//!
//! ```
//! use romprops_crypto::{KeyStore, NamedKey, keys::make_verify_data};
//!
//! let key = [0x42u8; 16];
//! let verify = make_verify_data(&key);
//!
//! let mut store = KeyStore::new();
//! store.add(NamedKey::new("xbox360-xex2", key));
//! assert!(store.get_and_verify("xbox360-xex2", &verify).is_ok());
//! ```
//!
//! ## Decrypting a byte range
//!
//! ```
//! use std::io::{Cursor, Read};
//! use romprops_crypto::{CbcReader, aes128::encrypt_cbc};
//!
//! let key = [7u8; 16];
//! let mut data = b"sixteen byte msgsixteen byte msg".to_vec();
//! encrypt_cbc(&key, &[0u8; 16], &mut data).unwrap();
//!
//! let mut reader = CbcReader::new(Cursor::new(data), 0, 32, Some(&key), None);
//! let mut plain = String::new();
//! reader.read_to_string(&mut plain).unwrap();
//! assert_eq!(plain, "sixteen byte msgsixteen byte msg");
//! ```

#![warn(missing_docs)]

pub mod aes128;
pub mod cbc_reader;
pub mod error;
pub mod keys;
pub mod store_trait;

pub use error::{CryptoError, CryptoResult};

// Re-export commonly used types
pub use cbc_reader::CbcReader;
pub use keys::{KeyStore, NamedKey, VerifyResult};
pub use store_trait::KeyProvider;
