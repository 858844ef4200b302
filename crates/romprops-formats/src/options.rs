//! Options shared by every parser

use std::fmt;
use std::sync::Arc;

use romprops_crypto::{KeyProvider, KeyStore};

use crate::language::Language;

/// Options passed to every `open()`
#[derive(Clone)]
pub struct ParseOptions {
    /// Source of decryption keys
    pub keys: Arc<dyn KeyProvider + Send + Sync>,
    /// Preferred display language; English when unset
    pub language: Option<Language>,
}

impl ParseOptions {
    /// Options using the given key store
    pub fn with_keys(keys: KeyStore) -> Self {
        Self {
            keys: Arc::new(keys),
            language: None,
        }
    }

    /// Set the preferred language
    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::with_keys(KeyStore::new())
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("keys", &self.keys.key_count().unwrap_or(0))
            .field("language", &self.language)
            .finish()
    }
}
