//! Client-supplied idempotency key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Validation errors for [`IdempotencyKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyKeyValidationError {
    /// The key was empty or whitespace only.
    EmptyKey,
}

impl fmt::Display for IdempotencyKeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyKey => write!(f, "idempotency key must not be empty"),
        }
    }
}

impl std::error::Error for IdempotencyKeyValidationError {}

/// Opaque token chosen by the client to identify one logical operation.
///
/// No format is imposed beyond being non-empty; surrounding whitespace is
/// trimmed so `"abc"` and `" abc "` name the same operation.
///
/// # Example
///
/// ```
/// # use mfi_backend::domain::idempotency::IdempotencyKey;
/// let key = IdempotencyKey::new("loan-42-repayment-1").expect("non-empty key");
/// assert_eq!(key.as_ref(), "loan-42-repayment-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate and construct a key.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyKeyValidationError::EmptyKey`] when nothing is
    /// left after trimming.
    pub fn new(key: impl AsRef<str>) -> Result<Self, IdempotencyKeyValidationError> {
        let trimmed = key.as_ref().trim();
        if trimmed.is_empty() {
            return Err(IdempotencyKeyValidationError::EmptyKey);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Construct a key from raw header bytes.
    ///
    /// UTF-8 values are taken as they are. Anything else is read as Latin-1,
    /// the legacy `obs-text` reading of header bytes, so distinct byte
    /// strings stay distinct keys.
    ///
    /// # Errors
    ///
    /// Returns [`IdempotencyKeyValidationError::EmptyKey`] for blank values.
    pub fn from_header_bytes(bytes: &[u8]) -> Result<Self, IdempotencyKeyValidationError> {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::new(text),
            Err(_) => Self::new(bytes.iter().copied().map(char::from).collect::<String>()),
        }
    }

    /// Hex SHA-256 of the key, used where the raw key must not appear
    /// (cache key names, metric labels).
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IdempotencyKey> for String {
    fn from(value: IdempotencyKey) -> Self {
        value.0
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = IdempotencyKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
