//! [`KeyMaterial`]: the resolved data key and its identifier.

use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Errors produced while resolving the data key.
///
/// `Clone` so that a single resolution outcome can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The decoded key material is not exactly [`KEY_LEN`] bytes.
    #[error("invalid data key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The secret store returned neither a binary nor a usable string payload.
    #[error("secret {0} has no usable payload")]
    SecretNotFound(String),

    /// The key-management service returned no plaintext for the wrapped key.
    #[error("key-management service returned no plaintext")]
    UnwrapFailed,

    /// A refresh produced different key bytes under the key id already in
    /// use. Secrets sealed under the cached key would become undecryptable,
    /// so the cached key is kept; a new key needs a new key id.
    #[error("data key {0} changed without a new key id")]
    KeyIdReused(String),

    /// The secret store or key-management service could not be reached or
    /// returned an error.
    #[error("key infrastructure error: {0}")]
    Infrastructure(String),
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// The memory is overwritten with zeroes on drop to minimise the window during
/// which plaintext key material lives in RAM.
struct DataKey(Box<[u8; KEY_LEN]>);

impl Drop for DataKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// A 256-bit data key bound to the identifier it is tracked under.
///
/// Only the key id is observable outside the crate. Instances are shared as
/// `Arc<KeyMaterial>` and never cloned.
pub struct KeyMaterial {
    key: DataKey,
    key_id: String,
}

impl KeyMaterial {
    /// Build key material from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyLength`] unless `bytes` is exactly
    /// [`KEY_LEN`] bytes long.
    pub fn from_slice(bytes: &[u8], key_id: impl Into<String>) -> Result<Self, KeyError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyError::InvalidKeyLength(bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self {
            key: DataKey(buf),
            key_id: key_id.into(),
        })
    }

    /// Identifier recorded next to every ciphertext sealed with this key.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub(crate) fn key_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key.0
    }

    /// Same key id and same key bytes.
    pub(crate) fn same_key(&self, other: &KeyMaterial) -> bool {
        self.key_id == other.key_id && self.key_bytes() == other.key_bytes()
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_length() {
        let material = KeyMaterial::from_slice(&[0x42; KEY_LEN], "k1").unwrap();
        assert_eq!(material.key_id(), "k1");
        assert_eq!(material.key_bytes(), &[0x42; KEY_LEN]);
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(
            KeyMaterial::from_slice(&[0u8; 16], "k1").unwrap_err(),
            KeyError::InvalidKeyLength(16)
        );
        assert_eq!(
            KeyMaterial::from_slice(&[0u8; 33], "k1").unwrap_err(),
            KeyError::InvalidKeyLength(33)
        );
    }

    #[test]
    fn same_key_compares_id_and_bytes() {
        let a = KeyMaterial::from_slice(&[1; KEY_LEN], "k1").unwrap();
        assert!(a.same_key(&KeyMaterial::from_slice(&[1; KEY_LEN], "k1").unwrap()));
        assert!(!a.same_key(&KeyMaterial::from_slice(&[2; KEY_LEN], "k1").unwrap()));
        assert!(!a.same_key(&KeyMaterial::from_slice(&[1; KEY_LEN], "k2").unwrap()));
    }

    #[test]
    fn key_redacted_in_debug() {
        let material = KeyMaterial::from_slice(&[0xAB; KEY_LEN], "k1").unwrap();
        let rendered = format!("{material:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(rendered.contains("k1"));
        assert!(!rendered.contains("171"), "raw key bytes leaked: {rendered}");
    }
}
