//! Where the data key comes from: explicit configuration or an envelope
//! fetched from a secret store and unwrapped by a key-management service.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};

use super::material::{KeyError, KeyMaterial};

/// Payload of a secret-store entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPayload {
    /// Raw bytes of the wrapped key.
    Binary(Vec<u8>),
    /// Base64 text of the wrapped key.
    Text(String),
}

/// Read access to a secret store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the secret named `secret_id`.
    ///
    /// `Ok(None)` means the entry exists but carries neither a binary nor a
    /// string payload. Transport and permission failures are `Err`.
    async fn fetch_secret(&self, secret_id: &str) -> anyhow::Result<Option<SecretPayload>>;
}

/// Unwraps an envelope-encrypted data key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyUnwrapper: Send + Sync {
    /// Decrypt `wrapped`. `Ok(None)` means the service answered without
    /// plaintext.
    async fn unwrap_key(&self, wrapped: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Configured origin of the data key.
#[derive(Clone)]
pub enum KeySource {
    /// Base64 key supplied directly through configuration.
    Explicit { key_b64: String, key_id: String },
    /// Wrapped key stored in a secret store.
    Envelope {
        secret_id: String,
        key_id: String,
        store: Arc<dyn SecretStore>,
        unwrapper: Arc<dyn KeyUnwrapper>,
    },
}

impl KeySource {
    /// Produce fresh key material. Performs I/O for [`KeySource::Envelope`].
    pub(crate) async fn load(&self) -> Result<KeyMaterial, KeyError> {
        match self {
            KeySource::Explicit { key_b64, key_id } => {
                // Undecodable input carries no key bytes at all.
                let mut bytes = decode_base64(key_b64).ok_or(KeyError::InvalidKeyLength(0))?;
                let material = KeyMaterial::from_slice(&bytes, key_id.as_str());
                bytes.fill(0);
                material
            }
            KeySource::Envelope {
                secret_id,
                key_id,
                store,
                unwrapper,
            } => {
                let wrapped = match store.fetch_secret(secret_id).await.map_err(infrastructure)? {
                    Some(SecretPayload::Binary(bytes)) => Some(bytes),
                    Some(SecretPayload::Text(text)) => decode_base64(&text),
                    None => None,
                }
                .filter(|bytes| !bytes.is_empty())
                .ok_or_else(|| KeyError::SecretNotFound(secret_id.clone()))?;

                let mut plaintext = unwrapper
                    .unwrap_key(&wrapped)
                    .await
                    .map_err(infrastructure)?
                    .ok_or(KeyError::UnwrapFailed)?;
                let material = KeyMaterial::from_slice(&plaintext, key_id.as_str());
                plaintext.fill(0);
                material
            }
        }
    }

    /// Key id the resolved material will carry.
    pub fn key_id(&self) -> &str {
        match self {
            KeySource::Explicit { key_id, .. } | KeySource::Envelope { key_id, .. } => key_id,
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Explicit { key_id, .. } => f
                .debug_struct("Explicit")
                .field("key_id", key_id)
                .field("key_b64", &"[REDACTED]")
                .finish(),
            KeySource::Envelope {
                secret_id, key_id, ..
            } => f
                .debug_struct("Envelope")
                .field("secret_id", secret_id)
                .field("key_id", key_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Standard base64, falling back to the URL-safe alphabet.
fn decode_base64(encoded: &str) -> Option<Vec<u8>> {
    let trimmed = encoded.trim();
    STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(trimmed))
        .ok()
}

fn infrastructure(err: anyhow::Error) -> KeyError {
    KeyError::Infrastructure(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LEN;

    fn envelope(store: MockSecretStore, unwrapper: MockKeyUnwrapper) -> KeySource {
        KeySource::Envelope {
            secret_id: "oauth/data-key".into(),
            key_id: "dk-1".into(),
            store: Arc::new(store),
            unwrapper: Arc::new(unwrapper),
        }
    }

    #[tokio::test]
    async fn explicit_key_decodes() {
        let source = KeySource::Explicit {
            key_b64: STANDARD.encode([7u8; KEY_LEN]),
            key_id: "local".into(),
        };
        let material = source.load().await.unwrap();
        assert_eq!(material.key_id(), "local");
        assert_eq!(material.key_bytes(), &[7u8; KEY_LEN]);
    }

    #[tokio::test]
    async fn explicit_key_accepts_url_safe_alphabet() {
        let source = KeySource::Explicit {
            key_b64: URL_SAFE.encode([0xFBu8; KEY_LEN]),
            key_id: "local".into(),
        };
        assert!(source.load().await.is_ok());
    }

    #[tokio::test]
    async fn explicit_key_wrong_length() {
        let short = KeySource::Explicit {
            key_b64: STANDARD.encode([7u8; 16]),
            key_id: "local".into(),
        };
        assert_eq!(short.load().await.unwrap_err(), KeyError::InvalidKeyLength(16));

        let garbage = KeySource::Explicit {
            key_b64: "not base64 at all!".into(),
            key_id: "local".into(),
        };
        assert_eq!(garbage.load().await.unwrap_err(), KeyError::InvalidKeyLength(0));
    }

    #[tokio::test]
    async fn envelope_binary_payload() {
        let mut store = MockSecretStore::new();
        store
            .expect_fetch_secret()
            .withf(|id| id == "oauth/data-key")
            .times(1)
            .returning(|_| Ok(Some(SecretPayload::Binary(vec![1, 2, 3]))));
        let mut unwrapper = MockKeyUnwrapper::new();
        unwrapper
            .expect_unwrap_key()
            .withf(|wrapped| wrapped == [1, 2, 3])
            .times(1)
            .returning(|_| Ok(Some(vec![9u8; KEY_LEN])));

        let material = envelope(store, unwrapper).load().await.unwrap();
        assert_eq!(material.key_id(), "dk-1");
        assert_eq!(material.key_bytes(), &[9u8; KEY_LEN]);
    }

    #[tokio::test]
    async fn envelope_text_payload_is_base64() {
        let mut store = MockSecretStore::new();
        store
            .expect_fetch_secret()
            .returning(|_| Ok(Some(SecretPayload::Text(STANDARD.encode([4u8, 5, 6])))));
        let mut unwrapper = MockKeyUnwrapper::new();
        unwrapper
            .expect_unwrap_key()
            .withf(|wrapped| wrapped == [4, 5, 6])
            .returning(|_| Ok(Some(vec![1u8; KEY_LEN])));

        assert!(envelope(store, unwrapper).load().await.is_ok());
    }

    #[tokio::test]
    async fn envelope_without_payload_is_secret_not_found() {
        for payload in [
            None,
            Some(SecretPayload::Binary(Vec::new())),
            Some(SecretPayload::Text("%%%".into())),
        ] {
            let mut store = MockSecretStore::new();
            store
                .expect_fetch_secret()
                .returning(move |_| Ok(payload.clone()));
            let mut unwrapper = MockKeyUnwrapper::new();
            unwrapper.expect_unwrap_key().never();

            assert_eq!(
                envelope(store, unwrapper).load().await.unwrap_err(),
                KeyError::SecretNotFound("oauth/data-key".into())
            );
        }
    }

    #[tokio::test]
    async fn envelope_without_plaintext_is_unwrap_failed() {
        let mut store = MockSecretStore::new();
        store
            .expect_fetch_secret()
            .returning(|_| Ok(Some(SecretPayload::Binary(vec![1]))));
        let mut unwrapper = MockKeyUnwrapper::new();
        unwrapper.expect_unwrap_key().returning(|_| Ok(None));

        assert_eq!(
            envelope(store, unwrapper).load().await.unwrap_err(),
            KeyError::UnwrapFailed
        );
    }

    #[tokio::test]
    async fn envelope_unwrapped_key_wrong_length() {
        let mut store = MockSecretStore::new();
        store
            .expect_fetch_secret()
            .returning(|_| Ok(Some(SecretPayload::Binary(vec![1]))));
        let mut unwrapper = MockKeyUnwrapper::new();
        unwrapper
            .expect_unwrap_key()
            .returning(|_| Ok(Some(vec![0u8; 24])));

        assert_eq!(
            envelope(store, unwrapper).load().await.unwrap_err(),
            KeyError::InvalidKeyLength(24)
        );
    }

    #[tokio::test]
    async fn collaborator_errors_are_infrastructure() {
        let mut store = MockSecretStore::new();
        store
            .expect_fetch_secret()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let mut unwrapper = MockKeyUnwrapper::new();
        unwrapper.expect_unwrap_key().never();

        match envelope(store, unwrapper).load().await.unwrap_err() {
            KeyError::Infrastructure(msg) => assert!(msg.contains("connection reset")),
            other => panic!("expected infrastructure error, got {other:?}"),
        }
    }

    #[test]
    fn debug_redacts_explicit_key() {
        let source = KeySource::Explicit {
            key_b64: "c2VjcmV0".into(),
            key_id: "local".into(),
        };
        let rendered = format!("{source:?}");
        assert!(!rendered.contains("c2VjcmV0"));
        assert!(rendered.contains("local"));
    }
}
