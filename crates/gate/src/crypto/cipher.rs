//! AES-256-GCM-SIV encryption and decryption of credential strings.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) with a fresh random 96-bit
//! nonce per call and a detached 128-bit tag. The nonce-misuse resistance of
//! SIV means an accidental nonce repeat leaks only plaintext equality, never
//! the key stream or the authentication key.
//!
//! **Existing AES-GCM secrets:** GCM-SIV derives its keystream and tag
//! differently from plain AES-256-GCM, so a secret sealed by an AES-GCM
//! implementation has the same `{ciphertext, iv, authTag}` shape but never
//! opens here; [`TokenCipher::decrypt`] reports
//! [`CipherError::AuthenticationFailed`] for it. There is no dual-algorithm
//! read path. Stored GCM secrets must be migrated before cutover: open each
//! one with the old implementation and seal the plaintext again with
//! [`TokenCipher::encrypt`], recording this cipher's key id.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, AeadInPlace, KeyInit, OsRng},
    Aes256GcmSiv, Key, Nonce, Tag,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::EncryptedSecret;
use thiserror::Error;
use tracing::warn;

use crate::keys::KeyMaterial;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag (16 bytes = 128 bits).
pub const TAG_LEN: usize = 16;

/// Errors produced by the cipher layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    /// The secret was sealed under a different key than this cipher holds.
    /// Raised before any cryptographic work is attempted.
    #[error("secret belongs to key {expected}, cipher holds key {held}")]
    KeyMismatch { expected: String, held: String },

    /// The tag did not verify: tampered data, wrong key, or corrupted nonce.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A field is not base64, or the nonce or tag has the wrong length.
    #[error("invalid encrypted secret format")]
    InvalidFormat,

    /// The AEAD refused to seal the plaintext. Only reachable for inputs
    /// beyond the algorithm's length limit.
    #[error("aead encryption failed")]
    EncryptionFailed,
}

/// Authenticated cipher bound to one data key and its key id.
///
/// Rotation is handled by building a new `TokenCipher` for the new key; the
/// old instance keeps decrypting secrets sealed before the switch.
#[derive(Clone)]
pub struct TokenCipher {
    aead: Aes256GcmSiv,
    key_id: String,
}

impl TokenCipher {
    /// Bind a cipher to `material`.
    pub fn new(material: &KeyMaterial) -> Self {
        let key = Key::<Aes256GcmSiv>::from_slice(material.key_bytes());
        Self {
            aead: Aes256GcmSiv::new(key),
            key_id: material.key_id().to_owned(),
        }
    }

    /// Identifier of the key this cipher seals under.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::EncryptionFailed`] only if the AEAD rejects the
    /// input length.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = self
            .aead
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| CipherError::EncryptionFailed)?;

        Ok(EncryptedSecret {
            ciphertext: STANDARD.encode(&buffer),
            iv: STANDARD.encode(nonce),
            auth_tag: STANDARD.encode(tag),
        })
    }

    /// Decrypt `secret`, optionally checking that it was sealed under
    /// `expected_key_id` first.
    ///
    /// # Errors
    ///
    /// - [`CipherError::KeyMismatch`] if `expected_key_id` is not this
    ///   cipher's key id.
    /// - [`CipherError::InvalidFormat`] if the secret cannot be decoded.
    /// - [`CipherError::AuthenticationFailed`] if the tag does not verify.
    pub fn decrypt(
        &self,
        secret: &EncryptedSecret,
        expected_key_id: Option<&str>,
    ) -> Result<String, CipherError> {
        if let Some(expected) = expected_key_id {
            if expected != self.key_id {
                warn!(expected_key_id = %expected, key_id = %self.key_id, "token key mismatch");
                return Err(CipherError::KeyMismatch {
                    expected: expected.to_owned(),
                    held: self.key_id.clone(),
                });
            }
        }

        let nonce: [u8; NONCE_LEN] = decode_fixed(&secret.iv)?;
        let tag: [u8; TAG_LEN] = decode_fixed(&secret.auth_tag)?;
        let mut buffer = STANDARD
            .decode(&secret.ciphertext)
            .map_err(|_| CipherError::InvalidFormat)?;

        if self
            .aead
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .is_err()
        {
            warn!(key_id = %self.key_id, "token authentication failed");
            return Err(CipherError::AuthenticationFailed);
        }

        // Authentic but not UTF-8 cannot have come from `encrypt`.
        String::from_utf8(buffer).map_err(|_| CipherError::AuthenticationFailed)
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

fn decode_fixed<const N: usize>(encoded: &str) -> Result<[u8; N], CipherError> {
    STANDARD
        .decode(encoded)
        .map_err(|_| CipherError::InvalidFormat)?
        .try_into()
        .map_err(|_| CipherError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LEN;

    fn random_material(key_id: &str) -> KeyMaterial {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        KeyMaterial::from_slice(&key, key_id).unwrap()
    }

    fn flip_bit(encoded: &str, bit: usize) -> String {
        let mut bytes = STANDARD.decode(encoded).unwrap();
        bytes[bit / 8] ^= 1 << (bit % 8);
        STANDARD.encode(bytes)
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = TokenCipher::new(&random_material("k1"));
        for plaintext in ["", "act.1a2b3c", "rft.Ünïcødé-✓", &"x".repeat(4096)] {
            let secret = cipher.encrypt(plaintext).unwrap();
            assert_eq!(cipher.decrypt(&secret, Some("k1")).unwrap(), plaintext);
            assert_eq!(cipher.decrypt(&secret, None).unwrap(), plaintext);
        }
    }

    #[test]
    fn wire_lengths() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let secret = cipher.encrypt("token").unwrap();
        assert_eq!(STANDARD.decode(&secret.iv).unwrap().len(), NONCE_LEN);
        assert_eq!(STANDARD.decode(&secret.auth_tag).unwrap().len(), TAG_LEN);
        assert_eq!(STANDARD.decode(&secret.ciphertext).unwrap().len(), "token".len());
    }

    #[test]
    fn nonce_is_fresh_per_call() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let a = cipher.encrypt("same token").unwrap();
        let b = cipher.encrypt("same token").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn any_flipped_bit_fails_authentication() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let secret = cipher.encrypt("refresh-token").unwrap();

        for bit in 0.."refresh-token".len() * 8 {
            let tampered = EncryptedSecret {
                ciphertext: flip_bit(&secret.ciphertext, bit),
                ..secret.clone()
            };
            assert_eq!(
                cipher.decrypt(&tampered, Some("k1")),
                Err(CipherError::AuthenticationFailed),
                "ciphertext bit {bit}"
            );
        }
        for bit in 0..TAG_LEN * 8 {
            let tampered = EncryptedSecret {
                auth_tag: flip_bit(&secret.auth_tag, bit),
                ..secret.clone()
            };
            assert_eq!(
                cipher.decrypt(&tampered, Some("k1")),
                Err(CipherError::AuthenticationFailed),
                "tag bit {bit}"
            );
        }
    }

    #[test]
    fn corrupted_nonce_fails_authentication() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let secret = cipher.encrypt("token").unwrap();
        let tampered = EncryptedSecret {
            iv: flip_bit(&secret.iv, 0),
            ..secret
        };
        assert_eq!(cipher.decrypt(&tampered, None), Err(CipherError::AuthenticationFailed));
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealer = TokenCipher::new(&random_material("k1"));
        let other = TokenCipher::new(&random_material("k1"));
        let secret = sealer.encrypt("token").unwrap();
        assert_eq!(other.decrypt(&secret, Some("k1")), Err(CipherError::AuthenticationFailed));
    }

    #[test]
    fn key_mismatch_checked_before_decoding() {
        let cipher = TokenCipher::new(&random_material("k2"));
        // Not even valid base64: a mismatch must still be reported first.
        let garbage = EncryptedSecret {
            ciphertext: "!!".into(),
            iv: "!!".into(),
            auth_tag: "!!".into(),
        };
        assert_eq!(
            cipher.decrypt(&garbage, Some("k1")),
            Err(CipherError::KeyMismatch {
                expected: "k1".into(),
                held: "k2".into()
            })
        );
    }

    #[test]
    fn rotation_keeps_old_cipher_usable() {
        let old = TokenCipher::new(&random_material("2024-01"));
        let new = TokenCipher::new(&random_material("2024-07"));
        let sealed_before = old.encrypt("token").unwrap();

        assert!(matches!(
            new.decrypt(&sealed_before, Some("2024-01")),
            Err(CipherError::KeyMismatch { .. })
        ));
        assert_eq!(old.decrypt(&sealed_before, Some("2024-01")).unwrap(), "token");

        let resealed = new.encrypt("token").unwrap();
        assert_eq!(new.decrypt(&resealed, Some(new.key_id())).unwrap(), "token");
    }

    #[test]
    fn rejects_malformed_encoding() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let secret = cipher.encrypt("token").unwrap();

        let bad_base64 = EncryptedSecret {
            ciphertext: "not base64!".into(),
            ..secret.clone()
        };
        assert_eq!(cipher.decrypt(&bad_base64, None), Err(CipherError::InvalidFormat));

        let short_iv = EncryptedSecret {
            iv: STANDARD.encode([0u8; 8]),
            ..secret.clone()
        };
        assert_eq!(cipher.decrypt(&short_iv, None), Err(CipherError::InvalidFormat));

        let long_tag = EncryptedSecret {
            auth_tag: STANDARD.encode([0u8; 20]),
            ..secret
        };
        assert_eq!(cipher.decrypt(&long_tag, None), Err(CipherError::InvalidFormat));
    }

    #[test]
    fn foreign_secret_of_valid_shape_fails_closed() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let mut ciphertext = [0u8; 24];
        let mut iv = [0u8; NONCE_LEN];
        let mut tag = [0u8; TAG_LEN];
        OsRng.fill_bytes(&mut ciphertext);
        OsRng.fill_bytes(&mut iv);
        OsRng.fill_bytes(&mut tag);
        let foreign = EncryptedSecret {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
            auth_tag: STANDARD.encode(tag),
        };
        assert_eq!(
            cipher.decrypt(&foreign, Some("k1")),
            Err(CipherError::AuthenticationFailed)
        );

        // Migration path: the recovered plaintext is sealed again.
        let resealed = cipher.encrypt("act.recovered-from-gcm").unwrap();
        assert_eq!(
            cipher.decrypt(&resealed, Some("k1")).unwrap(),
            "act.recovered-from-gcm"
        );
    }

    #[test]
    fn debug_shows_only_key_id() {
        let cipher = TokenCipher::new(&random_material("k1"));
        let rendered = format!("{cipher:?}");
        assert!(rendered.contains("k1"));
        assert!(!rendered.contains("aead"));
    }
}
