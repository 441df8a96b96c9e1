//! Authenticated encryption of OAuth credentials.
//!
//! Depends only on [`KeyMaterial`](crate::keys::KeyMaterial), not on the
//! provider that resolved it.
//!
//! # Ciphertext format
//!
//! ```text
//! { "ciphertext": <base64>, "iv": <base64, 12 bytes>, "authTag": <base64, 16 bytes> }
//! ```
//!
//! The key id is stored by the caller next to the record and passed back on
//! decrypt; a mismatch is refused before any cryptographic work.

pub mod cipher;

pub use cipher::{CipherError, TokenCipher};
