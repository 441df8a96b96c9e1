//! Trust boundary for third-party content and credentials.
//!
//! - [`embed`]: allow/deny validation of short-video embed markup.
//! - [`keys`]: resolution and caching of the 256-bit data key, from
//!   configuration or an envelope in a secret store.
//! - [`crypto`]: authenticated encryption of OAuth tokens under that key.
//!
//! [`server`] exposes the three over HTTP for the `trust-gate` binary.

pub mod aws;
pub mod config;
pub mod crypto;
pub mod embed;
pub mod keys;
pub mod server;
pub mod telemetry;

pub use crypto::{CipherError, TokenCipher};
pub use embed::{EmbedGuard, RejectionReason};
pub use keys::{KeyError, KeyMaterial, KeyProvider};
