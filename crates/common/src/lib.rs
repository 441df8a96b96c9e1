//! Wire types and errors shared across `trust-gate` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
pub use protocol::EncryptedSecret;
