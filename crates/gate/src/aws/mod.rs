//! AWS-backed collaborators for envelope key resolution.
//!
//! Secrets Manager holds the wrapped data key; KMS unwraps it. Both clients are
//! built from one shared SDK config so credentials are resolved once.

pub mod clients;

pub use clients::{AwsClients, KmsUnwrapper, SecretsManagerStore};
