//! Tracing setup: structured JSON logs, plus span export over OTLP when a
//! collector endpoint is configured.
//!
//! # Telemetry invariants
//!
//! - **No key material, nonces, or plaintext tokens** may appear in any span
//!   attribute or log field. Key ids and rejection reason codes are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence when set.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
