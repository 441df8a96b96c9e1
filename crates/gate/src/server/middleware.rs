//! Axum middleware settings applied to the router.
//!
//! Includes request tracing, timeout enforcement, a request body limit, and
//! response compression.

use std::time::Duration;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest accepted request body. Embed markup is capped well below this.
pub const MAX_BODY_BYTES: usize = 64 * 1024;
