//! Axum HTTP server exposing the trust-boundary primitives.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Inject shared application state (`AppState`) into handlers.
//! - Map domain errors onto [`common::ServiceError`] and JSON error bodies.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
