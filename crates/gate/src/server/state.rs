//! Shared application state injected into every Axum handler.

use crate::embed::EmbedGuard;
use crate::keys::KeyProvider;

/// Application state shared across all request handlers.
///
/// Both fields are cheap to clone: the guard is `Copy` and the provider is an
/// `Arc`-backed handle, so every clone shares one key cache.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Embed markup validator.
    pub embed: EmbedGuard,
    /// Data key provider for the token endpoints.
    pub keys: KeyProvider,
}

impl AppState {
    /// Create a new [`AppState`] with the default embed policy.
    pub fn new(keys: KeyProvider) -> Self {
        Self {
            embed: EmbedGuard::default(),
            keys,
        }
    }
}
