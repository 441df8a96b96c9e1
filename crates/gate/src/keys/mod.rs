//! Data key resolution, caching, and background refresh.
//!
//! # Lifecycle
//!
//! 1. [`KeyProvider::resolve`] loads the key from its [`KeySource`] on first
//!    use: either base64 from configuration, or a wrapped key fetched from a
//!    [`SecretStore`] and unwrapped by a [`KeyUnwrapper`].
//! 2. The resolved [`KeyMaterial`] is cached behind an `Arc` and handed to
//!    every later caller without I/O.
//! 3. Concurrent first callers share one resolution.
//! 4. Optionally, [`refresh_task`] re-resolves the key on an interval.
//!
//! The plaintext key is never logged; only its key id is.

pub mod material;
pub mod provider;
pub mod source;

pub use material::{KeyError, KeyMaterial, KEY_LEN};
pub use provider::KeyProvider;
pub use source::{KeySource, KeyUnwrapper, SecretPayload, SecretStore};

use std::time::Duration;

use tokio::time;
use tracing::{info, warn};

/// Spawn a background task that periodically refreshes the provider's key.
///
/// The first refresh fires after one full interval. On failure the previous
/// key is retained and a warning is emitted.
pub fn refresh_task(provider: KeyProvider, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match provider.refresh().await {
                Ok(material) => info!(key_id = material.key_id(), "data key refreshed"),
                Err(e) => warn!(error = %e, "data key refresh failed; retaining previous key"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use base64::{engine::general_purpose::STANDARD, Engine as _};

    #[tokio::test]
    async fn refresh_task_replaces_cached_key() {
        let provider = KeyProvider::explicit(STANDARD.encode([5u8; KEY_LEN]), "local-1");
        let first = provider.resolve().await.unwrap();

        let handle = refresh_task(provider.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        let current = provider.cached().unwrap();
        assert!(!Arc::ptr_eq(&first, &current));
        assert_eq!(current.key_id(), "local-1");
    }

    #[tokio::test]
    async fn refresh_task_keeps_key_when_source_fails() {
        let mut store = source::MockSecretStore::new();
        let mut calls = 0;
        store.expect_fetch_secret().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(Some(SecretPayload::Binary(vec![1])))
            } else {
                Err(anyhow::anyhow!("throttled"))
            }
        });
        let mut unwrapper = source::MockKeyUnwrapper::new();
        unwrapper
            .expect_unwrap_key()
            .times(1)
            .returning(|_| Ok(Some(vec![8u8; KEY_LEN])));

        let provider =
            KeyProvider::envelope(Arc::new(store), Arc::new(unwrapper), "oauth/data-key", "dk-1");
        let first = provider.resolve().await.unwrap();

        let handle = refresh_task(provider.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(Arc::ptr_eq(&first, &provider.cached().unwrap()));
    }

    #[tokio::test]
    async fn refresh_task_keeps_key_when_bytes_change_under_same_id() {
        let mut store = source::MockSecretStore::new();
        let mut calls = 0u8;
        store.expect_fetch_secret().returning(move |_| {
            calls += 1;
            Ok(Some(SecretPayload::Binary(vec![calls])))
        });
        let mut unwrapper = source::MockKeyUnwrapper::new();
        unwrapper
            .expect_unwrap_key()
            .returning(|wrapped| Ok(Some(vec![wrapped[0]; KEY_LEN])));

        let provider =
            KeyProvider::envelope(Arc::new(store), Arc::new(unwrapper), "oauth/data-key", "dk-1");
        let first = provider.resolve().await.unwrap();

        let handle = refresh_task(provider.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(Arc::ptr_eq(&first, &provider.cached().unwrap()));
    }
}
