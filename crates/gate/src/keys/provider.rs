//! [`KeyProvider`]: cached, single-flight resolution of the data key.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::{error, info, warn};

use super::material::{KeyError, KeyMaterial};
use super::source::{KeySource, KeyUnwrapper, SecretStore};

type Resolution = Result<Arc<KeyMaterial>, KeyError>;
type Flight = Shared<BoxFuture<'static, Resolution>>;

/// Resolves the data key once and shares it with every caller.
///
/// State moves one way: empty → in flight → cached. While a resolution is in
/// flight, further callers attach to it instead of issuing their own secret
/// store and key-management calls. The resolution itself runs on a spawned
/// task, so callers that stop waiting do not cancel it; its result still
/// lands in the cache.
///
/// A failed resolution clears the in-flight slot and leaves the cache as it
/// was, so the next call retries. A resolution that yields different key
/// bytes under the cached key id is treated as failed
/// ([`KeyError::KeyIdReused`]): rotating the key requires a new key id.
///
/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct KeyProvider {
    inner: Arc<Inner>,
}

struct Inner {
    source: KeySource,
    cache: ArcSwapOption<KeyMaterial>,
    in_flight: Mutex<Option<Flight>>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Option<Flight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache `fresh` unless it would silently replace the key behind the
    /// cached key id.
    fn admit(&self, fresh: Arc<KeyMaterial>) -> Result<Arc<KeyMaterial>, KeyError> {
        if let Some(current) = self.cache.load_full() {
            if current.key_id() == fresh.key_id() && !current.same_key(&fresh) {
                error!(
                    key_id = fresh.key_id(),
                    "data key bytes changed without a new key id; keeping cached key"
                );
                return Err(KeyError::KeyIdReused(fresh.key_id().to_owned()));
            }
        }
        self.cache.store(Some(Arc::clone(&fresh)));
        Ok(fresh)
    }
}

/// Empties the in-flight slot when the resolution task ends, including when
/// it panics or is cancelled by runtime shutdown.
struct ClearSlot(Arc<Inner>);

impl Drop for ClearSlot {
    fn drop(&mut self) {
        self.0.slot().take();
    }
}

impl KeyProvider {
    /// Create a provider for `source`. Nothing is fetched until the first
    /// [`resolve`](Self::resolve).
    pub fn new(source: KeySource) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                cache: ArcSwapOption::empty(),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Provider for a base64 key supplied through configuration.
    pub fn explicit(key_b64: impl Into<String>, key_id: impl Into<String>) -> Self {
        Self::new(KeySource::Explicit {
            key_b64: key_b64.into(),
            key_id: key_id.into(),
        })
    }

    /// Provider for a wrapped key held in `store` and unwrapped by `unwrapper`.
    pub fn envelope(
        store: Arc<dyn SecretStore>,
        unwrapper: Arc<dyn KeyUnwrapper>,
        secret_id: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self::new(KeySource::Envelope {
            secret_id: secret_id.into(),
            key_id: key_id.into(),
            store,
            unwrapper,
        })
    }

    /// Return the data key, resolving it on first use.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the [`KeyError`] of the resolution this call started or joined.
    pub async fn resolve(&self) -> Result<Arc<KeyMaterial>, KeyError> {
        if let Some(material) = self.cached() {
            return Ok(material);
        }
        self.join_or_start(false).await
    }

    /// Resolve fresh material regardless of the cache and swap it in.
    ///
    /// Joins a resolution that is already in flight. On failure the cached
    /// material, if any, is kept.
    ///
    /// # Errors
    ///
    /// Returns the [`KeyError`] of the underlying resolution, or
    /// [`KeyError::KeyIdReused`] if the source now yields different key bytes
    /// under the cached key id.
    pub async fn refresh(&self) -> Result<Arc<KeyMaterial>, KeyError> {
        self.join_or_start(true).await
    }

    /// Drop the cached material so the next [`resolve`](Self::resolve)
    /// fetches again. Holders of the previous `Arc` keep it.
    ///
    /// The next resolution is accepted whatever key bytes it yields, so only
    /// reset once no secret sealed under the old key still needs opening.
    pub fn reset(&self) {
        self.inner.cache.store(None);
    }

    /// The cached material, without any I/O.
    pub fn cached(&self) -> Option<Arc<KeyMaterial>> {
        self.inner.cache.load_full()
    }

    /// Returns `true` if key material is cached.
    pub fn is_ready(&self) -> bool {
        self.inner.cache.load().is_some()
    }

    fn join_or_start(&self, force: bool) -> Flight {
        let mut slot = self.inner.slot();
        if let Some(flight) = slot.as_ref() {
            return flight.clone();
        }
        // A flight may have completed between the caller's cache check and
        // taking the lock.
        if !force {
            if let Some(material) = self.cached() {
                return future::ready(Ok(material)).boxed().shared();
            }
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _clear = ClearSlot(Arc::clone(&inner));
            let outcome = inner
                .source
                .load()
                .await
                .map(Arc::new)
                .and_then(|fresh| inner.admit(fresh));
            match &outcome {
                Ok(material) => info!(key_id = material.key_id(), "data key resolved"),
                Err(e) => warn!(error = %e, "data key resolution failed"),
            }
            outcome
        });

        let flight = async move {
            task.await.unwrap_or_else(|e| {
                Err(KeyError::Infrastructure(format!("key resolution task failed: {e}")))
            })
        }
        .boxed()
        .shared();
        *slot = Some(flight.clone());
        flight
    }
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("source", &self.inner.source)
            .field("ready", &self.is_ready())
            .finish()
    }
}
