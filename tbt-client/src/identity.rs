//! Cached, single-flight display-name resolution
//!
//! Name lookup is best-effort enrichment: the resolver never surfaces an
//! error, only presence or absence. Permanent absence (the directory says
//! "no such record" or "no name field") is cached negatively; a transient
//! lookup failure resolves to absence for that call only, so the next call
//! retries.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Transient failure talking to the directory.
#[derive(Debug, Clone, Error)]
#[error("directory lookup failed: {0}")]
pub struct LookupError(pub String);

/// Underlying directory collaborator.
///
/// `Ok(None)` means the key definitively has no display name; transport or
/// provider failures are `Err` and must not be conflated with absence.
#[async_trait]
pub trait DirectoryLookup: Send + Sync + 'static {
    async fn display_name(&self, key: &str) -> Result<Option<String>, LookupError>;
}

type InFlight = Shared<BoxFuture<'static, Option<String>>>;

struct ResolverState {
    positive: HashMap<String, String>,
    negative: HashSet<String>,
    in_flight: HashMap<String, InFlight>,
}

struct ResolverInner<L> {
    lookup: Arc<L>,
    state: Mutex<ResolverState>,
}

/// Process-scoped resolver with explicit lifecycle: created once, injected
/// where needed, so tests instantiate isolated instances.
pub struct IdentityResolver<L> {
    inner: Arc<ResolverInner<L>>,
}

impl<L> Clone for IdentityResolver<L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<L: DirectoryLookup> IdentityResolver<L> {
    pub fn new(lookup: Arc<L>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                lookup,
                state: Mutex::new(ResolverState {
                    positive: HashMap::new(),
                    negative: HashSet::new(),
                    in_flight: HashMap::new(),
                }),
            }),
        }
    }

    /// Resolve a display name from an opaque user key.
    ///
    /// Concurrent calls for the same key share one underlying lookup; every
    /// caller receives that lookup's result.
    pub async fn resolve(&self, key: &str) -> Option<String> {
        let fut = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(name) = state.positive.get(key) {
                return Some(name.clone());
            }
            if state.negative.contains(key) {
                return None;
            }
            if let Some(existing) = state.in_flight.get(key) {
                existing.clone()
            } else {
                let inner = self.inner.clone();
                let owned_key = key.to_string();
                let fut: InFlight = async move {
                    let result = inner.lookup.display_name(&owned_key).await;
                    let mut state = inner.state.lock().unwrap();
                    state.in_flight.remove(&owned_key);
                    match result {
                        Ok(Some(name)) => {
                            state.positive.insert(owned_key, name.clone());
                            Some(name)
                        }
                        Ok(None) => {
                            state.negative.insert(owned_key);
                            None
                        }
                        Err(e) => {
                            // Not cached: a later call gets a fresh lookup
                            debug!(key = %owned_key, error = %e, "Name lookup failed transiently");
                            None
                        }
                    }
                }
                .boxed()
                .shared();
                state.in_flight.insert(key.to_string(), fut.clone());
                fut
            }
        };

        fut.await
    }
}
