//! Event-driven reconciliation between the local store and the remote store
//!
//! The engine owns orchestration only; transport is a collaborator behind
//! [`SyncTransport`]. Every trigger path funnels through a per-scope
//! single-flight map: overlapping invocations of the same scope share one
//! in-flight sync and its result instead of duplicating network work.

use crate::events::AppEvent;
use crate::store::LocalStore;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tbt_common::{Error, PatientRecord, Result, UploadRecord};
use tracing::{info, warn};

/// Result of pushing a batch of records to the remote store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    pub created: usize,
    pub updated: usize,
}

/// Remote transport collaborator. Implementations move data; the engine
/// decides when and what.
#[async_trait]
pub trait SyncTransport: Send + Sync + 'static {
    async fn push_records(&self, records: &[PatientRecord]) -> Result<PushSummary>;
    async fn push_upload(&self, upload: &UploadRecord) -> Result<()>;
    async fn pull_records(&self) -> Result<Vec<PatientRecord>>;
}

/// Scope of a sync run. Roles that must not move full patient datasets are
/// restricted to `UploadsOnly`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncScope {
    Full,
    UploadsOnly,
}

/// What a completed sync did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub uploads_pushed: usize,
    pub records_pushed: usize,
    pub records_pulled: usize,
}

/// Shared-future result type: late joiners receive a clone of the one
/// in-flight outcome.
pub type SyncResult = std::result::Result<SyncOutcome, Arc<Error>>;

type InFlight = Shared<BoxFuture<'static, SyncResult>>;

struct EngineInner<T> {
    store: LocalStore,
    transport: Arc<T>,
    uploads_only: bool,
    state: Mutex<EngineState>,
}

#[derive(Default)]
struct EngineState {
    online: bool,
    signed_in: bool,
    in_flight: HashMap<SyncScope, InFlight>,
}

/// Sync orchestrator. Cheap to clone; clones share one single-flight map.
pub struct SyncEngine<T> {
    inner: Arc<EngineInner<T>>,
}

impl<T> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: SyncTransport> SyncEngine<T> {
    /// `uploads_only` restricts every sync this engine runs to pending
    /// media, regardless of requested scope.
    pub fn new(store: LocalStore, transport: Arc<T>, uploads_only: bool) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                transport,
                uploads_only,
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Feed a trigger event. Fires a sync when the event leaves the engine
    /// both online and authenticated; returns its result, or `None` when no
    /// sync was warranted.
    pub async fn handle_event(&self, event: AppEvent) -> Option<SyncResult> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match event {
                AppEvent::Startup { online, signed_in } => {
                    state.online = online;
                    state.signed_in = signed_in;
                }
                AppEvent::ConnectivityChanged { online } => state.online = online,
                AppEvent::AuthChanged { signed_in } => state.signed_in = signed_in,
            }
            if !(state.online && state.signed_in) {
                return None;
            }
        }
        let scope = if self.inner.uploads_only {
            SyncScope::UploadsOnly
        } else {
            SyncScope::Full
        };
        Some(self.sync(scope).await)
    }

    /// Run (or join) a sync of the given scope. At most one sync per scope is
    /// in flight; concurrent callers await the same attempt.
    pub async fn sync(&self, scope: SyncScope) -> SyncResult {
        let scope = if self.inner.uploads_only {
            SyncScope::UploadsOnly
        } else {
            scope
        };

        let fut = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(existing) = state.in_flight.get(&scope) {
                existing.clone()
            } else {
                let inner = self.inner.clone();
                let fut: InFlight = async move {
                    let result = run_sync(&inner.store, inner.transport.as_ref(), scope)
                        .await
                        .map_err(Arc::new);
                    inner.state.lock().unwrap().in_flight.remove(&scope);
                    match &result {
                        Ok(outcome) => info!(
                            ?scope,
                            uploads = outcome.uploads_pushed,
                            pushed = outcome.records_pushed,
                            pulled = outcome.records_pulled,
                            "Sync finished"
                        ),
                        Err(e) => warn!(?scope, error = %e, "Sync failed"),
                    }
                    result
                }
                .boxed()
                .shared();
                state.in_flight.insert(scope, fut.clone());
                fut
            }
        };

        fut.await
    }
}

/// One sync attempt. A failure aborts the attempt without touching local
/// state; already-pushed uploads stay removed (the remote write succeeded),
/// everything else re-attempts from current local state on the next trigger.
async fn run_sync<T: SyncTransport>(
    store: &LocalStore,
    transport: &T,
    scope: SyncScope,
) -> Result<SyncOutcome> {
    info!(?scope, "Sync started");
    let mut outcome = SyncOutcome::default();

    // Pending media first: both scopes move uploads.
    let uploads = store.list_uploads().await?;
    for upload in &uploads {
        transport.push_upload(upload).await?;
        // Removed only after the push succeeded; a crash between the two
        // re-pushes on the next sync (remote treats uploads as idempotent
        // by upload_id).
        match store.remove_upload(&upload.upload_id).await {
            Ok(()) => outcome.uploads_pushed += 1,
            // A concurrent sync of the other scope already cleared it; the
            // duplicate push was absorbed by upload_id idempotency.
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }

    if scope == SyncScope::Full {
        let local = store.list_all().await?;
        transport.push_records(&local).await?;
        outcome.records_pushed = local.len();

        let remote = transport.pull_records().await?;
        outcome.records_pulled = remote.len();
        store.replace_all(&remote).await?;
    }

    Ok(outcome)
}
