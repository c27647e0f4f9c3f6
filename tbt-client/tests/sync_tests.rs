//! SyncEngine orchestration: single-flight coalescing, scope restriction,
//! and failure behavior.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tbt_client::db;
use tbt_client::store::LocalStore;
use tbt_client::sync::{PushSummary, SyncEngine, SyncScope, SyncTransport};
use tbt_client::AppEvent;
use tbt_common::models::{CapturerRole, Demographics, MediaKind};
use tbt_common::{Error, PatientRecord, Result, UploadRecord, SENTINEL_PATIENT_ID};
use tokio::sync::Semaphore;

fn patient(id: &str) -> PatientRecord {
    PatientRecord {
        patient_id: id.to_string(),
        demographics: Demographics {
            name: id.to_string(),
            age: 30,
            gender: "M".into(),
            phone: "9".into(),
            village: "V".into(),
            national_id_last4: None,
        },
        vitals: None,
        clinical: None,
        audio: vec![],
        ai: None,
        status: None,
        created_at: Utc::now(),
        collection_date: Utc::now(),
        synced_at: None,
        extra: serde_json::Map::new(),
    }
}

fn upload(id: &str) -> UploadRecord {
    UploadRecord {
        upload_id: id.to_string(),
        patient_id: SENTINEL_PATIENT_ID.to_string(),
        role: CapturerRole::LabTech,
        kind: MediaKind::Report,
        file_name: format!("{id}.pdf"),
        mime_type: "application/pdf".into(),
        payload: vec![1, 2, 3],
        created_at: Utc::now(),
    }
}

/// Transport double with call counters, an optional entry gate on
/// `push_records`, and a failure switch on `push_upload`.
struct MockTransport {
    push_records_calls: AtomicUsize,
    push_upload_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    push_records_entered: AtomicUsize,
    push_upload_entered: AtomicUsize,
    gate: Semaphore,
    gated: bool,
    gate_uploads: bool,
    fail_uploads: bool,
    remote: Vec<PatientRecord>,
}

impl MockTransport {
    fn new() -> Self {
        Self {
            push_records_calls: AtomicUsize::new(0),
            push_upload_calls: AtomicUsize::new(0),
            pull_calls: AtomicUsize::new(0),
            push_records_entered: AtomicUsize::new(0),
            push_upload_entered: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            gated: false,
            gate_uploads: false,
            fail_uploads: false,
            remote: vec![],
        }
    }

    fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    fn gated_uploads() -> Self {
        Self {
            gate_uploads: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl SyncTransport for MockTransport {
    async fn push_records(&self, records: &[PatientRecord]) -> Result<PushSummary> {
        self.push_records_entered.fetch_add(1, Ordering::SeqCst);
        if self.gated {
            let _permit = self.gate.acquire().await.expect("gate closed");
        }
        self.push_records_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PushSummary {
            created: records.len(),
            updated: 0,
        })
    }

    async fn push_upload(&self, _upload: &UploadRecord) -> Result<()> {
        self.push_upload_entered.fetch_add(1, Ordering::SeqCst);
        if self.gate_uploads {
            let _permit = self.gate.acquire().await.expect("gate closed");
        }
        if self.fail_uploads {
            return Err(Error::Transport("media endpoint unreachable".into()));
        }
        self.push_upload_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn pull_records(&self) -> Result<Vec<PatientRecord>> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.remote.clone())
    }
}

async fn memory_store() -> LocalStore {
    LocalStore::new(db::init_memory().await.unwrap())
}

#[tokio::test]
async fn overlapping_syncs_share_one_in_flight_operation() {
    let store = memory_store().await;
    let transport = Arc::new(MockTransport::gated());
    let engine = SyncEngine::new(store, transport.clone(), false);

    let first = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync(SyncScope::Full).await })
    };

    // Wait until the first sync is inside the transport
    while transport.push_records_entered.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let second = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync(SyncScope::Full).await })
    };
    // Let the second task reach the single-flight map before releasing
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    transport.gate.add_permits(1);

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a, b);

    // One network round, not two
    assert_eq!(transport.push_records_calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.pull_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sync_after_completion_starts_a_fresh_operation() {
    let store = memory_store().await;
    let transport = Arc::new(MockTransport::new());
    let engine = SyncEngine::new(store, transport.clone(), false);

    engine.sync(SyncScope::Full).await.unwrap();
    engine.sync(SyncScope::Full).await.unwrap();

    assert_eq!(transport.push_records_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn full_sync_replaces_local_with_pulled_remote() {
    let store = memory_store().await;
    store.upsert(&patient("local-only")).await.unwrap();

    let mut transport = MockTransport::new();
    transport.remote = vec![patient("remote-1"), patient("remote-2")];
    let engine = SyncEngine::new(store.clone(), Arc::new(transport), false);

    let outcome = engine.sync(SyncScope::Full).await.unwrap();
    assert_eq!(outcome.records_pushed, 1);
    assert_eq!(outcome.records_pulled, 2);

    let ids: Vec<String> = store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.patient_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"remote-1".to_string()));
}

#[tokio::test]
async fn uploads_only_engine_never_moves_patient_datasets() {
    let store = memory_store().await;
    store.add_upload(&upload("u1")).await.unwrap();

    let transport = Arc::new(MockTransport::new());
    let engine = SyncEngine::new(store.clone(), transport.clone(), true);

    let outcome = engine
        .handle_event(AppEvent::Startup {
            online: true,
            signed_in: true,
        })
        .await
        .expect("startup while online+authed should sync")
        .unwrap();

    assert_eq!(outcome.uploads_pushed, 1);
    assert_eq!(transport.push_records_calls.load(Ordering::SeqCst), 0);
    assert_eq!(transport.pull_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count_uploads().await.unwrap(), 0);
}

#[tokio::test]
async fn events_without_connectivity_or_auth_do_not_sync() {
    let store = memory_store().await;
    let transport = Arc::new(MockTransport::new());
    let engine = SyncEngine::new(store, transport.clone(), false);

    assert!(engine
        .handle_event(AppEvent::Startup {
            online: false,
            signed_in: true
        })
        .await
        .is_none());
    assert!(engine
        .handle_event(AppEvent::AuthChanged { signed_in: false })
        .await
        .is_none());

    // Coming online while signed out still must not sync
    assert!(engine
        .handle_event(AppEvent::ConnectivityChanged { online: true })
        .await
        .is_none());

    // Auth arriving while online fires the sync
    assert!(engine
        .handle_event(AppEvent::AuthChanged { signed_in: true })
        .await
        .is_some());
    assert_eq!(transport.push_records_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn overlapping_syncs_of_different_scopes_both_complete() {
    let store = memory_store().await;
    store.add_upload(&upload("u1")).await.unwrap();

    let transport = Arc::new(MockTransport::gated_uploads());
    let engine = SyncEngine::new(store.clone(), transport.clone(), false);

    // Hold both scopes inside the upload push so each has listed the same
    // pending upload before either removes it
    let full = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync(SyncScope::Full).await })
    };
    while transport.push_upload_entered.load(Ordering::SeqCst) < 1 {
        tokio::task::yield_now().await;
    }

    let uploads_only = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.sync(SyncScope::UploadsOnly).await })
    };
    while transport.push_upload_entered.load(Ordering::SeqCst) < 2 {
        tokio::task::yield_now().await;
    }

    transport.gate.add_permits(2);

    // Whichever sync removes the upload second finds it gone; neither
    // attempt aborts over it
    let full = full.await.unwrap();
    let uploads_only = uploads_only.await.unwrap();
    assert!(full.is_ok(), "full sync aborted: {:?}", full.err());
    assert!(
        uploads_only.is_ok(),
        "uploads-only sync aborted: {:?}",
        uploads_only.err()
    );
    assert_eq!(store.count_uploads().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_upload_push_leaves_the_upload_queued() {
    let store = memory_store().await;
    store.add_upload(&upload("u1")).await.unwrap();

    let mut transport = MockTransport::new();
    transport.fail_uploads = true;
    let engine = SyncEngine::new(store.clone(), Arc::new(transport), false);

    let result = engine.sync(SyncScope::Full).await;
    assert!(result.is_err());

    // Local durability over remote consistency: nothing was lost
    assert_eq!(store.count_uploads().await.unwrap(), 1);
}
