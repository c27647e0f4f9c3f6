//! # TBT Client Library
//!
//! Field-device side of the TB triage portal: a local-first durable store,
//! an event-driven sync engine, and a cached identity resolver. Capture flows
//! write to the local store unconditionally; reconciliation with the remote
//! store happens opportunistically when connectivity and auth allow.

pub mod db;
pub mod events;
pub mod identity;
pub mod store;
pub mod sync;

pub use events::AppEvent;
pub use identity::{DirectoryLookup, IdentityResolver, LookupError};
pub use store::LocalStore;
pub use sync::{PushSummary, SyncEngine, SyncOutcome, SyncScope, SyncTransport};
