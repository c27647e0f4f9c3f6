//! Application events that drive sync scheduling

use serde::{Deserialize, Serialize};

/// Events from independent sources (initial load, connectivity listener,
/// auth listener). Several may arrive together for one underlying change;
/// the sync engine coalesces the resulting sync attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AppEvent {
    /// Application start with the initial connectivity and auth state
    Startup { online: bool, signed_in: bool },
    /// Connectivity transition
    ConnectivityChanged { online: bool },
    /// Authentication established or lost
    AuthChanged { signed_in: bool },
}
