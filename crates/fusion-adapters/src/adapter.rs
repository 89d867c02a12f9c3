//! The uniform Adapter contract (spec §4.1) plus the additive
//! capability traits concrete adapters opt into.
//!
//! REDESIGN FLAGS (spec §9): the source dispatches dynamically by
//! probing for optional methods on a subclass. We replace that with a
//! closed `Adapter` interface for the universal lifecycle plus
//! capability-specific interfaces (`Scannable`, `Ticketable`,
//! `SiemSearchable`, `Remediable`) that concrete adapters implement;
//! since the (type, platform) matrix is closed (spec §4.2 whitelist),
//! capability lookup is a match on a `ConcreteAdapter` enum rather than
//! a trait-object downcast.

use async_trait::async_trait;
use fusion_common::error::FusionResult;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    Connecting,
    Connected,
    Syncing,
    Error,
    Disconnecting,
}

impl AdapterState {
    fn as_u8(self) -> u8 {
        match self {
            AdapterState::Idle => 0,
            AdapterState::Connecting => 1,
            AdapterState::Connected => 2,
            AdapterState::Syncing => 3,
            AdapterState::Error => 4,
            AdapterState::Disconnecting => 5,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => AdapterState::Idle,
            1 => AdapterState::Connecting,
            2 => AdapterState::Connected,
            3 => AdapterState::Syncing,
            4 => AdapterState::Error,
            _ => AdapterState::Disconnecting,
        }
    }
}

/// Atomic holder for the adapter state machine (spec §4.1
/// `idle -> connecting -> connected -> syncing -> connected | error ->
/// disconnecting -> idle`). Transition methods enforce nothing beyond
/// recording the new state — callers drive the sequence; this type just
/// makes the current state observable without locking.
pub struct AdapterStateCell(AtomicU8);

impl AdapterStateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(AdapterState::Idle.as_u8()))
    }

    pub fn get(&self) -> AdapterState {
        AdapterState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: AdapterState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

impl Default for AdapterStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque filter passed through to `Adapter::sync`; concrete adapters
/// interpret the fields relevant to their vendor (`timeRange`, query
/// strings, tag filters, ...).
pub type SyncFilter = Value;

/// Universal adapter lifecycle (spec §4.1). Every concrete adapter,
/// regardless of vendor, implements this.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn integration_id(&self) -> &str;
    fn tool_type(&self) -> &str;
    fn platform(&self) -> &str;

    async fn connect(&self) -> FusionResult<()>;
    async fn test_connection(&self) -> bool;
    async fn sync(&self, filter: SyncFilter) -> FusionResult<()>;
    async fn disconnect(&self) -> FusionResult<()>;
    fn status(&self) -> AdapterState;
}

/// Vulnerability-scanner-specific primitives (spec §4.1).
#[async_trait]
pub trait Scannable: Send + Sync {
    async fn create_scan(&self, target: &str) -> FusionResult<String>;
    async fn launch_scan(&self, scan_id: &str) -> FusionResult<()>;
    async fn get_scan_status(&self, scan_id: &str) -> FusionResult<String>;
    async fn export_scan(&self, scan_id: &str) -> FusionResult<Value>;
}

/// Ticketing-specific primitives (spec §4.1, §4.5).
#[async_trait]
pub trait Ticketable: Send + Sync {
    async fn create_ticket(&self, title: &str, description: &str, priority: &str) -> FusionResult<(String, String)>;
    async fn update_ticket(&self, external_id: &str, fields: Value) -> FusionResult<()>;
    async fn add_comment(&self, external_id: &str, comment: &str) -> FusionResult<()>;
    async fn transition_ticket(&self, external_id: &str, status: &str) -> FusionResult<()>;
    async fn link_tickets(&self, from_external_id: &str, to_external_id: &str) -> FusionResult<()>;
}

/// SIEM query primitives.
#[async_trait]
pub trait SiemSearchable: Send + Sync {
    async fn search(&self, query: &str, start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> FusionResult<Vec<Value>>;
}

/// Remediation primitives for cloud-security adapters.
#[async_trait]
pub trait Remediable: Send + Sync {
    async fn apply_remediation(&self, finding_id: &str) -> FusionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_cell_round_trips_every_variant() {
        let cell = AdapterStateCell::new();
        for state in [
            AdapterState::Idle,
            AdapterState::Connecting,
            AdapterState::Connected,
            AdapterState::Syncing,
            AdapterState::Error,
            AdapterState::Disconnecting,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
