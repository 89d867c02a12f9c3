//! Domain events emitted by adapters (spec §6 "Adapter boundary").
//!
//! The source system wires siblings via an in-process emitter with
//! probed listeners; we replace that with a typed channel each adapter
//! is handed at construction (REDESIGN FLAGS, spec §9) — no global
//! emitter, no listener leaks.

use chrono::{DateTime, Utc};
use fusion_common::events::{CloudSecurityFinding, NormalizedEvent, Vulnerability};
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SyncCounts {
    pub events: u64,
    pub vulnerabilities: u64,
    pub findings: u64,
}

#[derive(Debug, Clone)]
pub enum AdapterEvent {
    IntegrationConnected {
        integration_id: String,
        at: DateTime<Utc>,
    },
    IntegrationDisconnected {
        integration_id: String,
        at: DateTime<Utc>,
    },
    IntegrationError {
        integration_id: String,
        at: DateTime<Utc>,
        details: String,
    },
    SyncStarted {
        integration_id: String,
        filter: Value,
    },
    SyncCompleted {
        integration_id: String,
        filter: Value,
        counts: SyncCounts,
    },
    SyncFailed {
        integration_id: String,
        filter: Value,
        details: String,
    },
    ThreatDetected {
        integration_id: String,
        event: NormalizedEvent,
    },
    VulnerabilityDiscovered {
        integration_id: String,
        vulnerability: Vulnerability,
    },
    FindingCreated {
        integration_id: String,
        finding: CloudSecurityFinding,
    },
    TicketCreated {
        integration_id: String,
        ticket_id: String,
        external_id: String,
    },
    TicketUpdated {
        integration_id: String,
        ticket_id: String,
    },
    TicketSynced {
        integration_id: String,
        ticket_id: String,
    },
}

pub type EventSink = mpsc::Sender<AdapterEvent>;

/// Creates a bounded channel pair for adapter event emission; the
/// receiver end is owned by whatever subsystem subscribes (the
/// correlation engine's ingestion path, metrics, or a test harness).
pub fn event_channel(capacity: usize) -> (EventSink, mpsc::Receiver<AdapterEvent>) {
    mpsc::channel(capacity)
}
