//! Audit trail and per-integration/tool-type metrics snapshots.
//!
//! Not named in spec.md directly, but implied by any production-grade
//! registry/vault: who changed an integration's config and when, and
//! the counters a posture dashboard or an on-call engineer needs to
//! tell "syncing fine" from "silently failing." Side-store keyed the
//! same way spec.md §6 keys its other side-store entries
//! (`sync-schedule:<id>`): `integration-metrics:<id>`, `tool-metrics:<type>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    IntegrationCreated,
    IntegrationUpdated,
    IntegrationDeleted,
    CredentialsRotated,
    AdapterSwapped,
}

/// One append-only audit entry. Appended, never overwritten or deleted,
/// by the Registry (integration CRUD) and the Vault (credential
/// rotation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub integration_id: String,
    pub action: AuditAction,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(integration_id: impl Into<String>, action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            integration_id: integration_id.into(),
            action,
            actor: actor.into(),
            at: Utc::now(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(crate::error::redact::redact_str(&detail.into()));
        self
    }
}

/// Per-integration counters, persisted at `integration-metrics:<id>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrationMetrics {
    pub syncs_attempted: u64,
    pub syncs_succeeded: u64,
    pub syncs_failed: u64,
    pub events_processed: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

impl IntegrationMetrics {
    pub fn record_success(&mut self, events: u64) {
        self.syncs_attempted += 1;
        self.syncs_succeeded += 1;
        self.events_processed += events;
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.syncs_attempted += 1;
        self.syncs_failed += 1;
        self.last_error = Some(crate::error::redact::redact_str(&error.into()));
        self.last_error_at = Some(Utc::now());
    }
}

/// Per-tool-type rollup, persisted at `tool-metrics:<tool_type>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMetrics {
    pub connected_integrations: u64,
    pub total_integrations: u64,
    pub events_processed: u64,
}
