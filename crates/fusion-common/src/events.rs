//! Source-agnostic entities produced by the adapter normalization
//! pipeline (spec §3): Normalized Event, Vulnerability,
//! CloudSecurityFinding, Ticket.

use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventStatus {
    New,
    InProgress,
    Resolved,
}

/// Source-agnostic record emitted by every adapter after normalization.
///
/// Invariant: `severity` is always canonical post-mapping (P1); the
/// adapter layer never constructs one with a raw vendor label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source_type: String,
    pub source_integration_id: String,
    pub event_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub source_ip: Option<String>,
    pub dest_ip: Option<String>,
    pub user: Option<String>,
    pub host: Option<String>,
    pub protocol: Option<String>,
    pub tags: Vec<String>,
    pub raw_payload: Value,
    pub status: EventStatus,
    /// Extra fields the Field Mapper may have written; read by
    /// correlation conditions that reference a dotted path not modeled
    /// as a first-class field above (e.g. `assetCriticality`,
    /// `exploitAvailable`, `assetId`).
    pub attributes: HashMap<String, Value>,
}

impl NormalizedEvent {
    /// Dotted-path read used by the Field Mapper and the correlation
    /// condition evaluator. Supports the first-class fields by name and
    /// falls through to `attributes` for everything else.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        match path {
            "id" => Some(Value::String(self.id.clone())),
            "timestamp" => Some(Value::String(self.timestamp.to_rfc3339())),
            "sourceType" | "source_type" => Some(Value::String(self.source_type.clone())),
            "sourceIntegrationId" => Some(Value::String(self.source_integration_id.clone())),
            "eventType" | "event_type" => Some(Value::String(self.event_type.clone())),
            "severity" => Some(Value::String(self.severity.as_str().to_string())),
            "title" => Some(Value::String(self.title.clone())),
            "description" => Some(Value::String(self.description.clone())),
            "category" => Some(Value::String(self.category.clone())),
            "subcategory" => self.subcategory.clone().map(Value::String),
            "sourceIP" | "source_ip" => self.source_ip.clone().map(Value::String),
            "destIP" | "dest_ip" => self.dest_ip.clone().map(Value::String),
            "user" => self.user.clone().map(Value::String),
            "host" => self.host.clone().map(Value::String),
            "protocol" => self.protocol.clone().map(Value::String),
            _ => self.attributes.get(path).cloned().or_else(|| {
                // allow nested dotted lookups within attributes, e.g.
                // "raw.field" falling back to rawPayload.
                dotted_lookup(&self.raw_payload, path)
            }),
        }
    }
}

/// Walk a JSON value using a dotted path, creating no intermediate state.
pub fn dotted_lookup(root: &Value, path: &str) -> Option<Value> {
    let mut current = root;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current.clone())
}

/// Write a JSON value at a dotted path, creating intermediate objects as
/// needed (Field Mapper target-write semantics, spec §4.1 step 3).
pub fn dotted_write(root: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for (i, part) in parts.iter().enumerate() {
        if i == parts.len() - 1 {
            if !current.is_object() {
                *current = Value::Object(Default::default());
            }
            current
                .as_object_mut()
                .expect("just coerced to object")
                .insert(part.to_string(), value);
            return;
        }
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let obj = current.as_object_mut().expect("just coerced to object");
        current = obj
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VulnerabilityStatus {
    Open,
    Mitigated,
    Accepted,
    FalsePositive,
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub scanner_vuln_id: String,
    pub cve: Option<String>,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub cvss_score: f64,
    pub exploit_available: bool,
    pub affected_assets: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub scan_id: Option<String>,
    pub risk_score: f64,
    pub status: VulnerabilityStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    NotApplicable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSecurityFinding {
    pub id: String,
    pub finding_id: String,
    pub platform: String,
    pub resource_type: String,
    pub resource_id: String,
    pub region: String,
    pub account_id: String,
    pub compliance_status: ComplianceStatus,
    pub control_id: Option<String>,
    pub threat_intelligence: Option<Value>,
    pub remediation: Option<String>,
    pub severity: Severity,
    pub status: String,
    pub workflow_status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlaStatus {
    OnTrack,
    AtRisk,
    Breached,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub external_id: String,
    pub platform: String,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub severity: Severity,
    pub assignee: Option<String>,
    pub reporter: String,
    pub status: String,
    pub linked_threats: Vec<String>,
    pub linked_vulnerabilities: Vec<String>,
    pub linked_findings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sla_status: SlaStatus,
    pub time_to_resolution_minutes: Option<i64>,
}

/// Persisted linkage between a created ticket and the entity that
/// triggered it (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMapping {
    pub ticket_id: String,
    pub external_id: String,
    pub integration_id: String,
    pub threat_id: Option<String>,
    pub vulnerability_id: Option<String>,
    pub finding_id: Option<String>,
}
