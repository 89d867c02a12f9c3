//! Integration record (spec §3) — identity, connection config, sync
//! policy, mapping rules, and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    ApiKey,
    Oauth2,
    Basic,
    Token,
    Certificate,
}

/// Connection config. `credentials` is an opaque, already-encrypted blob
/// once it reaches the registry — plaintext secrets only ever exist
/// inside `fusion-vault` and the adapter that decrypted them for a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub auth_type: AuthType,
    pub credentials: Value,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub ssl_verify: bool,
    pub proxy: Option<String>,
    pub custom_headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Inbound,
    Outbound,
    Bidirectional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub enabled: bool,
    pub direction: SyncDirection,
    /// Clamped to `[5, 1440]` by `Integration::new`/`set_sync_policy`.
    pub interval_minutes: u32,
    pub filter: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub target_field: String,
    pub transform: FieldTransform,
    pub required: bool,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldTransform {
    Direct,
    Uppercase,
    Lowercase,
    Date,
    Custom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeverityMapping {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
    pub info: Vec<String>,
}

bitflags::bitflags! {
    #[derive(Serialize, Deserialize)]
    pub struct Features: u32 {
        const SYNC           = 0b0000_0001;
        const TICKETING      = 0b0000_0010;
        const SCANNING       = 0b0000_0100;
        const SIEM_SEARCH    = 0b0000_1000;
        const REMEDIATION    = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Configuring,
    Connected,
    Disconnected,
    Error,
    Testing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    pub name: String,
    pub tool_type: String,
    pub platform: String,
    pub connection_config: ConnectionConfig,
    pub sync_policy: SyncPolicy,
    pub field_mappings: Vec<FieldMapping>,
    pub severity_mapping: SeverityMapping,
    pub features: Features,
    pub status: IntegrationStatus,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Integration {
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    pub fn clamp_interval(minutes: u32) -> u32 {
        minutes.clamp(5, 1440)
    }
}

/// Platform whitelist enforced server-side (spec §4.2).
pub fn supported_platforms(tool_type: &str) -> &'static [&'static str] {
    match tool_type {
        "siem" => &["splunk", "qradar", "elastic", "sentinel", "chronicle", "sumologic", "custom"],
        "vulnerability-scanner" => &["nessus", "qualys", "rapid7", "openvas", "acunetix", "burp", "custom"],
        "cloud-security" => &["aws", "azure", "gcp", "alibaba", "oracle", "ibm"],
        "ticketing" => &["jira", "servicenow", "remedy", "zendesk", "freshservice", "custom"],
        _ => &[],
    }
}

pub fn is_supported(tool_type: &str, platform: &str) -> bool {
    supported_platforms(tool_type).contains(&platform)
}
