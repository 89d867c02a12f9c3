//! Cloud-security-posture adapters: AWS (Security Hub-shaped), Azure
//! (Defender-shaped), GCP (Security Command Center-shaped), and a
//! generic fallback for other whitelisted cloud platforms, all
//! implementing `Remediable`.

use crate::adapter::{Adapter, AdapterState, AdapterStateCell, Remediable, SyncFilter};
use crate::error::{classify_transport_error, AdapterError};
use crate::events::{AdapterEvent, EventSink, SyncCounts};
use crate::mapping::map_severity;
use async_trait::async_trait;
use chrono::Utc;
use fusion_common::error::{ErrorContext, FusionResult};
use fusion_common::events::{CloudSecurityFinding, ComplianceStatus};
use fusion_common::integration::{ConnectionConfig, SeverityMapping};
use std::time::Duration;

/// Shared shape for AWS Security Hub / Azure Defender for Cloud / GCP
/// Security Command Center / generic cloud posture tools: poll an
/// endpoint for findings, normalize severity and compliance status,
/// expose `apply_remediation` for action-dispatcher-triggered fixes.
/// The `platform` tag is the only structural difference, so one struct
/// parameterized by it covers the whole whitelist rather than four
/// near-identical copies.
pub struct CloudSecurityAdapter {
    integration_id: String,
    platform: &'static str,
    config: ConnectionConfig,
    severity_mapping: SeverityMapping,
    client: reqwest::Client,
    state: AdapterStateCell,
    sink: EventSink,
}

impl CloudSecurityAdapter {
    pub fn new(
        integration_id: String,
        platform: &'static str,
        config: ConnectionConfig,
        severity_mapping: SeverityMapping,
        sink: EventSink,
    ) -> Self {
        Self {
            integration_id,
            platform,
            config,
            severity_mapping,
            client: reqwest::Client::new(),
            state: AdapterStateCell::new(),
            sink,
        }
    }

    fn bearer_token(&self) -> String {
        self.config
            .credentials
            .get("token")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl Adapter for CloudSecurityAdapter {
    fn integration_id(&self) -> &str {
        &self.integration_id
    }

    fn tool_type(&self) -> &str {
        "cloud-security"
    }

    fn platform(&self) -> &str {
        self.platform
    }

    async fn connect(&self) -> FusionResult<()> {
        self.state.set(AdapterState::Connecting);
        let token = self.bearer_token();
        let result = self
            .client
            .get(format!("{}/findings?limit=1", self.config.endpoint))
            .bearer_auth(&token)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                self.state.set(AdapterState::Connected);
                let _ = self
                    .sink
                    .send(AdapterEvent::IntegrationConnected {
                        integration_id: self.integration_id.clone(),
                        at: Utc::now(),
                    })
                    .await;
                Ok(())
            }
            Ok(resp) => {
                self.state.set(AdapterState::Error);
                let err = crate::error::classify_http_status(resp.status().as_u16(), "connect failed")
                    .unwrap_or(AdapterError::IntegrationError { status: None, message: "connect failed".into() });
                Err(err.into_fusion_error(ErrorContext::new().with_integration(&self.integration_id)))
            }
            Err(e) => {
                self.state.set(AdapterState::Error);
                Err(classify_transport_error(&e).into_fusion_error(ErrorContext::new().with_integration(&self.integration_id)))
            }
        }
    }

    async fn test_connection(&self) -> bool {
        let token = self.bearer_token();
        self.client
            .get(format!("{}/findings?limit=1", self.config.endpoint))
            .bearer_auth(&token)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn sync(&self, filter: SyncFilter) -> FusionResult<()> {
        self.state.set(AdapterState::Syncing);
        let _ = self
            .sink
            .send(AdapterEvent::SyncStarted {
                integration_id: self.integration_id.clone(),
                filter: filter.clone(),
            })
            .await;

        let raw_findings = filter.get("findings").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let mut count = 0u64;
        for raw in raw_findings {
            let severity_label = raw.get("severity").and_then(|v| v.as_str()).unwrap_or("info");
            let compliant = raw.get("compliant").and_then(|v| v.as_bool()).unwrap_or(false);
            let finding = CloudSecurityFinding {
                id: uuid::Uuid::new_v4().to_string(),
                finding_id: raw.get("findingId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                platform: self.platform.to_string(),
                resource_type: raw.get("resourceType").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                resource_id: raw.get("resourceId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                region: raw.get("region").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                account_id: raw.get("accountId").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                compliance_status: if compliant {
                    ComplianceStatus::Compliant
                } else {
                    ComplianceStatus::NonCompliant
                },
                control_id: raw.get("controlId").and_then(|v| v.as_str()).map(str::to_string),
                threat_intelligence: raw.get("threatIntelligence").cloned(),
                remediation: raw.get("remediation").and_then(|v| v.as_str()).map(str::to_string),
                severity: map_severity(&self.severity_mapping, severity_label),
                status: "open".to_string(),
                workflow_status: "new".to_string(),
            };
            let _ = self
                .sink
                .send(AdapterEvent::FindingCreated {
                    integration_id: self.integration_id.clone(),
                    finding,
                })
                .await;
            count += 1;
        }

        self.state.set(AdapterState::Connected);
        let _ = self
            .sink
            .send(AdapterEvent::SyncCompleted {
                integration_id: self.integration_id.clone(),
                filter,
                counts: SyncCounts { events: 0, vulnerabilities: 0, findings: count },
            })
            .await;
        Ok(())
    }

    async fn disconnect(&self) -> FusionResult<()> {
        self.state.set(AdapterState::Idle);
        let _ = self
            .sink
            .send(AdapterEvent::IntegrationDisconnected {
                integration_id: self.integration_id.clone(),
                at: Utc::now(),
            })
            .await;
        Ok(())
    }

    fn status(&self) -> AdapterState {
        self.state.get()
    }
}

#[async_trait]
impl Remediable for CloudSecurityAdapter {
    async fn apply_remediation(&self, finding_id: &str) -> FusionResult<()> {
        let token = self.bearer_token();
        let result = self
            .client
            .post(format!("{}/findings/{finding_id}/remediate", self.config.endpoint))
            .bearer_auth(&token)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(crate::error::classify_http_status(resp.status().as_u16(), "remediation failed")
                .unwrap_or(AdapterError::IntegrationError { status: None, message: "remediation failed".into() })
                .into_fusion_error(ErrorContext::new().with_integration(&self.integration_id))),
            Err(e) => Err(classify_transport_error(&e).into_fusion_error(ErrorContext::new().with_integration(&self.integration_id))),
        }
    }
}
