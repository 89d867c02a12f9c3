//! Posture Aggregator (spec §4.6): on-demand dashboard rollup over the
//! persistent store — no background task, no owned state beyond the
//! store handle.

use chrono::{DateTime, Utc};
use fusion_common::audit::IntegrationMetrics;
use fusion_common::events::CloudSecurityFinding;
use fusion_common::integration::{Integration, IntegrationStatus};
use fusion_common::store::{DailyBucket, PersistentStore, SideStore};
use fusion_common::threat::UnifiedThreat;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const PLATFORM_TOOL_TYPES: [&str; 4] = ["siem", "vulnerability-scanner", "cloud-security", "ticketing"];

#[derive(Debug, Clone, Serialize)]
pub struct IntegrationHealth {
    pub integration_id: String,
    pub status: IntegrationStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_errors: u64,
    /// `(now - lastSync) / 60s`; `None` if the integration has never synced.
    pub data_lag_minutes: Option<i64>,
    /// Percentage of attempted syncs that succeeded; 100 when no sync
    /// has been attempted yet (nothing to hold against it).
    pub availability: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub top_threats: Vec<UnifiedThreat>,
    pub top_vulnerabilities: Vec<fusion_common::events::Vulnerability>,
    pub critical_active_findings: Vec<CloudSecurityFinding>,
    pub threat_histogram_30d: Vec<DailyBucket>,
    pub vulnerability_histogram_30d: Vec<DailyBucket>,
    pub integration_health: Vec<IntegrationHealth>,
    pub tool_type_coverage: HashMap<String, u32>,
    pub overall_risk_score: u32,
}

pub struct Aggregator {
    store: Arc<dyn PersistentStore>,
    side_store: Arc<dyn SideStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn PersistentStore>, side_store: Arc<dyn SideStore>) -> Self {
        Self { store, side_store }
    }

    pub async fn dashboard(&self, top_n: usize) -> Dashboard {
        let top_threats = self.store.top_threats(top_n).await;
        let top_vulnerabilities = self.store.top_vulnerabilities(top_n).await;
        let critical_active_findings = self.store.critical_active_findings().await;
        let threat_histogram_30d = self.store.threat_histogram_30d().await;
        let vulnerability_histogram_30d = self.store.vulnerability_histogram_30d().await;

        let integrations = self.store.list_integrations().await;
        let mut integration_health = Vec::with_capacity(integrations.len());
        for integration in &integrations {
            integration_health.push(self.health_for(integration).await);
        }

        let tool_type_coverage = self.tool_type_coverage(&integrations);

        let critical_threats = top_threats.iter().filter(|t| t.severity == fusion_common::Severity::Critical).count();
        let overall_risk_score = self.overall_risk_score(critical_threats, critical_active_findings.len(), &tool_type_coverage);

        Dashboard {
            top_threats,
            top_vulnerabilities,
            critical_active_findings,
            threat_histogram_30d,
            vulnerability_histogram_30d,
            integration_health,
            tool_type_coverage,
            overall_risk_score,
        }
    }

    async fn health_for(&self, integration: &Integration) -> IntegrationHealth {
        let key = format!("integration-metrics:{}", integration.id);
        let metrics: IntegrationMetrics = self
            .side_store
            .get(&key)
            .await
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();

        let data_lag_minutes = integration.last_sync.map(|last| (Utc::now() - last).num_seconds() / 60);

        let availability = if metrics.syncs_attempted == 0 {
            100
        } else {
            ((metrics.syncs_succeeded as f64 / metrics.syncs_attempted as f64) * 100.0).round() as u32
        };

        IntegrationHealth {
            integration_id: integration.id.clone(),
            status: integration.status,
            last_sync: integration.last_sync,
            sync_errors: metrics.syncs_failed,
            data_lag_minutes,
            availability,
        }
    }

    /// 100 if at least one connected integration of the tool type
    /// exists, else 0 (spec §4.6).
    fn tool_type_coverage(&self, integrations: &[Integration]) -> HashMap<String, u32> {
        PLATFORM_TOOL_TYPES
            .iter()
            .map(|tool_type| {
                let covered = integrations
                    .iter()
                    .any(|i| i.tool_type == *tool_type && i.status == IntegrationStatus::Connected);
                (tool_type.to_string(), if covered { 100 } else { 0 })
            })
            .collect()
    }

    /// Bounded additive combination of the dashboard's own signals
    /// (spec §4.6 leaves the exact weights open): active critical
    /// threats and critical findings push the score up, tool-type gaps
    /// push it up further, the whole thing clamped to 100.
    fn overall_risk_score(&self, critical_threats: usize, critical_findings: usize, coverage: &HashMap<String, u32>) -> u32 {
        let coverage_gap = coverage.values().filter(|v| **v == 0).count() as u32;
        let score = critical_threats as u32 * 15 + critical_findings as u32 * 10 + coverage_gap * 5;
        score.min(100)
    }
}
