//! UnifiedThreat and CorrelationRule (spec §3).

use crate::severity::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreatStatus {
    Active,
    Investigating,
    Contained,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatSource {
    pub tool_type: String,
    pub integration_id: String,
    pub source_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub factor: String,
    pub weight: u32,
    pub description: String,
}

/// Correlation-engine output. Invariants (spec §3, P4):
/// `first_seen <= last_seen`, `event_count == sources.len()` at creation
/// (may grow on dedup merge), `0 <= risk_score <= 100`,
/// `0 <= confidence <= 100`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedThreat {
    pub id: String,
    pub correlation_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: u32,
    pub sources: Vec<ThreatSource>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub event_count: u64,
    pub affected_assets: Vec<String>,
    pub affected_users: Vec<String>,
    pub status: ThreatStatus,
    pub evidence: Vec<String>,
    pub risk_score: u32,
    pub risk_factors: Vec<RiskFactor>,
}

impl UnifiedThreat {
    /// Validate the invariants spec §3 requires of every threat. Callers
    /// construct via `CorrelationEngine::synthesize`, which always
    /// upholds these; this is the property-test hook (P4).
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.first_seen > self.last_seen {
            return Err("firstSeen must be <= lastSeen".into());
        }
        if self.event_count == 0 {
            return Err("eventCount must be >= 1".into());
        }
        if self.risk_score > 100 {
            return Err("riskScore must be <= 100".into());
        }
        if self.confidence > 100 {
            return Err("confidence must be <= 100".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
    #[serde(default)]
    pub case_insensitive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Unique,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HavingClause {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregation {
    pub field: String,
    pub function: AggregationFunction,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub having: Option<HavingClause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    CreateThreat,
    UpdateThreat,
    CreateTicket,
    SendAlert,
    ExecutePlaybook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAction {
    pub action_type: ActionType,
    #[serde(default)]
    pub parameters: std::collections::HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub source_types: Vec<String>,
    pub conditions: Vec<RuleCondition>,
    pub aggregations: Vec<Aggregation>,
    pub severity: Severity,
    #[serde(default)]
    pub tags: Vec<String>,
    pub actions: Vec<RuleAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationEngineConfig {
    pub correlation_window_minutes: u32,
    pub lookback_minutes: u32,
    pub deduplication_enabled: bool,
    pub deduplication_fields: Vec<String>,
    pub enrichment_sources: Vec<String>,
    pub output_format: String,
    pub output_destinations: Vec<String>,
}

impl CorrelationEngineConfig {
    pub fn new(correlation_window_minutes: u32) -> Self {
        Self {
            correlation_window_minutes,
            lookback_minutes: correlation_window_minutes * 2,
            deduplication_enabled: true,
            deduplication_fields: vec!["title".into(), "severity".into()],
            enrichment_sources: Vec::new(),
            output_format: "json".into(),
            output_destinations: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_threat() -> UnifiedThreat {
        let now = Utc::now();
        UnifiedThreat {
            id: "t1".into(),
            correlation_id: "rule-1".into(),
            title: "x".into(),
            description: "y".into(),
            severity: Severity::High,
            confidence: 50,
            sources: vec![],
            first_seen: now,
            last_seen: now,
            event_count: 1,
            affected_assets: vec![],
            affected_users: vec![],
            status: ThreatStatus::Active,
            evidence: vec![],
            risk_score: 10,
            risk_factors: vec![],
        }
    }

    #[test]
    fn invariants_reject_out_of_order_timestamps() {
        let mut t = sample_threat();
        t.last_seen = t.first_seen - Duration::seconds(1);
        assert!(t.check_invariants().is_err());
    }

    #[test]
    fn invariants_accept_well_formed_threat() {
        assert!(sample_threat().check_invariants().is_ok());
    }

    proptest::proptest! {
        /// P4: any threat built with `lastSeen >= firstSeen`, at least
        /// one source, and scores in `[0, 100]` passes invariant checks.
        #[test]
        fn p4_well_formed_threats_always_pass(
            gap_secs in 0i64..86_400,
            event_count in 1u64..1000,
            risk_score in 0u32..=100,
            confidence in 0u32..=100,
        ) {
            let mut t = sample_threat();
            t.last_seen = t.first_seen + Duration::seconds(gap_secs);
            t.event_count = event_count;
            t.risk_score = risk_score;
            t.confidence = confidence;
            proptest::prop_assert!(t.check_invariants().is_ok());
        }

        /// P4: swapping firstSeen/lastSeen past each other is always
        /// rejected.
        #[test]
        fn p4_out_of_order_timestamps_always_rejected(gap_secs in 1i64..86_400) {
            let mut t = sample_threat();
            t.last_seen = t.first_seen - Duration::seconds(gap_secs);
            proptest::prop_assert!(t.check_invariants().is_err());
        }
    }
}
