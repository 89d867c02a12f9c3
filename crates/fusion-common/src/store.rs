//! Persistent store and side store contracts (spec §6).
//!
//! Real backends (a relational store, a keyed cache with TTL) are
//! out of scope; these traits pin down exactly the queries and
//! consistency the rest of the engine depends on, and the in-memory
//! implementations below back every test in this workspace.

use crate::events::{CloudSecurityFinding, NormalizedEvent, Ticket, TicketMapping, Vulnerability};
use crate::integration::Integration;
use crate::threat::UnifiedThreat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-day histogram bucket (posture aggregator, spec §4.6).
#[derive(Debug, Clone, serde::Serialize)]
pub struct DailyBucket {
    pub day: chrono::NaiveDate,
    pub count: u64,
    pub avg_value: f64,
}

/// Relational-store contract (spec §6). `read-your-writes` is required
/// on the integration CRUD path; the in-memory implementation below
/// trivially satisfies this since reads and writes share one map.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get_integration(&self, id: &str) -> Option<Integration>;
    async fn list_integrations(&self) -> Vec<Integration>;
    async fn put_integration(&self, integration: Integration);
    async fn delete_integration(&self, id: &str);

    async fn insert_event(&self, event: NormalizedEvent);
    async fn events_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NormalizedEvent>;

    async fn insert_vulnerability(&self, vuln: Vulnerability);
    async fn top_vulnerabilities(&self, limit: usize) -> Vec<Vulnerability>;

    async fn insert_finding(&self, finding: CloudSecurityFinding);
    async fn critical_active_findings(&self) -> Vec<CloudSecurityFinding>;

    async fn put_threat(&self, threat: UnifiedThreat);
    async fn get_threat(&self, id: &str) -> Option<UnifiedThreat>;
    async fn top_threats(&self, limit: usize) -> Vec<UnifiedThreat>;
    async fn all_threats(&self) -> Vec<UnifiedThreat>;

    async fn put_ticket(&self, ticket: Ticket);
    async fn get_ticket(&self, id: &str) -> Option<Ticket>;
    async fn put_ticket_mapping(&self, mapping: TicketMapping);
    async fn get_ticket_mapping(&self, ticket_id: &str) -> Option<TicketMapping>;

    /// Per-day histogram over the last 30 days: threats (count + avg
    /// risk score) and vulnerabilities (count + avg CVSS).
    async fn threat_histogram_30d(&self) -> Vec<DailyBucket>;
    async fn vulnerability_histogram_30d(&self) -> Vec<DailyBucket>;

    async fn count_by_type_status(&self, entity_type: &str, status: &str) -> u64;
}

/// Key-value side-store contract (spec §6): TTL-keyed, no ordered scans.
#[async_trait]
pub trait SideStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    /// Atomically set only if no live value exists for `key`; used for
    /// the sync-schedule lease (spec §4.3). Returns `true` if acquired.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool;
    async fn delete(&self, key: &str);
}

// ---------------------------------------------------------------------
// In-memory fakes used by every test in this workspace.
// ---------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryStore {
    integrations: DashMap<String, Integration>,
    events: DashMap<String, NormalizedEvent>,
    vulnerabilities: DashMap<String, Vulnerability>,
    findings: DashMap<String, CloudSecurityFinding>,
    threats: DashMap<String, UnifiedThreat>,
    tickets: DashMap<String, Ticket>,
    ticket_mappings: DashMap<String, TicketMapping>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn get_integration(&self, id: &str) -> Option<Integration> {
        self.integrations.get(id).map(|e| e.clone())
    }

    async fn list_integrations(&self) -> Vec<Integration> {
        let mut all: Vec<_> = self.integrations.iter().map(|e| e.clone()).collect();
        all.sort_by_key(|i| std::cmp::Reverse(i.created_at));
        all
    }

    async fn put_integration(&self, integration: Integration) {
        self.integrations.insert(integration.id.clone(), integration);
    }

    async fn delete_integration(&self, id: &str) {
        self.integrations.remove(id);
    }

    async fn insert_event(&self, event: NormalizedEvent) {
        self.events.insert(event.id.clone(), event);
    }

    async fn events_in_window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<NormalizedEvent> {
        self.events
            .iter()
            .filter(|e| e.timestamp >= start && e.timestamp <= end)
            .map(|e| e.clone())
            .collect()
    }

    async fn insert_vulnerability(&self, vuln: Vulnerability) {
        self.vulnerabilities.insert(vuln.id.clone(), vuln);
    }

    async fn top_vulnerabilities(&self, limit: usize) -> Vec<Vulnerability> {
        let mut all: Vec<_> = self.vulnerabilities.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.cvss_score.partial_cmp(&a.cvss_score).unwrap_or(std::cmp::Ordering::Equal))
        });
        all.truncate(limit);
        all
    }

    async fn insert_finding(&self, finding: CloudSecurityFinding) {
        self.findings.insert(finding.id.clone(), finding);
    }

    async fn critical_active_findings(&self) -> Vec<CloudSecurityFinding> {
        self.findings
            .iter()
            .filter(|f| f.severity == crate::severity::Severity::Critical && f.status != "resolved")
            .map(|f| f.clone())
            .collect()
    }

    async fn put_threat(&self, threat: UnifiedThreat) {
        self.threats.insert(threat.id.clone(), threat);
    }

    async fn get_threat(&self, id: &str) -> Option<UnifiedThreat> {
        self.threats.get(id).map(|e| e.clone())
    }

    async fn top_threats(&self, limit: usize) -> Vec<UnifiedThreat> {
        let mut all: Vec<_> = self.threats.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));
        all.truncate(limit);
        all
    }

    async fn all_threats(&self) -> Vec<UnifiedThreat> {
        self.threats.iter().map(|e| e.clone()).collect()
    }

    async fn put_ticket(&self, ticket: Ticket) {
        self.tickets.insert(ticket.id.clone(), ticket);
    }

    async fn get_ticket(&self, id: &str) -> Option<Ticket> {
        self.tickets.get(id).map(|e| e.clone())
    }

    async fn put_ticket_mapping(&self, mapping: TicketMapping) {
        self.ticket_mappings.insert(mapping.ticket_id.clone(), mapping);
    }

    async fn get_ticket_mapping(&self, ticket_id: &str) -> Option<TicketMapping> {
        self.ticket_mappings.get(ticket_id).map(|e| e.clone())
    }

    async fn threat_histogram_30d(&self) -> Vec<DailyBucket> {
        histogram_30d(self.threats.iter().map(|t| (t.first_seen, t.risk_score as f64)))
    }

    async fn vulnerability_histogram_30d(&self) -> Vec<DailyBucket> {
        histogram_30d(self.vulnerabilities.iter().map(|v| (v.first_seen, v.cvss_score)))
    }

    async fn count_by_type_status(&self, entity_type: &str, status: &str) -> u64 {
        match entity_type {
            "threat" => self
                .threats
                .iter()
                .filter(|t| format!("{:?}", t.status).to_lowercase() == status)
                .count() as u64,
            "vulnerability" => self
                .vulnerabilities
                .iter()
                .filter(|v| format!("{:?}", v.status).to_lowercase() == status)
                .count() as u64,
            _ => 0,
        }
    }
}

fn histogram_30d(items: impl Iterator<Item = (DateTime<Utc>, f64)>) -> Vec<DailyBucket> {
    let cutoff = Utc::now() - chrono::Duration::days(30);
    let mut buckets: HashMap<chrono::NaiveDate, (u64, f64)> = HashMap::new();
    for (ts, value) in items {
        if ts < cutoff {
            continue;
        }
        let day = ts.date_naive();
        let entry = buckets.entry(day).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += value;
    }
    let mut result: Vec<DailyBucket> = buckets
        .into_iter()
        .map(|(day, (count, sum))| DailyBucket {
            day,
            count,
            avg_value: if count > 0 { sum / count as f64 } else { 0.0 },
        })
        .collect();
    result.sort_by_key(|b| b.day);
    result
}

struct TtlEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemorySideStore {
    entries: DashMap<String, TtlEntry>,
}

impl InMemorySideStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn is_live(entry: &TtlEntry) -> bool {
        Instant::now() < entry.expires_at
    }
}

#[async_trait]
impl SideStore for InMemorySideStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).and_then(|e| {
            if Self::is_live(&e) {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            TtlEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> bool {
        // DashMap::entry gives us the atomic check-then-act this lease
        // needs without a separate lock.
        let mut acquired = false;
        self.entries
            .entry(key.to_string())
            .and_modify(|existing| {
                if !Self::is_live(existing) {
                    *existing = TtlEntry {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    };
                    acquired = true;
                }
            })
            .or_insert_with(|| {
                acquired = true;
                TtlEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                }
            });
        acquired
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_is_exclusive() {
        let store = InMemorySideStore::new();
        assert!(store.set_if_absent("k", b"a".to_vec(), Duration::from_secs(60)).await);
        assert!(!store.set_if_absent("k", b"b".to_vec(), Duration::from_secs(60)).await);
        assert_eq!(store.get("k").await, Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn expired_entry_is_reacquirable() {
        let store = InMemorySideStore::new();
        assert!(store.set_if_absent("k", b"a".to_vec(), Duration::from_millis(1)).await);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.set_if_absent("k", b"b".to_vec(), Duration::from_secs(60)).await);
    }
}
