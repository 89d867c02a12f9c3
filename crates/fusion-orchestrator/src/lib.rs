//! Sync Orchestrator (spec §4.3): bounded worker pool, per-integration
//! serialization, lease-based scheduling against the side store.

pub mod error;

use dashmap::DashSet;
use error::OrchestratorError;
use fusion_common::audit::IntegrationMetrics;
use fusion_common::integration::IntegrationStatus;
use fusion_common::store::{PersistentStore, SideStore};
use fusion_registry::Registry;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SyncJob {
    pub integration_id: String,
    pub filter: Value,
}

fn schedule_key(id: &str) -> String {
    format!("sync-schedule:{id}")
}

fn metrics_key(id: &str) -> String {
    format!("integration-metrics:{id}")
}

pub struct Orchestrator {
    registry: Arc<Registry>,
    store: Arc<dyn PersistentStore>,
    side_store: Arc<dyn SideStore>,
    job_tx: tokio::sync::mpsc::Sender<SyncJob>,
    job_rx: tokio::sync::Mutex<tokio::sync::mpsc::Receiver<SyncJob>>,
    in_flight: Arc<DashSet<String>>,
    semaphore: Arc<tokio::sync::Semaphore>,
    shutdown: CancellationToken,
    drain_deadline: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<Registry>,
        store: Arc<dyn PersistentStore>,
        side_store: Arc<dyn SideStore>,
        max_concurrent_syncs: usize,
        queue_capacity: usize,
        drain_deadline: Duration,
    ) -> Arc<Self> {
        let (job_tx, job_rx) = tokio::sync::mpsc::channel(queue_capacity);
        Arc::new(Self {
            registry,
            store,
            side_store,
            job_tx,
            job_rx: tokio::sync::Mutex::new(job_rx),
            in_flight: Arc::new(DashSet::new()),
            semaphore: Arc::new(tokio::sync::Semaphore::new(max_concurrent_syncs)),
            shutdown: CancellationToken::new(),
            drain_deadline,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Enqueues a sync job. Per-integration dedup (spec §4.3
    /// "Ordering"): a second request for an already-running integration
    /// is a silent no-op rather than an error, matching "the
    /// orchestrator will not enqueue a second job for an integration
    /// already running."
    pub async fn enqueue(&self, job: SyncJob) -> Result<(), OrchestratorError> {
        if self.shutdown.is_cancelled() {
            return Err(OrchestratorError::ShuttingDown);
        }
        if !self.in_flight.insert(job.integration_id.clone()) {
            tracing::debug!(integration_id = %job.integration_id, "sync already in flight, dropping duplicate request");
            return Ok(());
        }
        match self.job_tx.try_send(job.clone()) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.in_flight.remove(&job.integration_id);
                Err(OrchestratorError::SyncQueueFull)
            }
        }
    }

    /// Spawns `max_concurrent_syncs` workers pulling from the shared job
    /// queue. Each worker blocks on the semaphore permit so the pool
    /// width is enforced even if a worker task count is changed later.
    pub fn spawn_workers(self: &Arc<Self>, count: usize) {
        for _ in 0..count {
            let this = self.clone();
            tokio::spawn(async move { this.worker_loop().await });
        }
    }

    async fn worker_loop(self: Arc<Self>) {
        loop {
            let job = {
                let mut rx = self.job_rx.lock().await;
                tokio::select! {
                    _ = self.shutdown.cancelled() => None,
                    job = rx.recv() => job,
                }
            };
            let Some(job) = job else { break };

            let _permit = match self.semaphore.clone().acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            self.run_job(&job).await;
            self.in_flight.remove(&job.integration_id);
        }
    }

    async fn run_job(&self, job: &SyncJob) {
        let Some(handle) = self.registry.adapter_for(&job.integration_id) else {
            // Mapping no longer present (integration deleted/rebuilt
            // mid-flight); discard per spec §4.3 "Cancellation".
            tracing::debug!(integration_id = %job.integration_id, "discarding sync result, adapter mapping gone");
            return;
        };
        let adapter = handle.inner().as_adapter();
        let result = adapter.sync(job.filter.clone()).await;

        if let Some(mut integration) = self.store.get_integration(&job.integration_id).await {
            integration.last_sync = Some(chrono::Utc::now());
            integration.status = if result.is_ok() { IntegrationStatus::Connected } else { IntegrationStatus::Error };
            self.store.put_integration(integration).await;
        }

        match result {
            Ok(()) => self.record_metrics(&job.integration_id, true, None).await,
            Err(e) => {
                tracing::warn!(integration_id = %job.integration_id, error = %e, "sync failed");
                self.record_metrics(&job.integration_id, false, Some(e.to_string())).await;
            }
        }
    }

    async fn record_metrics(&self, integration_id: &str, success: bool, error: Option<String>) {
        let key = metrics_key(integration_id);
        let mut metrics: IntegrationMetrics = self
            .side_store
            .get(&key)
            .await
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default();
        if success {
            metrics.record_success(0);
        } else {
            metrics.record_failure(error.unwrap_or_default());
        }
        if let Ok(bytes) = serde_json::to_vec(&metrics) {
            self.side_store.set(&key, bytes, Duration::from_secs(30 * 24 * 3600)).await;
        }
    }

    /// Checks each known integration's schedule lease and enqueues a
    /// job for any whose lease has expired (spec §4.3 "a background
    /// cadence re-enqueues the integration when the lease expires").
    /// Saturated-pool drops are silent by design (`enqueue` swallows
    /// `SyncQueueFull` here); the next tick re-attempts.
    pub async fn schedule_tick(&self) {
        for integration in self.store.list_integrations().await {
            if !integration.sync_policy.enabled || integration.status != IntegrationStatus::Connected {
                continue;
            }
            let key = schedule_key(&integration.id);
            let ttl = Duration::from_secs(integration.sync_policy.interval_minutes as u64 * 60);
            if self.side_store.set_if_absent(&key, integration.id.clone().into_bytes(), ttl).await {
                let _ = self
                    .enqueue(SyncJob {
                        integration_id: integration.id.clone(),
                        filter: integration.sync_policy.filter.clone(),
                    })
                    .await;
            }
        }
    }

    /// Drains in-flight work then disconnects every known adapter
    /// (spec §5 "on shutdown the orchestrator (a) stops accepting new
    /// jobs, (b) lets in-flight jobs finish up to a drain deadline...,
    /// (c) closes all adapters").
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let deadline = tokio::time::Instant::now() + self.drain_deadline;
        while !self.in_flight.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !self.in_flight.is_empty() {
            tracing::warn!(remaining = self.in_flight.len(), "drain deadline exceeded, proceeding to close adapters");
        }
        for integration in self.store.list_integrations().await {
            if let Some(handle) = self.registry.adapter_for(&integration.id) {
                let _ = handle.inner().as_adapter().disconnect().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_common::integration::{AuthType, ConnectionConfig, SeverityMapping, SyncDirection, SyncPolicy};
    use fusion_common::store::{InMemorySideStore, InMemoryStore};
    use fusion_registry::NewIntegrationRequest;
    use fusion_vault::{CredentialVault, VaultKey};
    use std::collections::HashMap;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            endpoint: "http://example.invalid".into(),
            auth_type: AuthType::Token,
            credentials: serde_json::json!({"token": "t"}),
            timeout_secs: 2,
            retry_attempts: 1,
            ssl_verify: true,
            proxy: None,
            custom_headers: HashMap::new(),
        }
    }

    async fn setup() -> (Arc<Registry>, Arc<Orchestrator>, String) {
        let store = InMemoryStore::new();
        let side_store = InMemorySideStore::new();
        let (sink, _rx) = fusion_adapters::events::event_channel(64);
        let vault = Arc::new(CredentialVault::new(VaultKey::generate()));
        let registry = Arc::new(Registry::new(store.clone(), side_store.clone(), vault, sink));
        let integration = registry
            .create(
                NewIntegrationRequest {
                    name: "splunk".into(),
                    tool_type: "siem".into(),
                    platform: "splunk".into(),
                    connection_config: config(),
                    sync_policy: SyncPolicy {
                        enabled: true,
                        direction: SyncDirection::Inbound,
                        interval_minutes: 5,
                        filter: serde_json::json!({"events": []}),
                    },
                    field_mappings: vec![],
                    severity_mapping: SeverityMapping::default(),
                    features: fusion_common::integration::Features::SYNC,
                },
                "tester",
            )
            .await
            .unwrap();
        let orchestrator = Orchestrator::new(registry.clone(), store, side_store, 2, 16, Duration::from_secs(1));
        orchestrator.spawn_workers(2);
        (registry, orchestrator, integration.id)
    }

    #[tokio::test]
    async fn duplicate_enqueue_for_same_integration_is_a_no_op() {
        let (_registry, orchestrator, id) = setup().await;
        orchestrator.in_flight.insert(id.clone());
        let result = orchestrator.enqueue(SyncJob { integration_id: id, filter: Value::Null }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn sync_job_runs_and_updates_last_sync() {
        let (_registry, orchestrator, id) = setup().await;
        orchestrator
            .enqueue(SyncJob { integration_id: id.clone(), filter: serde_json::json!({"events": []}) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let integration = orchestrator.store.get_integration(&id).await.unwrap();
        assert!(integration.last_sync.is_some());
    }

    #[tokio::test]
    async fn shutdown_disconnects_adapters_and_stops_accepting() {
        let (_registry, orchestrator, id) = setup().await;
        orchestrator.shutdown().await;
        let result = orchestrator.enqueue(SyncJob { integration_id: id, filter: Value::Null }).await;
        assert!(matches!(result, Err(OrchestratorError::ShuttingDown)));
    }
}
