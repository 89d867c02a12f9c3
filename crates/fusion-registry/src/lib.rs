//! Integration Registry (spec §4.2): CRUD + state machine for
//! integration records, adapter construction/swap, platform whitelist
//! enforcement.
//!
//! The `integrationId -> Adapter` map is the one piece of shared state
//! spec §5 calls out by name: "mutated only by the Registry under an
//! exclusive write discipline... readers take a shared-access snapshot
//! pointer." `arc_swap::ArcSwap` gives us that snapshot-read/atomic-swap
//! shape directly; a per-integration `tokio::sync::Mutex` serializes the
//! disconnect-old/connect-new pair during a swap, matching the locking
//! discipline spec §5 spells out.

pub mod error;

use arc_swap::ArcSwap;
use chrono::Utc;
use dashmap::DashMap;
use error::RegistryError;
use fusion_adapters::{build_adapter, ConcreteAdapter, EventSink};
use fusion_common::audit::{AuditAction, AuditRecord};
use fusion_common::error::{FusionError, FusionResult};
use fusion_common::integration::{
    is_supported, ConnectionConfig, Features, FieldMapping, Integration, IntegrationStatus, SeverityMapping, SyncPolicy,
};
use fusion_common::store::{PersistentStore, SideStore};
use fusion_vault::{CredentialVault, EncryptedSecret};
use std::sync::Arc;
use std::time::Duration;

/// Input to `Registry::create`; `connection_config.credentials` is
/// plaintext JSON here — the registry encrypts it before it is ever
/// persisted (spec §4.2 "encrypts credentials").
pub struct NewIntegrationRequest {
    pub name: String,
    pub tool_type: String,
    pub platform: String,
    pub connection_config: ConnectionConfig,
    pub sync_policy: SyncPolicy,
    pub field_mappings: Vec<FieldMapping>,
    pub severity_mapping: SeverityMapping,
    pub features: Features,
}

/// Input to `Registry::update`. Only `connection_config` triggers an
/// adapter rebuild; the other fields are metadata-only updates.
pub struct UpdateIntegrationRequest {
    pub name: Option<String>,
    pub connection_config: Option<ConnectionConfig>,
    pub sync_policy: Option<SyncPolicy>,
    pub field_mappings: Option<Vec<FieldMapping>>,
    pub severity_mapping: Option<SeverityMapping>,
    pub features: Option<Features>,
}

struct AdapterSlot {
    current: ArcSwap<ConcreteAdapter>,
    swap_lock: tokio::sync::Mutex<()>,
}

pub struct Registry {
    store: Arc<dyn PersistentStore>,
    side_store: Arc<dyn SideStore>,
    vault: Arc<CredentialVault>,
    sink: EventSink,
    adapters: DashMap<String, Arc<AdapterSlot>>,
    audit: parking_lot::Mutex<Vec<AuditRecord>>,
}

fn schedule_key(id: &str) -> String {
    format!("sync-schedule:{id}")
}

impl Registry {
    pub fn new(store: Arc<dyn PersistentStore>, side_store: Arc<dyn SideStore>, vault: Arc<CredentialVault>, sink: EventSink) -> Self {
        Self {
            store,
            side_store,
            vault,
            sink,
            adapters: DashMap::new(),
            audit: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn audit_trail(&self) -> Vec<AuditRecord> {
        self.audit.lock().clone()
    }

    fn record_audit(&self, integration_id: &str, action: AuditAction, actor: &str) {
        self.audit.lock().push(AuditRecord::new(integration_id, action, actor));
    }

    fn validate_required(req_name: &str, tool_type: &str, platform: &str, config: &ConnectionConfig) -> Result<(), RegistryError> {
        if req_name.is_empty() {
            return Err(RegistryError::RequiredFieldMissing("name".into()));
        }
        if tool_type.is_empty() {
            return Err(RegistryError::RequiredFieldMissing("type".into()));
        }
        if platform.is_empty() {
            return Err(RegistryError::RequiredFieldMissing("platform".into()));
        }
        if config.endpoint.is_empty() {
            return Err(RegistryError::RequiredFieldMissing("endpoint".into()));
        }
        if config.credentials.is_null() {
            return Err(RegistryError::RequiredFieldMissing("credentials".into()));
        }
        Ok(())
    }

    /// Persists `connection_config` with `credentials` replaced by its
    /// encrypted envelope; the plaintext never reaches the store.
    fn encrypt_for_storage(&self, config: &ConnectionConfig) -> ConnectionConfig {
        let secret: EncryptedSecret = self.vault.encrypt_json(&config.credentials);
        ConnectionConfig {
            credentials: serde_json::to_value(secret).expect("EncryptedSecret serializes"),
            ..config.clone()
        }
    }

    async fn build_and_connect(
        &self,
        integration_id: &str,
        tool_type: &str,
        platform: &str,
        plaintext_config: ConnectionConfig,
        severity_mapping: SeverityMapping,
    ) -> (ConcreteAdapter, Result<(), FusionError>) {
        match build_adapter(
            integration_id.to_string(),
            tool_type,
            platform,
            plaintext_config,
            severity_mapping,
            self.sink.clone(),
        ) {
            Ok(adapter) => {
                let result = adapter.as_adapter().connect().await;
                (adapter, result)
            }
            Err(e) => {
                // UnsupportedIntegration; there is no adapter to return,
                // but callers of this helper already checked
                // `is_supported` before reaching here, so this arm is
                // unreachable in practice — kept for defense in depth.
                unreachable!("build_adapter failed after whitelist check: {e}")
            }
        }
    }

    /// Validates, encrypts credentials, persists, constructs the
    /// adapter, connects, and schedules periodic syncs on success
    /// (spec §4.2).
    pub async fn create(&self, req: NewIntegrationRequest, actor: &str) -> FusionResult<Integration> {
        Self::validate_required(&req.name, &req.tool_type, &req.platform, &req.connection_config).map_err(RegistryError::into_fusion_error)?;
        if !is_supported(&req.tool_type, &req.platform) {
            return Err(RegistryError::UnsupportedPlatform {
                tool_type: req.tool_type.clone(),
                platform: req.platform.clone(),
            }
            .into_fusion_error());
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let stored_config = self.encrypt_for_storage(&req.connection_config);
        let mut sync_policy = req.sync_policy;
        sync_policy.interval_minutes = Integration::clamp_interval(sync_policy.interval_minutes);

        let mut integration = Integration {
            id: id.clone(),
            name: req.name,
            tool_type: req.tool_type.clone(),
            platform: req.platform.clone(),
            connection_config: stored_config,
            sync_policy: sync_policy.clone(),
            field_mappings: req.field_mappings,
            severity_mapping: req.severity_mapping.clone(),
            features: req.features,
            status: IntegrationStatus::Configuring,
            last_connected: None,
            last_sync: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.store.put_integration(integration.clone()).await;

        let (adapter, connect_result) = self
            .build_and_connect(&id, &req.tool_type, &req.platform, req.connection_config, req.severity_mapping)
            .await;

        match &connect_result {
            Ok(()) => {
                integration.status = IntegrationStatus::Connected;
                integration.last_connected = Some(Utc::now());
                if sync_policy.enabled {
                    self.side_store
                        .set_if_absent(&schedule_key(&id), id.clone().into_bytes(), Duration::from_secs(sync_policy.interval_minutes as u64 * 60))
                        .await;
                }
            }
            Err(e) => {
                tracing::warn!(integration_id = %id, error = %e, "initial connect failed");
                integration.status = IntegrationStatus::Error;
            }
        }
        self.store.put_integration(integration.clone()).await;
        self.adapters.insert(
            id.clone(),
            Arc::new(AdapterSlot {
                current: ArcSwap::new(Arc::new(adapter)),
                swap_lock: tokio::sync::Mutex::new(()),
            }),
        );
        self.record_audit(&id, AuditAction::IntegrationCreated, actor);
        Ok(integration)
    }

    /// Rebuilds the adapter iff `connection_config` changed; the swap
    /// is atomic from readers' perspective (spec §4.2, §5 "Locking
    /// discipline").
    pub async fn update(&self, id: &str, req: UpdateIntegrationRequest, actor: &str) -> FusionResult<Integration> {
        let mut integration = self.store.get_integration(id).await.ok_or_else(|| RegistryError::NotFound(id.to_string()).into_fusion_error())?;

        let config_changed = req.connection_config.is_some();
        if let Some(name) = req.name {
            integration.name = name;
        }
        if let Some(mut policy) = req.sync_policy {
            policy.interval_minutes = Integration::clamp_interval(policy.interval_minutes);
            integration.sync_policy = policy;
        }
        if let Some(mappings) = req.field_mappings {
            integration.field_mappings = mappings;
        }
        if let Some(severity_mapping) = req.severity_mapping.clone() {
            integration.severity_mapping = severity_mapping;
        }
        if let Some(features) = req.features {
            integration.features = features;
        }

        if let Some(new_plaintext_config) = req.connection_config {
            let slot = self
                .adapters
                .get(id)
                .map(|e| e.clone())
                .ok_or_else(|| RegistryError::NotFound(id.to_string()).into_fusion_error())?;
            let _guard = slot.swap_lock.lock().await;

            let old_adapter = slot.current.load_full();
            let (new_adapter, connect_result) = self
                .build_and_connect(id, &integration.tool_type, &integration.platform, new_plaintext_config.clone(), integration.severity_mapping.clone())
                .await;

            integration.connection_config = self.encrypt_for_storage(&new_plaintext_config);
            match &connect_result {
                Ok(()) => {
                    integration.status = IntegrationStatus::Connected;
                    integration.last_connected = Some(Utc::now());
                }
                Err(_) => integration.status = IntegrationStatus::Error,
            }

            slot.current.store(Arc::new(new_adapter));
            let _ = old_adapter.as_adapter().disconnect().await;
            self.record_audit(id, AuditAction::AdapterSwapped, actor);
        }

        integration.touch();
        self.store.put_integration(integration.clone()).await;
        self.record_audit(id, AuditAction::IntegrationUpdated, actor);
        let _ = config_changed;
        Ok(integration)
    }

    pub async fn delete(&self, id: &str, actor: &str) -> FusionResult<()> {
        self.store.get_integration(id).await.ok_or_else(|| RegistryError::NotFound(id.to_string()).into_fusion_error())?;
        self.side_store.delete(&schedule_key(id)).await;
        if let Some((_, slot)) = self.adapters.remove(id) {
            let _ = slot.current.load_full().as_adapter().disconnect().await;
        }
        self.store.delete_integration(id).await;
        self.record_audit(id, AuditAction::IntegrationDeleted, actor);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Integration> {
        self.store.get_integration(id).await
    }

    pub async fn list(&self) -> Vec<Integration> {
        self.store.list_integrations().await
    }

    pub fn adapter_for(&self, id: &str) -> Option<ConcreteAdapterHandle> {
        self.adapters.get(id).map(|slot| ConcreteAdapterHandle(slot.current.load_full()))
    }

    /// Tests connectivity against an ephemeral, non-persisted spec
    /// (spec §4.2 "testConnection can be run... without touching the
    /// registry").
    pub async fn test_connection(&self, tool_type: &str, platform: &str, config: ConnectionConfig, severity_mapping: SeverityMapping) -> FusionResult<bool> {
        if !is_supported(tool_type, platform) {
            return Err(RegistryError::UnsupportedPlatform {
                tool_type: tool_type.to_string(),
                platform: platform.to_string(),
            }
            .into_fusion_error());
        }
        let ephemeral_id = uuid::Uuid::new_v4().to_string();
        let (sink, _rx) = fusion_adapters::events::event_channel(1);
        let adapter = build_adapter(ephemeral_id, tool_type, platform, config, severity_mapping, sink)?;
        Ok(adapter.as_adapter().test_connection().await)
    }
}

/// Opaque handle to the currently-live adapter for an integration, read
/// at snapshot time; holding it does not block a concurrent swap.
pub struct ConcreteAdapterHandle(Arc<ConcreteAdapter>);

impl ConcreteAdapterHandle {
    pub fn inner(&self) -> &ConcreteAdapter {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_common::integration::{AuthType, SyncDirection};
    use fusion_common::store::{InMemorySideStore, InMemoryStore};
    use std::collections::HashMap;

    fn vault() -> Arc<CredentialVault> {
        Arc::new(CredentialVault::new(fusion_vault::VaultKey::generate()))
    }

    fn registry() -> Registry {
        let (sink, _rx) = fusion_adapters::events::event_channel(64);
        Registry::new(InMemoryStore::new(), InMemorySideStore::new(), vault(), sink)
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            endpoint: "https://example.invalid".to_string(),
            auth_type: AuthType::Token,
            credentials: serde_json::json!({"token": "t"}),
            timeout_secs: 5,
            retry_attempts: 1,
            ssl_verify: true,
            proxy: None,
            custom_headers: HashMap::new(),
        }
    }

    fn sync_policy() -> SyncPolicy {
        SyncPolicy {
            enabled: true,
            direction: SyncDirection::Inbound,
            interval_minutes: 15,
            filter: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn create_rejects_unsupported_platform() {
        let reg = registry();
        let req = NewIntegrationRequest {
            name: "x".into(),
            tool_type: "siem".into(),
            platform: "datadog".into(),
            connection_config: config(),
            sync_policy: sync_policy(),
            field_mappings: vec![],
            severity_mapping: SeverityMapping::default(),
            features: Features::SYNC,
        };
        assert!(reg.create(req, "tester").await.is_err());
    }

    #[tokio::test]
    async fn create_persists_with_encrypted_credentials() {
        let reg = registry();
        let req = NewIntegrationRequest {
            name: "splunk-prod".into(),
            tool_type: "siem".into(),
            platform: "splunk".into(),
            connection_config: config(),
            sync_policy: sync_policy(),
            field_mappings: vec![],
            severity_mapping: SeverityMapping::default(),
            features: Features::SYNC | Features::SIEM_SEARCH,
        };
        let integration = reg.create(req, "tester").await.unwrap();
        // The encrypted envelope, not the raw token, is what lands in storage.
        assert!(integration.connection_config.credentials.get("ciphertext_b64").is_some());
        assert!(integration.connection_config.credentials.get("token").is_none());
        assert_eq!(reg.audit_trail().len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_integration_and_schedule() {
        let reg = registry();
        let req = NewIntegrationRequest {
            name: "splunk-prod".into(),
            tool_type: "siem".into(),
            platform: "splunk".into(),
            connection_config: config(),
            sync_policy: sync_policy(),
            field_mappings: vec![],
            severity_mapping: SeverityMapping::default(),
            features: Features::SYNC,
        };
        let integration = reg.create(req, "tester").await.unwrap();
        reg.delete(&integration.id, "tester").await.unwrap();
        assert!(reg.get(&integration.id).await.is_none());
        assert!(reg.adapter_for(&integration.id).is_none());
    }

    #[tokio::test]
    async fn test_connection_never_touches_registry() {
        let reg = registry();
        let connected = reg.test_connection("siem", "splunk", config(), SeverityMapping::default()).await.unwrap();
        assert!(reg.list().await.is_empty());
        let _ = connected;
    }
}
