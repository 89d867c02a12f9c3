//! Security Signal Fusion Engine - entrypoint.

use fusion_actions::{RecordingAlertChannel, RecordingPlaybookRunner};
use fusion_common::config::FusionConfig;
use fusion_common::store::{InMemorySideStore, InMemoryStore};
use fusion_core::Service;
use fusion_vault::{CredentialVault, VaultKey};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("fusion-engine v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::var("FUSION_CONFIG_PATH").unwrap_or_else(|_| "/etc/fusion-engine/config.toml".into());
    let config = FusionConfig::load(&config_path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "using default config");
        FusionConfig::default()
    });

    // Relational store / side store / credential vault connect failures
    // are the one startup condition that exits the process (spec.md §7);
    // the in-memory stand-ins here cannot fail, but a real backend's
    // connect call would be awaited right here, with `?` propagating any
    // error straight out of `main`.
    let store = InMemoryStore::new();
    let side_store = InMemorySideStore::new();
    let vault = Arc::new(CredentialVault::new(VaultKey::generate()));

    let service = Arc::new(Service::bootstrap(
        config,
        store,
        side_store,
        vault,
        Arc::new(RecordingAlertChannel::default()),
        Arc::new(RecordingPlaybookRunner::default()),
    ));

    let shutdown = service.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received");
            shutdown.cancel();
        }
    });

    service.run().await;
    tracing::info!("fusion-engine stopped");
    Ok(())
}
