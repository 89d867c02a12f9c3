//! Event Buffer and Correlation Engine (spec §4.4).

pub mod buffer;
pub mod engine;

pub use buffer::EventBuffer;
pub use engine::CorrelationEngine;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drives `CorrelationEngine::tick` on a fixed cadence until cancelled
/// (spec §5: "the correlation engine runs on a periodic tick, driven by
/// a tokio interval, and stops accepting new ticks once its
/// cancellation token fires, letting the in-flight tick finish").
pub async fn run_loop(engine: Arc<CorrelationEngine>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("correlation engine loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                let threats = engine.tick(chrono::Utc::now()).await;
                if !threats.is_empty() {
                    tracing::info!(count = threats.len(), "correlation tick produced threats");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_actions::{Dispatcher, RecordingAlertChannel, RecordingPlaybookRunner};
    use fusion_common::store::{InMemorySideStore, InMemoryStore};
    use fusion_common::threat::CorrelationEngineConfig;
    use fusion_registry::Registry;
    use fusion_vault::{CredentialVault, VaultKey};

    #[tokio::test]
    async fn run_loop_stops_promptly_once_cancelled() {
        let store = InMemoryStore::new();
        let side_store = InMemorySideStore::new();
        let vault = Arc::new(CredentialVault::new(VaultKey::generate()));
        let (sink, _rx) = fusion_adapters::events::event_channel(16);
        let registry = Arc::new(Registry::new(store.clone(), side_store, vault, sink));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            registry,
            Arc::new(RecordingAlertChannel::default()),
            Arc::new(RecordingPlaybookRunner::default()),
        ));
        let buffer = Arc::new(EventBuffer::new(store.clone(), Duration::from_secs(900)));
        let engine = Arc::new(CorrelationEngine::new(buffer, store, dispatcher, CorrelationEngineConfig::new(15)));

        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(run_loop(engine, Duration::from_millis(5), shutdown_clone));

        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
