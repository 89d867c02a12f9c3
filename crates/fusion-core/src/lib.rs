//! Service assembly and lifecycle supervision (spec §4's four core
//! subsystems wired together, plus the Posture Aggregator).
//!
//! Store/side-store connect failures at startup are the one case that
//! exits the process (spec §7); every other worker task is supervised
//! and restarted with backoff rather than taking the process down.

use fusion_actions::{AlertChannel, Dispatcher, PlaybookRunner};
use fusion_common::config::FusionConfig;
use fusion_common::store::{PersistentStore, SideStore};
use fusion_correlation::{CorrelationEngine, EventBuffer};
use fusion_orchestrator::Orchestrator;
use fusion_posture::Aggregator;
use fusion_registry::Registry;
use fusion_vault::CredentialVault;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything the running engine needs, already wired: a Registry owning
/// the adapter map, an Orchestrator driving syncs, a CorrelationEngine
/// consuming normalized events, and a Posture Aggregator for on-demand
/// dashboard reads.
pub struct Service {
    pub registry: Arc<Registry>,
    pub orchestrator: Arc<Orchestrator>,
    pub correlation_engine: Arc<CorrelationEngine>,
    pub aggregator: Arc<Aggregator>,
    pub shutdown: CancellationToken,
    config: FusionConfig,
}

impl Service {
    pub fn bootstrap(
        config: FusionConfig,
        store: Arc<dyn PersistentStore>,
        side_store: Arc<dyn SideStore>,
        vault: Arc<CredentialVault>,
        alert_channel: Arc<dyn AlertChannel>,
        playbook_runner: Arc<dyn PlaybookRunner>,
    ) -> Self {
        let (sink, event_rx) = fusion_adapters::events::event_channel(1024);
        // Domain events fan out to logging only today; a future transport
        // (webhook, message bus) would subscribe here instead.
        tokio::spawn(log_adapter_events(event_rx));

        let registry = Arc::new(Registry::new(store.clone(), side_store.clone(), vault, sink));
        let orchestrator = Orchestrator::new(
            registry.clone(),
            store.clone(),
            side_store.clone(),
            config.max_concurrent_syncs,
            config.sync_queue_capacity,
            Duration::from_secs(config.drain_deadline_secs),
        );

        let dispatcher = Arc::new(Dispatcher::new(store.clone(), registry.clone(), alert_channel, playbook_runner));
        let buffer = Arc::new(EventBuffer::new(
            store.clone(),
            Duration::from_secs(config.correlation_window_minutes as u64 * 60),
        ));
        let engine_config = fusion_common::threat::CorrelationEngineConfig::new(config.correlation_window_minutes);
        let correlation_engine = Arc::new(CorrelationEngine::new(buffer, store.clone(), dispatcher, engine_config));

        let aggregator = Arc::new(Aggregator::new(store, side_store));

        Self {
            registry,
            orchestrator,
            correlation_engine,
            aggregator,
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Sets the active correlation rule set. Exposed separately from
    /// `bootstrap` because rules are expected to be reloaded at runtime
    /// (registry-style config change), not just supplied once at boot.
    pub fn set_correlation_rules(&self, rules: Vec<fusion_common::threat::CorrelationRule>) {
        self.correlation_engine.set_rules(rules);
    }

    /// Starts every background worker and blocks until `shutdown` fires,
    /// then runs the drain/disconnect sequence (spec §5 "Cancellation and
    /// timeouts").
    pub async fn run(self: Arc<Self>) {
        self.orchestrator.spawn_workers(self.config.max_concurrent_syncs);

        let schedule_shutdown = self.shutdown.clone();
        let schedule_orchestrator = self.orchestrator.clone();
        tokio::spawn(supervise("schedule-tick", schedule_shutdown.clone(), move || {
            let orchestrator = schedule_orchestrator.clone();
            let shutdown = schedule_shutdown.clone();
            async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(30));
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = ticker.tick() => orchestrator.schedule_tick().await,
                    }
                }
            }
        }));

        let correlation_shutdown = self.shutdown.clone();
        let correlation_engine = self.correlation_engine.clone();
        let correlation_interval = Duration::from_millis(self.config.correlation_interval_ms);
        tokio::spawn(supervise("correlation-tick", correlation_shutdown.clone(), move || {
            let engine = correlation_engine.clone();
            let shutdown = correlation_shutdown.clone();
            async move { fusion_correlation::run_loop(engine, correlation_interval, shutdown).await }
        }));

        self.shutdown.cancelled().await;
        tracing::info!("shutdown signal received, draining");
        self.orchestrator.shutdown().await;
    }
}

async fn log_adapter_events(mut rx: tokio::sync::mpsc::Receiver<fusion_adapters::events::AdapterEvent>) {
    while let Some(event) = rx.recv().await {
        tracing::info!(?event, "adapter event");
    }
}

/// Runs `make_task` repeatedly until `shutdown` fires. A panic inside the
/// spawned task is caught by `JoinHandle` and restarted after an
/// exponential backoff (capped at 60s), rather than taking the process
/// down (spec §7, "process-fatal-but-not-process-exiting").
async fn supervise<F, Fut>(name: &'static str, shutdown: CancellationToken, make_task: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut backoff = Duration::from_secs(1);
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let handle = tokio::spawn(make_task());
        tokio::select! {
            _ = shutdown.cancelled() => return,
            result = handle => {
                match result {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::error!(task = name, error = %e, backoff_secs = backoff.as_secs(), "supervised task exited, restarting");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(Duration::from_secs(60));
                    }
                }
            }
        }
    }
}
