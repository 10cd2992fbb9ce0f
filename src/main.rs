use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use gatekeeper::api::Gateway;
use gatekeeper::audit::{AuditChain, FileSink, MemorySink};
use gatekeeper::config::Config;
use gatekeeper::engine::DecisionEngine;
use gatekeeper::observability::{init_tracing, MetricsRegistry};
use gatekeeper::policy::{RuleLoader, RuleStore, RuleWatcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        shadow_mode = config.shadow_mode,
        "Starting gatekeeper"
    );

    let metrics = Arc::new(MetricsRegistry::new());

    // Load initial rules and start the watcher
    let loader = RuleLoader::new(&config.rules_path);
    let store = Arc::new(RuleStore::open(&loader, Some(metrics.clone())));
    let watcher = RuleWatcher::new(loader, store.clone(), config.rules_reload_interval());
    let watcher_handle = watcher.start();

    let breakers = Arc::new(config.breaker_registry());
    let engine = Arc::new(DecisionEngine::new(breakers).with_metrics(metrics.clone()));

    let audit = Arc::new(open_audit_chain(&config, metrics.clone()).await?);

    let gateway = Arc::new(
        Gateway::new(store, engine, audit.clone(), metrics)
            .with_shadow_mode(config.shadow_mode)
            .with_latency_budget(config.latency_budget()),
    );

    let verify_handle = match config.audit_verify_interval() {
        Some(every) => Some(spawn_verifier(audit.clone(), every)),
        None => {
            info!("Periodic audit verification disabled");
            None
        }
    };

    match gateway.ready() {
        Ok(ready) => info!(
            rules_version = %ready.rules_version,
            rules = ready.rules,
            "Gateway ready"
        ),
        Err(e) => warn!(reason = %e.error, "Gateway started without rules"),
    }

    shutdown_signal().await;

    // Cleanup
    info!("Shutting down...");
    watcher_handle.abort();
    if let Some(handle) = verify_handle {
        handle.abort();
    }

    match audit.verify_chain().await {
        Ok(records) => info!(records = records, "Audit chain verified at shutdown"),
        Err(e) => error!(error = %e, "Audit chain verification failed at shutdown"),
    }

    let health = gateway.health();
    info!(
        uptime_secs = health.uptime_secs,
        audit_records = health.audit_records,
        breakers = health.breakers.len(),
        "Shutdown complete"
    );
    Ok(())
}

/// File-backed chain resumed from disk, or an in-memory chain.
async fn open_audit_chain(
    config: &Config,
    metrics: Arc<MetricsRegistry>,
) -> anyhow::Result<AuditChain> {
    match &config.audit_path {
        Some(path) => {
            let sink = FileSink::open(path)
                .with_context(|| format!("opening audit log {}", path.display()))?
                .with_sync(config.audit_sync);

            let chain = AuditChain::recover(Arc::new(sink), Some(metrics))
                .await
                .with_context(|| format!("recovering audit chain from {}", path.display()))?;

            if !chain.recovered_gaps().is_empty() {
                warn!(
                    path = %path.display(),
                    gaps = ?chain.recovered_gaps(),
                    "Audit log has missing records from a previous run"
                );
            }
            info!(path = %path.display(), records = chain.len(), "Audit log enabled");
            Ok(chain)
        }
        None => {
            warn!("Audit log is in memory only (no path configured)");
            Ok(AuditChain::new(Arc::new(MemorySink::new())).with_metrics(metrics))
        }
    }
}

fn spawn_verifier(audit: Arc<AuditChain>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Err(e) = audit.verify_chain().await {
                error!(error = %e, "Periodic audit verification failed");
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
