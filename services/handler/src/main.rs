//! Droplets handler daemon.
//!
//! Startup order: process lock, tracing, config, templates, advertised
//! IP, bus connections, then the receive and report loops. The process
//! then waits for SIGINT/SIGTERM (or for the bus to drop), destroys every
//! registered droplet with an announcement, and releases the lock.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use droplets_handler::bus::run_receive_loop;
use droplets_handler::config::{self, Config};
use droplets_handler::handler::Handler;
use droplets_handler::lock::{ProcessLock, LOCK_FILE};
use droplets_handler::reporter::run_report_loop;
use droplets_handler::workdir::{WorkdirConfig, WorkdirMaterializer};
use droplets_handler::{host, redis_bus};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting droplets handler");

    let lock =
        ProcessLock::acquire(LOCK_FILE).context("is another handler instance running here?")?;

    let config = Config::load(config::CONFIG_FILE)?;
    let templates = config::load_templates(config::TEMPLATES_FILE)?;
    info!(
        template_count = templates.len(),
        redis_host = %config.redis.host,
        "Configuration loaded"
    );

    let advertised_ip = resolve_advertised_ip(&config).await;
    info!(ip = %advertised_ip, "Using outbound IP address");

    info!("Connecting to the bus");
    let (bus, subscription) = redis_bus::connect(&config.redis)
        .await
        .context("connecting to the bus")?;

    let materializer = Arc::new(WorkdirMaterializer::new(WorkdirConfig::default()));
    let handler = Arc::new(Handler::new(
        config,
        templates,
        Arc::new(bus),
        materializer,
        advertised_ip,
    ));

    let mut receive_loop = tokio::spawn(run_receive_loop(
        Arc::clone(&handler),
        Box::new(subscription),
    ));
    let reporter = tokio::spawn(run_report_loop(Arc::clone(&handler)));

    tokio::select! {
        _ = termination_signal() => info!("Termination signal received"),
        _ = &mut receive_loop => warn!("Bus connection lost, shutting down"),
    }

    handler.shutdown().await;
    receive_loop.abort();
    reporter.abort();
    lock.release().context("releasing the process lock")?;
    info!("Goodbye");
    Ok(())
}

/// The configured external IP, or the discovered outbound address, or
/// loopback when discovery fails (proxy-on-same-node setups).
async fn resolve_advertised_ip(config: &Config) -> String {
    if !config.external_ip.is_empty() {
        return config.external_ip.clone();
    }
    match host::outbound_ip().await {
        Ok(ip) => ip,
        Err(e) => {
            warn!(error = %e, "Could not discover outbound IP, advertising loopback");
            "127.0.0.1".to_string()
        }
    }
}

/// Wait for SIGINT or SIGTERM.
async fn termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}
