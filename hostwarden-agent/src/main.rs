//! # Hostwarden Agent Binary
//!
//! Entry point for the hostwarden monitoring daemon. Collects structured
//! state from a fixed set of host probes on a periodic cadence, diffs each
//! snapshot against what was last sent, and syncs the result to a remote
//! collector API.
//!
//! ## Usage
//!
//! ```bash
//! # Basic usage, reading /etc/hostwarden.ini
//! hostwarden
//!
//! # Custom config file and debug logging
//! hostwarden --config ./hostwarden.ini --log-level debug
//!
//! # One-shot run for smoke-testing a deployment
//! hostwarden --once
//! ```
//!
//! ## Environment Variables
//!
//! - `HOSTWARDEN_API_URL`: collector API base URL
//! - `HOSTWARDEN_API_KEY`: collector API key
//! - `HOSTWARDEN_SERVER_ID`: this host's collector-assigned identity
//! - `HOSTWARDEN_TICK_INTERVAL_SECS`: override the collection cadence
//! - `RUST_LOG`: tracing env-filter, takes precedence over `--log-level`

use clap::Parser;
use hostwarden_agent::collection_loop::{wait_for_shutdown_signal, CollectionLoop};
use hostwarden_agent::config::{load_settings, Args};
use hostwarden_agent::plugins::build_registry;
use hostwarden_core::RemoteClient;

fn read_hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn init_tracing(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));

    match &args.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "hostwarden.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(non_blocking).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_tracing(&args);

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(%err, "fatal configuration error at startup");
            return Err(err);
        }
    };

    let remote = RemoteClient::new(
        settings.api_url.clone(),
        settings.api_key.clone(),
        read_hostname(),
        env!("CARGO_PKG_VERSION"),
    );
    let registry = build_registry();
    tracing::info!(plugins = registry.len(), "registry assembled");

    let mut loop_ = CollectionLoop::new(registry, remote, settings);
    loop_.init().await?;

    if args.once {
        loop_.tick().await?;
        return Ok(());
    }

    loop {
        let tick_interval = loop_.tick_interval();
        let tick_start = tokio::time::Instant::now();

        if let Err(err) = loop_.tick().await {
            tracing::error!(%err, "tick failed");
        }

        let elapsed = tick_start.elapsed();
        tokio::select! {
            _ = tokio::time::sleep(tick_interval.saturating_sub(elapsed)) => {}
            _ = wait_for_shutdown_signal() => {
                tracing::info!("shutting down");
                loop_.notify_shutdown().await;
                break;
            }
        }
    }

    Ok(())
}
