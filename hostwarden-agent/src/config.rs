//! Command-line surface and settings bootstrap for the agent binary.

use anyhow::Context;
use clap::Parser;
use hostwarden_core::{ConfigError, Settings};

/// Command line arguments for the hostwarden agent.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the Ini-format settings file.
    ///
    /// Directory discovery of multiple config fragments is not supported —
    /// name the one file this process should read.
    #[arg(short, long, default_value = "/etc/hostwarden.ini")]
    pub config: String,

    /// Collector API base URL. Overrides the value in the config file.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Logging level passed to the tracing env-filter (trace, debug, info,
    /// warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory to write rotated log files into. If unset, logs go to
    /// stderr only.
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Run a single tick and exit, instead of looping forever. Useful for
    /// smoke-testing a deployment.
    #[arg(long)]
    pub once: bool,
}

/// Load settings from `args.config` if it exists, falling back to
/// environment-derived defaults, then apply CLI overrides. A missing config
/// file is not fatal — the agent runs fine off environment variables alone
/// in container deployments — but a config file that exists and fails to
/// parse is a fatal startup error.
pub fn load_settings(args: &Args) -> anyhow::Result<Settings> {
    let mut settings = if std::path::Path::new(&args.config).exists() {
        Settings::load_from_file(&args.config).context("failed to load settings file")?
    } else {
        tracing::info!(path = %args.config, "settings file not found, falling back to environment");
        Settings::from_env()
    };

    if let Some(api_url) = &args.api_url {
        settings.api_url = api_url.clone();
    }

    if settings.api_key.is_none() {
        return Err(ConfigError::MissingRequired("api_key").into());
    }

    if settings.server_id.is_none() {
        return Err(ConfigError::MissingRequired("server_id").into());
    }

    Ok(settings)
}
