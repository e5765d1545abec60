use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod dashboard;
mod diagnostics;
mod probe;
mod utils;
mod view;

use config::AppConfig;
use probe::{ConnectivityState, SettlementPolicy};
use view::StatusView;

#[derive(Debug, Parser)]
#[command(name = "boris_status", about = "BORIS setup status page")]
struct Cli {
    /// TOML config file; the embedded default is used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the status to stdout instead of opening the dashboard
    #[arg(long)]
    headless: bool,

    /// Emit the headless report as JSON
    #[arg(long)]
    json: bool,

    /// Override the configured settlement policy
    #[arg(long, value_enum)]
    policy: Option<SettlementPolicy>,

    /// Seconds headless mode waits for the probe to settle
    #[arg(long, default_value_t = 10)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.json && !cli.headless && cfg!(feature = "ui") {
        tracing::warn!("--json only applies to headless output; pass --headless to use it");
    }
    info!("Starting boris_status");

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_default()?,
    }
    .with_env_overrides();

    let policy = cli.policy.unwrap_or(config.probe.policy);
    diagnostics::warn_on_lenient_policy(policy);

    let client = backend::create_client(&config.backend)?;
    let view = match cli.policy {
        Some(policy) => StatusView::mount_with_policy(client, &config, policy),
        None => StatusView::mount(client, &config),
    };

    if cli.headless || !cfg!(feature = "ui") {
        let window = Duration::from_secs(cli.wait_secs);
        let report =
            dashboard::run_headless(view, window, cli.json, &mut std::io::stdout()).await?;
        match report.state {
            ConnectivityState::Connected => Ok(()),
            ConnectivityState::Unreachable => bail!("{} is unreachable", report.service),
            ConnectivityState::Pending => {
                bail!("probe did not settle within {}s", cli.wait_secs)
            }
        }
    } else {
        // Blocks until the window closes; dropping the view tears down the probe.
        match dashboard::run_dashboard(view) {
            Ok(_) => info!("Dashboard closed cleanly"),
            Err(e) => eprintln!("Dashboard error: {:#?}", e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_parses_without_headless() {
        let cli = Cli::try_parse_from(["boris_status", "--json"]);
        assert!(cli.is_ok_and(|c| c.json && !c.headless));
    }

    #[test]
    fn test_policy_flag_uses_kebab_case() {
        let cli =
            Cli::try_parse_from(["boris_status", "--headless", "--policy", "always-connected"]);
        assert!(cli.is_ok_and(|c| c.policy == Some(SettlementPolicy::AlwaysConnected)));
    }
}
