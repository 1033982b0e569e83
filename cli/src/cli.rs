use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use engine::EngineConfig;

#[derive(Debug, Parser)]
#[clap(name = "divergence", version)]
pub struct Cli {
    /// Instruments to track (comma-separated)
    #[clap(long, value_delimiter = ',', default_values_t = ["BTC".to_string(), "ETH".to_string()])]
    pub instruments: Vec<String>,

    /// JSON file with engine settings; missing fields keep their defaults
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Compute tick period (ms)
    #[clap(long)]
    pub tick_ms: Option<u64>,

    /// |z| on sentiment differences that counts as a spike
    #[clap(long)]
    pub spike_threshold: Option<f64>,

    /// Delay between a spike and its realized-return measurement (ms)
    #[clap(long)]
    pub impact_window_ms: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[clap(long)]
    pub duration_secs: Option<u64>,

    /// Print the engine view every N seconds
    #[clap(long, default_value = "5")]
    pub report_every_secs: u64,

    /// Emit logs as JSON
    #[clap(long)]
    pub json_logs: bool,

    /// Synthetic price feed period (ms)
    #[clap(long, default_value = "250")]
    pub price_every_ms: u64,

    /// Synthetic sentiment feed period (ms)
    #[clap(long, default_value = "2000")]
    pub info_every_ms: u64,
}

/// Defaults, then the config file, then `SIGNAL_*` variables, then flags.
pub(crate) fn build_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    build_config_with(cli, |key| std::env::var(key).ok())
}

pub(crate) fn build_config_with<F>(cli: &Cli, env: F) -> anyhow::Result<EngineConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    cfg.apply_env(env)?;

    if let Some(v) = cli.tick_ms {
        cfg.tick_interval_ms = v;
    }
    if let Some(v) = cli.spike_threshold {
        cfg.spike_threshold = v;
    }
    if let Some(v) = cli.impact_window_ms {
        cfg.impact_window_ms = v;
    }

    cfg.validate()?;
    Ok(cfg)
}
