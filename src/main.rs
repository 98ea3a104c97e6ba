//! opalego CLI：定时拉取模型，编译后原子写入 sidecar 监听的 bundle 路径

use anyhow::{bail, Context, Result};
use clap::Parser;
use opalego::{fetcher_from_url, load_factory, ConfigManager, Lego, SidecarOptions};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "opalego",
    version,
    about = "Compile a declarative organization model into OPA bundles on a timer"
)]
struct Cli {
    /// Factory config (regoPiece + mode)
    #[arg(short, long)]
    config: PathBuf,
    /// Bundle destination watched by the sidecar
    #[arg(short, long)]
    out: PathBuf,
    /// Model source, fs://path or http(s)://...
    #[arg(short, long)]
    url: String,
    /// Refetch interval, e.g. 500ms, 10s, 5m, 1h
    #[arg(short, long, value_parser = parse_duration, default_value = "10s")]
    interval: Duration,
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (value, unit) = raw.split_at(split);
    let value: u64 = value
        .parse()
        .with_context(|| format!("invalid interval `{raw}`"))?;
    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .with_context(|| format!("interval `{raw}` is too large"))
    };
    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "" | "s" => Duration::from_secs(value),
        "m" => seconds(60)?,
        "h" => seconds(3600)?,
        other => bail!("unknown interval unit `{other}`"),
    };
    if duration.is_zero() {
        bail!("interval must be positive");
    }
    Ok(duration)
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let factory = load_factory(&cli.config)?;
    tracing::info!(mode = %factory.mode, service = %factory.service, interval = ?cli.interval, "Loaded factory");

    let config = ConfigManager::custom()
        .sidecar(SidecarOptions::new("", &cli.out))
        .build();
    let lego = Arc::new(Lego::new(factory, config)?);
    let fetcher = fetcher_from_url(&cli.url)?;

    let task = lego
        .schedule_set_bundle(fetcher, cli.interval, |e| {
            tracing::error!(kind = ?e.kind(), error = %e, "bundle cycle failed");
        })
        .context("bundle schedule already running")?;

    shutdown_signal().await?;
    tracing::info!("shutting down");
    task.abort();
    Ok(())
}
