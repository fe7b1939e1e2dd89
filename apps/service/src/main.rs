mod checks;
mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use checks::{Executor, Scheduler, SchedulerOptions};
use config::Config;

#[derive(Debug, Parser)]
#[command(name = "checkup", version, about = "Service check scheduler with upstream reporting")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run every check once, print the snapshot as JSON, and exit
    #[arg(long)]
    once: bool,

    /// Log full request/response payloads
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let config = Config::from_config(cli.config.as_deref()).context("loading configuration")?;
    info!("{config}");

    let client = build_client(&config)?;
    if client.is_none() {
        info!("no upstream base URL configured, results will only be logged");
    }

    let executor = Arc::new(
        Executor::new(Duration::from_millis(config.engine.degraded_threshold_ms))
            .context("building check executor")?,
    );

    let checks = if config.engine.disabled {
        Vec::new()
    } else {
        config.checks.iter().map(config::CheckEntry::to_check).collect()
    };

    let options = SchedulerOptions {
        parallel: config.engine.parallel,
        interval: Duration::from_secs(config.engine.interval_secs),
        fast_tick: Duration::from_secs(config.engine.fast_tick_secs),
        trigger_buffer: config.engine.trigger_buffer,
        verbose: cli.verbose,
        ..SchedulerOptions::default()
    };

    let (mut scheduler, service_config) = Scheduler::setup(checks, options, executor, client)
        .context("setting up service checks")?;

    if cli.once {
        let results = scheduler.run_once().await;
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if service_config.disabled {
        info!("service checks are disabled, nothing to do");
        return Ok(());
    }

    scheduler.start();

    tokio::signal::ctrl_c().await.context("listening for interrupt")?;
    info!("interrupt received, shutting down");
    scheduler.stop().await;

    Ok(())
}

/// Build the upstream client, or None when no base URL is configured.
fn build_client(config: &Config) -> anyhow::Result<Option<Arc<upcast::Client>>> {
    if config.upstream.base_url.is_empty() {
        return Ok(None);
    }

    let client = upcast::Client::new(upcast::ClientConfig {
        base_url: config.upstream.base_url.clone(),
        api_key: config.upstream.api_key.clone(),
        timeout: Duration::from_secs(config.upstream.timeout_secs),
        retries: config.upstream.retries,
        retry_delay: Duration::from_millis(config.upstream.retry_delay_ms),
        max_body: config.upstream.max_body,
    })
    .map_err(|err| {
        error!("upstream client rejected the configuration: {err}");
        err
    })?;

    Ok(Some(Arc::new(client)))
}
