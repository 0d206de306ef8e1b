//! Subcommand handlers

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::app::client::{PageClient, PageFetcher};
use crate::app::events::HarvestEvent;
use crate::app::manager::HarvestManager;
use crate::app::source::{ListSource, ProxySource};
use crate::cli::args::{ConfigArgs, GlobalArgs, RunArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};

/// Run the harvesting pipeline until interrupted (or, with `--once`,
/// until every source completes)
pub async fn handle_run(global: &GlobalArgs, args: RunArgs) -> Result<()> {
    let config = AppConfig::load_or_default(global.config.as_deref())?;
    config.validate()?;

    let fetcher: Arc<dyn PageFetcher> =
        Arc::new(PageClient::new(config.client.clone()).map_err(AppError::Source)?);

    let sources = config
        .sources
        .iter()
        .map(|source_config| {
            ListSource::new(source_config.clone())
                .map(|source| Arc::new(source) as Arc<dyn ProxySource>)
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(AppError::Source)?;

    let mut checker_config = config.checker.clone();
    if let Some(parallelism) = args.parallelism {
        checker_config.parallelism = parallelism;
    }

    info!(
        "harvesting {} sources with {} probe slots",
        sources.len(),
        checker_config.parallelism
    );

    let mut manager = HarvestManager::new(
        config.manager.clone(),
        checker_config,
        sources,
        fetcher,
    );
    let mut events = manager.subscribe();
    manager.start().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(HarvestEvent::PoolReady) => {
                    info!("pool ready: first validated proxy available");
                }
                Ok(HarvestEvent::BatchChecked { swept, valid, .. }) if swept > 0 => {
                    debug!("sweep validated {}/{} candidates", valid, swept);
                }
                Ok(HarvestEvent::AllSourcesCompleted { total_pages }) => {
                    info!("all sources completed ({} pages harvested)", total_pages);
                    if args.once {
                        break;
                    }
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event stream lagged by {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    let stats = manager.pool_stats().await;
    info!(
        "final pool: {} entries, {} validated, {} invalid",
        stats.total, stats.checked, stats.invalid
    );

    // Print the validated endpoints so the run's yield is usable as-is.
    for candidate in manager.pool().snapshot().await {
        if candidate.status.is_checked() {
            println!("{}\t{:?}", candidate.proxy_url(), candidate.latency);
        }
    }

    manager.shutdown().await;
    Ok(())
}

/// Print, and optionally persist, the effective configuration
pub async fn handle_config(global: &GlobalArgs, args: ConfigArgs) -> Result<()> {
    let config = AppConfig::load_or_default(global.config.as_deref())?;
    let rendered = toml::to_string_pretty(&config)
        .map_err(|err| AppError::Config(err.into()))?;

    if args.init {
        let path = AppConfig::default_path()
            .ok_or_else(|| AppError::generic("no default configuration directory"))?;
        config.save(&path)?;
        info!("wrote configuration to {}", path.display());
    }

    println!("{}", rendered);
    Ok(())
}
