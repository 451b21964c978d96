use super::load_applications;
use anyhow::Result;
use console::style;
use slotwatch_core::config::{EngineConfig, RunProfile};
use slotwatch_core::site::SiteRegistry;
use slotwatch_core::stats::EngineStats;
use slotwatch_core::store::MemoryStore;
use slotwatch_engine::BrowserMonitorEngine;
use std::path::Path;
use std::sync::Arc;

pub async fn execute(
    sites: &Path,
    apps: &Path,
    config_path: Option<&Path>,
    interactive: bool,
) -> Result<()> {
    let profile = if interactive {
        RunProfile::Interactive
    } else {
        RunProfile::Headless
    };

    let registry = SiteRegistry::from_json_file(sites)?;
    let config = match config_path {
        Some(path) => EngineConfig::from_json_file(path, profile)?,
        None => EngineConfig::for_profile(profile),
    };
    let records = load_applications(apps)?;
    let store = Arc::new(MemoryStore::new(records));

    let engine = BrowserMonitorEngine::with_browser_stack(config, registry, store)?;
    engine.start().await?;

    println!(
        "{}",
        style("Monitoring started. Press Ctrl-C to stop.").dim()
    );

    tokio::signal::ctrl_c().await?;
    println!("{}", style("Stopping...").dim());
    engine.stop().await;
    tracing::info!("monitoring run finished");

    print_stats(&engine.stats().await);
    if let Some(at) = engine.last_activity().await {
        println!("  last activity at {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

fn print_stats(stats: &EngineStats) {
    println!();
    println!("{}", style("Run summary").bold().underlined());

    let mut sites: Vec<_> = stats.per_site.iter().collect();
    sites.sort_by_key(|(key, _)| key.to_string());

    for (site, site_stats) in sites {
        println!(
            "  {:<20} checks {:>5}   slots found {:>3}   bookings {:>3}",
            site, site_stats.checks, site_stats.slots_found, site_stats.bookings
        );
    }
    println!(
        "  {:<20} checks {:>5}   slots found {:>3}   bookings {:>3}",
        style("total").bold(),
        stats.total.checks,
        stats.total.slots_found,
        stats.total.bookings
    );
}
