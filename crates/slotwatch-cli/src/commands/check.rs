use super::load_applications;
use anyhow::{bail, Result};
use console::style;
use slotwatch_core::config::{EngineConfig, RunProfile};
use slotwatch_core::site::SiteRegistry;
use slotwatch_engine::{
    ApplicationChecker, BrowserLeaseFactory, CheckError, CheckOutcome, LeaseFactory, SiteDriver,
};
use std::path::Path;

/// One-shot pass over a single site, without the repeating timer.
pub async fn execute(sites: &Path, apps: &Path, site_key: &str) -> Result<()> {
    let registry = SiteRegistry::from_json_file(sites)?;
    let site = registry.get(site_key)?;

    let applications: Vec<_> = load_applications(apps)?
        .into_iter()
        .filter(|a| a.is_active() && a.site_key == site_key)
        .collect();
    if applications.is_empty() {
        bail!("no active applications for site '{}'", site_key);
    }

    // One-shot checks assume an operator at the keyboard.
    let config = EngineConfig::for_profile(RunProfile::Interactive);
    let driver = SiteDriver::from_config(&config)?;
    let factory = BrowserLeaseFactory::new(config.profile);
    let handle = factory.create(site).await?;

    println!(
        "Checking {} application(s) against {}",
        applications.len(),
        style(&site.name).bold()
    );

    for application in &applications {
        match driver.check(site, application, &handle).await {
            Ok(CheckOutcome::NoSlots) => {
                println!("  {} — no slots", application.id);
            }
            Ok(CheckOutcome::SlotsFound { booked }) => {
                let extra = match booked {
                    Some(true) => " (booking confirmed)",
                    Some(false) => " (booking not confirmed)",
                    None => "",
                };
                println!(
                    "  {} — {}{}",
                    application.id,
                    style("slots available").green().bold(),
                    extra
                );
            }
            Err(CheckError::Throttled) => {
                println!(
                    "  {} — {}",
                    application.id,
                    style("rate limited, stopping pass").yellow()
                );
                break;
            }
            Err(e) => {
                println!("  {} — check failed: {}", application.id, e);
            }
        }
    }

    factory.close(handle).await;
    Ok(())
}
