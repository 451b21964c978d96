use anyhow::Result;
use console::style;
use slotwatch_core::site::SiteRegistry;
use std::path::Path;

pub fn execute(sites: &Path) -> Result<()> {
    let registry = SiteRegistry::from_json_file(sites)?;

    println!(
        "{} ({} configured)",
        style("Monitored sites").bold().underlined(),
        registry.len()
    );

    let mut entries: Vec<_> = registry.iter().collect();
    entries.sort_by_key(|site| site.key.clone());

    for site in entries {
        println!("  {:<16} {}", style(&site.key).cyan(), site.name);
        println!("  {:<16} login:        {}", "", site.login_url);
        println!("  {:<16} appointments: {}", "", site.appointment_url);
    }

    Ok(())
}
