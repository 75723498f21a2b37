use anyhow::Result;
use colored::Colorize;
use toolbelt::catalog;
use toolbelt::config::Config;

pub fn update(config: &Config) -> Result<()> {
    println!("Updating registry...");
    catalog::update_registry(config)?;
    println!("{} Registry is updated", "✓".green().bold());
    Ok(())
}
