use anyhow::Result;
use colored::Colorize;
use toolbelt::{upgrade, TOOL_VERSION};

pub fn upgrade() -> Result<()> {
    let latest = upgrade::latest_release()?;

    if latest.version <= TOOL_VERSION {
        println!("You already run the latest version");
        return Ok(());
    }

    println!(
        "{} {} from {} -> to {}",
        "==>".magenta().bold(),
        "Upgrading",
        TOOL_VERSION,
        latest.version
    );

    upgrade::perform_upgrade(&latest)?;
    println!(
        "{} Upgraded to version {}",
        "✓".green().bold(),
        latest.version
    );
    Ok(())
}
