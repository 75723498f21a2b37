use anyhow::Result;
use toolbelt::config::Config;
use toolbelt::userbin;

pub fn unlink(config: &Config, tool: &str) -> Result<()> {
    if userbin::has_symlink(config, tool) {
        userbin::remove_symlink(config, tool)?;
    } else {
        println!("{} is not linked (or installed)", tool);
    }
    Ok(())
}
