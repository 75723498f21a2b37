//! One module per CLI command.

pub mod add;
pub mod help;
pub mod info;
pub mod list;
pub mod remove;
pub mod unlink;
pub mod update;
pub mod upgrade;

use anyhow::{bail, Result};
use toolbelt::config::Config;
use toolbelt::registry::Registry;
use toolbelt::{catalog, TOOL_VERSION};

/// Load the catalog, refusing to use one that targets a newer tool binary.
pub fn load_registry(config: &Config) -> Result<Registry> {
    let registry = catalog::get_registry(config)?;
    if registry.requires_newer_tool(TOOL_VERSION) {
        bail!("your tool is outdated, run `tbx upgrade` to get the latest version");
    }
    Ok(registry)
}
