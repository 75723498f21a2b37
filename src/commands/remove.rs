use anyhow::{anyhow, bail, Result};
use colored::Colorize;
use toolbelt::config::Config;
use toolbelt::repository::Repository;
use toolbelt::userbin;
use toolbelt::version::VersionTriplet;

pub fn remove(config: &Config, tool: &str, version_selector: Option<&str>) -> Result<()> {
    let mut repo = Repository::load(&config.data_dir)?;

    if !repo.is_tool_installed(tool) && !userbin::has_symlink(config, tool) {
        println!("{} is not installed", tool);
        return Ok(());
    }

    match version_selector {
        // No version given: drop the symlink and every installed version.
        None => {
            if userbin::has_symlink(config, tool) {
                userbin::remove_symlink(config, tool)?;
            }

            if repo.is_tool_installed(tool) {
                let versions: Vec<VersionTriplet> = repo
                    .tools
                    .get(tool)
                    .map(|t| t.versions.iter().map(|v| v.version).collect())
                    .unwrap_or_default();

                for version in versions {
                    repo.uninstall_tool_version(tool, version)?;
                }
                repo.uninstall_tool(tool)?;
            }

            println!("{} {} has left the rocket ship", "✓".green().bold(), tool.bold());
        }

        Some(selector) => {
            let version: VersionTriplet = selector
                .parse()
                .map_err(|_| anyhow!("invalid version: {}", selector))?;

            let installed = match repo.find_tool_version(tool, version) {
                Some(installed) => installed,
                None => bail!("unable to find version {}/{}", tool, selector),
            };
            let run = installed.executable_path();

            let linked = userbin::read_symlink(config, tool)?;
            repo.uninstall_tool_version(tool, version)?;

            // Only drop the symlink when it pointed at the removed version.
            if linked.as_deref() == Some(run.as_path()) {
                userbin::remove_symlink(config, tool)?;
            }

            let now_empty = repo
                .tools
                .get(tool)
                .map(|t| !t.has_installed_versions())
                .unwrap_or(false);
            if now_empty {
                repo.uninstall_tool(tool)?;
            }

            println!(
                "{} {}/{} has left the rocket ship",
                "✓".green().bold(),
                tool.bold(),
                version
            );
        }
    }

    Ok(())
}
