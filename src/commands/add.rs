use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use toolbelt::config::Config;
use toolbelt::repository::Repository;
use toolbelt::{resolver, userbin};

pub fn add(config: &Config, tool: &str, version_selector: Option<&str>, force: bool) -> Result<()> {
    let mut repo = Repository::load(&config.data_dir)?;
    let registry = super::load_registry(config)?;

    let tool_info = registry
        .tools
        .get(tool)
        .ok_or_else(|| anyhow!("could not find tool '{}' in the registry", tool))?;

    let version = match version_selector {
        Some(selector) => tool_info.find(selector).map_err(|e| {
            anyhow!("{}: {} (use `tbx info {}` to list available versions)", tool, e, tool)
        })?,
        None => tool_info
            .latest()
            .ok_or_else(|| anyhow!("{}: no published versions", tool))?,
    };

    // Pick the first artifact that can run on this host (CPU architecture,
    // installed interpreters or docker).
    let artifact = resolver::find_runnable_artifact(&version.artifacts)
        .map_err(|e| anyhow!("{}: {}", tool, e))?;

    // An existing symlink either belongs to one of our installed versions
    // (switch or no-op) or to something we must not touch without -f.
    if let Some(target) = userbin::read_symlink(config, tool)? {
        match repo.find_tool_from_link(&target) {
            None => {
                if !force {
                    bail!(
                        "there is already a tool with the same name in your path; \
                         re-run with -f to overwrite it"
                    );
                }
            }
            Some((_, linked)) => {
                if linked.version == version.version {
                    println!(
                        "{} {}/{} is already there",
                        "✓".green().bold(),
                        tool.bold(),
                        version.version
                    );
                    return Ok(());
                }

                if let Some(installed) = repo.find_tool_version(tool, version.version) {
                    let run = installed.executable_path();
                    userbin::create_symlink(config, &run, tool)?;
                    println!(
                        "{} switched {} to {}",
                        "✓".green().bold(),
                        tool.bold(),
                        version.version
                    );
                    return Ok(());
                }
            }
        }
    }

    let run = repo
        .install_tool_version(tool, version, artifact)
        .with_context(|| tool.to_string())?;
    userbin::create_symlink(config, &run, tool)?;

    println!(
        "{} {}/{} has landed",
        "✓".green().bold(),
        tool.bold(),
        version.version
    );
    Ok(())
}
