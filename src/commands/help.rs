use anyhow::{anyhow, Result};
use colored::Colorize;
use toolbelt::config::Config;
use toolbelt::pipeline::{DownloadFlags, Pipeline};
use toolbelt::registry::ToolHelp;

pub fn help(config: &Config, tool: &str) -> Result<()> {
    let registry = super::load_registry(config)?;

    let tool_info = registry
        .tools
        .get(tool)
        .ok_or_else(|| anyhow!("could not find tool '{}' in the registry", tool))?;

    match &tool_info.help {
        Some(ToolHelp::Text { text, .. }) => {
            println!("--=[ {} ]=--", tool.bold());
            println!();
            println!("{}", text);
        }
        Some(ToolHelp::Url { url, inline, .. }) if *inline => {
            println!("--=[ {} ]=--", tool.bold());
            println!();
            let contents = Pipeline::download(url, DownloadFlags::default()).read_all()?;
            println!("{}", String::from_utf8_lossy(&contents));
        }
        Some(ToolHelp::Url { url, .. }) => {
            println!("Help for {} is available at {}", tool.bold(), url);
        }
        None => {
            println!("No help available for this tool");
        }
    }

    Ok(())
}
