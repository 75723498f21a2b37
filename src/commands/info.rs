use anyhow::{anyhow, Result};
use colored::Colorize;
use toolbelt::config::Config;
use toolbelt::registry::{Source, ToolArtifact};
use toolbelt::repository::Repository;

pub fn info(config: &Config, tool: &str) -> Result<()> {
    let repo = Repository::load(&config.data_dir)?;
    let registry = super::load_registry(config)?;

    let tool_info = registry
        .tools
        .get(tool)
        .ok_or_else(|| anyhow!("could not find tool '{}' in the registry", tool))?;

    println!("Available versions for '{}':", tool);
    for version in &tool_info.versions {
        let installed = repo.find_tool_version(tool, version.version);
        let marker = if installed.is_some() { " (installed)" } else { "" };
        println!("  * {}{}", version.version.to_string().bold(), marker);

        if let Some(installed) = installed {
            match repo.installed_size(installed) {
                Ok(size) => println!("    - size        : {}", format_size(size)),
                Err(e) => println!("    - size        : error: {}", e),
            }
        }

        for artifact in &version.artifacts {
            match artifact {
                ToolArtifact::Docker(docker) => {
                    println!("    - platform    : docker");
                    println!("      image       : {}:{}", docker.image, docker.tag);
                }
                ToolArtifact::Executable(exec) => {
                    if let Some(interpreter) = &exec.interpreter {
                        println!("    - platform    : interpreter");
                        println!("      interpreter : {}", interpreter.name());
                    } else {
                        println!("    - platform    : {}", exec.platform);
                        println!("      CPU arch    : {}", exec.arch);
                    }

                    match &exec.source {
                        Source::File { url, .. } => println!("    - source file : {}", url),
                        Source::Tar { url, .. } => println!("    - source tar  : {}", url),
                        Source::Git { url, .. } => println!("    - source git  : {}", url),
                    }
                }
            }
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
