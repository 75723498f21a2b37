use anyhow::Result;
use colored::Colorize;
use regex::Regex;
use toolbelt::config::Config;
use toolbelt::repository::Repository;

/// List catalog tools, marking installed ones with `*`. The optional
/// pattern filters by name substring, topic, or regular expression.
pub fn list(config: &Config, pattern: Option<&str>) -> Result<()> {
    let repo = Repository::load(&config.data_dir)?;
    let registry = super::load_registry(config)?;

    let matcher = pattern.map(|raw| (raw, Regex::new(raw).ok()));

    println!("Available tools in the registry:");
    for (name, info) in &registry.tools {
        if let Some((raw, regex)) = &matcher {
            let by_name = name.contains(raw);
            let by_topic = info.topics.iter().any(|topic| topic == raw);
            let by_regex = regex.as_ref().map(|r| r.is_match(name)).unwrap_or(false);
            if !by_name && !by_topic && !by_regex {
                continue;
            }
        }

        let marker = if repo.is_tool_installed(name) { " *" } else { "" };
        println!(
            "  {:<32} {}",
            format!("{}{}", name, marker).bold(),
            info.desc
        );
    }

    Ok(())
}
