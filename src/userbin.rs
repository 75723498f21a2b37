//! User-bin symlink management: at most one symlink per tool name.

use crate::config::Config;
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

fn link_path(config: &Config, tool: &str) -> PathBuf {
    config.user_bin_dir.join(tool)
}

/// Point `<userBinDir>/<tool>` at `target`, replacing any existing entry.
pub fn create_symlink(config: &Config, target: &Path, tool: &str) -> Result<()> {
    println!("{} {} {}", "==>".blue().bold(), "Link", tool.blue().bold());

    let link = link_path(config, tool);
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link)
            .with_context(|| format!("could not replace {}", link.display()))?;
    }

    symlink(target, &link)
        .with_context(|| format!("could not create symlink {}", link.display()))?;
    Ok(())
}

/// Remove the tool's symlink, ignoring a missing one.
pub fn remove_symlink(config: &Config, tool: &str) -> Result<()> {
    println!("{} {} {}", "==>".blue().bold(), "Unlink", tool.blue().bold());

    let link = link_path(config, tool);
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link)
            .with_context(|| format!("could not remove {}", link.display()))?;
    }
    Ok(())
}

/// The symlink's target, or `None` when no symlink exists.
pub fn read_symlink(config: &Config, tool: &str) -> Result<Option<PathBuf>> {
    let link = link_path(config, tool);
    if link.symlink_metadata().is_err() {
        return Ok(None);
    }

    let target = fs::read_link(&link)
        .with_context(|| format!("could not read symlink {}", link.display()))?;
    Ok(Some(target))
}

/// Whether anything exists under the tool's name in the user bin dir.
pub fn has_symlink(config: &Config, tool: &str) -> bool {
    link_path(config, tool).symlink_metadata().is_ok()
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks are not supported here"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn test_config(bin_dir: &std::path::Path) -> Config {
        Config {
            data_dir: bin_dir.join("data"),
            user_bin_dir: bin_dir.to_path_buf(),
            registry_url: "http://example.com/registry.json".to_string(),
            registry_pub_key: config::hardcoded_public_key(),
        }
    }

    #[test]
    fn link_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let target = dir.path().join("run");
        fs::write(&target, b"#!/bin/sh\n").unwrap();

        assert!(!has_symlink(&config, "mytool"));
        assert!(read_symlink(&config, "mytool").unwrap().is_none());

        create_symlink(&config, &target, "mytool").unwrap();
        assert!(has_symlink(&config, "mytool"));
        assert_eq!(read_symlink(&config, "mytool").unwrap().unwrap(), target);

        // Re-linking replaces the previous entry.
        let other = dir.path().join("run2");
        fs::write(&other, b"#!/bin/sh\n").unwrap();
        create_symlink(&config, &other, "mytool").unwrap();
        assert_eq!(read_symlink(&config, "mytool").unwrap().unwrap(), other);

        remove_symlink(&config, "mytool").unwrap();
        assert!(!has_symlink(&config, "mytool"));

        // Removing an absent link is not an error.
        remove_symlink(&config, "mytool").unwrap();
    }

    #[test]
    fn dangling_symlink_is_still_visible() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let target = dir.path().join("vanished");
        fs::write(&target, b"x").unwrap();

        create_symlink(&config, &target, "ghost").unwrap();
        fs::remove_file(&target).unwrap();

        assert!(has_symlink(&config, "ghost"));
        assert_eq!(read_symlink(&config, "ghost").unwrap().unwrap(), target);
    }
}
