//! Self-upgrade: discover the latest release and replace the running
//! executable in place.
//!
//! The protocol tolerates a crash between any two steps: the running binary
//! is renamed to `<path>.bak` before the new one is written, any failure
//! restores the backup, and the freshly written binary is handed
//! `complete-upgrade <bak>` to delete the backup once the old process has
//! exited.

use crate::config::RELEASES_URL;
use crate::pipeline::{DownloadFlags, Pipeline};
use crate::version::VersionTriplet;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

/// A published release that can replace this binary.
#[derive(Debug, Clone)]
pub struct LatestRelease {
    pub version: VersionTriplet,
    pub url: String,
}

/// Conventional artifact suffix for this host.
fn platform_asset_suffix() -> &'static str {
    if cfg!(target_os = "macos") {
        ".darwin"
    } else {
        ".linux"
    }
}

/// Query the release endpoint for the newest published version and the
/// download URL of this host's asset.
pub fn latest_release() -> Result<LatestRelease> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("tbx/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(10))
        .build()?;

    let release: Release = client
        .get(RELEASES_URL)
        .send()
        .context("error getting the latest version info")?
        .error_for_status()
        .context("error getting the latest version info")?
        .json()
        .context("error parsing the version info")?;

    let tag = release
        .tag_name
        .strip_prefix('v')
        .context("invalid tag name")?;
    let version: VersionTriplet = tag.parse()?;

    let suffix = platform_asset_suffix();
    let url = release
        .assets
        .iter()
        .map(|asset| asset.browser_download_url.as_str())
        .find(|url| url.ends_with(suffix))
        .context("could not find a download URL for this platform")?
        .to_string();

    Ok(LatestRelease { version, url })
}

/// Atomically replace the running executable with `release`.
///
/// On success the caller must exit: the replacement binary has been spawned
/// to clean up the backup and the on-disk executable is no longer this
/// program.
pub fn perform_upgrade(release: &LatestRelease) -> Result<()> {
    let target = std::env::current_exe().context("could not find the location of the tool")?;
    let backup = target.with_extension("bak");

    fs::rename(&target, &backup).context("could not rename the old version")?;

    let downloaded = Pipeline::download(&release.url, DownloadFlags::default())
        .show_progress("Downloading")
        .decompress_if_compressed()
        .write_to(&target);

    if let Err(e) = downloaded {
        let _ = fs::remove_file(&target);
        let _ = fs::rename(&backup, &target);
        bail!("could not fetch the new version: {}", e);
    }

    if let Err(e) = make_executable(&target) {
        let _ = fs::remove_file(&target);
        let _ = fs::rename(&backup, &target);
        return Err(e);
    }

    // Hand off to the new binary; it waits for us to exit and removes the
    // backup file.
    let spawned = Command::new(&target)
        .arg("complete-upgrade")
        .arg(&backup)
        .spawn();

    if let Err(e) = spawned {
        let _ = fs::remove_file(&target);
        let _ = fs::rename(&backup, &target);
        bail!("could not run the new version: {}", e);
    }

    Ok(())
}

/// Second half of the handoff, run by the freshly installed binary.
pub fn complete_upgrade(backup: &str) -> Result<()> {
    // Let the parent process exit before touching its old executable.
    std::thread::sleep(Duration::from_millis(500));

    fs::remove_file(backup).context("could not remove the old version")?;
    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("could not chmod {}", path.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> Result<()> {
    Ok(())
}
