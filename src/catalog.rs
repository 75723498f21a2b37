//! Signed catalog acquisition and the on-disk cache.
//!
//! The catalog lives next to the repository as `registry.json`. A cached
//! copy younger than [`CACHE_TTL`] is served from disk; otherwise the
//! detached signature is fetched first and the payload is verified while it
//! streams in. The cache is rewritten atomically so a crash mid-refresh
//! never leaves a truncated catalog behind.

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::{DownloadFlags, Pipeline};
use crate::registry::Registry;
use anyhow::Context;
use rsa::RsaPublicKey;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// How long a cached catalog stays fresh.
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

fn cache_file(config: &Config) -> PathBuf {
    config.data_dir.join("registry.json")
}

/// Load the catalog, refreshing from the network when the cache is stale.
pub fn get_registry(config: &Config) -> Result<Registry> {
    ensure_data_dir(config)?;

    let cache = cache_file(config);
    if is_cache_fresh(&cache) {
        debug!(path = %cache.display(), "loading catalog from cache");
        return registry_from_disk(&cache);
    }

    refresh_registry(config)
}

/// Force-refresh the catalog from the configured URL.
pub fn update_registry(config: &Config) -> Result<Registry> {
    ensure_data_dir(config)?;
    refresh_registry(config)
}

fn ensure_data_dir(config: &Config) -> Result<()> {
    if !config.data_dir.exists() {
        fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("could not create {}", config.data_dir.display()))?;
    }
    Ok(())
}

fn is_cache_fresh(path: &Path) -> bool {
    let modified = match path.metadata().and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };

    SystemTime::now()
        .duration_since(modified)
        .map(|age| age < CACHE_TTL)
        .unwrap_or(false)
}

fn refresh_registry(config: &Config) -> Result<Registry> {
    debug!(url = %config.registry_url, "refreshing catalog");
    let (registry, bytes) =
        registry_from_url(&config.registry_url, config.registry_pub_key.clone())?;

    write_cache_atomically(&cache_file(config), &bytes)?;
    Ok(registry)
}

/// Fetch the detached signature, then the catalog itself, verifying the
/// payload bytes against the pinned key while they stream in.
fn registry_from_url(url: &str, public_key: RsaPublicKey) -> Result<(Registry, Vec<u8>)> {
    let signature = Pipeline::download(&format!("{}.sig", url), DownloadFlags::default())
        .read_all()
        .map_err(|e| anyhow::anyhow!("unable to obtain the registry signature: {}", e))?;

    let bytes = Pipeline::download(url, DownloadFlags::default())
        .decompress_if_compressed()
        .validate_signature(signature, public_key)
        .read_all()
        .map_err(|e| anyhow::anyhow!("unable to fetch the registry: {}", e))?;

    let registry = Registry::parse(&bytes)?;
    Ok((registry, bytes))
}

pub fn registry_from_disk(path: &Path) -> Result<Registry> {
    let bytes =
        fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    Registry::parse(&bytes)
}

/// Replace the cache via a sibling temp file and a rename.
fn write_cache_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("could not write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("could not replace {}", path.display()))?;
    Ok(())
}
