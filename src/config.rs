//! Paths, catalog endpoints and the pinned catalog signing key.

use crate::version::VersionTriplet;
use anyhow::{Context, Result};
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use std::path::PathBuf;

/// Version of this build, compared against the catalog's `toolVersion` gate
/// and against published releases during self-upgrade.
pub const TOOL_VERSION: VersionTriplet = VersionTriplet(0, 2, 0);

/// Where the signed catalog is published.
const REGISTRY_URL: &str = "https://registry.toolbelt.sh/registry.json";

/// Release metadata endpoint used by self-upgrade.
pub const RELEASES_URL: &str = "https://api.github.com/repos/toolbelt/toolbelt/releases/latest";

/// The catalog signing key, pinned at build time. Tampering with this
/// constant must break the build's ability to accept any catalog.
const REGISTRY_PUBLIC_KEY_PEM: &str = "\
-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEArXiNKocrlaY2pmCEb4W8
5fksEky77ycdgdgYK3NCSZV6ScJzmcIcr6KzCK6TLxgTbjP3k+j5ie5p7T2WXJ+m
Z3KKDSxcIrkEWrYcooG7/8WQIuOmIrMIboCVOOc/Cjc/WVBhuGeFqBFhiXiBNWLq
fYb9yfPgyTm1pen5CvAqtVLSKXRVCwZ+vm1UqZgH1KOWZSGZpG3DrtCeB5yVo3j9
oBYd/TWQJtoJuxlxrSUE/JmT8ESgBC3c6sPoUogwQXaJS3ymwBAhdZXWtUNg9tub
Q227FC7W8BPrlXhGyllus4EYwvXLld2QPXGKiFouFVq/LjtSyhD05qz9NoGWkoi7
jQIDAQAB
-----END PUBLIC KEY-----";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the local repository (`pkg/`, `tools/`, cached catalog).
    pub data_dir: PathBuf,
    /// Directory receiving one symlink per linked tool.
    pub user_bin_dir: PathBuf,
    pub registry_url: String,
    pub registry_pub_key: RsaPublicKey,
}

impl Config {
    pub fn default_config() -> Result<Config> {
        let home = std::env::var_os("HOME").context("HOME is not set")?;

        Ok(Config {
            data_dir: PathBuf::from(home).join(".toolbelt"),
            user_bin_dir: PathBuf::from("/usr/local/bin"),
            registry_url: REGISTRY_URL.to_string(),
            registry_pub_key: hardcoded_public_key(),
        })
    }
}

/// Parse the embedded signing key.
///
/// This is a build-time invariant, so a corrupt constant panics instead of
/// surfacing a recoverable error.
pub fn hardcoded_public_key() -> RsaPublicKey {
    RsaPublicKey::from_public_key_pem(REGISTRY_PUBLIC_KEY_PEM)
        .expect("embedded registry public key is not a valid PKIX PEM block")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_key_parses() {
        let key = hardcoded_public_key();
        use rsa::traits::PublicKeyParts;
        assert!(key.size() >= 256);
    }

    #[test]
    fn default_paths() {
        let config = Config::default_config().unwrap();
        assert!(config.data_dir.ends_with(".toolbelt"));
        assert_eq!(config.user_bin_dir, PathBuf::from("/usr/local/bin"));
    }
}
