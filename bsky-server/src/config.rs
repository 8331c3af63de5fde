//! Server settings, read from a TOML file.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::http::HttpConfig;

/// DID the server identifies as unless configured otherwise.
pub const DEFAULT_SERVICE_DID: &str = "did:key:z6Mkmi4eUvWtRAP6PNB7MnGfUFdLkGe255ftW9sGo28uv44g";

/// Resource kind of the account attenuations required for updates.
pub const DEFAULT_ACCOUNT_KIND: &str = "bsky";

/// Default limit for request bodies, 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Default bound on proof chains.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = bsky_auth::verify::DEFAULT_MAX_CHAIN_DEPTH;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "BSKY_DATA_DIR";

/// Server settings.
///
/// Every field is optional in the file, missing ones take their [`Default`] value, which
/// serves on port 8080 with blocks in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where to listen.
    pub http: HttpConfig,
    /// The DID tokens must be addressed to.
    pub service_did: String,
    /// Resource kind in the `{"cap": "POST", <kind>: <name>}` attenuation updates need.
    pub account_kind: String,
    /// Maximum size of a request body in bytes.
    pub max_body_size: usize,
    /// Maximum number of proofs between a presented token and its root.
    pub max_chain_depth: usize,
    /// Keep blocks in memory instead of the data directory.
    pub in_memory: bool,
}

impl Config {
    /// Reads a config file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// `$BSKY_DATA_DIR`, or `bsky-server` in the platform data directory.
    pub fn data_dir() -> Result<PathBuf> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return Ok(dir.into());
        }
        dirs_next::data_dir()
            .map(|dir| dir.join("bsky-server"))
            .context("operating environment provides no directory for application data")
    }

    /// The redb file holding all blocks.
    pub fn block_store_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("blocks-1.db"))
    }

    /// In memory, on a free localhost port.
    pub fn for_tests() -> Self {
        Self {
            http: HttpConfig {
                port: 0,
                bind_addr: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            },
            in_memory: true,
            ..Default::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                port: 8080,
                bind_addr: None,
            },
            service_did: DEFAULT_SERVICE_DID.to_string(),
            account_kind: DEFAULT_ACCOUNT_KIND.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            in_memory: false,
        }
    }
}
