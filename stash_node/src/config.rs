use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StashNodeConfig {
    pub identity: NodeConfigIdentity,
    pub storage: NodeConfigStorage,
    #[serde(default)]
    pub http: NodeConfigHttp,
    #[serde(default)]
    pub token: NodeConfigToken,
    /// Accounts by username.
    #[serde(default)]
    pub account: BTreeMap<String, NodeConfigAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfigIdentity {
    /// Token signing key, relative to the config file's directory unless
    /// absolute.
    pub secret_key_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfigStorage {
    /// Directory holding one subdirectory per namespace.
    pub base_path: String,
    /// Where folder archives are staged; the system temp dir if unset.
    #[serde(default)]
    pub archive_tmp_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfigHttp {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for NodeConfigHttp {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfigToken {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for NodeConfigToken {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfigAccount {
    pub namespace: String,
    /// `hex(salt):hex(digest)`, see [`crate::accounts::hash_password`].
    pub password_hash: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_upload_bytes() -> u64 {
    1 << 30
}

fn default_ttl_secs() -> u64 {
    stash_core::token::DEFAULT_TOKEN_TTL.as_secs()
}

impl StashNodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let toml_content = std::fs::read_to_string(path)
            .with_context(|| format!("could not read node config file {path:?}"))?;
        toml::from_str(&toml_content).with_context(|| format!("could not parse node config file {path:?}"))
    }
}

/// Resolves a config-relative path against the directory of the config file.
pub fn resolve_path(config_dir: Option<&Path>, value: &str) -> PathBuf {
    let path = Path::new(value);
    match config_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}
