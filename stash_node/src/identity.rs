use anyhow::{Context, anyhow};
use base64::Engine;
use stash_core::SigningKey;
use std::path::Path;
use zeroize::Zeroizing;

use crate::config::{NodeConfigIdentity, resolve_path};

/// Load the token signing key named by the node config.
///
/// The `config_dir` should be the directory containing the config file,
/// used to resolve relative `secret_key_file` paths. The file may hold the
/// key as hex, unpadded base64url, or 32 raw bytes.
pub fn load_signing_key(
    identity: &NodeConfigIdentity,
    config_dir: Option<&Path>,
) -> anyhow::Result<SigningKey> {
    let path = resolve_path(config_dir, &identity.secret_key_file);
    let bytes = Zeroizing::new(
        std::fs::read(&path).with_context(|| format!("could not read signing key file {path:?}"))?,
    );

    if let Ok(s) = std::str::from_utf8(&bytes)
        && let Some(key) = parse_signing_key_string(s)
    {
        return Ok(key);
    }
    parse_signing_key_bytes(&bytes)
        .ok_or_else(|| anyhow!("signing key file {path:?} does not contain a 32-byte key"))
}

pub fn parse_signing_key_string(s: &str) -> Option<SigningKey> {
    let s = s.trim();
    if let Ok(bytes) = hex::decode(s).map(Zeroizing::new)
        && let Some(key) = parse_signing_key_bytes(&bytes)
    {
        return Some(key);
    }
    if let Ok(bytes) = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(s)
        .map(Zeroizing::new)
        && let Some(key) = parse_signing_key_bytes(&bytes)
    {
        return Some(key);
    }
    None
}

pub fn parse_signing_key_bytes(bytes: &[u8]) -> Option<SigningKey> {
    let arr: [u8; 32] = bytes.try_into().ok()?;
    Some(SigningKey::new(arr))
}
