//! Identity tokens binding a request to a single namespace.
//!
//! A token is `base64url(cbor(claims)) "." base64url(mac)` where `mac` is a
//! BLAKE3 keyed hash over a domain label and the encoded claims. Both halves
//! are URL and header safe.
//!
//! Verification reports every failure (bad encoding, bad MAC, unknown
//! version, expiry) as the same [`StashError::Unauthenticated`]. The concrete
//! reason only reaches the debug log.

use crate::{StashError, StashResult};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64_URL};
use chrono::{DateTime, Utc};
use minicbor::{Decode, Encode};
use std::time::Duration;
use zeroize::Zeroize;

/// Token lifetime used when the node config does not override it.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

const TOKEN_VERSION: u8 = 1;
const MAC_CONTEXT: &[u8] = b"stash/identity-token/v1";

/// Secret key used to sign identity tokens (32 bytes).
#[derive(Clone)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[derive(Encode, Decode, Clone, Debug, PartialEq, Eq)]
#[cbor(array)]
struct TokenClaims {
    #[n(0)]
    version: u8,
    #[n(1)]
    namespace: String,
    /// Unix seconds.
    #[n(2)]
    issued_at: i64,
    /// Unix seconds.
    #[n(3)]
    expires_at: i64,
}

/// Issues and verifies identity tokens with one process-wide key.
#[derive(Clone, Debug)]
pub struct TokenCodec {
    key: SigningKey,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(key: SigningKey, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, namespace: &str) -> StashResult<String> {
        self.issue_at(namespace, Utc::now())
    }

    pub fn issue_at(&self, namespace: &str, now: DateTime<Utc>) -> StashResult<String> {
        let issued_at = now.timestamp();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = TokenClaims {
            version: TOKEN_VERSION,
            namespace: namespace.to_owned(),
            issued_at,
            expires_at: issued_at.saturating_add(ttl_secs),
        };
        let payload = minicbor::to_vec(&claims).map_err(|err| {
            StashError::internal("failed to encode identity token", std::io::Error::other(err.to_string()))
        })?;
        let mac = self.mac(&payload);
        Ok(format!(
            "{}.{}",
            B64_URL.encode(&payload),
            B64_URL.encode(mac.as_bytes())
        ))
    }

    /// Returns the namespace id carried by `token`.
    pub fn verify(&self, token: &str) -> StashResult<String> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> StashResult<String> {
        self.check(token, now).map_err(|reason| {
            tracing::debug!(reason, "identity token rejected");
            StashError::Unauthenticated
        })
    }

    fn check(&self, token: &str, now: DateTime<Utc>) -> Result<String, &'static str> {
        let (payload_b64, mac_b64) = token.trim().split_once('.').ok_or("malformed")?;
        let payload = B64_URL.decode(payload_b64).map_err(|_| "malformed")?;
        let mac: [u8; 32] = B64_URL
            .decode(mac_b64)
            .map_err(|_| "malformed")?
            .try_into()
            .map_err(|_| "malformed")?;

        // blake3::Hash equality is constant time.
        if self.mac(&payload) != blake3::Hash::from(mac) {
            return Err("bad signature");
        }

        let claims: TokenClaims = minicbor::decode(&payload).map_err(|_| "malformed")?;
        if claims.version != TOKEN_VERSION {
            return Err("unsupported version");
        }
        if now.timestamp() > claims.expires_at {
            return Err("expired");
        }
        Ok(claims.namespace)
    }

    fn mac(&self, payload: &[u8]) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(self.key.as_bytes());
        hasher.update(MAC_CONTEXT);
        hasher.update(payload);
        hasher.finalize()
    }
}
