//! Gossip keyring derivation from shared cluster tokens.
//!
//! Operators configure an ordered list of cluster tokens; rotation is
//! "prepend the new token, keep the old one(s)". Only one-way hashes of the
//! tokens cross into the gossip layer, never the tokens themselves.

use log::warn;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Key length the gossip layer accepts. SHA-256 output, so derivation always
/// produces conforming keys.
pub const GOSSIP_KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("gossip key must be {GOSSIP_KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// Ordered symmetric keys for the gossip plane: one primary encryption key
/// plus legacy keys retained to verify traffic from peers that have not yet
/// rotated.
#[derive(Clone, PartialEq, Eq)]
pub struct GossipKeyring {
    primary: Vec<u8>,
    legacy: Vec<Vec<u8>>,
}

impl GossipKeyring {
    /// Build a keyring, rejecting keys of the wrong length. Derivation via
    /// [`derive_keyring`] cannot produce such keys, but the gossip layer's
    /// contract must surface the failure instead of panicking.
    pub fn new(primary: Vec<u8>, legacy: Vec<Vec<u8>>) -> Result<Self, KeyringError> {
        if primary.len() != GOSSIP_KEY_LEN {
            return Err(KeyringError::InvalidKeyLength(primary.len()));
        }
        if let Some(bad) = legacy.iter().find(|key| key.len() != GOSSIP_KEY_LEN) {
            return Err(KeyringError::InvalidKeyLength(bad.len()));
        }
        Ok(Self { primary, legacy })
    }

    /// The active encryption key.
    pub fn primary(&self) -> &[u8] {
        &self.primary
    }

    /// Verification-only keys from earlier rotations, oldest last.
    pub fn legacy(&self) -> &[Vec<u8>] {
        &self.legacy
    }

    /// Total number of keys in the ring; at least 1.
    pub fn key_count(&self) -> usize {
        1 + self.legacy.len()
    }
}

impl fmt::Debug for GossipKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GossipKeyring")
            .field("primary", &"<redacted>")
            .field("legacy", &self.legacy.len())
            .finish()
    }
}

/// Derive the gossip keyring from the configured tokens.
///
/// With no tokens the server name is hashed as the sole key, so a cluster
/// without operator secrets still encrypts gossip with a deterministic,
/// operator-visible key. That mode is for test/dev deployments and is logged
/// as such.
pub fn derive_keyring(tokens: &[String], server_name: &str) -> Result<GossipKeyring, KeyringError> {
    let mut hashed: Vec<Vec<u8>> = tokens
        .iter()
        .map(|token| Sha256::digest(token.as_bytes()).to_vec())
        .collect();

    match hashed.len() {
        0 => {
            warn!(
                "event=keyring_fallback server_name={server_name} no cluster tokens configured; gossip key derived from server name"
            );
            let primary = Sha256::digest(server_name.as_bytes()).to_vec();
            GossipKeyring::new(primary, Vec::new())
        }
        1 => GossipKeyring::new(hashed.remove(0), Vec::new()),
        _ => {
            let primary = hashed.remove(0);
            GossipKeyring::new(primary, hashed)
        }
    }
}
