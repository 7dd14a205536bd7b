//! `ConfigDigest` construction (spec §3, §4.A).
//!
//! 32 bytes; byte 0 = 0x00, byte 1 = 0x02 (domain prefix), bytes 2..31 are
//! a Keccak-256 truncation of a canonical serialization of the feed config
//! concatenated with separator `\x01\x02` and the chain id. The first two
//! bytes are overwritten with the domain prefix *after* hashing, so the
//! digest is not a pure hash of its own first two bytes — but it is still
//! a pure function of `(config, chain_id)` (R2).

use crate::codec::canonical_config_bytes;
use crate::error::OcrError;
use serde::{Deserialize, Serialize};
use sha3::{Digest as _, Keccak256};

pub const DOMAIN_PREFIX: [u8; 2] = [0x00, 0x02];
const SEPARATOR: [u8; 2] = [0x01, 0x02];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigDigest(pub [u8; 32]);

impl ConfigDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// I2: digest[0]==0x00 && digest[1]==0x02.
    pub fn has_domain_prefix(&self) -> bool {
        self.0[0] == DOMAIN_PREFIX[0] && self.0[1] == DOMAIN_PREFIX[1]
    }
}

/// Minimal config-relevant fields the digester needs. The full
/// `ContractConfig` (spec §3) carries more; only these participate in the
/// digest.
pub struct DigestInput<'a> {
    pub feed_id: &'a str,
    pub config_count: u64,
    pub signers: &'a [Vec<u8>],
    pub transmitters: &'a [Vec<u8>],
    pub f: u8,
    pub onchain_config: &'a [u8],
    pub offchain_config_version: u64,
    pub offchain_config: &'a [u8],
}

/// Computes the `ConfigDigest`. Refuses to operate without both
/// `chain_id` and `feed_id` (spec §4.A).
pub fn compute(input: &DigestInput<'_>, chain_id: &str) -> Result<ConfigDigest, OcrError> {
    if chain_id.is_empty() {
        return Err(OcrError::validation("config digest requires a chain_id"));
    }
    if input.feed_id.is_empty() {
        return Err(OcrError::validation("config digest requires a feed_id"));
    }

    let mut hasher = Keccak256::new();
    hasher.update(canonical_config_bytes(input));
    hasher.update(SEPARATOR);
    hasher.update(chain_id.as_bytes());
    let hash = hasher.finalize();

    let mut out = [0u8; 32];
    out.copy_from_slice(&hash[..32]);
    // Overwritten after hashing — the digest is not a pure hash of bytes 0-1.
    out[0] = DOMAIN_PREFIX[0];
    out[1] = DOMAIN_PREFIX[1];

    Ok(ConfigDigest(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> DigestInput<'static> {
        DigestInput {
            feed_id: "BTC/USD",
            config_count: 1,
            signers: &[],
            transmitters: &[],
            f: 1,
            onchain_config: &[],
            offchain_config_version: 1,
            offchain_config: &[],
        }
    }

    #[test]
    fn domain_prefix_always_present() {
        let digest = compute(&sample_input(), "injective-1").unwrap();
        assert!(digest.has_domain_prefix());
    }

    #[test]
    fn pure_function_of_inputs() {
        let a = compute(&sample_input(), "injective-1").unwrap();
        let b = compute(&sample_input(), "injective-1").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn chain_id_changes_digest() {
        let a = compute(&sample_input(), "injective-1").unwrap();
        let b = compute(&sample_input(), "injective-888").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_chain_id_rejected() {
        assert!(compute(&sample_input(), "").is_err());
    }

    #[test]
    fn empty_feed_id_rejected() {
        let mut input = sample_input();
        input.feed_id = "";
        assert!(compute(&input, "injective-1").is_err());
    }
}
