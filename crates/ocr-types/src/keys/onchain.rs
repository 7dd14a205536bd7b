//! On-chain signing key: the secp256k1-variant key used by the chain
//! keyring (spec §4.A). The "public key" the protocol actually deals with
//! is the signer's 20-byte account address, Ethermint/eth-style:
//! `keccak256(uncompressed_pubkey[1..])[12..]`.

use crate::error::OcrError;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

/// 20-byte Cosmos/Ethermint-style account address.
pub type Address = [u8; 20];

pub fn address_from_pubkey(pubkey: &PublicKey) -> Address {
    let uncompressed = pubkey.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    addr
}

pub fn address_to_hex(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr))
}

pub struct OnchainSigningKey {
    secret: SecretKey,
}

impl OnchainSigningKey {
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = rand::rngs::OsRng;
        let (secret, _) = secp.generate_keypair(&mut rng);
        Self { secret }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, OcrError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| OcrError::crypto(format!("invalid secp256k1 secret key: {e}")))?;
        Ok(Self { secret })
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        let secp = Secp256k1::new();
        PublicKey::from_secret_key(&secp, &self.secret)
    }

    pub fn address(&self) -> Address {
        address_from_pubkey(&self.public_key())
    }

    /// Signs `digest` (already hashed by the caller, spec §4.B's
    /// `ReportToSign::Digest()`) and returns a 65-byte `r||s||v` signature,
    /// the same shape the protocol's recoverable signatures use on-chain.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<[u8; 65], OcrError> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest)
            .map_err(|e| OcrError::internal(format!("bad digest length: {e}")))?;
        let recoverable = secp.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = recoverable.serialize_compact();
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&compact);
        out[64] = recovery_id.to_i32() as u8;
        Ok(out)
    }
}

/// Recovers the signer's address from a 65-byte `r||s||v` signature over
/// `digest` and compares it against `expected`. This is the on-chain
/// signature validity check from spec §4.B.
pub fn verify_signature(
    digest: &[u8; 32],
    signature: &[u8],
    expected: &Address,
) -> Result<(), OcrError> {
    if signature.len() != 65 {
        return Err(OcrError::validation(format!(
            "signature must be 65 bytes, got {}",
            signature.len()
        )));
    }
    let recovery_id = RecoveryId::from_i32(signature[64] as i32)
        .map_err(|e| OcrError::crypto(format!("bad recovery id: {e}")))?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| OcrError::crypto(format!("malformed signature: {e}")))?;
    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(digest)
        .map_err(|e| OcrError::internal(format!("bad digest length: {e}")))?;
    let recovered = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| OcrError::crypto(format!("signature recovery failed: {e}")))?;
    let recovered_addr = address_from_pubkey(&recovered);
    if &recovered_addr != expected {
        return Err(OcrError::crypto(
            "recovered address does not match declared signer",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_recover_matches_address() {
        let key = OnchainSigningKey::generate();
        let digest = [7u8; 32];
        let sig = key.sign_digest(&digest).unwrap();
        verify_signature(&digest, &sig, &key.address()).unwrap();
    }

    #[test]
    fn wrong_address_rejected() {
        let key = OnchainSigningKey::generate();
        let other = OnchainSigningKey::generate();
        let digest = [9u8; 32];
        let sig = key.sign_digest(&digest).unwrap();
        assert!(verify_signature(&digest, &sig, &other.address()).is_err());
    }

    #[test]
    fn signature_length_bound_enforced() {
        let key = OnchainSigningKey::generate();
        let short = vec![0u8; 64];
        assert!(verify_signature(&[1u8; 32], &short, &key.address()).is_err());
    }

    #[test]
    fn key_round_trips_bytes() {
        let key = OnchainSigningKey::generate();
        let bytes = key.to_bytes();
        let restored = OnchainSigningKey::from_bytes(&bytes).unwrap();
        assert_eq!(restored.address(), key.address());
    }
}
