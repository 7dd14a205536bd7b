//! Off-chain signing key (Ed25519). Used to sign the OCR2 gossip/consensus
//! traffic, not the on-chain report (spec §4.A).

use crate::error::OcrError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Public identifier: hex of the raw 32-byte public key.
pub type OffchainKeyId = String;

pub struct OffchainSigningKey {
    signing_key: SigningKey,
}

impl OffchainSigningKey {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn to_seed_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// The public identifier used throughout the store and job spec: hex of
    /// the raw public key bytes.
    pub fn id(&self) -> OffchainKeyId {
        hex::encode(self.public_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    /// R3: export-then-import must round-trip.
    pub fn export(&self) -> [u8; 32] {
        self.to_seed_bytes()
    }

    pub fn import(seed: [u8; 32]) -> Self {
        Self::from_seed(&seed)
    }
}

pub fn verify(public_key: &VerifyingKey, message: &[u8], signature: &Signature) -> Result<(), OcrError> {
    public_key
        .verify(message, signature)
        .map_err(|e| OcrError::crypto(format!("ed25519 verification failed: {e}")))
}

pub fn key_id_from_public(public_key: &VerifyingKey) -> OffchainKeyId {
    hex::encode(public_key.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_import_round_trips() {
        let key = OffchainSigningKey::generate();
        let id = key.id();
        let seed = key.export();
        let restored = OffchainSigningKey::import(seed);
        assert_eq!(restored.id(), id);
    }

    #[test]
    fn sign_and_verify() {
        let key = OffchainSigningKey::generate();
        let msg = b"round trip message";
        let sig = key.sign(msg);
        verify(&key.public_key(), msg, &sig).unwrap();
    }

    #[test]
    fn id_is_hex_of_public_key() {
        let key = OffchainSigningKey::generate();
        assert_eq!(key.id(), hex::encode(key.public_key().to_bytes()));
        assert_eq!(key.id().len(), 64);
    }
}
