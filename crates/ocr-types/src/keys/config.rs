//! Config-encryption key (X25519 / Curve25519), spec §4.A.
//!
//! Used to derive a shared point by multiplying the peer's public config
//! point; the offchain config blob is then sealed against that shared
//! secret by the embedding (out of scope here — we only provide the DH
//! primitive).

use x25519_dalek::{PublicKey, StaticSecret};

pub struct ConfigEncryptionKey {
    secret: StaticSecret,
}

impl ConfigEncryptionKey {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(rand::rngs::OsRng),
        }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Public identifier: hex of the raw public point.
    pub fn id(&self) -> String {
        hex::encode(self.public_key().to_bytes())
    }

    /// Multiply the peer's public config point by our secret scalar,
    /// yielding the shared point used to derive the offchain-config seal.
    pub fn shared_point(&self, peer_public: &PublicKey) -> [u8; 32] {
        self.secret.diffie_hellman(peer_public).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_point_agrees_both_directions() {
        let a = ConfigEncryptionKey::generate();
        let b = ConfigEncryptionKey::generate();
        assert_eq!(
            a.shared_point(&b.public_key()),
            b.shared_point(&a.public_key())
        );
    }

    #[test]
    fn round_trips_bytes() {
        let a = ConfigEncryptionKey::generate();
        let bytes = a.to_bytes();
        let restored = ConfigEncryptionKey::from_bytes(bytes);
        assert_eq!(restored.id(), a.id());
    }
}
