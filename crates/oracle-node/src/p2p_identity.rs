//! P2P identity material: a libp2p ed25519 keypair, persisted through the
//! same encrypted keystore format as the off-chain/on-chain keys.

use libp2p::identity::{ed25519, Keypair};
use ocr_types::OcrError;

pub fn generate() -> (Keypair, [u8; 32]) {
    let kp = ed25519::Keypair::generate();
    let secret_bytes: [u8; 32] = kp
        .secret()
        .as_ref()
        .try_into()
        .expect("ed25519 secret key is always 32 bytes");
    (Keypair::from(kp), secret_bytes)
}

pub fn from_secret(mut bytes: [u8; 32]) -> Result<Keypair, OcrError> {
    let secret = ed25519::SecretKey::try_from_bytes(&mut bytes)
        .map_err(|e| OcrError::crypto(format!("invalid p2p secret key: {e}")))?;
    Ok(Keypair::from(ed25519::Keypair::from(secret)))
}

pub fn peer_id_hex(keypair: &Keypair) -> String {
    hex::encode(keypair.public().to_peer_id().to_bytes())
}
