//! On-disk key persistence: one JSON file per key, encrypted with a
//! scrypt-based password KDF (spec §4.A).
//!
//! ```text
//! { key_type, id, public_key, crypto: { kdf, kdf_params, ciphertext, iv, mac } }
//! ```
//!
//! `id` is the plaintext-computed key id (e.g. hex of an Ed25519 public
//! key). On load it MUST round-trip-equal the id recomputed from the
//! decrypted material; a mismatch is a fatal, non-recoverable condition —
//! it means the file was tampered with or corrupted, not a wrong password.

use crate::error::OcrError;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use scrypt::Params as ScryptParams;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Offchain,
    Config,
    Onchain,
    P2p,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Offchain => "offchain",
            Self::Config => "config",
            Self::Onchain => "onchain",
            Self::P2p => "p2p",
        };
        f.write_str(s)
    }
}

/// Scrypt cost parameters. `n` must be a power of two (enforced by
/// [`ScryptParams::new`]); defaults match the original's recommended
/// interactive-login cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScryptCost {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptCost {
    fn default() -> Self {
        Self {
            log_n: 15,
            r: 8,
            p: 1,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CryptoSection {
    kdf: String,
    kdf_params: KdfParams,
    cipher: String,
    #[serde(with = "hex::serde")]
    ciphertext: Vec<u8>,
    #[serde(with = "hex::serde")]
    iv: Vec<u8>,
    #[serde(with = "hex::serde")]
    mac: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KdfParams {
    log_n: u8,
    r: u32,
    p: u32,
    #[serde(with = "hex::serde")]
    salt: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyFile {
    key_type: KeyType,
    id: String,
    public_key: String,
    crypto: CryptoSection,
}

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

fn derive_kek(passphrase: &str, salt: &[u8], cost: ScryptCost) -> Result<[u8; 32], OcrError> {
    let params = ScryptParams::new(cost.log_n, cost.r, cost.p, 32)
        .map_err(|e| OcrError::crypto(format!("invalid scrypt params: {e}")))?;
    let mut kek = [0u8; 32];
    scrypt::scrypt(passphrase.as_bytes(), salt, &params, &mut kek)
        .map_err(|e| OcrError::crypto(format!("scrypt derivation failed: {e}")))?;
    Ok(kek)
}

/// Encrypts `secret` under `passphrase`, producing the on-disk JSON blob.
/// `id` and `public_key` are the plaintext-derived identifiers that get
/// stored alongside the ciphertext so a reader can pick the right key file
/// without decrypting every candidate.
pub fn seal(
    key_type: KeyType,
    id: &str,
    public_key_hex: &str,
    secret: &[u8],
    passphrase: &str,
    cost: ScryptCost,
) -> Result<String, OcrError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let mut kek = derive_kek(passphrase, &salt, cost)?;
    let cipher = ChaCha20Poly1305::new((&kek).into());
    let nonce = Nonce::from_slice(&nonce_bytes);
    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: secret,
                aad: id.as_bytes(),
            },
        )
        .map_err(|e| OcrError::crypto(format!("encryption failed: {e}")))?;
    kek.zeroize();

    // ChaCha20Poly1305's output is ciphertext||tag; split so the on-disk
    // shape names the MAC the way spec §4.A describes it.
    let tag_len = 16;
    let (ciphertext, mac) = sealed.split_at(sealed.len() - tag_len);

    let file = KeyFile {
        key_type,
        id: id.to_string(),
        public_key: public_key_hex.to_string(),
        crypto: CryptoSection {
            kdf: "scrypt".to_string(),
            kdf_params: KdfParams {
                log_n: cost.log_n,
                r: cost.r,
                p: cost.p,
                salt: salt.to_vec(),
            },
            cipher: "chacha20poly1305".to_string(),
            ciphertext: ciphertext.to_vec(),
            iv: nonce_bytes.to_vec(),
            mac: mac.to_vec(),
        },
    };

    serde_json::to_string_pretty(&file)
        .map_err(|e| OcrError::internal(format!("failed to serialize key file: {e}")))
}

pub struct OpenedKey {
    pub key_type: KeyType,
    pub id: String,
    pub public_key_hex: String,
    pub secret: Vec<u8>,
}

/// Decrypts a key file, then re-derives the id from the decrypted material
/// via `recompute_id` and checks it against the stored id. A mismatch
/// aborts with [`OcrError::internal`] — per spec §4.A this is a fatal,
/// non-recoverable condition, distinct from a plain wrong-password error.
pub fn open(
    json: &str,
    passphrase: &str,
    recompute_id: impl FnOnce(&[u8]) -> String,
) -> Result<OpenedKey, OcrError> {
    let file: KeyFile = serde_json::from_str(json)
        .map_err(|e| OcrError::validation(format!("malformed key file: {e}")))?;

    if file.crypto.kdf != "scrypt" {
        return Err(OcrError::validation(format!(
            "unsupported kdf: {}",
            file.crypto.kdf
        )));
    }
    if file.crypto.kdf_params.salt.len() != SALT_LEN {
        return Err(OcrError::validation("malformed salt length"));
    }
    if file.crypto.iv.len() != NONCE_LEN {
        return Err(OcrError::validation("malformed iv length"));
    }

    let cost = ScryptCost {
        log_n: file.crypto.kdf_params.log_n,
        r: file.crypto.kdf_params.r,
        p: file.crypto.kdf_params.p,
    };
    let mut kek = derive_kek(passphrase, &file.crypto.kdf_params.salt, cost)?;
    let cipher = ChaCha20Poly1305::new((&kek).into());
    let nonce = Nonce::from_slice(&file.crypto.iv);

    let mut sealed = file.crypto.ciphertext.clone();
    sealed.extend_from_slice(&file.crypto.mac);

    let secret = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &sealed,
                aad: file.id.as_bytes(),
            },
        )
        .map_err(|_| OcrError::crypto("decryption failed: wrong passphrase or corrupted file"))?;
    kek.zeroize();

    let recomputed = recompute_id(&secret);
    if recomputed != file.id {
        return Err(OcrError::internal(format!(
            "key file id mismatch: stored={} recomputed={} — file is corrupt or tampered",
            file.id, recomputed
        )));
    }

    Ok(OpenedKey {
        key_type: file.key_type,
        id: file.id,
        public_key_hex: file.public_key,
        secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trips() {
        let secret = b"a 32 byte off chain signing seed";
        let id = hex::encode(secret);
        let blob = seal(
            KeyType::Offchain,
            &id,
            "deadbeef",
            secret,
            "hunter2",
            ScryptCost {
                log_n: 10,
                r: 8,
                p: 1,
            },
        )
        .unwrap();

        let opened = open(&blob, "hunter2", |s| hex::encode(s)).unwrap();
        assert_eq!(opened.secret, secret);
        assert_eq!(opened.id, id);
        assert_eq!(opened.key_type, KeyType::Offchain);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let secret = b"seed material";
        let id = hex::encode(secret);
        let blob = seal(
            KeyType::Onchain,
            &id,
            "cafebabe",
            secret,
            "correct horse",
            ScryptCost {
                log_n: 10,
                r: 8,
                p: 1,
            },
        )
        .unwrap();
        assert!(open(&blob, "wrong password", |s| hex::encode(s)).is_err());
    }

    #[test]
    fn tampered_id_is_fatal() {
        let secret = b"seed material two";
        let id = hex::encode(secret);
        let blob = seal(
            KeyType::P2p,
            &id,
            "feedface",
            secret,
            "pw",
            ScryptCost {
                log_n: 10,
                r: 8,
                p: 1,
            },
        )
        .unwrap();
        let opened = open(&blob, "pw", |_| "not-the-real-id".to_string());
        assert!(opened.is_err());
    }
}
