//! On-chain keyring: a single transmitter signing key, serialized behind a
//! mutex (spec §4.D concurrency note — signing and the account sequence
//! number it produces must not interleave across concurrent transmits).

use crate::proto::AttributedSignatureProto;
use ocr_types::keys::onchain::{Address, OnchainSigningKey};
use ocr_types::OcrError;
use tokio::sync::Mutex;

pub struct OnchainKeyring {
    key: Mutex<OnchainSigningKey>,
    address: Address,
}

impl OnchainKeyring {
    pub fn new(key: OnchainSigningKey) -> Self {
        let address = key.address();
        Self {
            key: Mutex::new(key),
            address,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs `digest` (the `ReportToSign::Digest()` output) and returns the
    /// signature tagged with this keyring's signer index.
    pub async fn sign(&self, signer: u8, digest: &[u8; 32]) -> Result<AttributedSignatureProto, OcrError> {
        let key = self.key.lock().await;
        let sig = key.sign_digest(digest)?;
        Ok(AttributedSignatureProto {
            signer: signer as u32,
            signature: sig.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_tags_signer_index_and_produces_65_byte_signature() {
        let keyring = OnchainKeyring::new(OnchainSigningKey::generate());
        let sig = keyring.sign(3, &[9u8; 32]).await.unwrap();
        assert_eq!(sig.signer, 3);
        assert_eq!(sig.signature.len(), 65);
    }

    #[tokio::test]
    async fn address_matches_underlying_key() {
        let key = OnchainSigningKey::generate();
        let expected = key.address();
        let keyring = OnchainKeyring::new(key);
        assert_eq!(keyring.address(), expected);
    }
}
