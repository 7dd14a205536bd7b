//! Write side of the chain adapter (spec §4.D): building, signing, and
//! broadcasting `MsgTransmit`.

use async_trait::async_trait;
use ocr_types::digest::ConfigDigest;
use ocr_types::keys::onchain::Address;
use ocr_types::OcrError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedSignature {
    pub signer: u8,
    /// 65-byte `r||s||v` recoverable signature (spec §4.B).
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgTransmitInput {
    pub config_digest: ConfigDigest,
    pub feed_id: String,
    pub epoch: u32,
    pub round: u8,
    pub extra_hash: [u8; 32],
    pub report: Vec<u8>,
    pub signatures: Vec<AttributedSignature>,
}

/// Broadcasts a signed transmission on behalf of this node's transmitter
/// account. A non-zero chain response code surfaces as
/// [`ocr_types::OcrErrorKind::ChainRejected`] carrying that code, never as
/// a generic transport error — callers (the pending-transmission sweeper)
/// distinguish "the chain rejected this" from "we couldn't reach the
/// chain" (spec §4.D, §7).
#[async_trait]
pub trait ChainTransmitter: Send + Sync {
    fn from_account(&self) -> Address;

    async fn transmit(&self, msg: MsgTransmitInput) -> Result<(), OcrError>;
}
