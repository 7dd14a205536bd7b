//! Key & digest primitives and the report/observation codec for the OCR2
//! Cosmos oracle node (spec §4.A, §4.B).

pub mod codec;
pub mod digest;
pub mod error;
pub mod keys;

pub use digest::ConfigDigest;
pub use error::{OcrError, OcrErrorKind};

/// Opaque operator-assigned job identifier, unique per node (spec §3).
pub type JobId = String;

/// Human-readable identifier for an on-chain feed, up to 20 bytes.
pub type FeedId = String;

pub fn validate_feed_id(feed_id: &str) -> Result<(), OcrError> {
    if feed_id.is_empty() || feed_id.len() > 20 {
        return Err(OcrError::validation(format!(
            "feed_id must be 1..=20 bytes, got {}",
            feed_id.len()
        )));
    }
    Ok(())
}
