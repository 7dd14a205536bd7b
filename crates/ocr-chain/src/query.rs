//! Read side of the chain adapter (spec §4.D): transmission details, the
//! latest out-of-band round request, and feed config info. All three are
//! read-only gRPC queries against the feed-oracle module.

use async_trait::async_trait;
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestTransmissionDetails {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
    pub latest_answer: Vec<u8>,
    pub latest_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestRoundRequested {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
}

impl LatestRoundRequested {
    /// The all-zero value returned when nothing has been requested within
    /// the lookback window — not an error (spec §9 Open Question: a chain
    /// with no matching event in scope is a legitimate "nothing happened"
    /// outcome, not a failure of the query).
    pub fn none() -> Self {
        Self {
            config_digest: ConfigDigest([0u8; 32]),
            epoch: 0,
            round: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedConfigInfo {
    pub latest_config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
}

/// Chain-side read queries the plugin's `ContractTransmitter`/
/// `ContractConfigTracker` roles depend on (spec §4.D).
#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn latest_transmission_details(
        &self,
        feed_id: &str,
    ) -> Result<LatestTransmissionDetails, OcrError>;

    /// `lookback` bounds how far back the query looks for a pending round
    /// request. Returns [`LatestRoundRequested::none`], not an error, when
    /// nothing is in scope.
    async fn latest_round_requested(
        &self,
        feed_id: &str,
        lookback: Duration,
    ) -> Result<LatestRoundRequested, OcrError>;

    async fn feed_config_info(&self, feed_id: &str) -> Result<FeedConfigInfo, OcrError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_the_all_zero_value_not_a_distinguishable_sentinel() {
        let none = LatestRoundRequested::none();
        assert_eq!(none.epoch, 0);
        assert_eq!(none.round, 0);
        assert_eq!(none.config_digest, ConfigDigest([0u8; 32]));
    }
}
