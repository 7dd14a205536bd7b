//! Persisted entities (spec §3).

use ocr_types::digest::ConfigDigest;
use serde::{Deserialize, Serialize};

/// Immutable across a job's lifetime; a respec requires stop+start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub is_bootstrap_peer: bool,
    pub feed_id: String,
    pub key_id: String,
    pub p2p_bootstrap_peers: Vec<String>,
    pub contract_config_confirmations: u32,
    /// Parsed with `humantime`; stored pre-parsing as the raw operator
    /// string so respec diffs are visible verbatim.
    pub contract_config_tracker_subscribe_interval: String,
    pub observation_timeout: String,
    pub blockchain_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_spec: JobSpec,
    pub active: bool,
    pub created_at: i64,
    /// Monotonic insertion order, used for stable cursor pagination.
    /// Assigned by the store, never by the caller.
    pub row_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    pub job_id: String,
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub highest_sent_epoch: u32,
    pub highest_received_epoch: Vec<u32>,
}

impl PersistentState {
    /// Invariant: `highest_sent_epoch <= epoch`;
    /// `highest_received_epoch[i] <= epoch` for every signer index `i`.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.highest_sent_epoch > self.epoch {
            return Err(format!(
                "highest_sent_epoch ({}) > epoch ({})",
                self.highest_sent_epoch, self.epoch
            ));
        }
        if let Some((i, v)) = self
            .highest_received_epoch
            .iter()
            .enumerate()
            .find(|(_, v)| **v > self.epoch)
        {
            return Err(format!(
                "highest_received_epoch[{i}] ({v}) > epoch ({})",
                self.epoch
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    pub job_id: String,
    pub config_digest: ConfigDigest,
    pub config_count: u64,
    pub signers: Vec<Vec<u8>>,
    pub transmitters: Vec<Vec<u8>>,
    pub f: u8,
    pub onchain_config: Vec<u8>,
    pub offchain_config_version: u64,
    pub offchain_config: Vec<u8>,
}

impl ContractConfig {
    /// `len(signers) == len(transmitters) >= 3f+1`.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.signers.len() != self.transmitters.len() {
            return Err(format!(
                "signers ({}) and transmitters ({}) length mismatch",
                self.signers.len(),
                self.transmitters.len()
            ));
        }
        let min_len = 3 * self.f as usize + 1;
        if self.signers.len() < min_len {
            return Err(format!(
                "need >= 3f+1 = {min_len} signers, got {}",
                self.signers.len()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReportTimestamp {
    pub epoch: u32,
    pub round: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedSignature {
    pub signer: u8,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransmission {
    pub job_id: String,
    pub config_digest: ConfigDigest,
    pub report_timestamp: ReportTimestamp,
    pub time: i64,
    pub extra_hash: [u8; 32],
    pub report: Vec<u8>,
    pub attributed_signatures: Vec<AttributedSignature>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    pub job_id: String,
    pub peer_id: String,
    pub announce: Vec<u8>,
    pub created_at: i64,
}

/// Stable cursor for [`crate::Store::list_jobs`]: paging by monotonic row
/// id, not by `created_at`, so ties never reshuffle a page (spec §4.C,
/// expanded in `SPEC_FULL.md` §C.4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Cursor {
    pub after_row_id: Option<u64>,
    pub limit: u32,
}
