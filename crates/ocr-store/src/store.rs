//! The `Store` capability: five operation families, spec §4.C.
//!
//! Every operation takes a `deadline` and reports [`ocr_types::OcrErrorKind::NotFound`]
//! distinctly from transport/backend errors. Every write is durable before
//! it returns `Ok` — no implementation may ack a write from an in-memory
//! cache before the backing store has accepted it.

use crate::models::{
    ContractConfig, Cursor, Job, PendingTransmission, PeerAnnouncement, PersistentState,
    ReportTimestamp,
};
use async_trait::async_trait;
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use std::time::Instant;

/// A scoped deadline for a single store operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Instant);

impl Deadline {
    pub fn after(duration: std::time::Duration) -> Self {
        Self(Instant::now() + duration)
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.0.saturating_duration_since(Instant::now())
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- Jobs ---
    async fn upsert_job(&self, job: Job, deadline: Deadline) -> Result<(), OcrError>;
    async fn delete_job(&self, job_id: &str, deadline: Deadline) -> Result<(), OcrError>;
    async fn list_jobs(&self, cursor: Cursor, deadline: Deadline) -> Result<Vec<Job>, OcrError>;
    async fn get_job(&self, job_id: &str, deadline: Deadline) -> Result<Job, OcrError>;

    // --- Persistent state ---
    async fn set_persistent_state(
        &self,
        state: PersistentState,
        deadline: Deadline,
    ) -> Result<(), OcrError>;
    async fn get_persistent_state(
        &self,
        job_id: &str,
        config_digest: &ConfigDigest,
        deadline: Deadline,
    ) -> Result<PersistentState, OcrError>;

    // --- Contract config ---
    async fn set_contract_config(
        &self,
        config: ContractConfig,
        deadline: Deadline,
    ) -> Result<(), OcrError>;
    async fn get_contract_config(
        &self,
        job_id: &str,
        deadline: Deadline,
    ) -> Result<ContractConfig, OcrError>;

    // --- Pending transmissions ---
    async fn insert_pending_transmission(
        &self,
        tx: PendingTransmission,
        deadline: Deadline,
    ) -> Result<(), OcrError>;
    async fn list_pending_transmissions(
        &self,
        job_id: &str,
        config_digest: &ConfigDigest,
        deadline: Deadline,
    ) -> Result<Vec<PendingTransmission>, OcrError>;
    async fn delete_pending_transmission(
        &self,
        job_id: &str,
        report_timestamp: ReportTimestamp,
        deadline: Deadline,
    ) -> Result<(), OcrError>;
    async fn delete_pending_transmissions_older_than(
        &self,
        job_id: &str,
        older_than_unix: i64,
        deadline: Deadline,
    ) -> Result<u64, OcrError>;

    // --- Peer announcements ---
    async fn upsert_announcement(
        &self,
        announcement: PeerAnnouncement,
        deadline: Deadline,
    ) -> Result<(), OcrError>;
    async fn list_announcements(
        &self,
        job_id: &str,
        peer_ids: &[String],
        deadline: Deadline,
    ) -> Result<Vec<PeerAnnouncement>, OcrError>;
}
