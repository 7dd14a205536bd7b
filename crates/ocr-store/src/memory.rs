//! An in-memory `Store`, used by tests and by `ocr-job`'s own unit tests.
//! Not durable across process restarts — production deployments use
//! [`crate::redb_store::RedbStore`].

use crate::models::{
    ContractConfig, Cursor, Job, PendingTransmission, PeerAnnouncement, PersistentState,
    ReportTimestamp,
};
use crate::store::{Deadline, Store};
use async_trait::async_trait;
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    persistent_state: HashMap<(String, [u8; 32]), PersistentState>,
    contract_config: HashMap<String, ContractConfig>,
    pending: HashMap<(String, u32, u8), PendingTransmission>,
    announcements: HashMap<(String, String), PeerAnnouncement>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    next_row_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            next_row_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_job(&self, mut job: Job, _deadline: Deadline) -> Result<(), OcrError> {
        let mut inner = self.inner.write().await;
        if !inner.jobs.contains_key(&job.job_id) {
            job.row_id = self.next_row_id.fetch_add(1, Ordering::SeqCst);
        } else {
            job.row_id = inner.jobs[&job.job_id].row_id;
        }
        inner.jobs.insert(job.job_id.clone(), job);
        Ok(())
    }

    async fn delete_job(&self, job_id: &str, _deadline: Deadline) -> Result<(), OcrError> {
        self.inner.write().await.jobs.remove(job_id);
        Ok(())
    }

    async fn list_jobs(&self, cursor: Cursor, _deadline: Deadline) -> Result<Vec<Job>, OcrError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.active)
            .filter(|j| cursor.after_row_id.map_or(true, |after| j.row_id > after))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        if cursor.limit > 0 {
            jobs.truncate(cursor.limit as usize);
        }
        Ok(jobs)
    }

    async fn get_job(&self, job_id: &str, _deadline: Deadline) -> Result<Job, OcrError> {
        self.inner
            .read()
            .await
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| OcrError::not_found(format!("job {job_id} not found")))
    }

    async fn set_persistent_state(
        &self,
        state: PersistentState,
        _deadline: Deadline,
    ) -> Result<(), OcrError> {
        state
            .check_invariants()
            .map_err(OcrError::internal)?;
        let key = (state.job_id.clone(), *state.config_digest.as_bytes());
        self.inner.write().await.persistent_state.insert(key, state);
        Ok(())
    }

    async fn get_persistent_state(
        &self,
        job_id: &str,
        config_digest: &ConfigDigest,
        _deadline: Deadline,
    ) -> Result<PersistentState, OcrError> {
        let key = (job_id.to_string(), *config_digest.as_bytes());
        self.inner
            .read()
            .await
            .persistent_state
            .get(&key)
            .cloned()
            .ok_or_else(|| OcrError::not_found("persistent state not found"))
    }

    async fn set_contract_config(
        &self,
        config: ContractConfig,
        _deadline: Deadline,
    ) -> Result<(), OcrError> {
        config.check_invariants().map_err(OcrError::internal)?;
        self.inner
            .write()
            .await
            .contract_config
            .insert(config.job_id.clone(), config);
        Ok(())
    }

    async fn get_contract_config(
        &self,
        job_id: &str,
        _deadline: Deadline,
    ) -> Result<ContractConfig, OcrError> {
        self.inner
            .read()
            .await
            .contract_config
            .get(job_id)
            .cloned()
            .ok_or_else(|| OcrError::not_found("contract config not found"))
    }

    async fn insert_pending_transmission(
        &self,
        tx: PendingTransmission,
        _deadline: Deadline,
    ) -> Result<(), OcrError> {
        let key = (
            tx.job_id.clone(),
            tx.report_timestamp.epoch,
            tx.report_timestamp.round,
        );
        let mut inner = self.inner.write().await;
        if inner.pending.contains_key(&key) {
            return Err(OcrError::already_exists(format!(
                "pending transmission for job {} epoch {} round {} already exists",
                tx.job_id, tx.report_timestamp.epoch, tx.report_timestamp.round
            )));
        }
        inner.pending.insert(key, tx);
        Ok(())
    }

    async fn list_pending_transmissions(
        &self,
        job_id: &str,
        config_digest: &ConfigDigest,
        _deadline: Deadline,
    ) -> Result<Vec<PendingTransmission>, OcrError> {
        let inner = self.inner.read().await;
        let mut rows: Vec<PendingTransmission> = inner
            .pending
            .values()
            .filter(|tx| tx.job_id == job_id && &tx.config_digest == config_digest)
            .cloned()
            .collect();
        rows.sort_by_key(|tx| tx.created_at);
        Ok(rows)
    }

    async fn delete_pending_transmission(
        &self,
        job_id: &str,
        report_timestamp: ReportTimestamp,
        _deadline: Deadline,
    ) -> Result<(), OcrError> {
        let key = (
            job_id.to_string(),
            report_timestamp.epoch,
            report_timestamp.round,
        );
        self.inner.write().await.pending.remove(&key);
        Ok(())
    }

    async fn delete_pending_transmissions_older_than(
        &self,
        job_id: &str,
        older_than_unix: i64,
        _deadline: Deadline,
    ) -> Result<u64, OcrError> {
        let mut inner = self.inner.write().await;
        let before = inner.pending.len();
        inner
            .pending
            .retain(|_, tx| !(tx.job_id == job_id && tx.created_at < older_than_unix));
        Ok((before - inner.pending.len()) as u64)
    }

    async fn upsert_announcement(
        &self,
        announcement: PeerAnnouncement,
        _deadline: Deadline,
    ) -> Result<(), OcrError> {
        let key = (announcement.job_id.clone(), announcement.peer_id.clone());
        self.inner.write().await.announcements.insert(key, announcement);
        Ok(())
    }

    async fn list_announcements(
        &self,
        job_id: &str,
        peer_ids: &[String],
        _deadline: Deadline,
    ) -> Result<Vec<PeerAnnouncement>, OcrError> {
        let inner = self.inner.read().await;
        Ok(peer_ids
            .iter()
            .filter_map(|peer_id| {
                inner
                    .announcements
                    .get(&(job_id.to_string(), peer_id.clone()))
                    .cloned()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobSpec;
    use std::time::Duration;

    fn dl() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    fn sample_job(job_id: &str) -> Job {
        Job {
            job_id: job_id.to_string(),
            job_spec: JobSpec {
                is_bootstrap_peer: false,
                feed_id: "BTC/USD".to_string(),
                key_id: "k1".to_string(),
                p2p_bootstrap_peers: vec![],
                contract_config_confirmations: 1,
                contract_config_tracker_subscribe_interval: "1m".to_string(),
                observation_timeout: "5s".to_string(),
                blockchain_timeout: "10s".to_string(),
            },
            active: true,
            created_at: 0,
            row_id: 0,
        }
    }

    #[tokio::test]
    async fn job_isolation_i4() {
        let store = MemoryStore::new();
        store.upsert_job(sample_job("a"), dl()).await.unwrap();
        store.upsert_job(sample_job("b"), dl()).await.unwrap();
        store.delete_job("a", dl()).await.unwrap();
        assert!(store.get_job("a", dl()).await.is_err());
        assert!(store.get_job("b", dl()).await.is_ok());
    }

    #[tokio::test]
    async fn pending_transmission_uniqueness_i3() {
        let store = MemoryStore::new();
        let digest = ConfigDigest([1u8; 32]);
        let tx = PendingTransmission {
            job_id: "a".to_string(),
            config_digest: digest,
            report_timestamp: ReportTimestamp { epoch: 1, round: 1 },
            time: 0,
            extra_hash: [0u8; 32],
            report: vec![],
            attributed_signatures: vec![],
            created_at: 0,
        };
        store.insert_pending_transmission(tx.clone(), dl()).await.unwrap();
        let err = store
            .insert_pending_transmission(tx, dl())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ocr_types::OcrErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn list_jobs_only_returns_active() {
        let store = MemoryStore::new();
        let mut inactive = sample_job("inactive");
        inactive.active = false;
        store.upsert_job(inactive, dl()).await.unwrap();
        store.upsert_job(sample_job("active"), dl()).await.unwrap();
        let jobs = store.list_jobs(Cursor::default(), dl()).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "active");
    }

    #[tokio::test]
    async fn not_found_is_distinct_kind() {
        let store = MemoryStore::new();
        let err = store.get_job("missing", dl()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
