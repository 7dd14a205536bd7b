//! Durable `Store` backed by `redb`. Each write commits synchronously
//! inside `spawn_blocking` before returning `Ok` — no background flush
//! channel, since a write must not be acked before the backend has
//! actually accepted it.

use crate::models::{
    ContractConfig, Cursor, Job, PendingTransmission, PeerAnnouncement, PersistentState,
    ReportTimestamp,
};
use crate::store::{Deadline, Store};
use async_trait::async_trait;
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");
const PERSISTENT_STATE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("persistent_state");
const CONTRACT_CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("contract_config");
const PENDING: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pending_transmissions");
const ANNOUNCEMENTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("peer_announcements");

fn k_persistent(job_id: &str, digest: &ConfigDigest) -> Vec<u8> {
    [job_id.as_bytes(), digest.as_bytes()].concat()
}

fn k_pending(job_id: &str, epoch: u32, round: u8) -> Vec<u8> {
    [job_id.as_bytes(), &epoch.to_be_bytes(), &[round]].concat()
}

fn k_announcement(job_id: &str, peer_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(job_id.len() + peer_id.len() + 1);
    key.extend_from_slice(job_id.as_bytes());
    key.push(0); // job ids are never empty; 0x00 can't appear in a feed/job id string
    key.extend_from_slice(peer_id.as_bytes());
    key
}

fn backend_err(e: impl std::fmt::Display) -> OcrError {
    OcrError::transport(format!("redb backend error: {e}"))
}

fn ser<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, OcrError> {
    bincode::serialize(value).map_err(|e| OcrError::internal(format!("serialize failed: {e}")))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, OcrError> {
    bincode::deserialize(bytes).map_err(|e| OcrError::internal(format!("deserialize failed: {e}")))
}

#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, OcrError> {
        let db = Database::create(path).map_err(backend_err)?;
        let write = db.begin_write().map_err(backend_err)?;
        {
            write.open_table(JOBS).map_err(backend_err)?;
            write.open_table(PERSISTENT_STATE).map_err(backend_err)?;
            write.open_table(CONTRACT_CONFIG).map_err(backend_err)?;
            write.open_table(PENDING).map_err(backend_err)?;
            write.open_table(ANNOUNCEMENTS).map_err(backend_err)?;
        }
        write.commit().map_err(backend_err)?;
        Ok(Self { db: Arc::new(db) })
    }

    async fn run_blocking<F, T>(&self, deadline: Deadline, f: F) -> Result<T, OcrError>
    where
        F: FnOnce(Arc<Database>) -> Result<T, OcrError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        let remaining = deadline.remaining();
        let handle = tokio::task::spawn_blocking(move || f(db));
        match tokio::time::timeout(remaining, handle).await {
            Ok(join_result) => join_result.map_err(|e| OcrError::internal(format!("task panicked: {e}")))?,
            Err(_) => Err(OcrError::timeout("store operation exceeded its deadline")),
        }
    }
}

#[async_trait]
impl Store for RedbStore {
    async fn upsert_job(&self, mut job: Job, deadline: Deadline) -> Result<(), OcrError> {
        self.run_blocking(deadline, move |db| {
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(JOBS).map_err(backend_err)?;
                if let Some(existing) = table.get(job.job_id.as_str()).map_err(backend_err)? {
                    let existing: Job = de(existing.value())?;
                    job.row_id = existing.row_id;
                } else {
                    let row_id = table.len().map_err(backend_err)? + 1;
                    job.row_id = row_id;
                }
                let bytes = ser(&job)?;
                table
                    .insert(job.job_id.as_str(), bytes.as_slice())
                    .map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn delete_job(&self, job_id: &str, deadline: Deadline) -> Result<(), OcrError> {
        let job_id = job_id.to_string();
        self.run_blocking(deadline, move |db| {
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(JOBS).map_err(backend_err)?;
                table.remove(job_id.as_str()).map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn list_jobs(&self, cursor: Cursor, deadline: Deadline) -> Result<Vec<Job>, OcrError> {
        self.run_blocking(deadline, move |db| {
            let read = db.begin_read().map_err(backend_err)?;
            let table = read.open_table(JOBS).map_err(backend_err)?;
            let mut jobs = Vec::new();
            for entry in table.iter().map_err(backend_err)? {
                let (_, value) = entry.map_err(backend_err)?;
                let job: Job = de(value.value())?;
                if !job.active {
                    continue;
                }
                if let Some(after) = cursor.after_row_id {
                    if job.row_id <= after {
                        continue;
                    }
                }
                jobs.push(job);
            }
            jobs.sort_by_key(|j| j.created_at);
            if cursor.limit > 0 {
                jobs.truncate(cursor.limit as usize);
            }
            Ok(jobs)
        })
        .await
    }

    async fn get_job(&self, job_id: &str, deadline: Deadline) -> Result<Job, OcrError> {
        let job_id = job_id.to_string();
        self.run_blocking(deadline, move |db| {
            let read = db.begin_read().map_err(backend_err)?;
            let table = read.open_table(JOBS).map_err(backend_err)?;
            match table.get(job_id.as_str()).map_err(backend_err)? {
                Some(value) => de(value.value()),
                None => Err(OcrError::not_found(format!("job {job_id} not found"))),
            }
        })
        .await
    }

    async fn set_persistent_state(
        &self,
        state: PersistentState,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        state.check_invariants().map_err(OcrError::internal)?;
        self.run_blocking(deadline, move |db| {
            let key = k_persistent(&state.job_id, &state.config_digest);
            let bytes = ser(&state)?;
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(PERSISTENT_STATE).map_err(backend_err)?;
                table.insert(key.as_slice(), bytes.as_slice()).map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_persistent_state(
        &self,
        job_id: &str,
        config_digest: &ConfigDigest,
        deadline: Deadline,
    ) -> Result<PersistentState, OcrError> {
        let key = k_persistent(job_id, config_digest);
        self.run_blocking(deadline, move |db| {
            let read = db.begin_read().map_err(backend_err)?;
            let table = read.open_table(PERSISTENT_STATE).map_err(backend_err)?;
            match table.get(key.as_slice()).map_err(backend_err)? {
                Some(value) => de(value.value()),
                None => Err(OcrError::not_found("persistent state not found")),
            }
        })
        .await
    }

    async fn set_contract_config(
        &self,
        config: ContractConfig,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        config.check_invariants().map_err(OcrError::internal)?;
        self.run_blocking(deadline, move |db| {
            let bytes = ser(&config)?;
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(CONTRACT_CONFIG).map_err(backend_err)?;
                table
                    .insert(config.job_id.as_str(), bytes.as_slice())
                    .map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn get_contract_config(
        &self,
        job_id: &str,
        deadline: Deadline,
    ) -> Result<ContractConfig, OcrError> {
        let job_id = job_id.to_string();
        self.run_blocking(deadline, move |db| {
            let read = db.begin_read().map_err(backend_err)?;
            let table = read.open_table(CONTRACT_CONFIG).map_err(backend_err)?;
            match table.get(job_id.as_str()).map_err(backend_err)? {
                Some(value) => de(value.value()),
                None => Err(OcrError::not_found("contract config not found")),
            }
        })
        .await
    }

    async fn insert_pending_transmission(
        &self,
        tx: PendingTransmission,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        self.run_blocking(deadline, move |db| {
            let key = k_pending(&tx.job_id, tx.report_timestamp.epoch, tx.report_timestamp.round);
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(PENDING).map_err(backend_err)?;
                if table.get(key.as_slice()).map_err(backend_err)?.is_some() {
                    return Err(OcrError::already_exists(format!(
                        "pending transmission for job {} epoch {} round {} already exists",
                        tx.job_id, tx.report_timestamp.epoch, tx.report_timestamp.round
                    )));
                }
                let bytes = ser(&tx)?;
                table.insert(key.as_slice(), bytes.as_slice()).map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn list_pending_transmissions(
        &self,
        job_id: &str,
        config_digest: &ConfigDigest,
        deadline: Deadline,
    ) -> Result<Vec<PendingTransmission>, OcrError> {
        let job_id = job_id.to_string();
        let config_digest = *config_digest;
        self.run_blocking(deadline, move |db| {
            let read = db.begin_read().map_err(backend_err)?;
            let table = read.open_table(PENDING).map_err(backend_err)?;
            let mut rows = Vec::new();
            for entry in table.iter().map_err(backend_err)? {
                let (_, value) = entry.map_err(backend_err)?;
                let tx: PendingTransmission = de(value.value())?;
                if tx.job_id == job_id && tx.config_digest == config_digest {
                    rows.push(tx);
                }
            }
            rows.sort_by_key(|tx| tx.created_at);
            Ok(rows)
        })
        .await
    }

    async fn delete_pending_transmission(
        &self,
        job_id: &str,
        report_timestamp: ReportTimestamp,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        let job_id = job_id.to_string();
        self.run_blocking(deadline, move |db| {
            let key = k_pending(&job_id, report_timestamp.epoch, report_timestamp.round);
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(PENDING).map_err(backend_err)?;
                table.remove(key.as_slice()).map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn delete_pending_transmissions_older_than(
        &self,
        job_id: &str,
        older_than_unix: i64,
        deadline: Deadline,
    ) -> Result<u64, OcrError> {
        let job_id = job_id.to_string();
        self.run_blocking(deadline, move |db| {
            let write = db.begin_write().map_err(backend_err)?;
            let mut deleted = 0u64;
            {
                let mut table = write.open_table(PENDING).map_err(backend_err)?;
                let stale_keys: Vec<Vec<u8>> = table
                    .iter()
                    .map_err(backend_err)?
                    .filter_map(|entry| {
                        let (key, value) = entry.ok()?;
                        let tx: PendingTransmission = de(value.value()).ok()?;
                        if tx.job_id == job_id && tx.created_at < older_than_unix {
                            Some(key.value().to_vec())
                        } else {
                            None
                        }
                    })
                    .collect();
                for key in stale_keys {
                    table.remove(key.as_slice()).map_err(backend_err)?;
                    deleted += 1;
                }
            }
            write.commit().map_err(backend_err)?;
            Ok(deleted)
        })
        .await
    }

    async fn upsert_announcement(
        &self,
        announcement: PeerAnnouncement,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        self.run_blocking(deadline, move |db| {
            let key = k_announcement(&announcement.job_id, &announcement.peer_id);
            let bytes = ser(&announcement)?;
            let write = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write.open_table(ANNOUNCEMENTS).map_err(backend_err)?;
                table.insert(key.as_slice(), bytes.as_slice()).map_err(backend_err)?;
            }
            write.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn list_announcements(
        &self,
        job_id: &str,
        peer_ids: &[String],
        deadline: Deadline,
    ) -> Result<Vec<PeerAnnouncement>, OcrError> {
        let job_id = job_id.to_string();
        let peer_ids = peer_ids.to_vec();
        self.run_blocking(deadline, move |db| {
            let read = db.begin_read().map_err(backend_err)?;
            let table = read.open_table(ANNOUNCEMENTS).map_err(backend_err)?;
            let mut rows = Vec::new();
            for peer_id in &peer_ids {
                let key = k_announcement(&job_id, peer_id);
                if let Some(value) = table.get(key.as_slice()).map_err(backend_err)? {
                    rows.push(de(value.value())?);
                }
            }
            Ok(rows)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobSpec;
    use std::time::Duration;

    fn dl() -> Deadline {
        Deadline::after(Duration::from_secs(2))
    }

    fn sample_job(job_id: &str) -> Job {
        Job {
            job_id: job_id.to_string(),
            job_spec: JobSpec {
                is_bootstrap_peer: false,
                feed_id: "ETH/USD".to_string(),
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
    async fn durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.upsert_job(sample_job("a"), dl()).await.unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        let job = store.get_job("a", dl()).await.unwrap();
        assert_eq!(job.job_id, "a");
    }

    #[tokio::test]
    async fn pending_transmission_duplicate_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("store.redb")).unwrap();
        let tx = PendingTransmission {
            job_id: "a".to_string(),
            config_digest: ConfigDigest([2u8; 32]),
            report_timestamp: ReportTimestamp { epoch: 1, round: 0 },
            time: 0,
            extra_hash: [0u8; 32],
            report: vec![1, 2, 3],
            attributed_signatures: vec![],
            created_at: 0,
        };
        store.insert_pending_transmission(tx.clone(), dl()).await.unwrap();
        assert!(store.insert_pending_transmission(tx, dl()).await.is_err());
    }
}
