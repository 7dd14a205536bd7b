//! The job service (spec §4.H): a `map<JobId, Job>` behind one
//! readers–writer lock, single writer for create/stop, many readers for
//! run/list.

use crate::bridge::{ObserveBridge, WebhookConfig};
use crate::job::{ConsensusParticipant, JobHandle, PeerHandle};
use ocr_store::models::{Cursor, JobSpec};
use ocr_store::{Deadline, Store};
use ocr_types::OcrError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type PeerFactory = Box<
    dyn Fn(&JobSpec, &crate::job::ParsedTimeouts) -> Result<Arc<dyn PeerHandle>, OcrError>
        + Send
        + Sync,
>;
type ParticipantFactory = Box<
    dyn Fn(
            &str,
            &JobSpec,
            &crate::job::ParsedTimeouts,
            &Arc<ObserveBridge>,
            Arc<dyn PeerHandle>,
        ) -> Result<Arc<dyn ConsensusParticipant>, OcrError>
        + Send
        + Sync,
>;

pub struct JobService {
    store: Arc<dyn Store>,
    offchain_key_id: String,
    webhook: WebhookConfig,
    acquire_peer: PeerFactory,
    make_participant: ParticipantFactory,
    jobs: RwLock<HashMap<String, Arc<JobHandle>>>,
}

impl JobService {
    pub fn new(
        store: Arc<dyn Store>,
        offchain_key_id: String,
        webhook: WebhookConfig,
        acquire_peer: PeerFactory,
        make_participant: ParticipantFactory,
    ) -> Self {
        Self {
            store,
            offchain_key_id,
            webhook,
            acquire_peer,
            make_participant,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// `StartJob(job_id, spec)`: persists first, only wires up the live
    /// job on durable success (spec §4.H).
    pub async fn start_job(
        &self,
        job_id: &str,
        spec: JobSpec,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        {
            let jobs = self.jobs.read().await;
            if jobs.contains_key(job_id) {
                return Err(OcrError::already_exists(format!(
                    "job {job_id} is already running"
                )));
            }
        }

        let bridge = Arc::new(ObserveBridge::new(job_id.to_string(), self.webhook.clone()));
        let handle = Arc::new(JobHandle::new(
            job_id.to_string(),
            spec,
            self.store.clone(),
            bridge,
        ));

        handle
            .start(
                &self.offchain_key_id,
                |spec, timeouts| (self.acquire_peer)(spec, timeouts),
                |id, spec, timeouts, bridge, peer| {
                    (self.make_participant)(id, spec, timeouts, bridge, peer)
                },
                deadline,
            )
            .await?;

        let mut jobs = self.jobs.write().await;
        jobs.insert(job_id.to_string(), handle);
        Ok(())
    }

    /// Recovery wiring: like [`Self::start_job`] but does not re-persist
    /// the `Job` row (spec §4.H recovery note — the row is already there).
    pub async fn recover_job(
        &self,
        job_id: &str,
        spec: JobSpec,
        deadline: Deadline,
    ) -> Result<(), OcrError> {
        self.start_job(job_id, spec, deadline).await
    }

    /// `RunJob(job_id, result)`: read-lock lookup, `NotFound` if absent.
    pub async fn run_job(&self, job_id: &str, result: &str) -> Result<(), OcrError> {
        let jobs = self.jobs.read().await;
        let job = jobs
            .get(job_id)
            .ok_or_else(|| OcrError::not_found(format!("job {job_id} not found")))?;
        job.run(result).await
    }

    /// `StopJob(job_id)`: write-lock lookup; absent is success (idempotent).
    /// On success, deletes the `Job` row — a stopped job is expected to be
    /// GC'd (spec §4.H).
    pub async fn stop_job(&self, job_id: &str, deadline: Deadline) -> Result<(), OcrError> {
        let handle = {
            let mut jobs = self.jobs.write().await;
            jobs.remove(job_id)
        };
        let Some(handle) = handle else {
            return Ok(());
        };
        handle.stop().await?;
        self.store.delete_job(job_id, deadline).await
    }

    /// Lists all `active` jobs from the store and starts each (spec §4.H
    /// recovery). Per-job failures are logged and do not halt recovery.
    pub async fn recover_all(&self, deadline_budget: std::time::Duration) -> Result<(), OcrError> {
        let jobs = self
            .store
            .list_jobs(Cursor::default(), Deadline::after(deadline_budget))
            .await?;
        for job in jobs {
            if let Err(err) = self
                .recover_job(&job.job_id, job.job_spec, Deadline::after(deadline_budget))
                .await
            {
                tracing::error!(job_id = %job.job_id, %err, "job recovery failed, skipping");
            }
        }
        Ok(())
    }

    /// Stops every active job, reporting but not propagating per-job stop
    /// errors (spec §4.H `Close`).
    pub async fn close(&self, deadline: Deadline) {
        let ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        for job_id in ids {
            if let Err(err) = self.stop_job(&job_id, deadline).await {
                tracing::warn!(job_id = %job_id, %err, "job stop failed during service close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ocr_store::MemoryStore;
    use std::time::Duration;

    struct NoopPeer;
    #[async_trait]
    impl PeerHandle for NoopPeer {
        async fn release(&self) -> Result<(), OcrError> {
            Ok(())
        }
    }

    struct NoopParticipant;
    #[async_trait]
    impl ConsensusParticipant for NoopParticipant {
        async fn start(&self) -> Result<(), OcrError> {
            Ok(())
        }
        async fn close(&self) -> Result<(), OcrError> {
            Ok(())
        }
    }

    fn sample_spec() -> JobSpec {
        JobSpec {
            is_bootstrap_peer: false,
            feed_id: "BTC/USD".to_string(),
            key_id: "k1".to_string(),
            p2p_bootstrap_peers: vec![],
            contract_config_confirmations: 1,
            contract_config_tracker_subscribe_interval: "1m".to_string(),
            observation_timeout: "5s".to_string(),
            blockchain_timeout: "10s".to_string(),
        }
    }

    fn dl() -> Deadline {
        Deadline::after(Duration::from_secs(1))
    }

    fn service() -> JobService {
        JobService::new(
            Arc::new(MemoryStore::new()),
            "k1".to_string(),
            WebhookConfig::with_defaults(
                "http://localhost".to_string(),
                "k".to_string(),
                "s".to_string(),
            ),
            Box::new(|_, _| Ok(Arc::new(NoopPeer) as Arc<dyn PeerHandle>)),
            Box::new(|_, _, _, _, _| Ok(Arc::new(NoopParticipant) as Arc<dyn ConsensusParticipant>)),
        )
    }

    #[tokio::test]
    async fn duplicate_start_job_rejected() {
        let svc = service();
        svc.start_job("a", sample_spec(), dl()).await.unwrap();
        let err = svc.start_job("a", sample_spec(), dl()).await.unwrap_err();
        assert_eq!(err.kind, ocr_types::OcrErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn stop_job_absent_is_success() {
        let svc = service();
        svc.stop_job("missing", dl()).await.unwrap();
    }

    #[tokio::test]
    async fn run_job_not_found_is_distinct_kind() {
        let svc = service();
        let err = svc.run_job("missing", "1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn stop_job_deletes_the_row() {
        let svc = service();
        svc.start_job("a", sample_spec(), dl()).await.unwrap();
        svc.stop_job("a", dl()).await.unwrap();
        assert!(svc.store.get_job("a", dl()).await.is_err());
    }

    #[tokio::test]
    async fn recover_all_restarts_active_jobs() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        store
            .upsert_job(
                ocr_store::models::Job {
                    job_id: "recovered".to_string(),
                    job_spec: sample_spec(),
                    active: true,
                    created_at: 0,
                    row_id: 0,
                },
                dl(),
            )
            .await
            .unwrap();
        let svc = JobService::new(
            store,
            "k1".to_string(),
            WebhookConfig::with_defaults(
                "http://localhost".to_string(),
                "k".to_string(),
                "s".to_string(),
            ),
            Box::new(|_, _| Ok(Arc::new(NoopPeer) as Arc<dyn PeerHandle>)),
            Box::new(|_, _, _, _, _| Ok(Arc::new(NoopParticipant) as Arc<dyn ConsensusParticipant>)),
        );
        svc.recover_all(Duration::from_secs(1)).await.unwrap();
        svc.run_job("recovered", "1").await.unwrap();
    }
}
