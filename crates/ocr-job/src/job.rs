//! The job state machine (spec §4.G). `New → Running → Stopped`,
//! transitions exclusive per `JobId`.
//!
//! Spec §9 Open Question: the original source guards `Start` and `Stop`
//! with the same once-cell, which means a failed `Start` can permanently
//! block `Stop` from ever running its cleanup. We use two distinct
//! once-guards (`start_once`, `stop_once`) so a failed `Start` still lets
//! `Stop` tear down whatever partial state it left behind, while
//! preserving the effective semantic: `Start` is one-shot, `Stop`
//! terminates.

use crate::bridge::ObserveBridge;
use async_trait::async_trait;
use humantime::parse_duration;
use ocr_store::models::{Job, JobSpec};
use ocr_store::{Deadline, Store};
use ocr_types::OcrError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Validated, parsed durations from a [`JobSpec`] (spec §4.G step 4).
pub struct ParsedTimeouts {
    pub blockchain_timeout: Duration,
    pub contract_config_tracker_subscribe_interval: Duration,
    pub observation_timeout: Duration,
}

pub fn parse_timeouts(spec: &JobSpec) -> Result<ParsedTimeouts, OcrError> {
    Ok(ParsedTimeouts {
        blockchain_timeout: parse_duration(&spec.blockchain_timeout)
            .map_err(|e| OcrError::validation(format!("bad blockchain_timeout: {e}")))?,
        contract_config_tracker_subscribe_interval: parse_duration(
            &spec.contract_config_tracker_subscribe_interval,
        )
        .map_err(|e| {
            OcrError::validation(format!(
                "bad contract_config_tracker_subscribe_interval: {e}"
            ))
        })?,
        observation_timeout: parse_duration(&spec.observation_timeout)
            .map_err(|e| OcrError::validation(format!("bad observation_timeout: {e}")))?,
    })
}

/// The participant a started job drives: either a bootstrap-only
/// consensus participant or a full oracle wired to the plugin, chain
/// adapter, store, and keyrings (spec §4.G step 6). The job state machine
/// only needs to start and close it; everything else about the consensus
/// embedding is opaque here.
#[async_trait]
pub trait ConsensusParticipant: Send + Sync {
    async fn start(&self) -> Result<(), OcrError>;
    async fn close(&self) -> Result<(), OcrError>;
}

/// A P2P endpoint handle a job acquires on `Start` and releases on `Stop`
/// (spec §4.E capability bundle, §9 design note on reference-counted
/// peers).
#[async_trait]
pub trait PeerHandle: Send + Sync {
    async fn release(&self) -> Result<(), OcrError>;
}

enum RunState {
    New,
    Running,
    Stopped,
}

pub struct JobHandle {
    pub job_id: String,
    spec: JobSpec,
    store: Arc<dyn Store>,
    bridge: Arc<ObserveBridge>,
    state: Mutex<RunState>,
    start_once: AtomicBool,
    stop_once: AtomicBool,
    participant: Mutex<Option<Arc<dyn ConsensusParticipant>>>,
    peer: Mutex<Option<Arc<dyn PeerHandle>>>,
}

impl JobHandle {
    pub fn new(
        job_id: String,
        spec: JobSpec,
        store: Arc<dyn Store>,
        bridge: Arc<ObserveBridge>,
    ) -> Self {
        Self {
            job_id,
            spec,
            store,
            bridge,
            state: Mutex::new(RunState::New),
            start_once: AtomicBool::new(false),
            stop_once: AtomicBool::new(false),
            participant: Mutex::new(None),
            peer: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn bridge(&self) -> &Arc<ObserveBridge> {
        &self.bridge
    }

    /// `Start`: idempotent, one-shot. `offchain_key_id` is the loaded
    /// off-chain signing key's id, checked against `job_spec.key_id`
    /// (step 1). `acquire_peer`/`make_participant` build the P2P handle and
    /// consensus participant; they are only invoked on the first call.
    pub async fn start<F, G>(
        &self,
        offchain_key_id: &str,
        acquire_peer: F,
        make_participant: G,
        deadline: Deadline,
    ) -> Result<(), OcrError>
    where
        F: FnOnce(&JobSpec, &ParsedTimeouts) -> Result<Arc<dyn PeerHandle>, OcrError>,
        G: FnOnce(
            &str,
            &JobSpec,
            &ParsedTimeouts,
            &Arc<ObserveBridge>,
            Arc<dyn PeerHandle>,
        ) -> Result<Arc<dyn ConsensusParticipant>, OcrError>,
    {
        if self.start_once.swap(true, Ordering::SeqCst) {
            return Ok(()); // already started: Start is a no-op thereafter
        }

        if self.spec.key_id != offchain_key_id {
            return Err(OcrError::validation(format!(
                "job_spec.key_id ({}) does not match loaded off-chain key id ({offchain_key_id})",
                self.spec.key_id
            )));
        }

        let timeouts = parse_timeouts(&self.spec)?;

        let peer = acquire_peer(&self.spec, &timeouts)?;
        let participant = make_participant(
            &self.job_id,
            &self.spec,
            &timeouts,
            &self.bridge,
            peer.clone(),
        )?;

        self.store
            .upsert_job(
                Job {
                    job_id: self.job_id.clone(),
                    job_spec: self.spec.clone(),
                    active: true,
                    created_at: now_unix(),
                    row_id: 0,
                },
                deadline,
            )
            .await?;

        participant.start().await?;

        *self.participant.lock().await = Some(participant);
        *self.peer.lock().await = Some(peer);
        *self.state.lock().await = RunState::Running;
        Ok(())
    }

    /// `Run(result)`: a no-op unless the job is `Running`; otherwise
    /// offered to the data-source bridge without queuing.
    pub async fn run(&self, result: &str) -> Result<(), OcrError> {
        if !matches!(*self.state.lock().await, RunState::Running) {
            return Ok(());
        }
        self.bridge.run(result).await?;
        Ok(())
    }

    /// `Stop`: closes the participant, then releases the peer. Idempotent;
    /// never cancellable (spec §5) — callers must await it to completion.
    pub async fn stop(&self) -> Result<(), OcrError> {
        if self.stop_once.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bridge.stop();
        *self.state.lock().await = RunState::Stopped;

        if let Some(participant) = self.participant.lock().await.take() {
            if let Err(err) = participant.close().await {
                tracing::warn!(job_id = %self.job_id, %err, "consensus participant close failed");
            }
        }
        if let Some(peer) = self.peer.lock().await.take() {
            if let Err(err) = peer.release().await {
                tracing::warn!(job_id = %self.job_id, %err, "peer release failed");
            }
        }
        Ok(())
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_store::MemoryStore;

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

    fn sample_spec(key_id: &str) -> JobSpec {
        JobSpec {
            is_bootstrap_peer: false,
            feed_id: "BTC/USD".to_string(),
            key_id: key_id.to_string(),
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

    fn handle(key_id: &str) -> JobHandle {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let bridge = Arc::new(ObserveBridge::new(
            "job-1".to_string(),
            crate::bridge::WebhookConfig::with_defaults(
                "http://localhost".to_string(),
                "k".to_string(),
                "s".to_string(),
            ),
        ));
        JobHandle::new("job-1".to_string(), sample_spec(key_id), store, bridge)
    }

    #[tokio::test]
    async fn start_rejects_key_id_mismatch_without_mutating_store() {
        let job = handle("expected-key");
        let result = job
            .start(
                "different-key",
                |_, _| Ok(Arc::new(NoopPeer) as Arc<dyn PeerHandle>),
                |_, _, _, _, _| Ok(Arc::new(NoopParticipant) as Arc<dyn ConsensusParticipant>),
                dl(),
            )
            .await;
        assert!(result.is_err());
        assert!(matches!(*job.state.lock().await, RunState::New));
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let job = handle("k1");
        for _ in 0..2 {
            job.start(
                "k1",
                |_, _| Ok(Arc::new(NoopPeer) as Arc<dyn PeerHandle>),
                |_, _, _, _, _| Ok(Arc::new(NoopParticipant) as Arc<dyn ConsensusParticipant>),
                dl(),
            )
            .await
            .unwrap();
        }
        assert!(matches!(*job.state.lock().await, RunState::Running));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop_and_start_still_works_after() {
        let job = handle("k1");
        job.stop().await.unwrap();
        job.start(
            "k1",
            |_, _| Ok(Arc::new(NoopPeer) as Arc<dyn PeerHandle>),
            |_, _, _, _, _| Ok(Arc::new(NoopParticipant) as Arc<dyn ConsensusParticipant>),
            dl(),
        )
        .await
        .unwrap();
        assert!(matches!(*job.state.lock().await, RunState::Running));
    }

    #[tokio::test]
    async fn run_is_noop_when_not_running() {
        let job = handle("k1");
        job.run("42").await.unwrap(); // New state, not Running: no-op, no error
    }
}
