//! The consensus participant a started job drives (spec §4.G step 6,
//! `ConsensusParticipant`/`PeerHandle` seams in `ocr-job`). Deliberately
//! not a reimplementation of the concrete BFT consensus algorithm — that
//! is out of scope here. What runs is the single-oracle path the plugin
//! already supports on its own: observe, fold that one observation into
//! a report, ask the plugin whether to accept and transmit it, and
//! broadcast (the chain adapter's own keyring supplies the transmitter's
//! signature, spec §4.D). A deployment running more than one oracle needs
//! a real gossip-driven consensus round wired into this same seam
//! instead.

use async_trait::async_trait;
use num_bigint::BigInt;
use ocr_chain::query::ChainQuery;
use ocr_chain::transmit::{ChainTransmitter, MsgTransmitInput};
use ocr_job::bridge::ObserveBridge;
use ocr_job::job::{ConsensusParticipant, PeerHandle};
use ocr_median::{DataSource, EpochRound, MedianPlugin};
use ocr_p2p::bootstrap::Bootstrapper;
use ocr_p2p::Peer;
use ocr_types::codec::Report;
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Bridges the job's data-source rendezvous into the plugin's
/// `DataSource` seam (spec §4.F/§4.G): `Observation` asks this, this asks
/// the webhook-fired `ObserveBridge`.
pub struct BridgeDataSource {
    bridge: Arc<ObserveBridge>,
    observation_timeout: Duration,
}

impl BridgeDataSource {
    pub fn new(bridge: Arc<ObserveBridge>, observation_timeout: Duration) -> Self {
        Self {
            bridge,
            observation_timeout,
        }
    }
}

#[async_trait]
impl DataSource for BridgeDataSource {
    async fn observe(&self) -> Result<Option<BigInt>, OcrError> {
        Ok(Some(self.bridge.observe(self.observation_timeout).await?))
    }
}

/// A job's hold on the shared [`Peer`] (spec §4.E). Acquired on
/// construction, released on `Stop`.
pub struct JobPeerHandle {
    peer: Peer,
}

impl JobPeerHandle {
    pub fn acquired(peer: Peer) -> Self {
        peer.acquire();
        Self { peer }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }
}

#[async_trait]
impl PeerHandle for JobPeerHandle {
    async fn release(&self) -> Result<(), OcrError> {
        self.peer.release().await
    }
}

/// A bootstrap-peer job's participant (`job_spec.is_bootstrap_peer ==
/// true`, spec §4.E): already joined the network on construction via
/// [`ocr_p2p::bootstrap::BootstrapperFactory::new_bootstrapper`], so
/// `start` has nothing further to do. `close` tears down the bootstrap
/// peer's hold on the network.
pub struct BootstrapParticipant {
    bootstrapper: Box<dyn Bootstrapper>,
}

impl BootstrapParticipant {
    pub fn new(bootstrapper: Box<dyn Bootstrapper>) -> Self {
        Self { bootstrapper }
    }
}

#[async_trait]
impl ConsensusParticipant for BootstrapParticipant {
    async fn start(&self) -> Result<(), OcrError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), OcrError> {
        self.bootstrapper.close().await
    }
}

/// The single-oracle consensus embedding: one round of observe →
/// build_report → should_accept → should_transmit → broadcast, repeated
/// every `report_interval` until closed. No epoch/round negotiation with
/// peers — `epoch` is fixed at 1 and `round` is a local counter, which is
/// only meaningful because there is exactly one transmitter driving the
/// contract.
pub struct DefaultConsensusParticipant<Q, T>
where
    Q: ChainQuery + Send + Sync + 'static,
    T: ChainTransmitter + Send + Sync + 'static,
{
    plugin: Arc<MedianPlugin<Q>>,
    transmitter: Arc<T>,
    signer_index: u8,
    config_digest: ConfigDigest,
    feed_id: String,
    report_interval: Duration,
    round: AtomicU8,
    stop: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<Q, T> DefaultConsensusParticipant<Q, T>
where
    Q: ChainQuery + Send + Sync + 'static,
    T: ChainTransmitter + Send + Sync + 'static,
{
    pub fn new(
        plugin: Arc<MedianPlugin<Q>>,
        transmitter: Arc<T>,
        signer_index: u8,
        config_digest: ConfigDigest,
        feed_id: String,
        report_interval: Duration,
    ) -> Self {
        Self {
            plugin,
            transmitter,
            signer_index,
            config_digest,
            feed_id,
            report_interval,
            round: AtomicU8::new(0),
            stop: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    fn next_epoch_round(&self) -> EpochRound {
        EpochRound {
            epoch: 1,
            round: self.round.fetch_add(1, Ordering::SeqCst),
        }
    }

    async fn run_once(&self) -> Result<(), OcrError> {
        let query = self.plugin.query();
        let observation = self.plugin.observation(&query).await?;
        let Some(report_bytes) = self
            .plugin
            .report(&query, &[(self.signer_index, observation)])
            .await?
        else {
            return Ok(());
        };
        let report = Report::decode(&report_bytes)?;
        let epoch_round = self.next_epoch_round();

        if !self
            .plugin
            .should_accept_finalized_report(epoch_round, &report)
            .await?
        {
            return Ok(());
        }
        if !self
            .plugin
            .should_transmit_accepted_report(epoch_round)
            .await?
        {
            return Ok(());
        }

        self.transmitter
            .transmit(MsgTransmitInput {
                config_digest: self.config_digest,
                feed_id: self.feed_id.clone(),
                epoch: epoch_round.epoch,
                round: epoch_round.round,
                // No leader-selected randomness in the single-oracle path.
                extra_hash: [0u8; 32],
                report: report_bytes,
                signatures: Vec::new(),
            })
            .await
    }
}

#[async_trait]
impl<Q, T> ConsensusParticipant for DefaultConsensusParticipant<Q, T>
where
    Q: ChainQuery + Send + Sync + 'static,
    T: ChainTransmitter + Send + Sync + 'static,
{
    async fn start(&self) -> Result<(), OcrError> {
        // The loop closes over a fresh participant sharing this one's
        // state rather than `self`, since `start` only borrows `&self`
        // but the spawned task must outlive the call.
        let inner = Arc::new(DefaultConsensusParticipant {
            plugin: self.plugin.clone(),
            transmitter: self.transmitter.clone(),
            signer_index: self.signer_index,
            config_digest: self.config_digest,
            feed_id: self.feed_id.clone(),
            report_interval: self.report_interval,
            round: AtomicU8::new(self.round.load(Ordering::SeqCst)),
            stop: self.stop.clone(),
            task: Mutex::new(None),
        });
        let report_interval = self.report_interval;

        let handle = tokio::spawn(async move {
            while !inner.stop.load(Ordering::SeqCst) {
                if let Err(err) = inner.run_once().await {
                    tracing::warn!(feed_id = %inner.feed_id, %err, "consensus round failed");
                }
                tokio::time::sleep(report_interval).await;
            }
        });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn close(&self) -> Result<(), OcrError> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }
}
