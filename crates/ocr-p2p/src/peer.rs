//! The reference-counted peer (spec §4.E, §9 design note): one libp2p
//! swarm per process, acquired by jobs through [`crate::endpoint`] and
//! [`crate::bootstrap`] factories rather than one swarm per job.

use crate::behaviour::{new_request_response, OcrBehaviour, OcrWireAck, OcrWireMessage};
use crate::config::NetworkingConfig;
use libp2p::identity::Keypair;
use libp2p::request_response::{self, OutboundRequestId};
use libp2p::swarm::SwarmEvent;
use libp2p::{noise, tcp, yamux, PeerId, Swarm, SwarmBuilder};
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

pub(crate) enum Command {
    Dial(libp2p::Multiaddr),
    Send {
        peer: PeerId,
        message: OcrWireMessage,
    },
    RegisterRoute {
        config_digest: ConfigDigest,
        sender: mpsc::Sender<(u8, Vec<u8>)>,
    },
    UnregisterRoute {
        config_digest: ConfigDigest,
    },
}

/// The live peer. Cloning is cheap (everything behind `Arc`); dropping the
/// last active-job reference via [`Peer::release`] lets the embedding tear
/// the swarm task down.
#[derive(Clone)]
pub struct Peer {
    inner: Arc<PeerInner>,
}

struct PeerInner {
    local_peer_id: PeerId,
    active_jobs: AtomicUsize,
    commands: mpsc::Sender<Command>,
    driver: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Peer {
    /// Builds the swarm, binds `config.listen_addresses`, and spawns the
    /// driver task. `config.validate()` must have already passed (spec
    /// §4.E: an invalid config never reaches this point).
    pub async fn start(keypair: Keypair, config: NetworkingConfig) -> Result<Self, OcrError> {
        config.validate()?;

        let local_peer_id = PeerId::from(keypair.public());
        let mut swarm: Swarm<OcrBehaviour> = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )
            .map_err(|e| OcrError::internal(format!("failed to configure tcp transport: {e}")))?
            .with_behaviour(|key| OcrBehaviour {
                request_response: new_request_response(),
                identify: libp2p::identify::Behaviour::new(libp2p::identify::Config::new(
                    "/ocr2/1.0.0".to_string(),
                    key.public(),
                )),
            })
            .map_err(|e| OcrError::internal(format!("failed to build behaviour: {e}")))?
            .build();

        for addr in &config.listen_addresses {
            swarm
                .listen_on(addr.clone())
                .map_err(|e| OcrError::transport(format!("listen_on {addr} failed: {e}")))?;
        }

        let (tx, rx) = mpsc::channel(config.incoming_buffer.max(1));
        let driver = tokio::spawn(run_driver(swarm, rx));

        Ok(Self {
            inner: Arc::new(PeerInner {
                local_peer_id,
                active_jobs: AtomicUsize::new(0),
                commands: tx,
                driver: Mutex::new(Some(driver)),
            }),
        })
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.inner.local_peer_id
    }

    /// A job acquiring the shared peer (spec §9: "reference-counts the
    /// peer").
    pub fn acquire(&self) {
        self.inner.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    /// Releases this job's reference. When the count reaches zero the
    /// swarm driver is shut down.
    pub async fn release(&self) -> Result<(), OcrError> {
        if self.inner.active_jobs.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Some(driver) = self.inner.driver.lock().await.take() {
                driver.abort();
            }
        }
        Ok(())
    }

    pub(crate) async fn register_route(
        &self,
        config_digest: ConfigDigest,
        sender: mpsc::Sender<(u8, Vec<u8>)>,
    ) -> Result<(), OcrError> {
        self.inner
            .commands
            .send(Command::RegisterRoute {
                config_digest,
                sender,
            })
            .await
            .map_err(|_| OcrError::stopped("peer driver is gone"))
    }

    pub(crate) async fn unregister_route(&self, config_digest: ConfigDigest) {
        let _ = self
            .inner
            .commands
            .send(Command::UnregisterRoute { config_digest })
            .await;
    }

    pub(crate) async fn send(&self, peer: PeerId, message: OcrWireMessage) -> Result<(), OcrError> {
        self.inner
            .commands
            .send(Command::Send { peer, message })
            .await
            .map_err(|_| OcrError::stopped("peer driver is gone"))
    }

    pub async fn dial(&self, addr: libp2p::Multiaddr) -> Result<(), OcrError> {
        self.inner
            .commands
            .send(Command::Dial(addr))
            .await
            .map_err(|_| OcrError::stopped("peer driver is gone"))
    }
}

async fn run_driver(mut swarm: Swarm<OcrBehaviour>, mut commands: mpsc::Receiver<Command>) {
    let mut routes: HashMap<ConfigDigest, mpsc::Sender<(u8, Vec<u8>)>> = HashMap::new();
    let mut pending: HashMap<OutboundRequestId, oneshot::Sender<()>> = HashMap::new();

    loop {
        tokio::select! {
            Some(command) = commands.recv() => match command {
                Command::Dial(addr) => {
                    if let Err(err) = swarm.dial(addr.clone()) {
                        tracing::warn!(%addr, %err, "p2p dial failed");
                    }
                }
                Command::Send { peer, message } => {
                    let id = swarm
                        .behaviour_mut()
                        .request_response
                        .send_request(&peer, message);
                    let (done_tx, _done_rx) = oneshot::channel();
                    pending.insert(id, done_tx);
                }
                Command::RegisterRoute { config_digest, sender } => {
                    routes.insert(config_digest, sender);
                }
                Command::UnregisterRoute { config_digest } => {
                    routes.remove(&config_digest);
                }
            },
            event = swarm.select_next_some() => {
                handle_swarm_event(&mut swarm, event, &routes, &mut pending);
            }
        }
    }
}

fn handle_swarm_event(
    swarm: &mut Swarm<OcrBehaviour>,
    event: SwarmEvent<crate::behaviour::OcrBehaviourEvent>,
    routes: &HashMap<ConfigDigest, mpsc::Sender<(u8, Vec<u8>)>>,
    pending: &mut HashMap<OutboundRequestId, oneshot::Sender<()>>,
) {
    use crate::behaviour::OcrBehaviourEvent;
    match event {
        SwarmEvent::Behaviour(OcrBehaviourEvent::RequestResponse(
            request_response::Event::Message { message, .. },
        )) => match message {
            request_response::Message::Request {
                request, channel, ..
            } => {
                if let Some(route) = routes.get(&ConfigDigest(request.config_digest)) {
                    let sender = route.clone();
                    // Non-queuing, bounded: drop and log on overflow (spec §5 backpressure).
                    if sender.try_send((request.oracle_index, request.payload)).is_err() {
                        tracing::warn!("p2p incoming buffer full, dropping message");
                    }
                }
                let _ = swarm
                    .behaviour_mut()
                    .request_response
                    .send_response(channel, OcrWireAck);
            }
            request_response::Message::Response { request_id, .. } => {
                if let Some(done) = pending.remove(&request_id) {
                    let _ = done.send(());
                }
            }
        },
        SwarmEvent::Behaviour(OcrBehaviourEvent::RequestResponse(
            request_response::Event::OutboundFailure { request_id, error, .. },
        )) => {
            pending.remove(&request_id);
            tracing::warn!(%error, "p2p outbound request failed");
        }
        SwarmEvent::NewListenAddr { address, .. } => {
            tracing::info!(%address, "p2p listening");
        }
        _ => {}
    }
}

use futures::StreamExt as _;
