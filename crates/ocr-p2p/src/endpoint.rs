//! `BinaryNetworkEndpointFactory` (spec §4.E): a point-to-point binary
//! endpoint scoped to a `(config_digest, oracles[])` set, the transport
//! the consensus participant sends/receives protocol messages over.

use crate::behaviour::OcrWireMessage;
use crate::peer::Peer;
use async_trait::async_trait;
use libp2p::PeerId;
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use tokio::sync::mpsc;

#[async_trait]
pub trait BinaryNetworkEndpointFactory: Send + Sync {
    async fn new_endpoint(
        &self,
        config_digest: ConfigDigest,
        oracles: Vec<PeerId>,
    ) -> Result<Box<dyn BinaryNetworkEndpoint>, OcrError>;
}

#[async_trait]
pub trait BinaryNetworkEndpoint: Send + Sync {
    /// Sends `payload` to the oracle at `to_index`, addressed by its
    /// position in the `oracles[]` set this endpoint was created with.
    async fn send_to(&self, to_index: u8, payload: Vec<u8>) -> Result<(), OcrError>;

    /// Receives the next `(from_index, payload)` delivered for this
    /// endpoint's config digest. Returns `None` once the endpoint closes.
    async fn recv(&mut self) -> Option<(u8, Vec<u8>)>;
}

struct LivePeerNetworkEndpointFactory {
    peer: Peer,
    incoming_buffer: usize,
}

pub fn factory(peer: Peer, incoming_buffer: usize) -> Box<dyn BinaryNetworkEndpointFactory> {
    Box::new(LivePeerNetworkEndpointFactory {
        peer,
        incoming_buffer,
    })
}

#[async_trait]
impl BinaryNetworkEndpointFactory for LivePeerNetworkEndpointFactory {
    async fn new_endpoint(
        &self,
        config_digest: ConfigDigest,
        oracles: Vec<PeerId>,
    ) -> Result<Box<dyn BinaryNetworkEndpoint>, OcrError> {
        let (tx, rx) = mpsc::channel(self.incoming_buffer.max(1));
        self.peer.register_route(config_digest, tx).await?;
        Ok(Box::new(LiveBinaryNetworkEndpoint {
            peer: self.peer.clone(),
            config_digest,
            oracles,
            incoming: rx,
        }))
    }
}

struct LiveBinaryNetworkEndpoint {
    peer: Peer,
    config_digest: ConfigDigest,
    oracles: Vec<PeerId>,
    incoming: mpsc::Receiver<(u8, Vec<u8>)>,
}

#[async_trait]
impl BinaryNetworkEndpoint for LiveBinaryNetworkEndpoint {
    async fn send_to(&self, to_index: u8, payload: Vec<u8>) -> Result<(), OcrError> {
        let peer_id = *self.oracles.get(to_index as usize).ok_or_else(|| {
            OcrError::validation(format!("no oracle at index {to_index}"))
        })?;
        self.peer
            .send(
                peer_id,
                OcrWireMessage {
                    config_digest: self.config_digest.0,
                    oracle_index: to_index,
                    payload,
                },
            )
            .await
    }

    async fn recv(&mut self) -> Option<(u8, Vec<u8>)> {
        self.incoming.recv().await
    }
}

impl Drop for LiveBinaryNetworkEndpoint {
    fn drop(&mut self) {
        let peer = self.peer.clone();
        let digest = self.config_digest;
        tokio::spawn(async move {
            peer.unregister_route(digest).await;
        });
    }
}
