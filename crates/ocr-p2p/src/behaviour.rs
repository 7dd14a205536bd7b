//! The swarm's `NetworkBehaviour` (spec §4.E): a single request/response
//! protocol carrying opaque OCR wire bytes, tagged with the
//! `(config_digest, oracle_index)` pair so one swarm can multiplex every
//! job's point-to-point endpoint. No gossipsub: discovery here is
//! store-backed, not DHT-backed.

use libp2p::request_response::{self, ProtocolSupport};
use libp2p::swarm::NetworkBehaviour;
use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_NAME: StreamProtocol = StreamProtocol::new("/ocr2/binary/1.0.0");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrWireMessage {
    pub config_digest: [u8; 32],
    pub oracle_index: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrWireAck;

pub type OcrRequestResponse =
    request_response::cbor::Behaviour<OcrWireMessage, OcrWireAck>;

#[derive(NetworkBehaviour)]
pub struct OcrBehaviour {
    pub request_response: OcrRequestResponse,
    pub identify: libp2p::identify::Behaviour,
}

pub fn new_request_response() -> OcrRequestResponse {
    request_response::cbor::Behaviour::new(
        [(PROTOCOL_NAME, ProtocolSupport::Full)],
        request_response::Config::default(),
    )
}
