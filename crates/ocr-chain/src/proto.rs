//! Wire-compatible protobuf message shapes for the narrow slice of the
//! Cosmos feed-oracle module this adapter speaks to (spec §4.D). Hand
//! derived against `prost::Message` rather than generated by `tonic-build`
//! from a `.proto` file — there is no `.proto` source in this workspace,
//! and the adapter only ever needs these handful of message shapes.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct QueryLatestTransmissionDetailsRequest {
    #[prost(string, tag = "1")]
    pub feed_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryLatestTransmissionDetailsResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub config_digest: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub epoch: u32,
    #[prost(uint32, tag = "3")]
    pub round: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub latest_answer: Vec<u8>,
    #[prost(int64, tag = "5")]
    pub latest_timestamp: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryLatestRoundRequestedRequest {
    #[prost(string, tag = "1")]
    pub feed_id: String,
    #[prost(int64, tag = "2")]
    pub lookback_seconds: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryLatestRoundRequestedResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub config_digest: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub epoch: u32,
    #[prost(uint32, tag = "3")]
    pub round: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryFeedConfigInfoRequest {
    #[prost(string, tag = "1")]
    pub feed_id: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryFeedConfigInfoResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub latest_config_digest: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub epoch: u32,
    #[prost(uint32, tag = "3")]
    pub round: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct AttributedSignatureProto {
    #[prost(uint32, tag = "1")]
    pub signer: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// `MsgTransmit`, spec §4.D. Signatures are ordered by signer index.
#[derive(Clone, PartialEq, Message)]
pub struct MsgTransmit {
    #[prost(bytes = "vec", tag = "1")]
    pub transmitter_addr: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub config_digest: Vec<u8>,
    #[prost(string, tag = "3")]
    pub feed_id: String,
    #[prost(uint32, tag = "4")]
    pub epoch: u32,
    #[prost(uint32, tag = "5")]
    pub round: u32,
    #[prost(bytes = "vec", tag = "6")]
    pub extra_hash: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    pub report: Vec<u8>,
    #[prost(message, repeated, tag = "8")]
    pub signatures: Vec<AttributedSignatureProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgTransmitResponse {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub raw_log: String,
}
