//! The chain adapter (spec §4.D): read-side queries against the
//! feed-oracle module and the signed, serialized `MsgTransmit` broadcast
//! path. [`client::CosmosChainClient`] is the only concrete implementation;
//! [`query::ChainQuery`] and [`transmit::ChainTransmitter`] are the seams
//! the plugin and job service depend on instead.

pub mod client;
pub mod keyring;
pub mod proto;
pub mod query;
pub mod transmit;

pub use client::CosmosChainClient;
pub use keyring::OnchainKeyring;
pub use query::{ChainQuery, FeedConfigInfo, LatestRoundRequested, LatestTransmissionDetails};
pub use transmit::{AttributedSignature, ChainTransmitter, MsgTransmitInput};
