//! The job lifecycle manager (spec §4.G, §4.H): one long-lived job per
//! oracle feed, the data-source bridge linking it to the external
//! initiator, and the registry that starts/runs/stops jobs by id.

pub mod bridge;
pub mod job;
pub mod service;

pub use bridge::{ObserveBridge, SharedObserveBridge, WebhookConfig};
pub use job::{ConsensusParticipant, JobHandle, ParsedTimeouts, PeerHandle};
pub use service::JobService;
