//! The durable consensus-state store (spec §4.C): per-feed persistent
//! state, contract config, pending transmissions, and peer announcements,
//! plus the job registry rows the job service uses for restart recovery.

pub mod memory;
pub mod models;
pub mod redb_store;
pub mod store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use store::{Deadline, Store};
