//! The numerical-median reporting plugin (spec §4.F): decides whether to
//! report, builds reports, and vets finalized reports before
//! acceptance/transmission.

pub mod data_source;
pub mod deviation;
pub mod plugin;

pub use data_source::DataSource;
pub use deviation::deviates;
pub use plugin::{EpochRound, MedianPlugin, MAX_OBSERVATION_LEN, MAX_QUERY_LEN, MAX_REPORT_LEN, UNIQUE_REPORTS};
