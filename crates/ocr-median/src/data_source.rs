//! The seam between the plugin and the job's data-source bridge (spec
//! §4.F/§4.G): `Observation` asks this for a value, never talking to the
//! external initiator directly.

use async_trait::async_trait;
use num_bigint::BigInt;
use ocr_types::OcrError;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Returns `None` where the source spec calls "a nil big integer" —
    /// the plugin turns that into a validation error, never a zero value.
    async fn observe(&self) -> Result<Option<BigInt>, OcrError>;
}
