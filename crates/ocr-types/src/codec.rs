//! Canonical, deterministic encoding of `Observation`, `Report`, and
//! `ReportToSign` (spec §4.B). The exact bytes matter: they are hashed and
//! signed, so every field is length-prefixed and big-endian, with no
//! serde/serde_json involved (that would not guarantee byte-stability
//! across versions).

use crate::digest::{ConfigDigest, DigestInput};
use crate::error::OcrError;
use num_bigint::{BigInt, Sign};
use sha3::{Digest as _, Keccak256};

fn put_bytes_with_len(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn take_bytes_with_len<'a>(buf: &'a [u8], cursor: &mut usize) -> Result<&'a [u8], OcrError> {
    if buf.len() < *cursor + 4 {
        return Err(OcrError::validation("truncated length prefix"));
    }
    let len =
        u32::from_be_bytes(buf[*cursor..*cursor + 4].try_into().unwrap()) as usize;
    *cursor += 4;
    if buf.len() < *cursor + len {
        return Err(OcrError::validation("truncated field"));
    }
    let slice = &buf[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

fn bigint_to_signed_be(v: &BigInt) -> Vec<u8> {
    v.to_signed_bytes_be()
}

fn bigint_from_signed_be(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        BigInt::new(Sign::NoSign, vec![])
    } else {
        BigInt::from_signed_bytes_be(bytes)
    }
}

/// One oracle's observation: `{timestamp, value}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub timestamp: i64,
    pub value: BigInt,
}

impl Observation {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        put_bytes_with_len(&mut buf, &bigint_to_signed_be(&self.value));
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OcrError> {
        if bytes.len() < 8 {
            return Err(OcrError::validation("observation too short"));
        }
        let timestamp = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let mut cursor = 8;
        let value_bytes = take_bytes_with_len(bytes, &mut cursor)?;
        Ok(Self {
            timestamp,
            value: bigint_from_signed_be(value_bytes),
        })
    }
}

/// An attributed observation: who said what. `signer` is the oracle index
/// in the current config's signer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributedObservation {
    pub observer: u8,
    pub observation: Observation,
}

/// The aggregated report carried on-chain. `observers` is parallel to
/// `observations`, both sorted ascending by value, per spec §4.B.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub observations_timestamp: i64,
    pub observers: Vec<u8>,
    pub observations: Vec<BigInt>,
}

impl Report {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.observations_timestamp.to_be_bytes());
        put_bytes_with_len(&mut buf, &self.observers);
        buf.extend_from_slice(&(self.observations.len() as u32).to_be_bytes());
        for obs in &self.observations {
            put_bytes_with_len(&mut buf, &bigint_to_signed_be(obs));
        }
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, OcrError> {
        if bytes.len() < 8 {
            return Err(OcrError::validation("report too short"));
        }
        let observations_timestamp = i64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let mut cursor = 8;
        let observers = take_bytes_with_len(bytes, &mut cursor)?.to_vec();

        if bytes.len() < cursor + 4 {
            return Err(OcrError::validation("truncated observation count"));
        }
        let count = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;

        let mut observations = Vec::with_capacity(count);
        for _ in 0..count {
            let v = take_bytes_with_len(bytes, &mut cursor)?;
            observations.push(bigint_from_signed_be(v));
        }

        if observers.len() != observations.len() {
            return Err(OcrError::validation(
                "observers/observations length mismatch",
            ));
        }

        Ok(Self {
            observations_timestamp,
            observers,
            observations,
        })
    }

    /// The median value: callers must have built this report with
    /// `observations` already sorted ascending (spec §4.F `build_report`).
    pub fn median(&self) -> Option<&BigInt> {
        self.observations.get(self.observations.len() / 2)
    }
}

/// What the on-chain signer actually signs (spec §4.B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportToSign {
    pub config_digest: ConfigDigest,
    pub epoch: u32,
    pub round: u8,
    pub extra_hash: [u8; 32],
    pub report: Report,
}

impl ReportToSign {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.config_digest.as_bytes());
        buf.extend_from_slice(&self.epoch.to_be_bytes());
        buf.push(self.round);
        buf.extend_from_slice(&self.extra_hash);
        buf.extend_from_slice(&self.report.encode());
        buf
    }

    /// `Digest()`: Keccak-256 of the deterministic serialization.
    pub fn digest(&self) -> [u8; 32] {
        let hash = Keccak256::digest(self.encode());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hash);
        out
    }

    /// The `(epoch, round)` report timestamp used for monotonicity checks.
    pub fn epoch_round(&self) -> (u32, u8) {
        (self.epoch, self.round)
    }
}

/// Canonical byte serialization of the config fields that feed into
/// [`crate::digest::compute`]. Lives here (not in `digest.rs`) because it
/// shares the length-prefixing helpers with the rest of the codec.
pub(crate) fn canonical_config_bytes(input: &DigestInput<'_>) -> Vec<u8> {
    let mut buf = Vec::new();
    put_bytes_with_len(&mut buf, input.feed_id.as_bytes());
    buf.extend_from_slice(&input.config_count.to_be_bytes());

    buf.extend_from_slice(&(input.signers.len() as u32).to_be_bytes());
    for signer in input.signers {
        put_bytes_with_len(&mut buf, signer);
    }
    buf.extend_from_slice(&(input.transmitters.len() as u32).to_be_bytes());
    for transmitter in input.transmitters {
        put_bytes_with_len(&mut buf, transmitter);
    }
    buf.push(input.f);
    put_bytes_with_len(&mut buf, input.onchain_config);
    buf.extend_from_slice(&input.offchain_config_version.to_be_bytes());
    put_bytes_with_len(&mut buf, input.offchain_config);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_round_trips() {
        let obs = Observation {
            timestamp: 1_700_000_000,
            value: BigInt::from(-123_456_789i64),
        };
        let decoded = Observation::decode(&obs.encode()).unwrap();
        assert_eq!(obs, decoded);
    }

    #[test]
    fn observation_zero_value_round_trips() {
        let obs = Observation {
            timestamp: 0,
            value: BigInt::from(0),
        };
        let decoded = Observation::decode(&obs.encode()).unwrap();
        assert_eq!(obs, decoded);
    }

    #[test]
    fn report_round_trips() {
        let report = Report {
            observations_timestamp: 42,
            observers: vec![0, 2, 3],
            observations: vec![BigInt::from(10), BigInt::from(11), BigInt::from(12)],
        };
        let decoded = Report::decode(&report.encode()).unwrap();
        assert_eq!(report, decoded);
    }

    #[test]
    fn report_median_is_middle_of_sorted() {
        let report = Report {
            observations_timestamp: 0,
            observers: vec![0, 1, 2, 3],
            observations: vec![
                BigInt::from(10),
                BigInt::from(11),
                BigInt::from(12),
                BigInt::from(13),
            ],
        };
        assert_eq!(report.median(), Some(&BigInt::from(12)));
    }

    #[test]
    fn report_to_sign_digest_is_deterministic() {
        let report = Report {
            observations_timestamp: 1,
            observers: vec![0],
            observations: vec![BigInt::from(5)],
        };
        let rts = ReportToSign {
            config_digest: ConfigDigest([1u8; 32]),
            epoch: 3,
            round: 1,
            extra_hash: [2u8; 32],
            report,
        };
        assert_eq!(rts.digest(), rts.digest());
    }

    #[test]
    fn mismatched_observers_length_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0i64.to_be_bytes());
        put_bytes_with_len(&mut buf, &[0, 1, 2]); // 3 observers
        buf.extend_from_slice(&1u32.to_be_bytes()); // 1 observation
        put_bytes_with_len(&mut buf, &bigint_to_signed_be(&BigInt::from(1)));
        assert!(Report::decode(&buf).is_err());
    }
}
