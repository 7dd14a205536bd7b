//! The median reporting plugin: the per-round algorithmic core invoked by
//! the consensus embedding. Observation, report-building, and the
//! accept/transmit gates below follow an attestation-aggregation shape —
//! gossip replaced by a plugin callback interface, quorum replaced by the
//! state-store-backed config/epoch tracking below.

use crate::deviation::deviates;
use crate::data_source::DataSource;
use async_trait::async_trait;
use num_bigint::BigInt;
use ocr_chain::query::ChainQuery;
use ocr_store::models::ContractConfig;
use ocr_types::codec::{AttributedObservation, Observation, Report};
use ocr_types::digest::ConfigDigest;
use ocr_types::OcrError;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

pub const MAX_QUERY_LEN: usize = 0;
pub const MAX_OBSERVATION_LEN: usize = 65536;
pub const MAX_REPORT_LEN: usize = 65536;
pub const UNIQUE_REPORTS: bool = false;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpochRound {
    pub epoch: u32,
    pub round: u8,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Mutable acceptance state, guarded so `ShouldAcceptFinalizedReport`
/// updates happen-before any subsequent call on the same instance (spec
/// §5 ordering guarantee).
struct AcceptanceState {
    latest_accepted_epoch_round: EpochRound,
    latest_accepted_median: BigInt,
}

pub struct MedianPlugin<Q: ChainQuery> {
    config: ContractConfig,
    config_digest: ConfigDigest,
    feed_id: String,
    alpha_ppb: u64,
    delta_c: Duration,
    chain: Arc<Q>,
    data_source: Arc<dyn DataSource>,
    state: Mutex<AcceptanceState>,
}

impl<Q: ChainQuery> MedianPlugin<Q> {
    pub fn new(
        config: ContractConfig,
        feed_id: String,
        alpha_ppb: u64,
        delta_c: Duration,
        chain: Arc<Q>,
        data_source: Arc<dyn DataSource>,
    ) -> Self {
        let config_digest = config.config_digest;
        Self {
            config,
            config_digest,
            feed_id,
            alpha_ppb,
            delta_c,
            chain,
            data_source,
            state: Mutex::new(AcceptanceState {
                latest_accepted_epoch_round: EpochRound { epoch: 0, round: 0 },
                latest_accepted_median: BigInt::from(0),
            }),
        }
    }

    pub fn config_digest(&self) -> ConfigDigest {
        self.config_digest
    }

    /// `Query(report_ts)`: always empty; callers reject non-empty queries.
    pub fn query(&self) -> Vec<u8> {
        Vec::new()
    }

    /// `Observation(report_ts, query)`.
    pub async fn observation(&self, query: &[u8]) -> Result<Vec<u8>, OcrError> {
        if !query.is_empty() {
            return Err(OcrError::validation("observation query must be empty"));
        }
        let value = self
            .data_source
            .observe()
            .await?
            .ok_or_else(|| OcrError::validation("data source returned a nil value"))?;
        let observation = Observation {
            timestamp: now_unix(),
            value,
        };
        let encoded = observation.encode();
        if encoded.len() > MAX_OBSERVATION_LEN {
            return Err(OcrError::validation("observation exceeds max_observation_len"));
        }
        Ok(encoded)
    }

    /// `Report(report_ts, query, attributed_observations[])`.
    pub async fn report(
        &self,
        query: &[u8],
        raw_observations: &[(u8, Vec<u8>)],
    ) -> Result<Option<Vec<u8>>, OcrError> {
        if !query.is_empty() {
            return Err(OcrError::validation("report query must be empty"));
        }

        let mut observations = Vec::with_capacity(raw_observations.len());
        for (observer, raw) in raw_observations {
            // Malformed entries are skipped silently — best-effort
            // aggregation (spec §4.F).
            if let Ok(observation) = Observation::decode(raw) {
                observations.push(AttributedObservation {
                    observer: *observer,
                    observation,
                });
            }
        }
        if observations.is_empty() {
            return Err(OcrError::validation("no well-formed observations"));
        }

        let decision = self.should_report(&observations).await?;
        if !decision.should_report {
            return Ok(None);
        }
        let report = build_report(&observations);
        let encoded = report.encode();
        if encoded.len() > MAX_REPORT_LEN {
            return Err(OcrError::validation("report exceeds max_report_len"));
        }
        Ok(Some(encoded))
    }

    /// The four disjoint, ordered `should_report` conditions (spec §4.F).
    /// Evaluated in order; the first true one wins, but every condition is
    /// still computed (useful for logging which later ones would also
    /// have fired).
    async fn should_report(
        &self,
        observations: &[AttributedObservation],
    ) -> Result<ShouldReportDecision, OcrError> {
        let (latest, requested) = tokio::try_join!(
            self.chain.latest_transmission_details(&self.feed_id),
            self.chain
                .latest_round_requested(&self.feed_id, self.delta_c),
        )?;

        let mut sorted: Vec<&BigInt> = observations.iter().map(|o| &o.observation.value).collect();
        sorted.sort();
        let answer = sorted[sorted.len() / 2].clone();

        let latest_answer = if latest.latest_answer.is_empty() {
            BigInt::from(0)
        } else {
            BigInt::from_signed_bytes_be(&latest.latest_answer)
        };

        let initial_round = latest.config_digest == self.config_digest
            && latest.epoch == 0
            && latest.round == 0;
        let deviation = deviates(self.alpha_ppb, &latest_answer, &answer);
        let delta_c_timeout =
            latest.latest_timestamp + self.delta_c.as_secs() as i64 < now_unix();
        let requested_epoch_round = EpochRound {
            epoch: requested.epoch,
            round: requested.round,
        };
        let latest_epoch_round = EpochRound {
            epoch: latest.epoch,
            round: latest.round,
        };
        let unfulfilled_request = requested.config_digest == self.config_digest
            && !(requested_epoch_round < latest_epoch_round);

        let should_report =
            initial_round || deviation || delta_c_timeout || unfulfilled_request;

        Ok(ShouldReportDecision {
            should_report,
            initial_round,
            deviation,
            delta_c_timeout,
            unfulfilled_request,
        })
    }

    /// `ShouldAcceptFinalizedReport(report_ts, report)`.
    pub async fn should_accept_finalized_report(
        &self,
        report_epoch_round: EpochRound,
        report: &Report,
    ) -> Result<bool, OcrError> {
        let mut state = self.state.lock().await;
        if report_epoch_round <= state.latest_accepted_epoch_round {
            return Ok(false);
        }

        let contract = self.chain.feed_config_info(&self.feed_id).await?;
        if contract.latest_config_digest != self.config_digest {
            return Ok(false);
        }
        let contract_epoch_round = EpochRound {
            epoch: contract.epoch,
            round: contract.round,
        };
        if contract_epoch_round >= report_epoch_round {
            return Ok(false);
        }

        let report_median = report
            .median()
            .cloned()
            .ok_or_else(|| OcrError::validation("report has no observations to take a median of"))?;
        let deviates_from_accepted =
            deviates(self.alpha_ppb, &state.latest_accepted_median, &report_median);
        let nothing_pending = contract_epoch_round >= state.latest_accepted_epoch_round;

        let accept = deviates_from_accepted || nothing_pending;
        if accept {
            state.latest_accepted_epoch_round = report_epoch_round;
            state.latest_accepted_median = report_median;
        }
        Ok(accept)
    }

    /// `ShouldTransmitAcceptedReport(report_ts, report)`.
    pub async fn should_transmit_accepted_report(
        &self,
        report_epoch_round: EpochRound,
    ) -> Result<bool, OcrError> {
        let contract = self.chain.feed_config_info(&self.feed_id).await?;
        if contract.latest_config_digest != self.config_digest {
            return Ok(false);
        }
        let contract_epoch_round = EpochRound {
            epoch: contract.epoch,
            round: contract.round,
        };
        Ok(contract_epoch_round < report_epoch_round)
    }
}

#[derive(Debug, Clone, Copy)]
struct ShouldReportDecision {
    should_report: bool,
    #[allow(dead_code)]
    initial_round: bool,
    #[allow(dead_code)]
    deviation: bool,
    #[allow(dead_code)]
    delta_c_timeout: bool,
    #[allow(dead_code)]
    unfulfilled_request: bool,
}

/// `build_report()` (spec §4.F): median timestamp, observations sorted
/// ascending by value with a parallel observer-index array.
fn build_report(observations: &[AttributedObservation]) -> Report {
    let mut by_timestamp: Vec<i64> = observations.iter().map(|o| o.observation.timestamp).collect();
    by_timestamp.sort();
    let observations_timestamp = by_timestamp[by_timestamp.len() / 2];

    let mut sorted = observations.to_vec();
    sorted.sort_by(|a, b| a.observation.value.cmp(&b.observation.value));

    Report {
        observations_timestamp,
        observers: sorted.iter().map(|o| o.observer).collect(),
        observations: sorted.into_iter().map(|o| o.observation.value).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocr_chain::query::{FeedConfigInfo, LatestRoundRequested, LatestTransmissionDetails};
    use std::sync::Mutex as StdMutex;

    struct FakeChain {
        transmission: LatestTransmissionDetails,
        requested: LatestRoundRequested,
        config_info: FeedConfigInfo,
    }

    #[async_trait]
    impl ChainQuery for FakeChain {
        async fn latest_transmission_details(
            &self,
            _feed_id: &str,
        ) -> Result<LatestTransmissionDetails, OcrError> {
            Ok(self.transmission.clone())
        }

        async fn latest_round_requested(
            &self,
            _feed_id: &str,
            _lookback: Duration,
        ) -> Result<LatestRoundRequested, OcrError> {
            Ok(self.requested)
        }

        async fn feed_config_info(&self, _feed_id: &str) -> Result<FeedConfigInfo, OcrError> {
            Ok(self.config_info)
        }
    }

    struct FixedDataSource(StdMutex<BigInt>);

    #[async_trait]
    impl DataSource for FixedDataSource {
        async fn observe(&self) -> Result<Option<BigInt>, OcrError> {
            Ok(Some(self.0.lock().unwrap().clone()))
        }
    }

    fn sample_config(digest: ConfigDigest) -> ContractConfig {
        ContractConfig {
            job_id: "job".to_string(),
            config_digest: digest,
            config_count: 1,
            signers: vec![vec![0]; 4],
            transmitters: vec![vec![0]; 4],
            f: 1,
            onchain_config: vec![],
            offchain_config_version: 1,
            offchain_config: vec![],
        }
    }

    fn observations(values: &[i64]) -> Vec<(u8, Vec<u8>)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let obs = Observation {
                    timestamp: 1_000 + i as i64,
                    value: BigInt::from(*v),
                };
                (i as u8, obs.encode())
            })
            .collect()
    }

    fn plugin_with_chain(digest: ConfigDigest, chain: FakeChain) -> MedianPlugin<FakeChain> {
        MedianPlugin::new(
            sample_config(digest),
            "BTC/USD".to_string(),
            10_000_000, // 1%
            Duration::from_secs(60),
            Arc::new(chain),
            Arc::new(FixedDataSource(StdMutex::new(BigInt::from(0)))),
        )
    }

    #[tokio::test]
    async fn initial_round_triggers_report_with_correct_median() {
        let digest = ConfigDigest([7u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 0,
                    round: 0,
                    latest_answer: vec![],
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 0,
                    round: 0,
                },
            },
        );
        let report = plugin
            .report(&[], &observations(&[10, 11, 12, 13]))
            .await
            .unwrap()
            .expect("initial round must report");
        let decoded = Report::decode(&report).unwrap();
        assert_eq!(decoded.median(), Some(&BigInt::from(12)));
    }

    #[tokio::test]
    async fn deviation_triggers_report() {
        let digest = ConfigDigest([1u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 5,
                    round: 1,
                    latest_answer: BigInt::from(100).to_signed_bytes_be(),
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 5,
                    round: 1,
                },
            },
        );
        let report = plugin
            .report(&[], &observations(&[105, 105, 105, 105]))
            .await
            .unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn heartbeat_triggers_report_via_delta_c_timeout() {
        let digest = ConfigDigest([2u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 5,
                    round: 1,
                    latest_answer: BigInt::from(100).to_signed_bytes_be(),
                    latest_timestamp: now_unix() - 120,
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 5,
                    round: 1,
                },
            },
        );
        let report = plugin
            .report(&[], &observations(&[100, 100, 100, 100]))
            .await
            .unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn unfulfilled_request_triggers_report() {
        let digest = ConfigDigest([3u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 5,
                    round: 1,
                    latest_answer: BigInt::from(100).to_signed_bytes_be(),
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested {
                    config_digest: digest,
                    epoch: 5,
                    round: 2,
                },
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 5,
                    round: 1,
                },
            },
        );
        let report = plugin
            .report(&[], &observations(&[100, 100, 100, 100]))
            .await
            .unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn no_condition_fires_means_no_report() {
        let digest = ConfigDigest([4u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 5,
                    round: 1,
                    latest_answer: BigInt::from(100).to_signed_bytes_be(),
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 5,
                    round: 1,
                },
            },
        );
        let report = plugin
            .report(&[], &observations(&[100, 100, 100, 100]))
            .await
            .unwrap();
        assert!(report.is_none());
    }

    #[tokio::test]
    async fn malformed_observations_are_skipped_not_fatal() {
        let digest = ConfigDigest([5u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 0,
                    round: 0,
                    latest_answer: vec![],
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 0,
                    round: 0,
                },
            },
        );
        let mut raw = observations(&[10, 11, 12]);
        raw.push((9, vec![0xFF])); // truncated, undecodable
        let report = plugin.report(&[], &raw).await.unwrap();
        assert!(report.is_some());
    }

    #[tokio::test]
    async fn non_empty_query_is_rejected() {
        let digest = ConfigDigest([6u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 0,
                    round: 0,
                    latest_answer: vec![],
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 0,
                    round: 0,
                },
            },
        );
        assert!(plugin.observation(&[1]).await.is_err());
        assert!(plugin.report(&[1], &[]).await.is_err());
    }

    #[tokio::test]
    async fn stale_finalized_report_rejected_i1_monotonic() {
        let digest = ConfigDigest([8u8; 32]);
        let plugin = plugin_with_chain(
            digest,
            FakeChain {
                transmission: LatestTransmissionDetails {
                    config_digest: digest,
                    epoch: 0,
                    round: 0,
                    latest_answer: vec![],
                    latest_timestamp: now_unix(),
                },
                requested: LatestRoundRequested::none(),
                config_info: FeedConfigInfo {
                    latest_config_digest: digest,
                    epoch: 10,
                    round: 3,
                },
            },
        );
        let report = Report {
            observations_timestamp: 0,
            observers: vec![0],
            observations: vec![BigInt::from(1)],
        };

        // Seed latest_accepted_epoch_round to (10, 3) by accepting it first.
        // Contract must be behind (10,3) for acceptance.
        {
            let mut state = plugin.state.lock().await;
            state.latest_accepted_epoch_round = EpochRound { epoch: 10, round: 3 };
            state.latest_accepted_median = BigInt::from(1);
        }

        assert!(!plugin
            .should_accept_finalized_report(EpochRound { epoch: 10, round: 3 }, &report)
            .await
            .unwrap());
        assert!(!plugin
            .should_accept_finalized_report(EpochRound { epoch: 10, round: 2 }, &report)
            .await
            .unwrap());
        assert!(plugin
            .should_accept_finalized_report(EpochRound { epoch: 10, round: 4 }, &report)
            .await
            .unwrap());
    }
}
