//! The data-source bridge (spec §4.G): the single place the external
//! initiator's `Run` pushes a result into the consensus machine's
//! `Observe`. Modeled as a single-slot rendezvous per the design note in
//! spec §9 — a waiting `Observe` picks up the value, a `Run` with no
//! waiter is a no-op, and there is never a queue to go stale.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use num_bigint::BigInt;
use ocr_types::OcrError;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, Notify};

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub chainlink_url: String,
    pub access_key: String,
    pub secret: String,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl WebhookConfig {
    /// `EI_WEBHOOK_MAX_RETRIES` / `EI_WEBHOOK_BACKOFF` defaults (SPEC_FULL §C.5).
    pub fn with_defaults(chainlink_url: String, access_key: String, secret: String) -> Self {
        Self {
            chainlink_url,
            access_key,
            secret,
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Single-slot rendezvous between `Observe` (the waiter, at most one at a
/// time per job) and `Run` (the pusher). `I5`: concurrent `Observe` callers
/// never see the same in-flight result because only one waiter slot can
/// ever be armed at a time — arming is guarded by `waiting`.
pub struct ObserveBridge {
    http: reqwest::Client,
    job_id: String,
    webhook: WebhookConfig,
    slot: Mutex<Option<oneshot::Sender<BigInt>>>,
    waiting: Mutex<()>,
    stopped: Notify,
    is_stopped: std::sync::atomic::AtomicBool,
}

impl ObserveBridge {
    pub fn new(job_id: String, webhook: WebhookConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            job_id,
            webhook,
            slot: Mutex::new(None),
            waiting: Mutex::new(()),
            stopped: Notify::new(),
            is_stopped: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Marks the bridge stopped; any in-flight `Observe` wakes with
    /// `OcrErrorKind::Stopped` (spec §4.G `Stop`).
    pub fn stop(&self) {
        self.is_stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        self.stopped.notify_waiters();
    }

    /// `Run(result)`: parses `result` as a decimal integer and offers it to
    /// a waiting `Observe`, non-blocking. Returns `true` if a waiter picked
    /// it up, `false` if it was dropped (no waiter, or the waiter already
    /// gave up).
    pub async fn run(&self, result: &str) -> Result<bool, OcrError> {
        let value = BigInt::from_str(result)
            .map_err(|e| OcrError::validation(format!("run result is not a decimal integer: {e}")))?;
        let mut slot = self.slot.lock().await;
        match slot.take() {
            Some(sender) => Ok(sender.send(value).is_ok()),
            None => Ok(false),
        }
    }

    /// `Observe(ctx)`: fires the webhook, then waits for either a `Run`
    /// delivery or `deadline`, whichever comes first. Guarantees at-most-one
    /// in-flight waiter: a second concurrent call returns `Internal` rather
    /// than silently racing the first (the embedding is responsible for
    /// never doing this; spec §4.F calls `Observe` at most once per
    /// `(epoch, round)`).
    pub async fn observe(&self, deadline: Duration) -> Result<BigInt, OcrError> {
        let _guard = self
            .waiting
            .try_lock()
            .map_err(|_| OcrError::internal("concurrent Observe call on the same job"))?;

        if self.is_stopped.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(OcrError::stopped("job stopped before observe began"));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.slot.lock().await;
            *slot = Some(tx);
        }

        self.fire_webhook();

        tokio::select! {
            result = rx => {
                result.map_err(|_| OcrError::internal("observe slot sender dropped without stopping"))
            }
            _ = tokio::time::sleep(deadline) => {
                self.slot.lock().await.take();
                Err(OcrError::timeout("observe timed out waiting for a run result"))
            }
            _ = self.stopped.notified() => {
                self.slot.lock().await.take();
                Err(OcrError::stopped("job stopped while observe was in flight"))
            }
        }
    }

    fn fire_webhook(&self) {
        let http = self.http.clone();
        let job_id = self.job_id.clone();
        let webhook = self.webhook.clone();
        tokio::spawn(async move {
            let url = format!("{}/v2/jobs/{}/runs", webhook.chainlink_url, job_id);
            let mut backoff = ExponentialBackoffBuilder::new()
                .with_initial_interval(webhook.initial_backoff)
                .with_max_elapsed_time(None)
                .build();

            for attempt in 0..=webhook.max_retries {
                let result = http
                    .post(&url)
                    .header("X-Chainlink-EA-AccessKey", &webhook.access_key)
                    .header("X-Chainlink-EA-Secret", &webhook.secret)
                    .send()
                    .await;

                match result {
                    Ok(resp) if resp.status().is_success() => return,
                    Ok(resp) => {
                        tracing::warn!(job_id = %job_id, status = %resp.status(), attempt, "webhook fire returned non-success status");
                    }
                    Err(err) => {
                        tracing::warn!(job_id = %job_id, %err, attempt, "webhook fire transport error");
                    }
                }
                if attempt == webhook.max_retries {
                    break;
                }
                if let Some(wait) = backoff.next_backoff() {
                    tokio::time::sleep(wait).await;
                }
            }
            tracing::error!(job_id = %job_id, "webhook fire exhausted retries");
        });
    }
}

pub type SharedObserveBridge = Arc<ObserveBridge>;

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> WebhookConfig {
        WebhookConfig::with_defaults(
            "http://127.0.0.1:0".to_string(),
            "key".to_string(),
            "secret".to_string(),
        )
    }

    #[tokio::test]
    async fn run_without_waiter_is_dropped() {
        let bridge = ObserveBridge::new("job-1".to_string(), cfg());
        assert!(!bridge.run("42").await.unwrap());
    }

    #[tokio::test]
    async fn run_delivers_to_waiting_observe() {
        let bridge = Arc::new(ObserveBridge::new("job-2".to_string(), cfg()));
        let waiter = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.observe(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(bridge.run("7").await.unwrap());
        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value, BigInt::from(7));
    }

    #[tokio::test]
    async fn observe_times_out_with_no_run() {
        let bridge = ObserveBridge::new("job-3".to_string(), cfg());
        let err = bridge.observe(Duration::from_millis(50)).await.unwrap_err();
        assert_eq!(err.kind, ocr_types::OcrErrorKind::Timeout);
    }

    #[tokio::test]
    async fn stop_interrupts_in_flight_observe() {
        let bridge = Arc::new(ObserveBridge::new("job-4".to_string(), cfg()));
        let waiter = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.observe(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        bridge.stop();
        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ocr_types::OcrErrorKind::Stopped);
    }

    #[tokio::test]
    async fn malformed_result_is_validation_error() {
        let bridge = ObserveBridge::new("job-5".to_string(), cfg());
        assert!(bridge.run("not-a-number").await.is_err());
    }
}
