//! Peer networking configuration (spec §4.E).

use libp2p::Multiaddr;
use ocr_types::OcrError;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NetworkingConfig {
    pub listen_addresses: Vec<Multiaddr>,
    pub announce_addresses: Vec<Multiaddr>,
    pub delta_dial: Duration,
    pub delta_reconcile: Duration,
    pub incoming_buffer: usize,
    pub outgoing_buffer: usize,
    pub new_stream_timeout: Duration,
    pub dht_lookup_interval: Duration,
    pub bootstrap_check_interval: Duration,
    pub bootstrappers: Vec<Multiaddr>,
}

impl NetworkingConfig {
    /// Fails validation if `listen_addresses` or `announce_addresses` is
    /// empty (spec §4.E).
    pub fn validate(&self) -> Result<(), OcrError> {
        if self.listen_addresses.is_empty() {
            return Err(OcrError::validation("listen_addresses must not be empty"));
        }
        if self.announce_addresses.is_empty() {
            return Err(OcrError::validation("announce_addresses must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Multiaddr {
        "/ip4/127.0.0.1/tcp/9000".parse().unwrap()
    }

    fn sample() -> NetworkingConfig {
        NetworkingConfig {
            listen_addresses: vec![addr()],
            announce_addresses: vec![addr()],
            delta_dial: Duration::from_secs(15),
            delta_reconcile: Duration::from_secs(60),
            incoming_buffer: 100,
            outgoing_buffer: 100,
            new_stream_timeout: Duration::from_secs(10),
            dht_lookup_interval: Duration::from_secs(30),
            bootstrap_check_interval: Duration::from_secs(60),
            bootstrappers: vec![],
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn empty_listen_addresses_rejected() {
        let mut cfg = sample();
        cfg.listen_addresses.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_announce_addresses_rejected() {
        let mut cfg = sample();
        cfg.announce_addresses.clear();
        assert!(cfg.validate().is_err());
    }
}
