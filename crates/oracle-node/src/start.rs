//! The `start` subcommand (spec §6): loads keys and configuration, wires
//! the store, chain adapter, P2P peer, telemetry and external-initiator
//! surfaces, recovers persisted jobs, then blocks until SIGINT/SIGTERM.

use anyhow::{bail, Context, Result};
use clap::Parser;
use ocr_chain::{CosmosChainClient, OnchainKeyring};
use ocr_ei::{AppState, EiConfig};
use ocr_job::bridge::WebhookConfig;
use ocr_job::job::{ConsensusParticipant, ParsedTimeouts, PeerHandle};
use ocr_job::JobService;
use ocr_median::MedianPlugin;
use ocr_p2p::{NetworkingConfig, Peer};
use ocr_store::models::JobSpec;
use ocr_store::{Deadline, RedbStore, Store};
use ocr_telemetry::{init_logging, LogFormat};
use ocr_types::keys::offchain::OffchainSigningKey;
use ocr_types::keys::onchain::OnchainSigningKey;
use ocr_types::OcrError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::p2p_identity;
use crate::participant::{BootstrapParticipant, BridgeDataSource, DefaultConsensusParticipant, JobPeerHandle};

fn multiaddrs(raw: &str) -> Result<Vec<libp2p::Multiaddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<libp2p::Multiaddr>().with_context(|| format!("invalid multiaddr {s}")))
        .collect()
}

#[derive(Parser, Debug)]
pub struct StartArgs {
    #[clap(long, env = "CHAIN_ID")]
    pub chain_id: String,
    #[clap(long, env = "COSMOS_GRPC")]
    pub cosmos_grpc: String,
    #[clap(long, env = "TENDERMINT_RPC")]
    pub tendermint_rpc: String,
    /// Not used for transmit-path estimation yet; carried through for
    /// forward compatibility with a real gas-estimating transmitter.
    #[clap(long, env = "COSMOS_GAS_PRICES", default_value = "")]
    pub cosmos_gas_prices: String,

    /// Raw hex secp256k1 secret for the on-chain transmitter account.
    /// `COSMOS_KEYRING_*`/`COSMOS_USE_LEDGER` keyring-backend signing is
    /// not implemented in this build; see DESIGN.md.
    #[clap(long, env = "COSMOS_PK")]
    pub cosmos_pk: Option<String>,
    #[clap(long, env = "COSMOS_USE_LEDGER", default_value_t = false)]
    pub cosmos_use_ledger: bool,
    #[clap(long, env = "COSMOS_FROM", default_value = "")]
    pub cosmos_from: String,
    #[clap(long, env = "COSMOS_SIGNER_INDEX", default_value_t = 0)]
    pub cosmos_signer_index: u8,
    #[clap(long, env = "COSMOS_ACCOUNT_NUMBER", default_value_t = 0)]
    pub cosmos_account_number: u64,
    #[clap(long, env = "COSMOS_SEQUENCE", default_value_t = 0)]
    pub cosmos_sequence: u64,

    #[clap(long, env = "OCR_KEYRING_DIR")]
    pub ocr_keyring_dir: PathBuf,
    #[clap(long, env = "OCR_KEY_ID")]
    pub ocr_key_id: String,
    #[clap(long, env = "OCR_KEY_PASSPHRASE")]
    pub ocr_key_passphrase: Option<String>,
    /// Raw hex ed25519 seed, bypassing the encrypted keystore entirely.
    #[clap(long, env = "OCR_PK")]
    pub ocr_pk: Option<String>,

    #[clap(long, env = "P2P_KEYRING_DIR")]
    pub p2p_keyring_dir: PathBuf,
    #[clap(long, env = "P2P_PEER_ID")]
    pub p2p_peer_id: Option<String>,
    #[clap(long, env = "P2P_KEY_PASSPHRASE")]
    pub p2p_key_passphrase: Option<String>,
    #[clap(long, env = "P2P_PK")]
    pub p2p_pk: Option<String>,

    #[clap(long, env = "P2P_V2_LISTEN_ADDRESSES")]
    pub p2p_v2_listen_addresses: String,
    #[clap(long, env = "P2P_V2_ANNOUNCE_ADDRESSES")]
    pub p2p_v2_announce_addresses: String,
    #[clap(long, env = "P2P_V2_BOOTSTRAPPERS", default_value = "")]
    pub p2p_v2_bootstrappers: String,
    #[clap(long, env = "P2P_V2_DELTA_DIAL", default_value = "15s")]
    pub p2p_v2_delta_dial: String,
    #[clap(long, env = "P2P_V2_DELTA_RECONCILE", default_value = "60s")]
    pub p2p_v2_delta_reconcile: String,
    #[clap(long, env = "P2P_DHT_LOOKUP_INTERVAL", default_value = "30s")]
    pub p2p_dht_lookup_interval: String,
    #[clap(long, env = "P2P_NEW_STREAM_TIMEOUT", default_value = "10s")]
    pub p2p_new_stream_timeout: String,
    #[clap(long, env = "P2P_BOOTSTRAP_CHECK_INTERVAL", default_value = "60s")]
    pub p2p_bootstrap_check_interval: String,
    #[clap(long, env = "P2P_INCOMING_MESSAGE_BUFFER_SIZE", default_value_t = 100)]
    pub p2p_incoming_message_buffer_size: usize,
    #[clap(long, env = "P2P_OUTGOING_MESSAGE_BUFFER_SIZE", default_value_t = 100)]
    pub p2p_outgoing_message_buffer_size: usize,
    #[clap(long, env = "P2P_TRACE_LOGGING", default_value_t = false)]
    pub p2p_trace_logging: bool,

    #[clap(long, env = "EI_CHAINLINKURL")]
    pub ei_chainlink_url: String,
    #[clap(long, env = "EI_IC_ACCESSKEY")]
    pub ei_ic_accesskey: String,
    #[clap(long, env = "EI_IC_SECRET")]
    pub ei_ic_secret: String,
    #[clap(long, env = "EI_CI_ACCESSKEY")]
    pub ei_ci_accesskey: String,
    #[clap(long, env = "EI_CI_SECRET")]
    pub ei_ci_secret: String,
    #[clap(long, env = "EI_CI_LISTEN_ADDR", default_value = "0.0.0.0:6688")]
    pub ei_ci_listen_addr: String,
    #[clap(long, env = "EI_LOOPBACK_LISTEN_ADDR", default_value = "127.0.0.1:6689")]
    pub ei_loopback_listen_addr: String,
    #[clap(long, env = "EI_WEBHOOK_MAX_RETRIES", default_value_t = 5)]
    pub ei_webhook_max_retries: u32,
    #[clap(long, env = "EI_WEBHOOK_BACKOFF", default_value = "200ms")]
    pub ei_webhook_backoff: String,

    #[clap(long, env = "DB_CONNECTION")]
    pub db_connection: PathBuf,
    #[clap(long, env = "DB_NAME", default_value = "oracle-node.redb")]
    pub db_name: String,

    #[clap(long, env = "ORACLE_ENV", default_value = "production")]
    pub oracle_env: String,
    #[clap(long, env = "ORACLE_LOG_FORMAT", default_value = "text")]
    pub oracle_log_format: String,
    #[clap(long, env = "ORACLE_SERVICE_WAIT_TIMEOUT", default_value = "30s")]
    pub oracle_service_wait_timeout: String,
    #[clap(long, env = "ORACLE_METRICS_LISTEN_ADDR", default_value = "127.0.0.1:9090")]
    pub oracle_metrics_listen_addr: String,
    #[clap(long, env = "ORACLE_ALPHA_PPB", default_value_t = 0)]
    pub oracle_alpha_ppb: u64,
    #[clap(long, env = "ORACLE_DELTA_C", default_value = "1h")]
    pub oracle_delta_c: String,
    #[clap(long, env = "ORACLE_REPORT_INTERVAL", default_value = "5s")]
    pub oracle_report_interval: String,
}

fn load_ocr_key(args: &StartArgs) -> Result<OffchainSigningKey> {
    if let Some(hex_seed) = &args.ocr_pk {
        let bytes = hex::decode(hex_seed).context("OCR_PK is not valid hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("OCR_PK must decode to 32 bytes"))?;
        return Ok(OffchainSigningKey::from_seed(&seed));
    }

    let path = args.ocr_keyring_dir.join(format!("{}.json", args.ocr_key_id));
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading off-chain key file {}", path.display()))?;
    let passphrase = match &args.ocr_key_passphrase {
        Some(p) => p.clone(),
        None => rpassword::prompt_password("OCR key passphrase: ")?,
    };
    let opened = ocr_types::keys::keystore::open(&json, &passphrase, |secret| {
        let seed: [u8; 32] = secret.try_into().unwrap_or([0u8; 32]);
        OffchainSigningKey::from_seed(&seed).id()
    })
    .map_err(|e| anyhow::anyhow!(e))?;
    let seed: [u8; 32] = opened
        .secret
        .try_into()
        .map_err(|_| anyhow::anyhow!("off-chain key file did not contain a 32-byte seed"))?;
    Ok(OffchainSigningKey::from_seed(&seed))
}

fn load_onchain_key(args: &StartArgs) -> Result<OnchainSigningKey> {
    let Some(hex_secret) = &args.cosmos_pk else {
        bail!(
            "COSMOS_PK is required in this build; keyring-backend and COSMOS_USE_LEDGER signing \
             are not implemented (see DESIGN.md)"
        );
    };
    if args.cosmos_use_ledger {
        bail!("COSMOS_USE_LEDGER is not supported alongside COSMOS_PK");
    }
    let bytes = hex::decode(hex_secret).context("COSMOS_PK is not valid hex")?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("COSMOS_PK must decode to 32 bytes"))?;
    OnchainSigningKey::from_bytes(&arr).map_err(|e| anyhow::anyhow!(e))
}

fn load_p2p_keypair(args: &StartArgs) -> Result<libp2p::identity::Keypair> {
    if let Some(hex_secret) = &args.p2p_pk {
        let bytes = hex::decode(hex_secret).context("P2P_PK is not valid hex")?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("P2P_PK must decode to 32 bytes"))?;
        return p2p_identity::from_secret(seed).map_err(|e| anyhow::anyhow!(e));
    }

    let id = args
        .p2p_peer_id
        .as_deref()
        .context("P2P_PEER_ID is required when P2P_PK is not set")?;
    let path = args.p2p_keyring_dir.join(format!("{id}.json"));
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("reading p2p key file {}", path.display()))?;
    let passphrase = match &args.p2p_key_passphrase {
        Some(p) => p.clone(),
        None => rpassword::prompt_password("P2P key passphrase: ")?,
    };
    let opened = ocr_types::keys::keystore::open(&json, &passphrase, |secret| {
        let seed: [u8; 32] = secret.try_into().unwrap_or([0u8; 32]);
        match p2p_identity::from_secret(seed) {
            Ok(kp) => p2p_identity::peer_id_hex(&kp),
            Err(_) => String::new(),
        }
    })
    .map_err(|e| anyhow::anyhow!(e))?;
    let seed: [u8; 32] = opened
        .secret
        .try_into()
        .map_err(|_| anyhow::anyhow!("p2p key file did not contain a 32-byte seed"))?;
    p2p_identity::from_secret(seed).map_err(|e| anyhow::anyhow!(e))
}

fn networking_config(args: &StartArgs) -> Result<NetworkingConfig> {
    Ok(NetworkingConfig {
        listen_addresses: multiaddrs(&args.p2p_v2_listen_addresses)?,
        announce_addresses: multiaddrs(&args.p2p_v2_announce_addresses)?,
        delta_dial: humantime::parse_duration(&args.p2p_v2_delta_dial)?,
        delta_reconcile: humantime::parse_duration(&args.p2p_v2_delta_reconcile)?,
        incoming_buffer: args.p2p_incoming_message_buffer_size,
        outgoing_buffer: args.p2p_outgoing_message_buffer_size,
        new_stream_timeout: humantime::parse_duration(&args.p2p_new_stream_timeout)?,
        dht_lookup_interval: humantime::parse_duration(&args.p2p_dht_lookup_interval)?,
        bootstrap_check_interval: humantime::parse_duration(&args.p2p_bootstrap_check_interval)?,
        bootstrappers: multiaddrs(&args.p2p_v2_bootstrappers)?,
    })
}

/// Builds the per-job `ConsensusParticipant` (spec §4.G step 6): a
/// bootstrap-only peer for `is_bootstrap_peer` jobs, otherwise the
/// single-oracle median-reporting embedding. The contract config an
/// oracle job needs must already have been recorded against its
/// `job_id` — there is no live config tracker in this build (DESIGN.md).
fn make_participant(
    job_id: &str,
    spec: &JobSpec,
    timeouts: &ParsedTimeouts,
    bridge: &Arc<ocr_job::bridge::ObserveBridge>,
    peer: Arc<dyn PeerHandle>,
    store: &Arc<dyn Store>,
    chain: &Arc<CosmosChainClient>,
    signer_index: u8,
    alpha_ppb: u64,
    delta_c: Duration,
    report_interval: Duration,
    p2p_peer: &Peer,
) -> Result<Arc<dyn ConsensusParticipant>, OcrError> {
    drop(peer); // the JobPeerHandle above already owns the acquire/release lifecycle

    if spec.is_bootstrap_peer {
        let bootstrapper_factory = ocr_p2p::bootstrapper_factory(p2p_peer.clone());
        let locators = spec
            .p2p_bootstrap_peers
            .iter()
            .filter_map(|s| s.parse::<libp2p::Multiaddr>().ok())
            .collect();
        let bootstrapper = futures::executor::block_on(
            bootstrapper_factory.new_bootstrapper(locators),
        )?;
        return Ok(Arc::new(BootstrapParticipant::new(bootstrapper)));
    }

    let config = futures::executor::block_on(
        store.get_contract_config(job_id, Deadline::after(timeouts.blockchain_timeout)),
    )
    .map_err(|e| {
        OcrError::validation(format!(
            "no contract config recorded for job {job_id}: {e}"
        ))
    })?;

    let data_source = Arc::new(BridgeDataSource::new(
        bridge.clone(),
        timeouts.observation_timeout,
    ));
    let config_digest = config.config_digest;
    let plugin = Arc::new(MedianPlugin::new(
        config,
        spec.feed_id.clone(),
        alpha_ppb,
        delta_c,
        chain.clone(),
        data_source,
    ));

    Ok(Arc::new(DefaultConsensusParticipant::new(
        plugin,
        chain.clone(),
        signer_index,
        config_digest,
        spec.feed_id.clone(),
        report_interval,
    )))
}

pub async fn run(args: StartArgs) -> Result<()> {
    let log_format: LogFormat = args
        .oracle_log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    init_logging(log_format)?;
    let metrics_sink = ocr_telemetry::prometheus::install()?;
    tracing::info!(env = %args.oracle_env, "starting oracle node");

    let ocr_key = load_ocr_key(&args)?;
    let ocr_key_id = ocr_key.id();
    let onchain_key = load_onchain_key(&args)?;
    let p2p_keypair = load_p2p_keypair(&args)?;

    let db_path = args.db_connection.join(&args.db_name);
    let store: Arc<dyn Store> = Arc::new(RedbStore::open(&db_path).map_err(|e| anyhow::anyhow!(e))?);

    let keyring = Arc::new(OnchainKeyring::new(onchain_key));
    let chain = Arc::new(
        CosmosChainClient::connect(
            &args.cosmos_grpc,
            &args.tendermint_rpc,
            &args.chain_id,
            keyring,
            args.cosmos_signer_index,
            args.cosmos_account_number,
            args.cosmos_sequence,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))?,
    );

    let networking = networking_config(&args)?;
    let p2p_peer = Peer::start(p2p_keypair, networking)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(peer_id = %p2p_peer.local_peer_id(), "p2p peer started");

    let delta_c = humantime::parse_duration(&args.oracle_delta_c)?;
    let report_interval = humantime::parse_duration(&args.oracle_report_interval)?;
    let alpha_ppb = args.oracle_alpha_ppb;
    let signer_index = args.cosmos_signer_index;

    let store_for_peer = store.clone();
    let chain_for_factory = chain.clone();
    let p2p_peer_for_factory = p2p_peer.clone();
    let p2p_peer_for_acquire = p2p_peer.clone();

    let job_service = Arc::new(JobService::new(
        store.clone(),
        ocr_key_id,
        WebhookConfig {
            chainlink_url: args.ei_chainlink_url.clone(),
            access_key: args.ei_ci_accesskey.clone(),
            secret: args.ei_ci_secret.clone(),
            max_retries: args.ei_webhook_max_retries,
            initial_backoff: humantime::parse_duration(&args.ei_webhook_backoff)?,
        },
        Box::new(move |_spec, _timeouts| {
            Ok(Arc::new(JobPeerHandle::acquired(p2p_peer_for_acquire.clone())) as Arc<dyn PeerHandle>)
        }),
        Box::new(move |job_id, spec, timeouts, bridge, peer| {
            make_participant(
                job_id,
                spec,
                timeouts,
                bridge,
                peer,
                &store_for_peer,
                &chain_for_factory,
                signer_index,
                alpha_ppb,
                delta_c,
                report_interval,
                &p2p_peer_for_factory,
            )
        }),
    ));

    let wait_timeout = humantime::parse_duration(&args.oracle_service_wait_timeout)?;
    if let Err(err) = job_service.recover_all(wait_timeout).await {
        tracing::error!(%err, "job recovery failed during startup");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ei_config = EiConfig::new(
        args.ei_ci_listen_addr.clone(),
        args.ei_loopback_listen_addr.clone(),
        args.ei_ic_accesskey.clone(),
        args.ei_ic_secret.clone(),
    );
    let ei_state = AppState::new(job_service.clone(), args.ei_ic_accesskey.clone(), args.ei_ic_secret.clone());
    let ei_shutdown = shutdown_rx.clone();
    let ei_task = tokio::spawn(async move {
        if let Err(err) = ocr_ei::run_server(ei_config, ei_state, ei_shutdown).await {
            tracing::error!(%err, "external-initiator server exited with error");
        }
    });

    let metrics_addr: std::net::SocketAddr = args.oracle_metrics_listen_addr.parse()?;
    let telemetry_shutdown = shutdown_rx.clone();
    let telemetry_task = tokio::spawn(ocr_telemetry::http::run_server(metrics_addr, telemetry_shutdown));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, closing jobs");
    let _ = shutdown_tx.send(true);

    job_service
        .close(Deadline::after(wait_timeout))
        .await;
    metrics_sink.set_jobs_running(0);

    let _ = ei_task.await;
    let _ = telemetry_task.await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
