//! The `oracle-node` binary (spec §6): `start` runs the node; `ocr`/`p2p`
//! manage their respective keyrings; `version` prints the build version.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod keystore;
mod p2p_identity;
mod participant;
mod start;

use keystore::{KeyCommand, OcrKeyMaterial, P2pKeyMaterial};

#[derive(Parser, Debug)]
#[clap(name = "oracle-node", version, about = "OCR2 Cosmos oracle node")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the oracle node: recovers persisted jobs and serves the
    /// external-initiator and telemetry surfaces until signalled to stop.
    Start(Box<start::StartArgs>),
    /// Manage the off-chain (OCR) signing keyring.
    Ocr {
        #[clap(subcommand)]
        command: KeyCommand,
    },
    /// Manage the P2P identity keyring.
    P2p {
        #[clap(subcommand)]
        command: KeyCommand,
    },
    /// Print the build version.
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => start::run(*args).await,
        Commands::Ocr { command } => {
            let dir = std::env::var("OCR_KEYRING_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|_| std::path::PathBuf::from("./keys/ocr"));
            keystore::run(
                &dir,
                &OcrKeyMaterial,
                command,
                std::env::var("OCR_KEY_PASSPHRASE").ok(),
            )
        }
        Commands::P2p { command } => {
            let dir = std::env::var("P2P_KEYRING_DIR")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|_| std::path::PathBuf::from("./keys/p2p"));
            keystore::run(
                &dir,
                &P2pKeyMaterial,
                command,
                std::env::var("P2P_KEY_PASSPHRASE").ok(),
            )
        }
        Commands::Version => {
            println!("oracle-node {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
