//! `{ocr|p2p} {add,delete,view,unsafe-export-pk,list}` (spec §6, expanded
//! by `SPEC_FULL.md` §C.2). One JSON key file per id, in the directory
//! the operator points `OCR_KEYRING_DIR` / `P2P_KEYRING_DIR` at.

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use ocr_types::keys::keystore::{self, KeyType, OpenedKey, ScryptCost};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum KeyCommand {
    /// Generate a new key and seal it in the keyring directory.
    Add,
    /// Remove a key by id.
    Delete { id: String },
    /// Print a key's metadata (id, public key) without decrypting it.
    View { id: String },
    /// Decrypt and print a key's raw private material. Requires the
    /// passphrase again; always logs a warning banner.
    UnsafeExportPk { id: String },
    /// List every key id stored in the keyring directory.
    List,
}

/// What a specific keyring (`ocr` or `p2p`) knows how to generate and
/// re-derive an id from. The CLI glue below is generic over this.
pub trait KeyMaterial {
    fn key_type(&self) -> KeyType;
    /// Returns `(secret_bytes, id, public_key_hex)`.
    fn generate(&self) -> (Vec<u8>, String, String);
    fn recompute_id(&self, secret: &[u8]) -> String;
}

fn key_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.json"))
}

fn read_passphrase(prompt: &str, env_value: Option<String>) -> Result<String> {
    if let Some(p) = env_value {
        return Ok(p);
    }
    rpassword::prompt_password(prompt).context("failed to read passphrase")
}

pub fn run(
    dir: &Path,
    material: &dyn KeyMaterial,
    command: KeyCommand,
    passphrase_env: Option<String>,
) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating keyring dir {}", dir.display()))?;

    match command {
        KeyCommand::Add => {
            let (secret, id, public_key_hex) = material.generate();
            let passphrase = read_passphrase("New key passphrase: ", passphrase_env)?;
            let blob = keystore::seal(
                material.key_type(),
                &id,
                &public_key_hex,
                &secret,
                &passphrase,
                ScryptCost::default(),
            )
            .map_err(|e| anyhow::anyhow!(e))?;
            fs::write(key_path(dir, &id), blob)
                .with_context(|| format!("writing key file for {id}"))?;
            println!("{}", id);
        }
        KeyCommand::Delete { id } => {
            let path = key_path(dir, &id);
            if !path.exists() {
                bail!("no key with id {id}");
            }
            fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        }
        KeyCommand::View { id } => {
            let json = fs::read_to_string(key_path(dir, &id))
                .with_context(|| format!("no key with id {id}"))?;
            let summary: serde_json::Value = serde_json::from_str(&json)
                .context("malformed key file")?;
            println!(
                "id: {}",
                summary.get("id").and_then(|v| v.as_str()).unwrap_or("?")
            );
            println!(
                "public_key: {}",
                summary
                    .get("public_key")
                    .and_then(|v| v.as_str())
                    .unwrap_or("?")
            );
        }
        KeyCommand::UnsafeExportPk { id } => {
            eprintln!("WARNING: exporting raw private key material for {id} to stdout");
            let json = fs::read_to_string(key_path(dir, &id))
                .with_context(|| format!("no key with id {id}"))?;
            let passphrase = read_passphrase("Passphrase: ", None)?;
            let opened: OpenedKey = keystore::open(&json, &passphrase, |secret| {
                material.recompute_id(secret)
            })
            .map_err(|e| anyhow::anyhow!(e))?;
            println!("{}", hex::encode(opened.secret));
        }
        KeyCommand::List => {
            let mut ids = Vec::new();
            for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        ids.push(stem.to_string());
                    }
                }
            }
            ids.sort();
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}

pub struct OcrKeyMaterial;

impl KeyMaterial for OcrKeyMaterial {
    fn key_type(&self) -> KeyType {
        KeyType::Offchain
    }

    fn generate(&self) -> (Vec<u8>, String, String) {
        use ocr_types::keys::offchain::OffchainSigningKey;
        let key = OffchainSigningKey::generate();
        let id = key.id();
        let public_key_hex = hex::encode(key.public_key().to_bytes());
        (key.to_seed_bytes().to_vec(), id, public_key_hex)
    }

    fn recompute_id(&self, secret: &[u8]) -> String {
        use ocr_types::keys::offchain::OffchainSigningKey;
        let seed: [u8; 32] = secret.try_into().unwrap_or([0u8; 32]);
        OffchainSigningKey::from_seed(&seed).id()
    }
}

pub struct P2pKeyMaterial;

impl KeyMaterial for P2pKeyMaterial {
    fn key_type(&self) -> KeyType {
        KeyType::P2p
    }

    fn generate(&self) -> (Vec<u8>, String, String) {
        let (keypair, secret) = crate::p2p_identity::generate();
        let id = crate::p2p_identity::peer_id_hex(&keypair);
        (secret.to_vec(), id.clone(), id)
    }

    fn recompute_id(&self, secret: &[u8]) -> String {
        let seed: [u8; 32] = secret.try_into().unwrap_or([0u8; 32]);
        match crate::p2p_identity::from_secret(seed) {
            Ok(keypair) => crate::p2p_identity::peer_id_hex(&keypair),
            Err(_) => String::new(),
        }
    }
}
