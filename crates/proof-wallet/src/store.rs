//! Wallet persistence
//!
//! One pretty-printed JSON file per wallet under `<data_dir>/<network>/`.

use crate::wallet::{Wallet, WalletError, WalletRecord};
use proof_core::Network;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Wallet not found: {0}")]
    NotFound(String),

    #[error("Invalid wallet name: {0:?}")]
    InvalidName(String),

    #[error("Wallet {name} belongs to {found}, not {expected}")]
    WrongNetwork {
        name: String,
        expected: Network,
        found: Network,
    },

    #[error("Stored wallet is invalid: {0}")]
    Wallet(#[from] WalletError),
}

#[derive(Debug, Clone)]
pub struct WalletStore {
    dir: PathBuf,
    network: Network,
}

impl WalletStore {
    pub fn new(data_dir: impl AsRef<Path>, network: Network) -> Self {
        Self {
            dir: data_dir.as_ref().join(network.to_string()),
            network,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn network(&self) -> Network {
        self.network
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", name)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Write (or overwrite) the wallet's record
    pub fn save(&self, wallet: &Wallet) -> Result<PathBuf, StoreError> {
        if wallet.network() != self.network {
            return Err(StoreError::WrongNetwork {
                name: wallet.name().to_string(),
                expected: self.network,
                found: wallet.network(),
            });
        }
        let path = self.path_for(wallet.name())?;
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(&wallet.to_record())?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        log::info!("Saved wallet {} to {}", wallet.name(), path.display());
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Wallet, StoreError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let contents = fs::read_to_string(&path)?;
        let record: WalletRecord = serde_json::from_str(&contents)?;
        if record.network != self.network {
            return Err(StoreError::WrongNetwork {
                name: record.name,
                expected: self.network,
                found: record.network,
            });
        }
        let wallet = Wallet::from_record(&record)?;
        log::debug!("Loaded wallet {} ({})", wallet.name(), wallet.fingerprint());
        Ok(wallet)
    }

    /// Names of stored wallets, sorted
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
