//! Configuration, parsed from a TOML file plus environment overrides.
//!
//! Priority: environment variables > config file > defaults. A missing
//! config file is not an error: every field has a default.

use anyhow::{Context, Result};
use proof_bitcoind::BitcoindConfig;
use proof_core::Network;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProofConfig {
    #[serde(default)]
    pub wallet: WalletSection,

    #[serde(default)]
    pub bitcoind: BitcoindSection,
}

/// Wallet storage and network selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSection {
    /// "mainnet", "testnet" or "regtest"
    #[serde(default = "default_network")]
    pub network: String,

    /// Wallet files live under `<data_dir>/<network>/`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WalletSection {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Bitcoin Core binaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoindSection {
    #[serde(default = "default_cli_path")]
    pub cli_path: PathBuf,

    #[serde(default = "default_bitcoind_path")]
    pub bitcoind_path: PathBuf,

    /// Extra arguments for every `bitcoin-cli` call, e.g. `-datadir=...`
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Start `bitcoind -daemon` if the node does not answer
    #[serde(default = "default_start_daemon")]
    pub start_daemon: bool,
}

impl Default for BitcoindSection {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            bitcoind_path: default_bitcoind_path(),
            extra_args: Vec::new(),
            start_daemon: default_start_daemon(),
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_network() -> String {
    "regtest".to_string()
}

fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".proof-wallet"),
        None => PathBuf::from(".proof-wallet"),
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_cli_path() -> PathBuf {
    PathBuf::from("bitcoin-cli")
}

fn default_bitcoind_path() -> PathBuf {
    PathBuf::from("bitcoind")
}

fn default_start_daemon() -> bool {
    true
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ProofConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ProofConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `PROOF_NETWORK`
    /// - `PROOF_DATA_DIR`
    /// - `PROOF_LOG_LEVEL`
    /// - `PROOF_BITCOIN_CLI`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PROOF_NETWORK") {
            self.wallet.network = v;
        }
        if let Ok(v) = std::env::var("PROOF_DATA_DIR") {
            self.wallet.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PROOF_LOG_LEVEL") {
            self.wallet.log_level = v;
        }
        if let Ok(v) = std::env::var("PROOF_BITCOIN_CLI") {
            self.bitcoind.cli_path = PathBuf::from(v);
        }
    }

    pub fn network(&self) -> Result<Network> {
        self.wallet
            .network
            .parse()
            .with_context(|| format!("wallet.network: {:?}", self.wallet.network))
    }

    /// Adapter settings for the configured network
    pub fn bitcoind_config(&self) -> Result<BitcoindConfig> {
        let mut config = BitcoindConfig::new(self.network()?);
        config.cli_path = self.bitcoind.cli_path.clone();
        config.bitcoind_path = self.bitcoind.bitcoind_path.clone();
        config.extra_args = self.bitcoind.extra_args.clone();
        Ok(config)
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.network()?;

        anyhow::ensure!(
            !self.wallet.data_dir.as_os_str().is_empty(),
            "wallet.data_dir must not be empty"
        );
        anyhow::ensure!(
            !self.bitcoind.cli_path.as_os_str().is_empty(),
            "bitcoind.cli_path must not be empty"
        );
        anyhow::ensure!(
            !self.bitcoind.bitcoind_path.as_os_str().is_empty(),
            "bitcoind.bitcoind_path must not be empty"
        );
        anyhow::ensure!(
            matches!(
                self.wallet.log_level.as_str(),
                "error" | "warn" | "info" | "debug" | "trace" | "off"
            ),
            "wallet.log_level must be one of error, warn, info, debug, trace, off"
        );

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
