//! Bitcoin Core chain oracle
//!
//! Implements [`ChainOracle`] by running `bitcoin-cli` as a subprocess, one
//! call per RPC. No wallet is loaded in the node: signing goes through
//! `descriptorprocesspsbt` with descriptors passed on stdin, so private keys
//! never appear on a command line.
//!
//! # Example
//!
//! ```ignore
//! use proof_bitcoind::BitcoindAdapter;
//! use proof_core::Network;
//!
//! let node = BitcoindAdapter::new(Network::Regtest);
//! node.ensure_running()?;
//! let decoded = node.decode_psbt(&psbt)?;
//! ```

use proof_core::{ExtendedKey, Network};
use proof_psbt::{DecodedPsbt, PsbtAnalysis};
use proof_wallet::{ChainOracle, DescriptorRequest, OracleError, SignedPsbt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;
use zeroize::Zeroizing;

/// Polls of `getnetworkinfo` before giving up on a starting node
pub const STARTUP_POLLS: u32 = 20;

/// Delay between startup polls
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Where the node binaries live and how to call them
#[derive(Debug, Clone)]
pub struct BitcoindConfig {
    pub network: Network,
    pub cli_path: PathBuf,
    pub bitcoind_path: PathBuf,
    /// Passed to both binaries, e.g. `-datadir=...`
    pub extra_args: Vec<String>,
}

impl BitcoindConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            cli_path: PathBuf::from("bitcoin-cli"),
            bitcoind_path: PathBuf::from("bitcoind"),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct DescriptorInfo {
    checksum: String,
}

/// Chain oracle backed by a local Bitcoin Core node
#[derive(Debug, Clone)]
pub struct BitcoindAdapter {
    config: BitcoindConfig,
}

impl BitcoindAdapter {
    pub fn new(network: Network) -> Self {
        Self::with_config(BitcoindConfig::new(network))
    }

    pub fn with_config(config: BitcoindConfig) -> Self {
        Self { config }
    }

    pub fn network(&self) -> Network {
        self.config.network
    }

    /// Full `bitcoin-cli` argument list for `rpc`
    fn cli_args(&self, rpc: &str, args: &[&str], stdin: bool) -> Vec<String> {
        let mut out = vec![self.config.network.chain_arg().to_string()];
        out.extend(self.config.extra_args.iter().cloned());
        if stdin {
            out.push("-stdin".to_string());
        }
        out.push(rpc.to_string());
        out.extend(args.iter().map(|a| a.to_string()));
        out
    }

    fn spawn_error(&self, program: &Path, source: std::io::Error) -> OracleError {
        OracleError::Spawn {
            program: program.display().to_string(),
            source,
        }
    }

    /// Run one RPC. `secret_args` are written to stdin, one per line.
    fn run(&self, rpc: &str, args: &[&str], secret_args: &[&str]) -> Result<Output, OracleError> {
        let cli = &self.config.cli_path;
        log::debug!("bitcoin-cli {} ({} args)", rpc, args.len() + secret_args.len());

        let mut child = Command::new(cli)
            .args(self.cli_args(rpc, args, !secret_args.is_empty()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(cli, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            for arg in secret_args {
                writeln!(stdin, "{}", arg).map_err(|e| self.spawn_error(cli, e))?;
            }
        }
        child
            .wait_with_output()
            .map_err(|e| self.spawn_error(cli, e))
    }

    fn call(&self, rpc: &str, args: &[&str], secret_args: &[&str]) -> Result<String, OracleError> {
        let output = self.run(rpc, args, secret_args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            log::warn!("{} failed: {}", rpc, stderr);
            return Err(OracleError::Command {
                rpc: rpc.to_string(),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn call_json<T: DeserializeOwned>(
        &self,
        rpc: &str,
        args: &[&str],
        secret_args: &[&str],
    ) -> Result<T, OracleError> {
        let stdout = self.call(rpc, args, secret_args)?;
        serde_json::from_str(&stdout).map_err(|source| OracleError::Json {
            rpc: rpc.to_string(),
            source,
        })
    }

    /// True if the node answers `getnetworkinfo`
    pub fn ping(&self) -> bool {
        self.run("getnetworkinfo", &[], &[])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Start `bitcoind -daemon` unless a node already answers, then wait
    /// for it to come up.
    pub fn ensure_running(&self) -> Result<(), OracleError> {
        if self.ping() {
            return Ok(());
        }
        let bitcoind = &self.config.bitcoind_path;
        log::info!("Starting {} on {}", bitcoind.display(), self.config.network);
        // A second daemon exits straight away if one is already starting
        let status = Command::new(bitcoind)
            .arg(self.config.network.chain_arg())
            .args(&self.config.extra_args)
            .arg("-daemon")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| self.spawn_error(bitcoind, e))?;
        log::debug!("bitcoind -daemon exited with {}", status);

        for _ in 0..STARTUP_POLLS {
            if self.ping() {
                log::info!("Bitcoin Core is ready");
                return Ok(());
            }
            thread::sleep(STARTUP_POLL_INTERVAL);
        }
        Err(OracleError::Unavailable(format!(
            "no answer from bitcoind after {} attempts",
            STARTUP_POLLS
        )))
    }

    /// Whether each required program can be run
    pub fn diagnostics(&self) -> Vec<(String, bool)> {
        [&self.config.bitcoind_path, &self.config.cli_path]
            .into_iter()
            .map(|program| {
                let ok = Command::new(program)
                    .arg("-version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .map(|s| s.success())
                    .unwrap_or(false);
                (program.display().to_string(), ok)
            })
            .collect()
    }
}

/// JSON array for `descriptorprocesspsbt`
fn descriptors_json(descriptors: &[DescriptorRequest]) -> String {
    let items: Vec<serde_json::Value> = descriptors
        .iter()
        .map(|d| {
            serde_json::json!({
                "desc": d.desc.as_str(),
                "range": [d.range.0, d.range.1],
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

impl ChainOracle for BitcoindAdapter {
    fn decode_psbt(&self, psbt: &str) -> Result<DecodedPsbt, OracleError> {
        self.call_json("decodepsbt", &[psbt], &[])
    }

    fn analyze_psbt(&self, psbt: &str) -> Result<PsbtAnalysis, OracleError> {
        self.call_json("analyzepsbt", &[psbt], &[])
    }

    fn derive_addresses(
        &self,
        descriptor: &str,
        range: (u32, u32),
    ) -> Result<Vec<String>, OracleError> {
        let range = format!("[{},{}]", range.0, range.1);
        self.call_json("deriveaddresses", &[descriptor, &range], &[])
    }

    fn descriptor_checksum(&self, descriptor: &str) -> Result<String, OracleError> {
        // Private descriptors go through stdin
        let info: DescriptorInfo = self.call_json("getdescriptorinfo", &[], &[descriptor])?;
        Ok(info.checksum)
    }

    fn is_valid_extended_key(&self, key: &str, network: Network) -> Result<bool, OracleError> {
        match ExtendedKey::deserialize(key, network) {
            Ok(k) if !k.is_private() => {}
            _ => return Ok(false),
        }
        let desc = format!("pk({})", key);
        match self.call("getdescriptorinfo", &[&desc], &[]) {
            Ok(_) => Ok(true),
            Err(OracleError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn sign(
        &self,
        descriptors: &[DescriptorRequest],
        psbt: &str,
    ) -> Result<SignedPsbt, OracleError> {
        let descriptors = Zeroizing::new(descriptors_json(descriptors));
        let signed: SignedPsbt =
            self.call_json("descriptorprocesspsbt", &[psbt], &[descriptors.as_str()])?;
        log::info!("Signed PSBT (complete: {})", signed.complete);
        Ok(signed)
    }
}
