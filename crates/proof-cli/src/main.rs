//! Proof Wallet: air-gapped M-of-N multisig signer on top of Bitcoin Core
//!
//! # Usage
//!
//! ```bash
//! proof --config /path/to/proof.toml
//! proof --network testnet
//! proof --validate   # Validate config, check binaries and exit
//! ```

use anyhow::{Context, Result};
use proof_bitcoind::BitcoindAdapter;
use proof_cli::{hardening, ProofConfig, Session, TerminalConsole};
use proof_wallet::WalletStore;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = "proof.toml";

fn main() -> Result<()> {
    let hardened = hardening::disable_core_dumps();

    // Parse CLI args (minimal, no clap)
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut network: Option<String> = None;
    let mut validate_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_path = Some(PathBuf::from(path)),
                    None => anyhow::bail!("--config requires a path argument"),
                }
            }
            "--network" | "-n" => {
                i += 1;
                match args.get(i) {
                    Some(name) => network = Some(name.clone()),
                    None => anyhow::bail!("--network requires mainnet, testnet or regtest"),
                }
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("proof {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    // An explicit --config must exist; the default path is optional
    let mut config = match &config_path {
        Some(path) => ProofConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ProofConfig::load_or_default(&PathBuf::from(DEFAULT_CONFIG))?,
    };
    config.apply_env_overrides();
    if let Some(network) = network {
        config.wallet.network = network;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.wallet.log_level.as_str()),
    )
    .init();
    if let Err(e) = hardened {
        log::warn!("Could not disable core dumps: {}", e);
    }

    let network = config.network()?;
    let node = BitcoindAdapter::with_config(config.bitcoind_config()?);

    if validate_only {
        println!("Configuration is valid.");
        println!("  Network:       {}", network);
        println!("  Data dir:      {}", config.wallet.data_dir.display());
        println!("  bitcoin-cli:   {}", config.bitcoind.cli_path.display());
        println!("  bitcoind:      {}", config.bitcoind.bitcoind_path.display());
        println!("  Start daemon:  {}", config.bitcoind.start_daemon);
        println!();
        println!("Diagnostic report:");
        for (program, ok) in node.diagnostics() {
            println!("  {:<40} {}", program, if ok { "ok" } else { "MISSING" });
        }
        return Ok(());
    }

    let missing: Vec<String> = node
        .diagnostics()
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(program, _)| program)
        .collect();
    anyhow::ensure!(
        missing.is_empty(),
        "Required programs not installed: {}",
        missing.join(", ")
    );

    if config.bitcoind.start_daemon {
        node.ensure_running()
            .context("Failed to start or reach bitcoind")?;
    } else if !node.ping() {
        anyhow::bail!("bitcoind is not answering on {} and start_daemon is off", network);
    }
    log::info!("Connected to bitcoind ({})", network);

    let store = WalletStore::new(&config.wallet.data_dir, network);
    let mut session = Session::new(TerminalConsole::stdio(), node, store);
    session.run()
}

fn print_help() {
    println!(
        r#"proof: air-gapped M-of-N multisig signer for Bitcoin Core

USAGE:
    proof [OPTIONS]

OPTIONS:
    -c, --config <PATH>     Config file (default: ./proof.toml if present)
    -n, --network <NAME>    mainnet, testnet or regtest (overrides config)
        --validate          Validate config, check binaries and exit
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT:
    PROOF_NETWORK           Overrides wallet.network
    PROOF_DATA_DIR          Overrides wallet.data_dir
    PROOF_LOG_LEVEL         Overrides wallet.log_level
    PROOF_BITCOIN_CLI       Overrides bitcoind.cli_path
    RUST_LOG                Overrides the log filter entirely"#
    );
}
