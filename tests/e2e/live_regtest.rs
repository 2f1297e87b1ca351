//! Live tests against a Bitcoin Core regtest node. No mocks.
//!
//! Needs `bitcoind` and `bitcoin-cli` (v25 or later) on PATH.
//! Run with: cargo test -p proof-e2e --test live_regtest -- --ignored --nocapture

use proof_bitcoind::BitcoindAdapter;
use proof_core::Network;
use proof_psbt::{Branch, ValidationError};
use proof_wallet::test_utils::{complete_wallets, test_wallet};
use proof_wallet::{
    receive_addresses, review_psbt, ChainOracle, CosignerError, FingerprintSource,
    PendingCosigner,
};
use std::process::Command;

fn node() -> BitcoindAdapter {
    let node = BitcoindAdapter::new(Network::Regtest);
    node.ensure_running().expect("regtest bitcoind");
    node
}

#[test]
#[ignore]
fn test_node_derives_wallet_addresses() {
    let node = node();
    let wallets = complete_wallets(2, 3, Network::Regtest);

    let addresses = receive_addresses(&node, &wallets[0], (0, 19)).unwrap();
    assert_eq!(addresses.len(), 20);
    assert_eq!(addresses[7], wallets[2].address(Branch::Receive, 7).unwrap());
    println!("  m/0/0 = {}", addresses[0]);
}

#[test]
#[ignore]
fn test_node_checks_cosigner_keys() {
    let node = node();
    let wallet = test_wallet(4, 2, 2, Network::Regtest);

    let pending = PendingCosigner::prepare(
        &node,
        &wallet.xpub().to_string(),
        Network::Regtest,
        FingerprintSource::Derived,
    )
    .unwrap();
    assert_eq!(pending.fingerprint(), wallet.fingerprint());

    let private = PendingCosigner::prepare(
        &node,
        &wallet.xprv().to_string(),
        Network::Regtest,
        FingerprintSource::Derived,
    );
    assert!(matches!(private, Err(CosignerError::PrivateKey)));
}

#[test]
#[ignore]
fn test_descriptor_checksum_roundtrip() {
    let node = node();
    let wallets = complete_wallets(1, 2, Network::Regtest);
    let desc = wallets[0].descriptor().to_string_for(Branch::Change);

    let with_checksum = node.with_checksum(&desc).unwrap();
    assert!(with_checksum.starts_with(&desc));
    assert_eq!(with_checksum.len(), desc.len() + 9);
    let addresses = node.derive_addresses(&with_checksum, (3, 3)).unwrap();
    assert_eq!(addresses, vec![wallets[1].address(Branch::Change, 3).unwrap()]);
}

#[test]
#[ignore]
fn test_bare_psbt_is_refused() {
    let node = node();
    let wallets = complete_wallets(2, 3, Network::Regtest);
    let to = wallets[0].address(Branch::Receive, 0).unwrap();

    // A PSBT with no UTXO data, as a careless coordinator would send
    let output = Command::new("bitcoin-cli")
        .args([
            "-chain=regtest",
            "createpsbt",
            &format!(r#"[{{"txid":"{}","vout":0}}]"#, "11".repeat(32)),
            &format!(r#"[{{"{}":0.001}}]"#, to),
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let psbt = String::from_utf8(output.stdout).unwrap();

    let review = review_psbt(&node, &wallets[1], psbt.trim());
    assert_eq!(
        review.validation.errors,
        vec![ValidationError::MissingWitnessUtxo(0)]
    );
}
