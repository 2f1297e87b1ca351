//! Full signing ceremony across three air-gapped machines.
//!
//! Each machine has its own data directory and wallet. Keys travel between
//! them as xpub strings and PSBTs as base64 chunks; the node is the in-memory
//! mock oracle.
//!
//! Run with: cargo test -p proof-e2e --test ceremony

use proof_cli::{Session, TerminalConsole};
use proof_core::{DeviceEntropy, DiceRolls, Network, WalletEntropy};
use proof_psbt::Branch;
use proof_wallet::test_utils::{MockOracle, PsbtFixture};
use proof_wallet::transport::{join_chunks, split_chunks};
use proof_wallet::{
    receive_addresses, review_psbt, sign_psbt, FingerprintSource, PendingCosigner, Wallet,
    WalletStore,
};
use std::io::Cursor;
use tempfile::tempdir;

const NETWORK: Network = Network::Regtest;
const PSBT: &str = "cHNidP8BAAoCAAAAAAAAAAAAAA==";

fn dice(offset: usize) -> DiceRolls {
    let faces: Vec<u8> = (0..120).map(|i| ((i * 7 + offset) % 6) as u8 + 1).collect();
    DiceRolls::from_faces(&faces).unwrap()
}

fn transcript(byte: char) -> DeviceEntropy {
    DeviceEntropy::from_transcript(&byte.to_string().repeat(64)).unwrap()
}

/// Three 2-of-3 wallets from distinct entropy, cross-imported and saved.
fn setup(root: &std::path::Path) -> (Vec<WalletStore>, Vec<Wallet>, MockOracle) {
    let oracle = MockOracle::new();
    let mut wallets: Vec<Wallet> = ['1', 'a', 'f']
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let entropy = WalletEntropy::new(&dice(i), &transcript(*c)).unwrap();
            Wallet::from_entropy(&entropy, 2, 3, NETWORK).unwrap()
        })
        .collect();

    let exported: Vec<String> = wallets.iter().map(|w| w.xpub().to_string()).collect();
    for wallet in wallets.iter_mut() {
        for xpub in &exported {
            if *xpub == wallet.xpub().to_string() {
                continue;
            }
            let pending =
                PendingCosigner::prepare(&oracle, xpub, NETWORK, FingerprintSource::Derived)
                    .unwrap();
            wallet.add_cosigner(pending).unwrap();
        }
        assert!(wallet.is_complete());
    }

    let stores: Vec<WalletStore> = (0..3)
        .map(|i| WalletStore::new(root.join(format!("machine-{}", i)), NETWORK))
        .collect();
    for (store, wallet) in stores.iter().zip(&wallets) {
        store.save(wallet).unwrap();
    }
    (stores, wallets, oracle)
}

#[test]
fn test_two_machines_derive_same_mnemonic() {
    let device = transcript('7');
    let first = WalletEntropy::new(&dice(3), &device).unwrap();
    let second = WalletEntropy::new(
        &dice(3),
        &DeviceEntropy::from_transcript(&device.grouped().to_uppercase()).unwrap(),
    )
    .unwrap();

    let a = Wallet::from_entropy(&first, 2, 3, NETWORK).unwrap();
    let b = Wallet::from_entropy(&second, 2, 3, NETWORK).unwrap();
    assert_eq!(a.mnemonic().to_string(), b.mnemonic().to_string());
    assert_eq!(a.fingerprint(), b.fingerprint());

    let other = Wallet::from_entropy(
        &WalletEntropy::new(&dice(4), &device).unwrap(),
        2,
        3,
        NETWORK,
    )
    .unwrap();
    assert_ne!(a.fingerprint(), other.fingerprint());
}

#[test]
fn test_all_machines_agree_on_addresses() {
    let dir = tempdir().unwrap();
    let (stores, wallets, oracle) = setup(dir.path());

    for index in [0, 1, 17, 1000] {
        for branch in [Branch::Receive, Branch::Change] {
            let expected = wallets[0].address(branch, index).unwrap();
            for wallet in &wallets[1..] {
                assert_eq!(wallet.address(branch, index).unwrap(), expected);
            }
        }
    }

    // Reloaded wallets derive the same addresses, cross-checked by the node
    for (store, wallet) in stores.iter().zip(&wallets) {
        let reloaded = store.load(wallet.name()).unwrap();
        assert_eq!(reloaded.fingerprint(), wallet.fingerprint());
        assert_eq!(
            receive_addresses(&oracle, &reloaded, (0, 9)).unwrap(),
            receive_addresses(&oracle, &wallets[0], (0, 9)).unwrap()
        );
    }
}

#[test]
fn test_psbt_signed_by_two_cosigners() {
    let dir = tempdir().unwrap();
    let (stores, wallets, oracle) = setup(dir.path());

    // The watch-only coordinator builds a spend with change
    let decoded = PsbtFixture::new(&wallets[0])
        .input(Branch::Receive, 3, 1_000_000)
        .external_output(400_000)
        .wallet_output(Branch::Change, 4, 599_000)
        .build();
    oracle.register_psbt(PSBT, decoded);

    // Second machine signs first, from its stored wallet
    let second = stores[1].load(wallets[1].name()).unwrap();
    let review = review_psbt(&oracle, &second, PSBT);
    assert!(review.is_signable(), "{:?}", review.validation.errors);
    assert!(review.validation.warnings.is_empty());
    assert_eq!(review.validation.import_range, Some((3, 4)));
    assert_eq!(review.fee().unwrap().to_sat(), 1_000);

    let partial = sign_psbt(&oracle, &second, &review).unwrap();
    assert!(!partial.complete);

    // The partially signed PSBT crosses the air gap in chunks
    let chunks = split_chunks(&partial.psbt, 16);
    assert!(chunks.len() > 1);
    let carried = join_chunks(&chunks);
    assert_eq!(carried, partial.psbt);

    let third = stores[2].load(wallets[2].name()).unwrap();
    let review = review_psbt(&oracle, &third, &carried);
    assert!(review.is_signable(), "{:?}", review.validation.errors);
    let signed = sign_psbt(&oracle, &third, &review).unwrap();
    assert!(signed.complete);

    // Each signer passed its own xprv, for both branches, over the same range
    let requests = oracle.sign_requests();
    assert_eq!(requests.len(), 2);
    for (wallet, (descs, _)) in [&second, &third].iter().zip(&requests) {
        assert_eq!(descs.len(), 2);
        assert!(descs[0].0.contains(&wallet.xprv().to_string()));
        assert!(descs.iter().all(|(_, range)| *range == (3, 4)));
    }
}

#[test]
fn test_session_signs_from_stored_wallet() {
    let dir = tempdir().unwrap();
    let (stores, wallets, oracle) = setup(dir.path());
    oracle.register_psbt(
        PSBT,
        PsbtFixture::new(&wallets[0])
            .input(Branch::Receive, 0, 50_000)
            .external_output(20_000)
            .wallet_output(Branch::Change, 0, 29_500)
            .build(),
    );

    // home: load -> wallet 1 -> sign -> paste -> confirm -> back -> exit
    let script = ["3", "", "1", "1", "", PSBT, "", "s", "", "q", "4"].join("\n") + "\n";
    let console = TerminalConsole::new(Cursor::new(script.into_bytes()), Vec::new());
    let store = WalletStore::new(stores[0].dir().parent().unwrap(), NETWORK);
    let mut session = Session::new(console, oracle, store);
    session.run().unwrap();

    let out = String::from_utf8_lossy(session.console().output()).into_owned();
    assert!(out.contains("Proof Wallet: Review PSBT"));
    assert!(out.contains("Fee rate:"));
    assert!(out.contains("More signatures are required"));
    assert_eq!(session.wallet().unwrap().name(), wallets[0].name());
    assert_eq!(session.oracle().sign_requests().len(), 1);
}

#[test]
fn test_restore_matches_original() {
    let dir = tempdir().unwrap();
    let (_, wallets, _) = setup(dir.path());

    let phrase = wallets[1].mnemonic().to_string();
    let restored = Wallet::restore(&phrase, 2, 3, NETWORK).unwrap();
    assert_eq!(restored.fingerprint(), wallets[1].fingerprint());
    assert_eq!(restored.xpub(), wallets[1].xpub());
    assert!(!restored.is_complete());
}
