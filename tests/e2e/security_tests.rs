//! Adversarial inputs against the signer.
//!
//! These tests verify:
//! 1. Tampered PSBTs from a compromised coordinator are refused
//! 2. Bad cosigner keys never enter a wallet
//! 3. Malformed Base58 and extended keys don't panic
//! 4. Nothing is signed without a complete, valid wallet

use proof_core::{base58, ExtendedKey, Network, XkeyError};
use proof_psbt::decoded::WitnessScript;
use proof_psbt::{validate_psbt, Branch, DecodedPsbt, ValidationError, ValidationWarning};
use proof_wallet::test_utils::{complete_wallets, test_wallet, MockOracle, PsbtFixture};
use proof_wallet::{
    review_psbt, sign_psbt, CeremonyError, CosignerError, FingerprintSource, PendingCosigner,
    Wallet, WalletError,
};

const NETWORK: Network = Network::Regtest;

fn spend(wallet: &Wallet) -> DecodedPsbt {
    PsbtFixture::new(wallet)
        .input(Branch::Receive, 2, 300_000)
        .input(Branch::Change, 9, 50_000)
        .external_output(200_000)
        .wallet_output(Branch::Change, 10, 149_000)
        .build()
}

// ============================================================================
// 1. Tampered PSBTs
// ============================================================================

#[test]
fn test_untampered_spend_is_signable() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let result = validate_psbt(&spend(&wallets[0]), &wallets[2]);
    assert!(result.is_signable(), "{:?}", result.errors);
    assert_eq!(result.import_range, Some((2, 10)));
    assert_eq!(result.successes.len(), 3);
}

#[test]
fn test_change_redirected_to_attacker() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let attacker = complete_wallets(2, 3, Network::Testnet);
    let mut psbt = spend(&wallets[0]);

    // Claimed address swapped; derivation data left intact
    let stolen = attacker[0].address(Branch::Change, 10).unwrap();
    psbt.tx.vout[1].script_pubkey.address = Some(stolen);

    let result = validate_psbt(&psbt, &wallets[1]);
    assert!(!result.is_signable());
    assert!(matches!(
        result.errors[..],
        [ValidationError::AddressMismatch { index: 1, .. }]
    ));
}

#[test]
fn test_change_with_foreign_key_set() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let strangers = complete_wallets(2, 2, NETWORK);
    let mut psbt = spend(&wallets[0]);
    let foreign = spend(&strangers[0]);
    psbt.outputs[1] = foreign.outputs[1].clone();

    let result = validate_psbt(&psbt, &wallets[0]);
    assert!(matches!(
        result.errors[..],
        [ValidationError::FingerprintMismatch { index: 1, .. }]
    ));
}

#[test]
fn test_swapped_witness_script() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let mut psbt = spend(&wallets[0]);
    let other = spend(&wallets[0]);
    // Script of the second input under the first input's scriptPubKey
    psbt.inputs[0].witness_script = other.inputs[1].witness_script.clone();

    let result = validate_psbt(&psbt, &wallets[0]);
    assert_eq!(result.errors, vec![ValidationError::WitnessScriptMismatch(0)]);
    assert!(result.successes.is_empty());
}

#[test]
fn test_garbage_witness_script() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let mut psbt = spend(&wallets[0]);
    psbt.inputs[1].witness_script = Some(WitnessScript {
        asm: "OP_TRUE".to_string(),
        hex: "51".to_string(),
        script_type: None,
    });

    let result = validate_psbt(&psbt, &wallets[0]);
    assert_eq!(result.errors, vec![ValidationError::WitnessScriptMismatch(1)]);
    // the first input was checked before the halt
    assert_eq!(result.successes.len(), 1);
}

#[test]
fn test_non_default_sighash() {
    let wallets = complete_wallets(2, 3, NETWORK);
    for sighash in ["NONE", "SINGLE|ANYONECANPAY", "ALL|ANYONECANPAY"] {
        let mut psbt = spend(&wallets[0]);
        psbt.inputs[1].sighash = Some(sighash.to_string());
        let result = validate_psbt(&psbt, &wallets[0]);
        assert!(
            matches!(
                result.errors[..],
                [ValidationError::DisallowedSighash { index: 1, .. }]
            ),
            "{} accepted",
            sighash
        );
    }
}

#[test]
fn test_legacy_utxo_refused() {
    let wallets = complete_wallets(1, 2, NETWORK);
    let mut psbt = spend(&wallets[0]);
    psbt.inputs[0].non_witness_utxo = Some(serde_json::json!({"txid": "00"}));

    let result = validate_psbt(&psbt, &wallets[0]);
    assert_eq!(result.errors, vec![ValidationError::NonWitnessUtxo(0)]);
}

#[test]
fn test_hardened_path_refused() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let mut psbt = spend(&wallets[0]);
    for deriv in psbt.inputs[0].bip32_derivs.iter_mut() {
        deriv.path = "m/0'/2".to_string();
    }
    let result = validate_psbt(&psbt, &wallets[0]);
    assert!(matches!(
        result.errors[..],
        [ValidationError::InvalidPath { index: 0, .. }]
    ));
}

#[test]
fn test_change_on_receive_branch_warns() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let psbt = PsbtFixture::new(&wallets[0])
        .input(Branch::Receive, 0, 100_000)
        .wallet_output(Branch::Receive, 1, 99_000)
        .build();

    let result = validate_psbt(&psbt, &wallets[1]);
    assert!(result.is_signable());
    assert!(result.warnings.contains(&ValidationWarning::ChangeOnReceiveBranch {
        output: 0,
        index: 1
    }));
    assert!(result.warnings.contains(&ValidationWarning::NoChangeOutput));
}

#[test]
fn test_tampered_psbt_never_reaches_signer() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let oracle = MockOracle::new();
    let mut psbt = spend(&wallets[0]);
    psbt.inputs[0].sighash = Some("NONE".to_string());
    oracle.register_psbt("cHNidP8BAAoCAAAAAAAAAAAAAA==", psbt);

    let review = review_psbt(&oracle, &wallets[1], "cHNidP8BAAoCAAAAAAAAAAAAAA==");
    assert!(matches!(
        sign_psbt(&oracle, &wallets[1], &review),
        Err(CeremonyError::NotSignable)
    ));
    assert!(oracle.sign_requests().is_empty());
}

#[test]
fn test_node_offline_means_undecodable() {
    let wallets = complete_wallets(2, 3, NETWORK);
    let oracle = MockOracle::new();
    oracle.register_psbt("cHNidP8BAAoCAAAAAAAAAAAAAA==", spend(&wallets[0]));
    oracle.set_offline(true);

    let review = review_psbt(&oracle, &wallets[0], "cHNidP8BAAoCAAAAAAAAAAAAAA==");
    assert_eq!(review.validation.errors, vec![ValidationError::Undecodable]);
}

// ============================================================================
// 2. Cosigner keys
// ============================================================================

#[test]
fn test_private_key_refused_as_cosigner() {
    let oracle = MockOracle::new();
    let other = test_wallet(9, 2, 2, NETWORK);
    let result = PendingCosigner::prepare(
        &oracle,
        &other.xprv().to_string(),
        NETWORK,
        FingerprintSource::Derived,
    );
    assert!(matches!(result, Err(CosignerError::PrivateKey)));
}

#[test]
fn test_mainnet_key_refused_on_regtest() {
    let oracle = MockOracle::new();
    let mainnet = test_wallet(9, 2, 2, Network::Mainnet);
    let result = PendingCosigner::prepare(
        &oracle,
        &mainnet.xpub().to_string(),
        NETWORK,
        FingerprintSource::Derived,
    );
    assert!(matches!(
        result,
        Err(CosignerError::InvalidKey(XkeyError::WrongNetwork { .. }))
    ));
}

#[test]
fn test_own_key_duplicate_and_overflow_refused() {
    let oracle = MockOracle::new();
    let mut wallet = test_wallet(1, 2, 3, NETWORK);
    let prepare = |w: &Wallet| {
        PendingCosigner::prepare(
            &oracle,
            &w.xpub().to_string(),
            NETWORK,
            FingerprintSource::Derived,
        )
        .unwrap()
    };

    let own = prepare(&wallet);
    assert!(matches!(
        wallet.add_cosigner(own),
        Err(WalletError::Cosigner(CosignerError::Duplicate(_)))
    ));

    let second = test_wallet(2, 2, 3, NETWORK);
    wallet.add_cosigner(prepare(&second)).unwrap();
    assert!(matches!(
        wallet.add_cosigner(prepare(&second)),
        Err(WalletError::Cosigner(CosignerError::Duplicate(_)))
    ));

    wallet.add_cosigner(prepare(&test_wallet(3, 2, 3, NETWORK))).unwrap();
    assert!(wallet.is_complete());
    assert!(matches!(
        wallet.add_cosigner(prepare(&test_wallet(4, 2, 3, NETWORK))),
        Err(WalletError::Cosigner(CosignerError::RegistryFull(_)))
    ));
}

#[test]
fn test_incomplete_wallet_cannot_sign() {
    let wallet = test_wallet(1, 2, 3, NETWORK);
    assert!(matches!(
        wallet.signing_descriptor(Branch::Receive),
        Err(WalletError::Incomplete { have: 1, n: 3 })
    ));
}

// ============================================================================
// 3. Malformed encodings don't panic
// ============================================================================

#[test]
fn test_malformed_base58_does_not_panic() {
    let inputs = [
        "",
        "0",
        "OIl",
        "1111111111",
        "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz",
        "tpubD6NzVbkrYhZ4",
        "\u{1F600}",
        " xpub ",
    ];
    for input in inputs {
        let _ = base58::decode(input);
        assert!(base58::decode_check(input).is_err(), "{:?} passed", input);
        assert!(ExtendedKey::decode(input).is_err(), "{:?} passed", input);
    }
}

#[test]
fn test_corrupted_xpub_fails_checksum() {
    let xpub = test_wallet(5, 1, 1, NETWORK).xpub().to_string();
    let mut chars: Vec<char> = xpub.chars().collect();
    let mid = chars.len() / 2;
    chars[mid] = if chars[mid] == 'a' { 'b' } else { 'a' };
    let corrupted: String = chars.into_iter().collect();

    assert!(ExtendedKey::deserialize(&xpub, NETWORK).is_ok());
    assert!(matches!(
        ExtendedKey::deserialize(&corrupted, NETWORK),
        Err(XkeyError::Base58(_))
    ));
}
