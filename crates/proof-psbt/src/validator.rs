//! Wallet-side PSBT validation
//!
//! [`validate_psbt`] decides whether a decoded PSBT may be signed by a
//! wallet. Every input must provably belong to the wallet's quorum: the
//! fingerprint set must match exactly, the witness script must hash to the
//! scriptPubKey, and the claimed address must re-derive from the wallet's own
//! descriptor. Outputs carrying derivation metadata are held to the same
//! standard; outputs without it are external payments.
//!
//! Inputs are checked before outputs, each in ascending index order, and the
//! first hard error ends validation.

use crate::decoded::{Bip32Derivation, DecodedPsbt, PsbtInput, ScriptPubKey, SIGHASH_ALL};
use crate::path::{Branch, WalletPath};
use crate::result::{PsbtValidationResult, Side, ValidationError, ValidationWarning};
use bitcoin::bip32::Fingerprint;
use bitcoin::hashes::{sha256, Hash};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// What the validator needs to know about a wallet
pub trait WalletPolicy {
    type Error: fmt::Display;

    /// Master fingerprints of every signer, local key included
    fn fingerprints(&self) -> BTreeSet<Fingerprint>;

    /// Number of signers in the policy (`n`)
    fn signer_count(&self) -> usize;

    /// Address of the wallet's script at `m/<branch>/<index>`
    fn derive_address(&self, branch: Branch, index: u32) -> Result<String, Self::Error>;
}

/// Validate `psbt` against `wallet`.
///
/// Never fails: problems are reported in the returned result.
pub fn validate_psbt<W: WalletPolicy>(psbt: &DecodedPsbt, wallet: &W) -> PsbtValidationResult {
    let mut result = PsbtValidationResult::new(psbt.clone());
    if let Err(err) = run(psbt, wallet, &mut result) {
        log::warn!("PSBT rejected: {}", err);
        result.errors.push(err);
    }
    result
}

fn run<W: WalletPolicy>(
    psbt: &DecodedPsbt,
    wallet: &W,
    result: &mut PsbtValidationResult,
) -> Result<(), ValidationError> {
    if psbt.inputs.is_empty() {
        return Err(ValidationError::NoInputs);
    }
    if psbt.outputs.is_empty() {
        return Err(ValidationError::NoOutputs);
    }
    if psbt.inputs.len() != psbt.tx.vin.len() || psbt.outputs.len() != psbt.tx.vout.len() {
        return Err(ValidationError::InconsistentTransaction);
    }

    let expected = wallet.fingerprints();
    if expected.len() != wallet.signer_count() {
        return Err(ValidationError::IncompleteWallet {
            have: expected.len(),
            n: wallet.signer_count(),
        });
    }

    for (index, input) in psbt.inputs.iter().enumerate() {
        log::debug!("Checking input {}", index);
        let path = check_input(index, input, &expected, wallet)?;
        result.track_index(path.index);
        result.successes.push(format!(
            "Input {} spends a wallet UTXO at {}",
            index, path
        ));
    }

    let mut change_found = false;
    for (index, output) in psbt.outputs.iter().enumerate() {
        log::debug!("Checking output {}", index);
        if output.bip32_derivs.is_empty() {
            continue;
        }
        let script_pubkey = &psbt.tx.vout[index].script_pubkey;
        let path = check_owned_output(index, &output.bip32_derivs, script_pubkey, &expected, wallet)?;
        result.track_index(path.index);

        match path.branch {
            Branch::Change => {
                change_found = true;
                result.change_outputs.push((index, path.index));
                result
                    .successes
                    .push(format!("Output {} is change at {}", index, path));
            }
            Branch::Receive => {
                log::warn!("Output {} pays a receive address of this wallet", index);
                result.warnings.push(ValidationWarning::ChangeOnReceiveBranch {
                    output: index,
                    index: path.index,
                });
            }
        }
    }

    if !change_found {
        result.warnings.push(ValidationWarning::NoChangeOutput);
    }
    Ok(())
}

fn check_input<W: WalletPolicy>(
    index: usize,
    input: &PsbtInput,
    expected: &BTreeSet<Fingerprint>,
    wallet: &W,
) -> Result<WalletPath, ValidationError> {
    let utxo = input
        .witness_utxo
        .as_ref()
        .ok_or(ValidationError::MissingWitnessUtxo(index))?;
    if input.non_witness_utxo.is_some() {
        return Err(ValidationError::NonWitnessUtxo(index));
    }

    if input.bip32_derivs.is_empty() {
        return Err(ValidationError::MissingDerivations {
            side: Side::Input,
            index,
        });
    }
    check_fingerprints(Side::Input, index, &input.bip32_derivs, expected)?;
    check_script_type(Side::Input, index, &utxo.script_pubkey)?;

    let witness_script = input
        .witness_script
        .as_ref()
        .ok_or(ValidationError::MissingWitnessScript(index))?;
    let script_hash = wsh_program(index, &utxo.script_pubkey.asm)?;
    let script_bytes =
        hex::decode(&witness_script.hex).map_err(|_| ValidationError::WitnessScriptMismatch(index))?;
    if sha256::Hash::hash(&script_bytes).to_byte_array() != script_hash {
        return Err(ValidationError::WitnessScriptMismatch(index));
    }

    let path = common_path(Side::Input, index, &input.bip32_derivs)?;
    let claimed = single_address(Side::Input, index, &utxo.script_pubkey)?;
    check_address(Side::Input, index, path, claimed, wallet)?;

    if let Some(sighash) = &input.sighash {
        if sighash != SIGHASH_ALL {
            return Err(ValidationError::DisallowedSighash {
                index,
                sighash: sighash.clone(),
            });
        }
    }

    Ok(path)
}

fn check_owned_output<W: WalletPolicy>(
    index: usize,
    derivs: &[Bip32Derivation],
    script_pubkey: &ScriptPubKey,
    expected: &BTreeSet<Fingerprint>,
    wallet: &W,
) -> Result<WalletPath, ValidationError> {
    check_fingerprints(Side::Output, index, derivs, expected)?;
    check_script_type(Side::Output, index, script_pubkey)?;
    let claimed = single_address(Side::Output, index, script_pubkey)?;
    let path = common_path(Side::Output, index, derivs)?;
    check_address(Side::Output, index, path, claimed, wallet)?;
    Ok(path)
}

/// The derivation records' fingerprint set must equal the wallet's exactly.
fn check_fingerprints(
    side: Side,
    index: usize,
    derivs: &[Bip32Derivation],
    expected: &BTreeSet<Fingerprint>,
) -> Result<(), ValidationError> {
    let mut found = BTreeSet::new();
    let mut unparsed = false;
    for d in derivs {
        match Fingerprint::from_str(&d.master_fingerprint) {
            Ok(fp) => {
                found.insert(fp);
            }
            Err(_) => unparsed = true,
        }
    }
    if unparsed || &found != expected {
        let mut found: Vec<String> = derivs
            .iter()
            .map(|d| d.master_fingerprint.to_lowercase())
            .collect();
        found.sort();
        found.dedup();
        return Err(ValidationError::FingerprintMismatch {
            side,
            index,
            found,
            expected: expected.iter().map(ToString::to_string).collect(),
        });
    }
    Ok(())
}

fn check_script_type(side: Side, index: usize, spk: &ScriptPubKey) -> Result<(), ValidationError> {
    if !spk.is_wsh() {
        return Err(ValidationError::WrongScriptType {
            side,
            index,
            found: spk.script_type.clone(),
        });
    }
    Ok(())
}

/// Parse a P2WSH scriptPubKey asm of the form `0 <32-byte hex>`.
fn wsh_program(index: usize, asm: &str) -> Result<[u8; 32], ValidationError> {
    let malformed = || ValidationError::MalformedScriptPubKey {
        index,
        asm: asm.to_string(),
    };
    let tokens: Vec<&str> = asm.split(' ').collect();
    if tokens.len() != 2 || tokens[0] != "0" {
        return Err(malformed());
    }
    let bytes = hex::decode(tokens[1]).map_err(|_| malformed())?;
    bytes.try_into().map_err(|_| malformed())
}

/// Every record must carry the same well-formed wallet path.
fn common_path(
    side: Side,
    index: usize,
    derivs: &[Bip32Derivation],
) -> Result<WalletPath, ValidationError> {
    let first = &derivs[0].path;
    if derivs.iter().any(|d| &d.path != first) {
        return Err(ValidationError::DivergentPaths { side, index });
    }
    first
        .parse::<WalletPath>()
        .map_err(|_| ValidationError::InvalidPath {
            side,
            index,
            path: first.clone(),
        })
}

fn single_address(side: Side, index: usize, spk: &ScriptPubKey) -> Result<&str, ValidationError> {
    match spk.all_addresses().as_slice() {
        [address] => Ok(*address),
        other => Err(ValidationError::AddressCount {
            side,
            index,
            count: other.len(),
        }),
    }
}

fn check_address<W: WalletPolicy>(
    side: Side,
    index: usize,
    path: WalletPath,
    claimed: &str,
    wallet: &W,
) -> Result<(), ValidationError> {
    let derived = wallet
        .derive_address(path.branch, path.index)
        .map_err(|e| ValidationError::Derivation {
            side,
            index,
            reason: e.to_string(),
        })?;
    if derived != claimed {
        return Err(ValidationError::AddressMismatch {
            side,
            index,
            claimed: claimed.to_string(),
            expected: derived,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoded::{DecodedTx, PsbtOutput, TxIn, TxOut, WitnessScript, WitnessUtxo, WSH_TYPE};
    use bitcoin::Amount;
    use std::collections::BTreeMap;

    const WITNESS_SCRIPT: &str = "5221020202020202020202020202020202020202020202020202020202020202020252ae";

    struct StubWallet {
        fingerprints: Vec<&'static str>,
        n: usize,
        addresses: BTreeMap<(Branch, u32), String>,
    }

    impl StubWallet {
        fn new() -> Self {
            let mut addresses = BTreeMap::new();
            for i in 0..10 {
                addresses.insert((Branch::Receive, i), format!("bcrt1q-receive-{i}"));
                addresses.insert((Branch::Change, i), format!("bcrt1q-change-{i}"));
            }
            Self {
                fingerprints: vec!["aabbccdd", "11223344"],
                n: 2,
                addresses,
            }
        }
    }

    impl WalletPolicy for StubWallet {
        type Error = String;

        fn fingerprints(&self) -> BTreeSet<Fingerprint> {
            self.fingerprints
                .iter()
                .map(|f| Fingerprint::from_str(f).unwrap())
                .collect()
        }

        fn signer_count(&self) -> usize {
            self.n
        }

        fn derive_address(&self, branch: Branch, index: u32) -> Result<String, String> {
            self.addresses
                .get(&(branch, index))
                .cloned()
                .ok_or_else(|| format!("no address at {branch}/{index}"))
        }
    }

    fn derivs(fps: &[&str], path: &str) -> Vec<Bip32Derivation> {
        fps.iter()
            .enumerate()
            .map(|(i, fp)| Bip32Derivation {
                pubkey: format!("02{:064x}", i),
                master_fingerprint: fp.to_string(),
                path: path.to_string(),
            })
            .collect()
    }

    fn wsh_spk(address: &str) -> ScriptPubKey {
        let script = hex::decode(WITNESS_SCRIPT).unwrap();
        let hash = sha256::Hash::hash(&script);
        ScriptPubKey {
            asm: format!("0 {}", hash),
            hex: format!("0020{}", hash),
            script_type: WSH_TYPE.to_string(),
            address: Some(address.to_string()),
            addresses: Vec::new(),
        }
    }

    fn wallet_input(path: &str, address: &str) -> PsbtInput {
        PsbtInput {
            witness_utxo: Some(WitnessUtxo {
                amount: Amount::from_sat(100_000),
                script_pubkey: wsh_spk(address),
            }),
            sighash: Some("ALL".to_string()),
            witness_script: Some(WitnessScript {
                asm: String::new(),
                hex: WITNESS_SCRIPT.to_string(),
                script_type: Some("multisig".to_string()),
            }),
            bip32_derivs: derivs(&["aabbccdd", "11223344"], path),
            ..Default::default()
        }
    }

    fn external_spk() -> ScriptPubKey {
        ScriptPubKey {
            asm: "0 751e76e8199196d454941c45d1b3a323f1433bd6".to_string(),
            hex: "0014751e76e8199196d454941c45d1b3a323f1433bd6".to_string(),
            script_type: "witness_v0_keyhash".to_string(),
            address: Some("bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080".to_string()),
            addresses: Vec::new(),
        }
    }

    fn psbt(inputs: Vec<PsbtInput>, outputs: Vec<(PsbtOutput, ScriptPubKey)>) -> DecodedPsbt {
        let vin = (0..inputs.len())
            .map(|i| TxIn {
                txid: format!("{:064x}", i + 1),
                vout: 0,
                sequence: 0xffff_fffd,
            })
            .collect();
        let (outputs, spks): (Vec<_>, Vec<_>) = outputs.into_iter().unzip();
        let vout = spks
            .into_iter()
            .enumerate()
            .map(|(n, script_pubkey)| TxOut {
                value: Amount::from_sat(40_000),
                n: n as u32,
                script_pubkey,
            })
            .collect();
        DecodedPsbt {
            tx: DecodedTx {
                txid: "00".repeat(32),
                version: 2,
                locktime: 0,
                vsize: Some(200),
                vin,
                vout,
            },
            unknown: BTreeMap::new(),
            inputs,
            outputs,
            fee: Some(Amount::from_sat(20_000)),
        }
    }

    fn change_output(path: &str, address: &str) -> (PsbtOutput, ScriptPubKey) {
        (
            PsbtOutput {
                witness_script: None,
                bip32_derivs: derivs(&["aabbccdd", "11223344"], path),
            },
            wsh_spk(address),
        )
    }

    fn payment() -> (PsbtOutput, ScriptPubKey) {
        (PsbtOutput::default(), external_spk())
    }

    #[test]
    fn test_accepts_spend_with_change() {
        let wallet = StubWallet::new();
        let psbt = psbt(
            vec![wallet_input("m/0/5", "bcrt1q-receive-5")],
            vec![payment(), change_output("m/1/6", "bcrt1q-change-6")],
        );
        let result = validate_psbt(&psbt, &wallet);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert_eq!(result.import_range, Some((5, 6)));
        assert_eq!(result.successes.len(), 2);
        assert_eq!(result.change_outputs, vec![(1, 6)]);
        assert!(result.is_signable());
    }

    #[test]
    fn test_rejects_superset_fingerprints() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.bip32_derivs = derivs(&["aabbccdd", "11223344", "ffffffff"], "m/0/5");
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(result.errors.len(), 1);
        assert!(result.successes.is_empty());
        assert!(matches!(
            result.errors[0],
            ValidationError::FingerprintMismatch { side: Side::Input, index: 0, .. }
        ));
        assert!(!result.is_signable());
    }

    #[test]
    fn test_rejects_subset_fingerprints() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.bip32_derivs = derivs(&["aabbccdd"], "m/0/5");
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::FingerprintMismatch { .. }]
        ));
    }

    #[test]
    fn test_fingerprint_case_insensitive() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.bip32_derivs = derivs(&["AABBCCDD", "11223344"], "m/0/5");
        let result = validate_psbt(
            &psbt(vec![input], vec![change_output("m/1/0", "bcrt1q-change-0")]),
            &wallet,
        );
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn test_invalid_branch_halts() {
        let wallet = StubWallet::new();
        let inputs = vec![
            wallet_input("m/0/1", "bcrt1q-receive-1"),
            wallet_input("m/2/0", "bcrt1q-receive-0"),
            wallet_input("m/0/3", "bcrt1q-receive-3"),
        ];
        let result = validate_psbt(&psbt(inputs, vec![payment()]), &wallet);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(
            result.errors[0],
            ValidationError::InvalidPath {
                side: Side::Input,
                index: 1,
                path: "m/2/0".to_string(),
            }
        );
        // Only the first input was accepted before the halt
        assert_eq!(result.successes.len(), 1);
        assert_eq!(result.import_range, Some((1, 1)));
    }

    #[test]
    fn test_empty_inputs_or_outputs() {
        let wallet = StubWallet::new();
        let result = validate_psbt(&psbt(vec![], vec![payment()]), &wallet);
        assert_eq!(result.errors, vec![ValidationError::NoInputs]);

        let result = validate_psbt(
            &psbt(vec![wallet_input("m/0/5", "bcrt1q-receive-5")], vec![]),
            &wallet,
        );
        assert_eq!(result.errors, vec![ValidationError::NoOutputs]);
    }

    #[test]
    fn test_rejects_non_witness_utxo() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.non_witness_utxo = Some(serde_json::json!({"txid": "00"}));
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(result.errors, vec![ValidationError::NonWitnessUtxo(0)]);

        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.witness_utxo = None;
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(result.errors, vec![ValidationError::MissingWitnessUtxo(0)]);
    }

    #[test]
    fn test_rejects_missing_derivations() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.bip32_derivs.clear();
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(
            result.errors,
            vec![ValidationError::MissingDerivations {
                side: Side::Input,
                index: 0
            }]
        );
    }

    #[test]
    fn test_rejects_non_wsh_input() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.witness_utxo.as_mut().unwrap().script_pubkey = external_spk();
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::WrongScriptType { side: Side::Input, .. }]
        ));
    }

    #[test]
    fn test_rejects_witness_script_mismatch() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.witness_script.as_mut().unwrap().hex = "51".to_string();
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(result.errors, vec![ValidationError::WitnessScriptMismatch(0)]);

        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.witness_script = None;
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(result.errors, vec![ValidationError::MissingWitnessScript(0)]);
    }

    #[test]
    fn test_rejects_malformed_script_pubkey_asm() {
        let wallet = StubWallet::new();
        for asm in ["1 abcd", "0", "0 zz", "0 aa bb"] {
            let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
            input.witness_utxo.as_mut().unwrap().script_pubkey.asm = asm.to_string();
            let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
            assert!(
                matches!(
                    result.errors.as_slice(),
                    [ValidationError::MalformedScriptPubKey { .. }]
                ),
                "asm {asm:?} gave {:?}",
                result.errors
            );
        }
    }

    #[test]
    fn test_rejects_divergent_paths() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.bip32_derivs[1].path = "m/0/6".to_string();
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(
            result.errors,
            vec![ValidationError::DivergentPaths {
                side: Side::Input,
                index: 0
            }]
        );
    }

    #[test]
    fn test_rejects_spoofed_input_address() {
        let wallet = StubWallet::new();
        let input = wallet_input("m/0/5", "bcrt1q-receive-4");
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(
            result.errors,
            vec![ValidationError::AddressMismatch {
                side: Side::Input,
                index: 0,
                claimed: "bcrt1q-receive-4".to_string(),
                expected: "bcrt1q-receive-5".to_string(),
            }]
        );
    }

    #[test]
    fn test_derivation_failure_is_error() {
        let wallet = StubWallet::new();
        let input = wallet_input("m/0/50", "bcrt1q-receive-50");
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::Derivation { side: Side::Input, index: 0, .. }]
        ));
    }

    #[test]
    fn test_sighash() {
        let wallet = StubWallet::new();
        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.sighash = Some("NONE|ANYONECANPAY".to_string());
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert_eq!(
            result.errors,
            vec![ValidationError::DisallowedSighash {
                index: 0,
                sighash: "NONE|ANYONECANPAY".to_string()
            }]
        );

        let mut input = wallet_input("m/0/5", "bcrt1q-receive-5");
        input.sighash = None;
        let result = validate_psbt(&psbt(vec![input], vec![payment()]), &wallet);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_no_change_warning() {
        let wallet = StubWallet::new();
        let result = validate_psbt(
            &psbt(vec![wallet_input("m/0/5", "bcrt1q-receive-5")], vec![payment()]),
            &wallet,
        );
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings, vec![ValidationWarning::NoChangeOutput]);
        assert_eq!(result.import_range, Some((5, 5)));
        assert!(result.is_signable());
    }

    #[test]
    fn test_change_to_receive_branch_warns() {
        let wallet = StubWallet::new();
        let result = validate_psbt(
            &psbt(
                vec![wallet_input("m/0/2", "bcrt1q-receive-2")],
                vec![payment(), change_output("m/0/7", "bcrt1q-receive-7")],
            ),
            &wallet,
        );
        assert!(result.errors.is_empty());
        assert_eq!(
            result.warnings,
            vec![
                ValidationWarning::ChangeOnReceiveBranch { output: 1, index: 7 },
                ValidationWarning::NoChangeOutput,
            ]
        );
        assert_eq!(result.import_range, Some((2, 7)));
    }

    #[test]
    fn test_rejects_spoofed_change() {
        let wallet = StubWallet::new();
        let result = validate_psbt(
            &psbt(
                vec![wallet_input("m/0/5", "bcrt1q-receive-5")],
                vec![change_output("m/1/6", "bcrt1q-attacker")],
            ),
            &wallet,
        );
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::AddressMismatch { side: Side::Output, index: 0, .. }]
        ));
    }

    #[test]
    fn test_rejects_owned_output_checks() {
        let wallet = StubWallet::new();

        let (mut out, spk) = change_output("m/1/6", "bcrt1q-change-6");
        out.bip32_derivs = derivs(&["aabbccdd", "deadbeef"], "m/1/6");
        let result = validate_psbt(
            &psbt(vec![wallet_input("m/0/5", "bcrt1q-receive-5")], vec![(out, spk)]),
            &wallet,
        );
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::FingerprintMismatch { side: Side::Output, .. }]
        ));

        let (out, _) = change_output("m/1/6", "bcrt1q-change-6");
        let result = validate_psbt(
            &psbt(vec![wallet_input("m/0/5", "bcrt1q-receive-5")], vec![(out, external_spk())]),
            &wallet,
        );
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::WrongScriptType { side: Side::Output, .. }]
        ));

        let (out, mut spk) = change_output("m/1/6", "bcrt1q-change-6");
        spk.addresses = vec!["bcrt1q-change-6".to_string(), "bcrt1q-other".to_string()];
        let result = validate_psbt(
            &psbt(vec![wallet_input("m/0/5", "bcrt1q-receive-5")], vec![(out, spk)]),
            &wallet,
        );
        assert_eq!(
            result.errors,
            vec![ValidationError::AddressCount {
                side: Side::Output,
                index: 0,
                count: 2
            }]
        );
    }

    #[test]
    fn test_rejects_wallet_missing_signers() {
        let mut wallet = StubWallet::new();
        wallet.n = 3;
        let psbt = psbt(
            vec![wallet_input("m/0/5", "bcrt1q-receive-5")],
            vec![payment(), change_output("m/1/6", "bcrt1q-change-6")],
        );
        let result = validate_psbt(&psbt, &wallet);
        assert!(!result.is_signable());
        assert_eq!(
            result.errors,
            vec![ValidationError::IncompleteWallet { have: 2, n: 3 }]
        );
        assert!(result.successes.is_empty());
        assert_eq!(result.import_range, None);
    }

    #[test]
    fn test_idempotent() {
        let wallet = StubWallet::new();
        let psbt = psbt(
            vec![wallet_input("m/0/5", "bcrt1q-receive-5")],
            vec![payment(), change_output("m/1/6", "bcrt1q-change-6")],
        );
        assert_eq!(validate_psbt(&psbt, &wallet), validate_psbt(&psbt, &wallet));
    }
}
