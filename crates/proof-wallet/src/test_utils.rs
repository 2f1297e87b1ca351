//! Shared test utilities for proof-wallet and downstream tests.
//!
//! Provides deterministic wallets, a scripted in-memory chain oracle and a
//! builder for decoded PSBTs whose scripts and addresses are derived from a
//! real wallet descriptor.

use crate::cosigner::{Cosigner, FingerprintSource, PendingCosigner};
use crate::oracle::{ChainOracle, DescriptorRequest, OracleError, SignedPsbt};
use crate::transport::PSBT_MAGIC;
use crate::wallet::Wallet;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::bip32::ChildNumber;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::{Address, Amount, ScriptBuf, WPubkeyHash};
use miniscript::descriptor::DescriptorPublicKey;
use miniscript::Descriptor;
use proof_core::{seed, ExtendedKey, Network};
use proof_psbt::decoded::{
    Bip32Derivation, DecodedTx, PsbtInput, PsbtOutput, ScriptPubKey, TxIn, TxOut, WitnessScript,
    WitnessUtxo, WSH_TYPE,
};
use proof_psbt::{Branch, DecodedPsbt, PsbtAnalysis};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;

/// Wallet whose mnemonic encodes 32 copies of `seed_byte`.
pub fn test_wallet(seed_byte: u8, m: usize, n: usize, network: Network) -> Wallet {
    let mnemonic = seed::to_mnemonic(&[seed_byte; 32]).unwrap();
    Wallet::new(None, mnemonic, m, n, network).unwrap()
}

/// The local signer of `test_wallet(seed_byte, ..)`
pub fn test_signer(seed_byte: u8, network: Network) -> Cosigner {
    test_wallet(seed_byte, 1, 1, network).local_signer()
}

/// `n` wallets (seed bytes 1..=n) that have all imported each other.
pub fn complete_wallets(m: usize, n: usize, network: Network) -> Vec<Wallet> {
    let oracle = MockOracle::with_network(network);
    let mut wallets: Vec<Wallet> = (1..=n as u8)
        .map(|b| test_wallet(b, m, n, network))
        .collect();
    let signers: Vec<Cosigner> = wallets.iter().map(Wallet::local_signer).collect();

    for wallet in wallets.iter_mut() {
        for signer in &signers {
            if signer.fingerprint == wallet.fingerprint() {
                continue;
            }
            let pending = PendingCosigner::prepare(
                &oracle,
                &signer.xpub.to_string(),
                network,
                FingerprintSource::Derived,
            )
            .unwrap();
            wallet.add_cosigner(pending).unwrap();
        }
        assert!(wallet.is_complete());
    }
    wallets
}

/// Recorded signing call: descriptors with ranges, then the PSBT
pub type SignRequest = (Vec<(String, (u32, u32))>, String);

/// In-memory chain oracle.
///
/// PSBTs must be registered before they can be decoded. Signing records the
/// request, adds a placeholder partial signature per input and registers the
/// result under a fresh base64 string.
pub struct MockOracle {
    network: Network,
    psbts: RefCell<HashMap<String, DecodedPsbt>>,
    rejected_keys: RefCell<HashSet<String>>,
    sign_log: RefCell<Vec<SignRequest>>,
    tamper_addresses: Cell<bool>,
    offline: Cell<bool>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::with_network(Network::Regtest)
    }

    pub fn with_network(network: Network) -> Self {
        Self {
            network,
            psbts: RefCell::new(HashMap::new()),
            rejected_keys: RefCell::new(HashSet::new()),
            sign_log: RefCell::new(Vec::new()),
            tamper_addresses: Cell::new(false),
            offline: Cell::new(false),
        }
    }

    pub fn register_psbt(&self, psbt: &str, decoded: DecodedPsbt) {
        self.psbts.borrow_mut().insert(psbt.to_string(), decoded);
    }

    pub fn reject_key(&self, key: &str) {
        self.rejected_keys.borrow_mut().insert(key.to_string());
    }

    /// Make `derive_addresses` return wrong addresses
    pub fn tamper_addresses(&self, on: bool) {
        self.tamper_addresses.set(on);
    }

    /// Make every call fail as if the node were down
    pub fn set_offline(&self, on: bool) {
        self.offline.set(on);
    }

    pub fn sign_requests(&self) -> Vec<SignRequest> {
        self.sign_log.borrow().clone()
    }

    fn check_online(&self) -> Result<(), OracleError> {
        if self.offline.get() {
            return Err(OracleError::Unavailable("mock node offline".into()));
        }
        Ok(())
    }

    fn lookup(&self, rpc: &str, psbt: &str) -> Result<DecodedPsbt, OracleError> {
        self.check_online()?;
        self.psbts
            .borrow()
            .get(psbt)
            .cloned()
            .ok_or_else(|| OracleError::Command {
                rpc: rpc.to_string(),
                code: Some(-22),
                stderr: "TX decode failed".to_string(),
            })
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_checksum(desc: &str) -> &str {
    desc.split('#').next().unwrap_or(desc)
}

fn threshold(desc: &str) -> usize {
    desc.split("sortedmulti(")
        .nth(1)
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.parse().ok())
        .unwrap_or(1)
}

fn first_origin(desc: &str) -> String {
    desc.split('[')
        .nth(1)
        .and_then(|s| s.split(']').next())
        .unwrap_or("00000000")
        .to_string()
}

impl ChainOracle for MockOracle {
    fn decode_psbt(&self, psbt: &str) -> Result<DecodedPsbt, OracleError> {
        self.lookup("decodepsbt", psbt)
    }

    fn analyze_psbt(&self, psbt: &str) -> Result<PsbtAnalysis, OracleError> {
        let decoded = self.lookup("analyzepsbt", psbt)?;
        let vsize = decoded.tx.vsize.unwrap_or(200);
        let fee_rate = decoded
            .fee
            .map(|fee| fee.to_btc() * 1000.0 / vsize as f64);
        Ok(PsbtAnalysis {
            estimated_vsize: Some(vsize),
            estimated_feerate: fee_rate,
            fee: decoded.fee,
            next: Some("signer".to_string()),
        })
    }

    fn derive_addresses(
        &self,
        descriptor: &str,
        range: (u32, u32),
    ) -> Result<Vec<String>, OracleError> {
        self.check_online()?;
        let desc = Descriptor::<DescriptorPublicKey>::from_str(strip_checksum(descriptor))
            .map_err(|e| OracleError::Rejected(e.to_string()))?;
        let mut out = Vec::new();
        for index in range.0..=range.1 {
            let address = desc
                .at_derivation_index(index)
                .map_err(|e| OracleError::Rejected(e.to_string()))?
                .address(self.network.to_bitcoin())
                .map_err(|e| OracleError::Rejected(e.to_string()))?;
            out.push(address.to_string());
        }
        if self.tamper_addresses.get() {
            out.reverse();
            if let Some(first) = out.first_mut() {
                first.push('x');
            }
        }
        Ok(out)
    }

    fn descriptor_checksum(&self, descriptor: &str) -> Result<String, OracleError> {
        self.check_online()?;
        let hash = sha256::Hash::hash(descriptor.as_bytes()).to_string();
        Ok(hash[..8].to_string())
    }

    fn is_valid_extended_key(&self, key: &str, network: Network) -> Result<bool, OracleError> {
        self.check_online()?;
        if self.rejected_keys.borrow().contains(key) {
            return Ok(false);
        }
        Ok(ExtendedKey::deserialize(key, network).is_ok())
    }

    fn sign(
        &self,
        descriptors: &[DescriptorRequest],
        psbt: &str,
    ) -> Result<SignedPsbt, OracleError> {
        let mut decoded = self.lookup("descriptorprocesspsbt", psbt)?;
        let recorded = descriptors
            .iter()
            .map(|d| (d.desc.to_string(), d.range))
            .collect();
        self.sign_log
            .borrow_mut()
            .push((recorded, psbt.to_string()));

        let (m, signer) = match descriptors.first() {
            Some(d) => (threshold(&d.desc), first_origin(&d.desc)),
            None => (1, "00000000".to_string()),
        };
        for input in decoded.inputs.iter_mut() {
            input
                .partial_signatures
                .insert(signer.clone(), "3044022000".to_string());
        }
        let complete = decoded
            .inputs
            .iter()
            .all(|i| i.partial_signatures.len() >= m);

        let mut bytes = PSBT_MAGIC.to_vec();
        bytes.extend_from_slice(
            sha256::Hash::hash(format!("{}{}", psbt, signer).as_bytes()).as_byte_array(),
        );
        let signed = STANDARD.encode(bytes);
        self.register_psbt(&signed, decoded);

        Ok(SignedPsbt {
            psbt: signed,
            complete,
        })
    }
}

enum FixtureOutput {
    External(u64),
    Wallet(Branch, u32, u64),
}

/// Builds a decoded PSBT spending from and paying to `wallet`'s scripts,
/// as `decodepsbt` would report it.
pub struct PsbtFixture<'a> {
    wallet: &'a Wallet,
    inputs: Vec<(Branch, u32, u64)>,
    outputs: Vec<FixtureOutput>,
}

impl<'a> PsbtFixture<'a> {
    pub fn new(wallet: &'a Wallet) -> Self {
        Self {
            wallet,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Spend a wallet UTXO worth `sats` at `m/<branch>/<index>`
    pub fn input(mut self, branch: Branch, index: u32, sats: u64) -> Self {
        self.inputs.push((branch, index, sats));
        self
    }

    /// Pay `sats` to a P2WPKH address outside the wallet
    pub fn external_output(mut self, sats: u64) -> Self {
        self.outputs.push(FixtureOutput::External(sats));
        self
    }

    /// Pay `sats` back to the wallet at `m/<branch>/<index>`
    pub fn wallet_output(mut self, branch: Branch, index: u32, sats: u64) -> Self {
        self.outputs.push(FixtureOutput::Wallet(branch, index, sats));
        self
    }

    fn wallet_script(&self, branch: Branch, index: u32) -> (ScriptPubKey, WitnessScript) {
        let derived = self.wallet.descriptor().derive(branch, index).unwrap();
        let witness = derived.explicit_script().unwrap();
        let spk = derived.script_pubkey();
        let address = derived
            .address(self.wallet.network().to_bitcoin())
            .unwrap();
        (
            ScriptPubKey {
                asm: format!("0 {}", hex::encode(&spk.as_bytes()[2..])),
                hex: spk.to_hex_string(),
                script_type: WSH_TYPE.to_string(),
                address: Some(address.to_string()),
                addresses: Vec::new(),
            },
            WitnessScript {
                asm: witness.to_asm_string(),
                hex: witness.to_hex_string(),
                script_type: Some("multisig".to_string()),
            },
        )
    }

    fn derivations(&self, branch: Branch, index: u32) -> Vec<Bip32Derivation> {
        let secp = Secp256k1::verification_only();
        let path = [
            ChildNumber::from_normal_idx(branch.number()).unwrap(),
            ChildNumber::from_normal_idx(index).unwrap(),
        ];
        self.wallet
            .signers()
            .into_iter()
            .map(|(fingerprint, xpub)| Bip32Derivation {
                pubkey: xpub.derive_pub(&secp, &path).unwrap().public_key.to_string(),
                master_fingerprint: fingerprint.to_string(),
                path: format!("m/{}/{}", branch.number(), index),
            })
            .collect()
    }

    fn external_script(&self, n: usize) -> ScriptPubKey {
        let hash = WPubkeyHash::from_byte_array([n as u8 + 0x75; 20]);
        let spk = ScriptBuf::new_p2wpkh(&hash);
        let address = Address::from_script(&spk, self.wallet.network().to_bitcoin()).unwrap();
        ScriptPubKey {
            asm: format!("0 {}", hex::encode(hash.as_byte_array())),
            hex: spk.to_hex_string(),
            script_type: "witness_v0_keyhash".to_string(),
            address: Some(address.to_string()),
            addresses: Vec::new(),
        }
    }

    pub fn build(self) -> DecodedPsbt {
        let mut inputs = Vec::new();
        let mut vin = Vec::new();
        let mut total_in = 0u64;
        for (i, &(branch, index, sats)) in self.inputs.iter().enumerate() {
            let (spk, witness_script) = self.wallet_script(branch, index);
            total_in += sats;
            inputs.push(PsbtInput {
                witness_utxo: Some(WitnessUtxo {
                    amount: Amount::from_sat(sats),
                    script_pubkey: spk,
                }),
                sighash: Some("ALL".to_string()),
                witness_script: Some(witness_script),
                bip32_derivs: self.derivations(branch, index),
                ..Default::default()
            });
            vin.push(TxIn {
                txid: format!("{:064x}", i + 1),
                vout: 0,
                sequence: 0xffff_fffd,
            });
        }

        let mut outputs = Vec::new();
        let mut vout = Vec::new();
        let mut total_out = 0u64;
        for (n, output) in self.outputs.iter().enumerate() {
            let (psbt_output, spk, sats) = match *output {
                FixtureOutput::External(sats) => {
                    (PsbtOutput::default(), self.external_script(n), sats)
                }
                FixtureOutput::Wallet(branch, index, sats) => {
                    let (spk, witness_script) = self.wallet_script(branch, index);
                    (
                        PsbtOutput {
                            witness_script: Some(witness_script),
                            bip32_derivs: self.derivations(branch, index),
                        },
                        spk,
                        sats,
                    )
                }
            };
            total_out += sats;
            outputs.push(psbt_output);
            vout.push(TxOut {
                value: Amount::from_sat(sats),
                n: n as u32,
                script_pubkey: spk,
            });
        }

        let vsize = 11 + 105 * vin.len() as u64 + 43 * vout.len() as u64;
        DecodedPsbt {
            tx: DecodedTx {
                txid: "ab".repeat(32),
                version: 2,
                locktime: 0,
                vsize: Some(vsize),
                vin,
                vout,
            },
            unknown: BTreeMap::new(),
            inputs,
            outputs,
            fee: Some(Amount::from_sat(total_in.saturating_sub(total_out))),
        }
    }
}
