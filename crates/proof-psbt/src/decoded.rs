//! Decoded PSBT schema
//!
//! Typed mirror of Bitcoin Core's `decodepsbt` and `analyzepsbt` JSON. The
//! JSON is parsed once at the oracle boundary; the validator only ever sees
//! these structs. Fields the validator does not use are kept where they help
//! the operator review a transaction.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Script type reported for P2WSH outputs
pub const WSH_TYPE: &str = "witness_v0_scripthash";

/// Sighash name reported for `SIGHASH_ALL`
pub const SIGHASH_ALL: &str = "ALL";

/// BTC/kvB to sat/vB
pub const FEE_RATE_MULTIPLIER: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedPsbt {
    pub tx: DecodedTx,
    #[serde(default)]
    pub unknown: BTreeMap<String, String>,
    pub inputs: Vec<PsbtInput>,
    pub outputs: Vec<PsbtOutput>,
    #[serde(default, with = "bitcoin::amount::serde::as_btc::opt")]
    pub fee: Option<Amount>,
}

impl DecodedPsbt {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Sum of all output values
    pub fn total_out(&self) -> Amount {
        self.tx.vout.iter().map(|o| o.value).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedTx {
    pub txid: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub locktime: u32,
    #[serde(default)]
    pub vsize: Option<u64>,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    pub txid: String,
    pub vout: u32,
    #[serde(default)]
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub value: Amount,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: ScriptPubKey,
}

/// `scriptPubKey` object. Older Core releases list `addresses`, newer ones a
/// single `address`; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptPubKey {
    pub asm: String,
    #[serde(default)]
    pub hex: String,
    #[serde(rename = "type")]
    pub script_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

impl ScriptPubKey {
    /// Every address associated with the script, without duplicates
    pub fn all_addresses(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.addresses.iter().map(String::as_str).collect();
        if let Some(addr) = &self.address {
            if !out.contains(&addr.as_str()) {
                out.push(addr);
            }
        }
        out
    }

    pub fn is_wsh(&self) -> bool {
        self.script_type == WSH_TYPE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WitnessUtxo {
    #[serde(with = "bitcoin::amount::serde::as_btc")]
    pub amount: Amount,
    #[serde(rename = "scriptPubKey")]
    pub script_pubkey: ScriptPubKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessScript {
    pub asm: String,
    pub hex: String,
    #[serde(rename = "type", default)]
    pub script_type: Option<String>,
}

/// One `bip32_derivs` record: public key with its origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bip32Derivation {
    pub pubkey: String,
    pub master_fingerprint: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PsbtInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_witness_utxo: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_utxo: Option<WitnessUtxo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub partial_signatures: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sighash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_script: Option<WitnessScript>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bip32_derivs: Vec<Bip32Derivation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PsbtOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub witness_script: Option<WitnessScript>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bip32_derivs: Vec<Bip32Derivation>,
}

/// Subset of `analyzepsbt` shown to the operator before signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsbtAnalysis {
    #[serde(default)]
    pub estimated_vsize: Option<u64>,
    /// BTC per kvB
    #[serde(default)]
    pub estimated_feerate: Option<f64>,
    #[serde(default, with = "bitcoin::amount::serde::as_btc::opt")]
    pub fee: Option<Amount>,
    #[serde(default)]
    pub next: Option<String>,
}

impl PsbtAnalysis {
    /// Estimated fee rate in sat/vB
    pub fn fee_rate_sat_vb(&self) -> Option<f64> {
        self.estimated_feerate.map(|r| r * FEE_RATE_MULTIPLIER)
    }
}
