//! Validation outcome types

use crate::decoded::DecodedPsbt;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Whether a finding concerns an input or an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Input,
    Output,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Input => f.write_str("Input"),
            Side::Output => f.write_str("Output"),
        }
    }
}

/// A hard error. Any one of these blocks signing.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationError {
    #[error("Wallet has {have} of {n} signers and cannot validate spends yet")]
    IncompleteWallet { have: usize, n: usize },

    #[error("PSBT has no inputs")]
    NoInputs,

    #[error("PSBT has no outputs")]
    NoOutputs,

    #[error("PSBT input/output count does not match its transaction")]
    InconsistentTransaction,

    #[error("Input {0} has no witness UTXO")]
    MissingWitnessUtxo(usize),

    #[error("Input {0} carries a non-witness UTXO")]
    NonWitnessUtxo(usize),

    #[error("{side} {index} has no BIP32 derivation information")]
    MissingDerivations { side: Side, index: usize },

    #[error("{side} {index} fingerprints {found:?} do not match wallet fingerprints {expected:?}")]
    FingerprintMismatch {
        side: Side,
        index: usize,
        found: Vec<String>,
        expected: Vec<String>,
    },

    #[error("{side} {index} has script type {found}, expected witness_v0_scripthash")]
    WrongScriptType {
        side: Side,
        index: usize,
        found: String,
    },

    #[error("Input {0} has no witness script")]
    MissingWitnessScript(usize),

    #[error("Input {index} has malformed scriptPubKey {asm:?}")]
    MalformedScriptPubKey { index: usize, asm: String },

    #[error("Input {0} witness script does not hash to its scriptPubKey")]
    WitnessScriptMismatch(usize),

    #[error("{side} {index} derivation paths differ between cosigners")]
    DivergentPaths { side: Side, index: usize },

    #[error("{side} {index} has invalid derivation path {path:?}")]
    InvalidPath {
        side: Side,
        index: usize,
        path: String,
    },

    #[error("{side} {index} must be associated with exactly one address, found {count}")]
    AddressCount {
        side: Side,
        index: usize,
        count: usize,
    },

    #[error("{side} {index} could not be re-derived from the wallet: {reason}")]
    Derivation {
        side: Side,
        index: usize,
        reason: String,
    },

    #[error("{side} {index} claims address {claimed} but the wallet derives {expected}")]
    AddressMismatch {
        side: Side,
        index: usize,
        claimed: String,
        expected: String,
    },

    #[error("Input {index} uses sighash {sighash}, only ALL is allowed")]
    DisallowedSighash { index: usize, sighash: String },

    #[error("PSBT could not be decoded or analyzed")]
    Undecodable,
}

/// Advisory findings. Signing may proceed at the operator's discretion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationWarning {
    /// A wallet-owned output sits on the receive branch
    ChangeOnReceiveBranch { output: usize, index: u32 },
    /// No output returns funds to the wallet's change branch
    NoChangeOutput,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationWarning::ChangeOnReceiveBranch { output, index } => write!(
                f,
                "Output {} pays this wallet's receive address m/0/{}, not a change address",
                output, index
            ),
            ValidationWarning::NoChangeOutput => {
                f.write_str("No change output returns funds to this wallet")
            }
        }
    }
}

/// Outcome of one validation attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PsbtValidationResult {
    pub successes: Vec<String>,
    pub warnings: Vec<ValidationWarning>,
    /// At most one entry: validation stops at the first hard error
    pub errors: Vec<ValidationError>,
    /// `None` when the oracle could not decode the PSBT
    pub decoded_psbt: Option<DecodedPsbt>,
    /// Inclusive derivation index range touched by wallet-owned scripts
    pub import_range: Option<(u32, u32)>,
    /// Wallet-owned outputs on the change branch, as `(output, index)`
    #[serde(skip)]
    pub change_outputs: Vec<(usize, u32)>,
}

impl PsbtValidationResult {
    pub fn new(decoded: DecodedPsbt) -> Self {
        Self {
            successes: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            decoded_psbt: Some(decoded),
            import_range: None,
            change_outputs: Vec::new(),
        }
    }

    /// Result for a PSBT the oracle failed to decode or analyze
    pub fn undecodable() -> Self {
        Self {
            successes: Vec::new(),
            warnings: Vec::new(),
            errors: vec![ValidationError::Undecodable],
            decoded_psbt: None,
            import_range: None,
            change_outputs: Vec::new(),
        }
    }

    pub fn is_signable(&self) -> bool {
        self.errors.is_empty() && self.decoded_psbt.is_some()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(ToString::to_string).collect()
    }

    pub(crate) fn track_index(&mut self, index: u32) {
        self.import_range = Some(match self.import_range {
            None => (index, index),
            Some((low, high)) => (low.min(index), high.max(index)),
        });
    }
}
