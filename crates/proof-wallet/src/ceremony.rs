//! Signing ceremony steps that involve the chain oracle
//!
//! Reviewing a PSBT decodes and analyzes it through the oracle, then runs
//! the validator against the wallet. Any oracle failure becomes a single
//! opaque validation error: a PSBT the node cannot read is never trusted.

use crate::oracle::{ChainOracle, DescriptorRequest, OracleError, SignedPsbt};
use crate::transport::{self, TransportError};
use crate::wallet::{Wallet, WalletError};
use bitcoin::Amount;
use proof_psbt::{
    validate_psbt, Branch, DecodedPsbt, PsbtAnalysis, PsbtValidationResult, WalletPolicy,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("PSBT failed validation and cannot be signed")]
    NotSignable,

    #[error("PSBT touches no wallet derivation index")]
    NoImportRange,

    #[error("Node returned addresses that do not match this wallet")]
    AddressMismatch,

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A PSBT after validation, ready for the operator's decision
#[derive(Debug, Clone)]
pub struct PsbtReview {
    /// Base64 PSBT as received
    pub psbt: String,
    pub validation: PsbtValidationResult,
    pub analysis: Option<PsbtAnalysis>,
}

impl PsbtReview {
    pub fn is_signable(&self) -> bool {
        self.validation.is_signable()
    }

    pub fn decoded(&self) -> Option<&DecodedPsbt> {
        self.validation.decoded_psbt.as_ref()
    }

    pub fn fee(&self) -> Option<Amount> {
        self.decoded()
            .and_then(|d| d.fee)
            .or_else(|| self.analysis.as_ref().and_then(|a| a.fee))
    }

    pub fn estimated_vsize(&self) -> Option<u64> {
        self.analysis.as_ref().and_then(|a| a.estimated_vsize)
    }

    pub fn fee_rate_sat_vb(&self) -> Option<f64> {
        self.analysis.as_ref().and_then(PsbtAnalysis::fee_rate_sat_vb)
    }
}

fn decode_and_analyze<O: ChainOracle + ?Sized>(
    oracle: &O,
    psbt: &str,
) -> Result<(DecodedPsbt, PsbtAnalysis), CeremonyError> {
    transport::decode_base64_psbt(psbt)?;
    let decoded = oracle.decode_psbt(psbt)?;
    let analysis = oracle.analyze_psbt(psbt)?;
    Ok((decoded, analysis))
}

/// Decode, analyze and validate `psbt` for `wallet`.
pub fn review_psbt<O, W>(oracle: &O, wallet: &W, psbt: &str) -> PsbtReview
where
    O: ChainOracle + ?Sized,
    W: WalletPolicy,
{
    let psbt = psbt.trim().to_string();
    match decode_and_analyze(oracle, &psbt) {
        Ok((decoded, analysis)) => PsbtReview {
            validation: validate_psbt(&decoded, wallet),
            analysis: Some(analysis),
            psbt,
        },
        Err(e) => {
            log::warn!("PSBT could not be decoded or analyzed: {}", e);
            PsbtReview {
                psbt,
                validation: PsbtValidationResult::undecodable(),
                analysis: None,
            }
        }
    }
}

/// Sign a reviewed PSBT with the wallet's private key.
///
/// Both branch descriptors are imported over the review's index range.
pub fn sign_psbt<O: ChainOracle + ?Sized>(
    oracle: &O,
    wallet: &Wallet,
    review: &PsbtReview,
) -> Result<SignedPsbt, CeremonyError> {
    if !review.is_signable() {
        return Err(CeremonyError::NotSignable);
    }
    let range = review
        .validation
        .import_range
        .ok_or(CeremonyError::NoImportRange)?;

    let mut requests = Vec::with_capacity(2);
    for branch in [Branch::Receive, Branch::Change] {
        let desc = wallet.signing_descriptor(branch)?;
        let checksum = oracle.descriptor_checksum(&desc)?;
        let mut full = desc;
        full.push('#');
        full.push_str(&checksum);
        requests.push(DescriptorRequest { desc: full, range });
    }

    log::info!(
        "Signing PSBT with wallet {} over indices {}..={}",
        wallet.fingerprint(),
        range.0,
        range.1
    );
    let signed = oracle.sign(&requests, &review.psbt)?;
    if signed.psbt == review.psbt {
        log::warn!("Signer returned the PSBT unchanged");
    }
    Ok(signed)
}

/// Receive addresses over `range`, derived by the node and cross-checked
/// against local derivation.
pub fn receive_addresses<O: ChainOracle + ?Sized>(
    oracle: &O,
    wallet: &Wallet,
    range: (u32, u32),
) -> Result<Vec<String>, CeremonyError> {
    let desc = wallet.descriptor().to_string_for(Branch::Receive);
    let desc = oracle.with_checksum(&desc)?;
    let addresses = oracle.derive_addresses(&desc, range)?;

    let expected = (range.0..=range.1)
        .map(|i| wallet.address(Branch::Receive, i))
        .collect::<Result<Vec<_>, _>>()?;
    if addresses != expected {
        log::warn!("Node-derived addresses differ from local derivation");
        return Err(CeremonyError::AddressMismatch);
    }
    Ok(addresses)
}
