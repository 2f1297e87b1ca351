//! Chain oracle seam
//!
//! The wallet never decodes, analyzes or signs transactions itself. It asks
//! an external node through [`ChainOracle`] and cross-checks the answers.
//! Every call may be slow and may fail.

use proof_core::Network;
use proof_psbt::{DecodedPsbt, PsbtAnalysis};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{rpc} failed (exit code {code:?}): {stderr}")]
    Command {
        rpc: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected response from {rpc}: {source}")]
    Json {
        rpc: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Node unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle rejected request: {0}")]
    Rejected(String),
}

/// One descriptor handed to the signer, with the index range to import
#[derive(Clone)]
pub struct DescriptorRequest {
    pub desc: Zeroizing<String>,
    pub range: (u32, u32),
}

impl std::fmt::Debug for DescriptorRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRequest")
            .field("desc", &"<redacted>")
            .field("range", &self.range)
            .finish()
    }
}

/// Output of a signing call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPsbt {
    /// Base64 PSBT including this wallet's signatures
    pub psbt: String,
    /// True once enough signatures are present to finalize
    pub complete: bool,
}

pub trait ChainOracle {
    fn decode_psbt(&self, psbt: &str) -> Result<DecodedPsbt, OracleError>;

    fn analyze_psbt(&self, psbt: &str) -> Result<PsbtAnalysis, OracleError>;

    /// Addresses for a checksummed descriptor over an inclusive index range
    fn derive_addresses(
        &self,
        descriptor: &str,
        range: (u32, u32),
    ) -> Result<Vec<String>, OracleError>;

    /// The node's checksum for `descriptor`
    fn descriptor_checksum(&self, descriptor: &str) -> Result<String, OracleError>;

    fn is_valid_extended_key(&self, key: &str, network: Network) -> Result<bool, OracleError>;

    fn sign(
        &self,
        descriptors: &[DescriptorRequest],
        psbt: &str,
    ) -> Result<SignedPsbt, OracleError>;

    /// `descriptor#checksum`
    fn with_checksum(&self, descriptor: &str) -> Result<String, OracleError> {
        let checksum = self.descriptor_checksum(descriptor)?;
        Ok(format!("{}#{}", descriptor, checksum))
    }
}
