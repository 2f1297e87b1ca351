//! Sorted-multisig descriptors
//!
//! A wallet's scripts are `wsh(sortedmulti(m, [fp]key/<branch>/*, ...))`,
//! one descriptor per branch. Keys are listed local signer first, then
//! cosigners in import order. `sortedmulti` orders the derived public keys
//! itself, so the listing order never changes an address.

use bitcoin::bip32::{Fingerprint, Xpub};
use bitcoin::Address;
use miniscript::descriptor::{DefiniteDescriptorKey, DescriptorPublicKey};
use miniscript::Descriptor;
use proof_core::Network;
use proof_psbt::Branch;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on signers in one wallet
pub const MAX_SIGNERS: usize = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Threshold {m} cannot be met by {keys} key(s)")]
    Threshold { m: usize, keys: usize },

    #[error("Invalid descriptor: {0}")]
    Invalid(String),

    #[error("Address derivation failed: {0}")]
    Address(String),
}

/// `[fingerprint]key/<branch>/*`
pub fn key_expression(fingerprint: Fingerprint, key: &str, branch: Branch) -> String {
    format!("[{}]{}/{}/*", fingerprint, key, branch.number())
}

/// `wsh(sortedmulti(m,k1,k2,...))` over pre-built key expressions, in the
/// order given.
pub fn sortedmulti<I, S>(m: usize, keys: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut desc = format!("wsh(sortedmulti({}", m);
    for key in keys {
        desc.push(',');
        desc.push_str(key.as_ref());
    }
    desc.push_str("))");
    desc
}

/// Public multisig descriptor pair for a set of signers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigDescriptor {
    m: usize,
    keys: Vec<(Fingerprint, Xpub)>,
}

impl MultisigDescriptor {
    pub fn new(m: usize, keys: Vec<(Fingerprint, Xpub)>) -> Self {
        Self { m, keys }
    }

    pub fn threshold(&self) -> usize {
        self.m
    }

    pub fn keys(&self) -> &[(Fingerprint, Xpub)] {
        &self.keys
    }

    /// Descriptor text for `branch`, without checksum
    pub fn to_string_for(&self, branch: Branch) -> String {
        sortedmulti(
            self.m,
            self.keys
                .iter()
                .map(|(fp, xpub)| key_expression(*fp, &xpub.to_string(), branch)),
        )
    }

    /// Parsed descriptor for `branch`
    pub fn parse(&self, branch: Branch) -> Result<Descriptor<DescriptorPublicKey>, DescriptorError> {
        if self.m == 0 || self.m > self.keys.len() {
            return Err(DescriptorError::Threshold {
                m: self.m,
                keys: self.keys.len(),
            });
        }
        Descriptor::<DescriptorPublicKey>::from_str(&self.to_string_for(branch))
            .map_err(|e| DescriptorError::Invalid(e.to_string()))
    }

    /// Fully derived descriptor at `m/<branch>/<index>`
    pub fn derive(
        &self,
        branch: Branch,
        index: u32,
    ) -> Result<Descriptor<DefiniteDescriptorKey>, DescriptorError> {
        self.parse(branch)?
            .at_derivation_index(index)
            .map_err(|e| DescriptorError::Address(e.to_string()))
    }

    pub fn address(
        &self,
        branch: Branch,
        index: u32,
        network: Network,
    ) -> Result<Address, DescriptorError> {
        self.derive(branch, index)?
            .address(network.to_bitcoin())
            .map_err(|e| DescriptorError::Address(e.to_string()))
    }
}
