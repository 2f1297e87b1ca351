//! Cosigner import and registry
//!
//! Cosigners are imported one at a time. An import is first prepared
//! (key checked locally and by the node, fingerprint derived or entered by
//! hand), shown to the operator, then confirmed into the registry. Dropping a
//! [`PendingCosigner`] aborts the import.

use crate::oracle::{ChainOracle, OracleError};
use bitcoin::bip32::{Fingerprint, Xpub};
use proof_core::{ExtendedKey, Network, XkeyError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Hex characters in a manually entered fingerprint
pub const FINGERPRINT_HEX_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum CosignerError {
    #[error("Invalid extended public key: {0}")]
    InvalidKey(#[from] XkeyError),

    #[error("Expected an extended public key, got a private key")]
    PrivateKey,

    #[error("Node rejected this key as a {0} extended public key")]
    RejectedByNode(Network),

    #[error("Fingerprint must be {FINGERPRINT_HEX_LEN} hex characters, got {0:?}")]
    InvalidFingerprint(String),

    #[error("Signer {0} is already part of this wallet")]
    Duplicate(Fingerprint),

    #[error("Wallet already has all {0} signers")]
    RegistryFull(usize),

    #[error("Key validation failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Key parse error: {0}")]
    Parse(#[from] bitcoin::bip32::Error),
}

macro_rules! string_serde {
    ($mod_name:ident, $type:ty) => {
        mod $mod_name {
            use super::*;
            use serde::{Deserializer, Serializer};

            pub fn serialize<S>(value: &$type, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&value.to_string())
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<$type, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                <$type>::from_str(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(fingerprint_serde, Fingerprint);
string_serde!(xpub_serde, Xpub);

/// An imported signer. Immutable once confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosigner {
    /// Master fingerprint (lowercase hex)
    #[serde(with = "fingerprint_serde")]
    pub fingerprint: Fingerprint,
    #[serde(with = "xpub_serde")]
    pub xpub: Xpub,
}

impl Cosigner {
    pub fn new(fingerprint: Fingerprint, xpub: Xpub) -> Self {
        Self { fingerprint, xpub }
    }
}

/// Where a cosigner's fingerprint comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintSource {
    /// Computed from the key itself; right when the key is a master key
    Derived,
    /// Supplied by the operator, for keys exported below the master
    Manual(String),
}

/// Parse an operator-entered fingerprint: exactly 8 hex characters.
pub fn parse_fingerprint(text: &str) -> Result<Fingerprint, CosignerError> {
    let text = text.trim();
    if text.len() != FINGERPRINT_HEX_LEN || !text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CosignerError::InvalidFingerprint(text.to_string()));
    }
    Fingerprint::from_str(&text.to_ascii_lowercase())
        .map_err(|_| CosignerError::InvalidFingerprint(text.to_string()))
}

/// A validated key awaiting operator confirmation
#[derive(Debug, Clone)]
pub struct PendingCosigner {
    xpub: Xpub,
    derived: Fingerprint,
    fingerprint: Fingerprint,
}

impl PendingCosigner {
    /// Validate `text` as an extended public key for `network`, locally and
    /// with the node, and settle its fingerprint.
    pub fn prepare<O: ChainOracle + ?Sized>(
        oracle: &O,
        text: &str,
        network: Network,
        source: FingerprintSource,
    ) -> Result<Self, CosignerError> {
        let text = text.trim();
        let key = ExtendedKey::deserialize(text, network)?;
        if key.is_private() {
            return Err(CosignerError::PrivateKey);
        }
        if !oracle.is_valid_extended_key(text, network)? {
            return Err(CosignerError::RejectedByNode(network));
        }
        let xpub = Xpub::from_str(text)?;

        let derived = key.fingerprint();
        let fingerprint = match source {
            FingerprintSource::Derived => derived,
            FingerprintSource::Manual(hex) => parse_fingerprint(&hex)?,
        };
        log::debug!("Prepared cosigner {} (derived {})", fingerprint, derived);

        Ok(Self {
            xpub,
            derived,
            fingerprint,
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Fingerprint computed from the key, whatever the source
    pub fn derived_fingerprint(&self) -> Fingerprint {
        self.derived
    }

    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    pub fn confirm(self) -> Cosigner {
        Cosigner::new(self.fingerprint, self.xpub)
    }
}

/// Whether a wallet with `cosigners` imported keys has all `n` signers
pub fn is_complete(cosigners: usize, n: usize) -> bool {
    cosigners + 1 == n
}

/// Append-only list of cosigners in import order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CosignerRegistry {
    cosigners: Vec<Cosigner>,
}

impl CosignerRegistry {
    pub fn new() -> Self {
        Self {
            cosigners: Vec::new(),
        }
    }

    /// Append a confirmed cosigner.
    ///
    /// `local` is the wallet's own signer, which never appears in the list
    /// but may not be imported again.
    pub fn add(
        &mut self,
        cosigner: Cosigner,
        local: &Cosigner,
        n: usize,
    ) -> Result<(), CosignerError> {
        if self.cosigners.len() + 1 >= n {
            return Err(CosignerError::RegistryFull(n));
        }
        let clash = std::iter::once(local)
            .chain(self.cosigners.iter())
            .any(|c| c.fingerprint == cosigner.fingerprint || c.xpub == cosigner.xpub);
        if clash {
            return Err(CosignerError::Duplicate(cosigner.fingerprint));
        }
        log::info!(
            "Imported cosigner {} ({} of {})",
            cosigner.fingerprint,
            self.cosigners.len() + 2,
            n
        );
        self.cosigners.push(cosigner);
        Ok(())
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Cosigner> {
        self.cosigners.iter().find(|c| &c.fingerprint == fingerprint)
    }

    pub fn list(&self) -> &[Cosigner] {
        &self.cosigners
    }

    pub fn len(&self) -> usize {
        self.cosigners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cosigners.is_empty()
    }

    pub fn is_complete(&self, n: usize) -> bool {
        is_complete(self.cosigners.len(), n)
    }

    /// Cosigners still to import
    pub fn remaining(&self, n: usize) -> usize {
        n.saturating_sub(self.cosigners.len() + 1)
    }
}

impl From<Vec<Cosigner>> for CosignerRegistry {
    fn from(cosigners: Vec<Cosigner>) -> Self {
        Self { cosigners }
    }
}
