//! Wallet derivation paths
//!
//! Proof wallets derive every script from the root key at
//! `m/<branch>/<index>`, branch 0 for receive and 1 for change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid wallet derivation path: {0:?} (expected m/0/<index> or m/1/<index>)")]
pub struct InvalidPath(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Branch {
    /// External addresses handed out to payers
    Receive,
    /// Internal addresses for change
    Change,
}

impl Branch {
    pub fn number(self) -> u32 {
        match self {
            Branch::Receive => 0,
            Branch::Change => 1,
        }
    }

    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            0 => Some(Branch::Receive),
            1 => Some(Branch::Change),
            _ => None,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Receive => f.write_str("receive"),
            Branch::Change => f.write_str("change"),
        }
    }
}

/// A parsed `m/<branch>/<index>` path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletPath {
    pub branch: Branch,
    pub index: u32,
}

impl WalletPath {
    pub fn new(branch: Branch, index: u32) -> Self {
        Self { branch, index }
    }
}

impl FromStr for WalletPath {
    type Err = InvalidPath;

    /// Matches `m/(0|1)/(0|[1-9][0-9]*)` exactly; hardened steps, leading
    /// zeros and extra components are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidPath(s.to_string());

        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return Err(invalid());
        }
        let branch = match parts.next() {
            Some("0") => Branch::Receive,
            Some("1") => Branch::Change,
            _ => return Err(invalid()),
        };
        let index_str = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let well_formed = !index_str.is_empty()
            && index_str.bytes().all(|b| b.is_ascii_digit())
            && (index_str == "0" || !index_str.starts_with('0'));
        if !well_formed {
            return Err(invalid());
        }
        // Indices at or above 2^31 would be hardened
        let index: u32 = index_str.parse().map_err(|_| invalid())?;
        if index >= 0x8000_0000 {
            return Err(invalid());
        }

        Ok(Self { branch, index })
    }
}

impl fmt::Display for WalletPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}/{}", self.branch.number(), self.index)
    }
}
