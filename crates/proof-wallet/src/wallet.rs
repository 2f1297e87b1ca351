//! The multisig wallet
//!
//! A [`Wallet`] is one local signer (held as a mnemonic) plus the cosigners
//! imported so far, an `m`-of-`n` policy and a network. Keys, fingerprint and
//! descriptors are pure functions of that state: the same mnemonic and
//! cosigner list always reproduce the same wallet.

use crate::cosigner::{Cosigner, CosignerError, CosignerRegistry, PendingCosigner};
use crate::descriptor::{key_expression, sortedmulti, DescriptorError, MultisigDescriptor, MAX_SIGNERS};
use bip39::Mnemonic;
use bitcoin::bip32::{Fingerprint, Xpriv, Xpub};
use proof_core::entropy::{EntropyError, WalletEntropy};
use proof_core::seed::{self, SeedError};
use proof_core::Network;
use proof_psbt::{Branch, WalletPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid policy {m}-of-{n}: need 1 <= m <= n <= {MAX_SIGNERS}")]
    InvalidPolicy { m: usize, n: usize },

    #[error("Wallet has {have} of {n} signers")]
    Incomplete { have: usize, n: usize },

    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("Entropy error: {0}")]
    Entropy(#[from] EntropyError),

    #[error("Cosigner error: {0}")]
    Cosigner(#[from] CosignerError),

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
}

/// Check `1 <= m <= n <= 15`.
pub fn validate_policy(m: usize, n: usize) -> Result<(), WalletError> {
    if m == 0 || m > n || n > MAX_SIGNERS {
        return Err(WalletError::InvalidPolicy { m, n });
    }
    Ok(())
}

pub struct Wallet {
    name: String,
    mnemonic: Mnemonic,
    network: Network,
    m: usize,
    n: usize,
    cosigners: CosignerRegistry,
    xprv: Xpriv,
    xpub: Xpub,
}

impl Wallet {
    /// Build a wallet around `mnemonic`. `name` defaults to
    /// `wallet-<fingerprint>`.
    pub fn new(
        name: Option<String>,
        mnemonic: Mnemonic,
        m: usize,
        n: usize,
        network: Network,
    ) -> Result<Self, WalletError> {
        validate_policy(m, n)?;
        let seed = seed::to_seed(&mnemonic, "");
        let xprv = seed::to_hd_master_key(&seed, network)?;
        let xpub = seed::xpub_from_xprv(&xprv);
        let name = name.unwrap_or_else(|| format!("wallet-{}", xpub.fingerprint()));

        Ok(Self {
            name,
            mnemonic,
            network,
            m,
            n,
            cosigners: CosignerRegistry::new(),
            xprv,
            xpub,
        })
    }

    /// New wallet from freshly combined entropy
    pub fn from_entropy(
        entropy: &WalletEntropy,
        m: usize,
        n: usize,
        network: Network,
    ) -> Result<Self, WalletError> {
        let wallet = Self::new(None, entropy.mnemonic()?, m, n, network)?;
        log::info!(
            "Created {}-of-{} {} wallet {}",
            m,
            n,
            network,
            wallet.fingerprint()
        );
        Ok(wallet)
    }

    /// Rebuild a wallet from its 24 words
    pub fn restore(phrase: &str, m: usize, n: usize, network: Network) -> Result<Self, WalletError> {
        let mnemonic = seed::parse_mnemonic(phrase)?;
        let wallet = Self::new(None, mnemonic, m, n, network)?;
        log::info!("Restored {} wallet {}", network, wallet.fingerprint());
        Ok(wallet)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn m(&self) -> usize {
        self.m
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn mnemonic(&self) -> &Mnemonic {
        &self.mnemonic
    }

    pub fn xprv(&self) -> &Xpriv {
        &self.xprv
    }

    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.xpub.fingerprint()
    }

    /// This wallet's own key as a cosigner record, for export
    pub fn local_signer(&self) -> Cosigner {
        Cosigner::new(self.fingerprint(), self.xpub)
    }

    pub fn cosigners(&self) -> &CosignerRegistry {
        &self.cosigners
    }

    pub fn is_complete(&self) -> bool {
        self.cosigners.is_complete(self.n)
    }

    /// Confirm a prepared cosigner into the wallet.
    pub fn add_cosigner(&mut self, pending: PendingCosigner) -> Result<(), WalletError> {
        let local = self.local_signer();
        self.cosigners.add(pending.confirm(), &local, self.n)?;
        Ok(())
    }

    /// Local signer first, then cosigners in import order
    pub fn signers(&self) -> Vec<(Fingerprint, Xpub)> {
        std::iter::once((self.fingerprint(), self.xpub))
            .chain(self.cosigners.list().iter().map(|c| (c.fingerprint, c.xpub)))
            .collect()
    }

    /// Public descriptor over the signers known so far
    pub fn descriptor(&self) -> MultisigDescriptor {
        MultisigDescriptor::new(self.m, self.signers())
    }

    /// Descriptor for `branch` with the local xprv in place of its xpub.
    pub fn signing_descriptor(&self, branch: Branch) -> Result<Zeroizing<String>, WalletError> {
        if !self.is_complete() {
            return Err(WalletError::Incomplete {
                have: self.cosigners.len() + 1,
                n: self.n,
            });
        }
        let xprv = Zeroizing::new(self.xprv.to_string());
        let mut keys = vec![Zeroizing::new(key_expression(self.fingerprint(), &xprv, branch))];
        keys.extend(self.cosigners.list().iter().map(|c| {
            Zeroizing::new(key_expression(c.fingerprint, &c.xpub.to_string(), branch))
        }));
        Ok(Zeroizing::new(sortedmulti(
            self.m,
            keys.iter().map(|k| k.as_str()),
        )))
    }

    pub fn address(&self, branch: Branch, index: u32) -> Result<String, WalletError> {
        Ok(self
            .descriptor()
            .address(branch, index, self.network)?
            .to_string())
    }

    pub fn to_record(&self) -> WalletRecord {
        WalletRecord {
            name: self.name.clone(),
            network: self.network,
            m: self.m,
            n: self.n,
            mnemonic: Zeroizing::new(self.mnemonic.to_string()),
            cosigners: self.cosigners.list().to_vec(),
        }
    }

    /// Reload from a persisted record, replaying cosigner imports so every
    /// registry invariant is enforced again.
    pub fn from_record(record: &WalletRecord) -> Result<Self, WalletError> {
        let mnemonic = seed::parse_mnemonic(&record.mnemonic)?;
        let mut wallet = Self::new(
            Some(record.name.clone()),
            mnemonic,
            record.m,
            record.n,
            record.network,
        )?;
        let local = wallet.local_signer();
        for cosigner in &record.cosigners {
            wallet.cosigners.add(cosigner.clone(), &local, wallet.n)?;
        }
        Ok(wallet)
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("name", &self.name)
            .field("network", &self.network)
            .field("policy", &format_args!("{}-of-{}", self.m, self.n))
            .field("fingerprint", &self.fingerprint())
            .field("cosigners", &self.cosigners.len())
            .finish_non_exhaustive()
    }
}

impl WalletPolicy for Wallet {
    type Error = DescriptorError;

    fn fingerprints(&self) -> BTreeSet<Fingerprint> {
        self.signers().into_iter().map(|(fp, _)| fp).collect()
    }

    fn signer_count(&self) -> usize {
        self.n
    }

    fn derive_address(&self, branch: Branch, index: u32) -> Result<String, DescriptorError> {
        Ok(self
            .descriptor()
            .address(branch, index, self.network)?
            .to_string())
    }
}

/// Flat persisted form of a wallet
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub name: String,
    pub network: Network,
    pub m: usize,
    pub n: usize,
    #[serde(with = "zeroizing_string")]
    pub mnemonic: Zeroizing<String>,
    pub cosigners: Vec<Cosigner>,
}

impl fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecord")
            .field("name", &self.name)
            .field("network", &self.network)
            .field("m", &self.m)
            .field("n", &self.n)
            .field("mnemonic", &"<redacted>")
            .field("cosigners", &self.cosigners)
            .finish()
    }
}

mod zeroizing_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    pub fn serialize<S>(value: &Zeroizing<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Zeroizing<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Zeroizing::new(String::deserialize(deserializer)?))
    }
}
