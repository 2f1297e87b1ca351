//! BIP-39 seed management
//!
//! Thin wrappers over the `bip39` and `bitcoin` crates: entropy to mnemonic,
//! mnemonic to seed, seed to master extended key.

use crate::network::Network;
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{Xpriv, Xpub};
use secp256k1::Secp256k1;
use thiserror::Error;
use zeroize::Zeroizing;

/// Word count for every Proof wallet
pub const MNEMONIC_WORDS: usize = 24;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeedError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("Mnemonic must have {MNEMONIC_WORDS} words, got {0}")]
    WrongWordCount(usize),
    #[error("Master key derivation failed: {0}")]
    DerivationFailed(String),
}

/// Encode 256 bits of entropy as a 24-word English mnemonic.
pub fn to_mnemonic(entropy: &[u8; 32]) -> Result<Mnemonic, SeedError> {
    Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))
}

/// Parse a 24-word English mnemonic
pub fn parse_mnemonic(words: &str) -> Result<Mnemonic, SeedError> {
    let mnemonic = Mnemonic::parse_in(Language::English, words)
        .map_err(|e| SeedError::InvalidMnemonic(e.to_string()))?;
    if mnemonic.word_count() != MNEMONIC_WORDS {
        return Err(SeedError::WrongWordCount(mnemonic.word_count()));
    }
    Ok(mnemonic)
}

/// Derive the 64-byte seed (NFKD-normalized passphrase)
pub fn to_seed(mnemonic: &Mnemonic, passphrase: &str) -> Zeroizing<[u8; 64]> {
    Zeroizing::new(mnemonic.to_seed(passphrase))
}

/// Master extended private key for `network`
pub fn to_hd_master_key(seed: &[u8; 64], network: Network) -> Result<Xpriv, SeedError> {
    Xpriv::new_master(network.to_bitcoin(), seed)
        .map_err(|e| SeedError::DerivationFailed(e.to_string()))
}

/// Neutered master key
pub fn xpub_from_xprv(xprv: &Xpriv) -> Xpub {
    let secp = Secp256k1::signing_only();
    Xpub::from_priv(&secp, xprv)
}
