//! Proof Wallet Core
//!
//! Key material primitives for an air-gapped M-of-N multisig wallet.
//!
//! # Components
//!
//! - [`base58`]: Base58Check text codec used by extended keys
//! - [`xkey`]: BIP-32 extended key serialization and fingerprints
//! - [`entropy`]: dice + device entropy combination
//! - [`seed`]: BIP-39 mnemonic, seed and master key derivation
//!
//! Every function in this crate is pure apart from
//! [`entropy::DeviceEntropy::generate`], which reads OS randomness.

pub mod base58;
pub mod entropy;
pub mod network;
pub mod seed;
pub mod xkey;

pub use base58::Base58Error;
pub use entropy::{combine_entropy, DeviceEntropy, DiceRolls, EntropyError, WalletEntropy};
pub use network::Network;
pub use seed::SeedError;
pub use xkey::{fingerprint, ExtendedKey, KeyVersion, XkeyError};
