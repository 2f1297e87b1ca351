//! Proof Wallet
//!
//! The M-of-N multisig wallet model and its signing ceremony.
//!
//! # Components
//!
//! - [`descriptor`]: `wsh(sortedmulti(..))` construction and address derivation
//! - [`cosigner`]: cosigner import and the append-only registry
//! - [`wallet`]: the wallet itself, its keys and persisted record
//! - [`oracle`]: the [`ChainOracle`] seam to an external node
//! - [`ceremony`]: PSBT review, signing and address preview through the oracle
//! - [`transport`]: QR chunk joining and PSBT text checks
//! - [`store`]: JSON persistence per network

pub mod ceremony;
pub mod cosigner;
pub mod descriptor;
pub mod oracle;
pub mod store;
pub mod transport;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ceremony::{receive_addresses, review_psbt, sign_psbt, CeremonyError, PsbtReview};
pub use cosigner::{Cosigner, CosignerError, CosignerRegistry, FingerprintSource, PendingCosigner};
pub use descriptor::{DescriptorError, MultisigDescriptor, MAX_SIGNERS};
pub use oracle::{ChainOracle, DescriptorRequest, OracleError, SignedPsbt};
pub use store::{StoreError, WalletStore};
pub use wallet::{Wallet, WalletError, WalletRecord};
