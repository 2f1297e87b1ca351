//! Proof Wallet PSBT validation
//!
//! Decoded-PSBT schema, derivation path parsing, and the validator that
//! decides whether a wallet may sign.

pub mod decoded;
pub mod path;
pub mod result;
pub mod validator;

pub use decoded::{DecodedPsbt, PsbtAnalysis};
pub use path::{Branch, InvalidPath, WalletPath};
pub use result::{PsbtValidationResult, Side, ValidationError, ValidationWarning};
pub use validator::{validate_psbt, WalletPolicy};
