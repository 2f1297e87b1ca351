//! Wallet entropy from two independent sources
//!
//! Seed entropy is `SHA256(dice rolls) XOR device entropy`. Either source
//! alone is enough to make the result unpredictable.
//!
//! # Two-machine verification
//!
//! The device entropy is carried as its 64-character hex transcript. The
//! first machine generates and displays it; the second machine has the
//! operator type it in. Both machines use the transcript's ASCII bytes, never
//! the decoded value, so that the same dice rolls and the same transcript
//! always yield the same mnemonic on both machines.

use crate::seed::{self, SeedError};
use bip39::Mnemonic;
use bitcoin::hashes::{sha256, Hash};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Minimum number of die rolls accepted for a new wallet
pub const MIN_DICE_ROLLS: usize = 100;

/// Length of combined entropy (256 bits)
pub const ENTROPY_LEN: usize = 32;

/// Hex characters in a device entropy transcript
pub const TRANSCRIPT_LEN: usize = 64;

/// OS random bytes hashed into the device entropy
const OS_RANDOM_BYTES: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntropyError {
    #[error("Invalid die face {0} (must be 1-6)")]
    InvalidDieFace(u8),

    #[error("Not enough dice rolls: {got} (need at least {MIN_DICE_ROLLS})")]
    NotEnoughRolls { got: usize },

    #[error("Device entropy must be {TRANSCRIPT_LEN} hex characters, got {0}")]
    InvalidTranscriptLength(usize),

    #[error("Device entropy contains non-hex character {0:?}")]
    InvalidTranscriptCharacter(char),

    #[error("Entropy length mismatch: {left} vs {right} bytes")]
    LengthMismatch { left: usize, right: usize },

    #[error("Mnemonic generation failed: {0}")]
    Seed(#[from] SeedError),
}

/// A sequence of die faces, each in 1..=6
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiceRolls(Vec<u8>);

impl DiceRolls {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_faces(faces: &[u8]) -> Result<Self, EntropyError> {
        let mut rolls = Self::new();
        for &face in faces {
            rolls.push(face)?;
        }
        Ok(rolls)
    }

    pub fn push(&mut self, face: u8) -> Result<(), EntropyError> {
        if !(1..=6).contains(&face) {
            return Err(EntropyError::InvalidDieFace(face));
        }
        self.0.push(face);
        Ok(())
    }

    /// Remove the last roll (operator undo)
    pub fn pop(&mut self) -> Option<u8> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_sufficient(&self) -> bool {
        self.0.len() >= MIN_DICE_ROLLS
    }

    pub fn faces(&self) -> &[u8] {
        &self.0
    }

    /// SHA256 of the face values taken as raw bytes.
    pub fn entropy(&self) -> Result<[u8; ENTROPY_LEN], EntropyError> {
        if !self.is_sufficient() {
            return Err(EntropyError::NotEnoughRolls { got: self.0.len() });
        }
        Ok(sha256::Hash::hash(&self.0).to_byte_array())
    }

    /// Rows of ten rolls for display, e.g. `"3 1 6 2 ..."`
    pub fn rows(&self) -> Vec<String> {
        self.0
            .chunks(10)
            .map(|row| {
                row.iter()
                    .map(|f| f.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

/// Device entropy as a lowercase hex transcript
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceEntropy(Zeroizing<String>);

impl DeviceEntropy {
    /// Hash fresh OS randomness into a new transcript.
    pub fn generate() -> Self {
        let mut buf = Zeroizing::new([0u8; OS_RANDOM_BYTES]);
        OsRng.fill_bytes(&mut buf[..]);
        let digest = sha256::Hash::hash(&buf[..]).to_byte_array();
        Self(Zeroizing::new(hex::encode(digest)))
    }

    /// Accept a transcript typed in from the other machine.
    ///
    /// Whitespace is ignored and letters are case-folded.
    pub fn from_transcript(text: &str) -> Result<Self, EntropyError> {
        let mut clean = Zeroizing::new(String::with_capacity(TRANSCRIPT_LEN));
        for ch in text.chars().filter(|c| !c.is_whitespace()) {
            if !ch.is_ascii_hexdigit() {
                return Err(EntropyError::InvalidTranscriptCharacter(ch));
            }
            clean.push(ch.to_ascii_lowercase());
        }
        if clean.len() != TRANSCRIPT_LEN {
            return Err(EntropyError::InvalidTranscriptLength(clean.len()));
        }
        Ok(Self(clean))
    }

    pub fn transcript(&self) -> &str {
        &self.0
    }

    /// The bytes mixed into the seed: the leading 32 ASCII characters of the
    /// transcript, byte-for-byte.
    pub fn entropy_bytes(&self) -> &[u8] {
        &self.0.as_bytes()[..ENTROPY_LEN]
    }

    /// Sixteen groups of four characters, for reading aloud or retyping
    pub fn grouped(&self) -> String {
        self.0
            .as_bytes()
            .chunks(4)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Debug for DeviceEntropy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeviceEntropy(<redacted>)")
    }
}

/// XOR two equal-length byte strings into 256-bit seed entropy.
///
/// A length mismatch means a caller bug, not bad operator input.
pub fn combine_entropy(
    left: &[u8],
    right: &[u8],
) -> Result<Zeroizing<[u8; ENTROPY_LEN]>, EntropyError> {
    if left.len() != ENTROPY_LEN || right.len() != ENTROPY_LEN {
        return Err(EntropyError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    let mut out = Zeroizing::new([0u8; ENTROPY_LEN]);
    for (o, (a, b)) in out.iter_mut().zip(left.iter().zip(right)) {
        *o = a ^ b;
    }
    Ok(out)
}

/// Combined entropy for a new wallet
pub struct WalletEntropy {
    combined: Zeroizing<[u8; ENTROPY_LEN]>,
}

impl WalletEntropy {
    pub fn new(dice: &DiceRolls, device: &DeviceEntropy) -> Result<Self, EntropyError> {
        let dice_entropy = Zeroizing::new(dice.entropy()?);
        let combined = combine_entropy(device.entropy_bytes(), &dice_entropy[..])?;
        log::debug!("Combined {} dice rolls with device entropy", dice.len());
        Ok(Self { combined })
    }

    pub fn as_bytes(&self) -> &[u8; ENTROPY_LEN] {
        &self.combined
    }

    /// The 24-word mnemonic for this entropy. Deterministic.
    pub fn mnemonic(&self) -> Result<Mnemonic, EntropyError> {
        Ok(seed::to_mnemonic(&self.combined)?)
    }
}
