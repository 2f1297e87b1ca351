//! BIP-32 extended key serialization
//!
//! Layout of the 78-byte payload (after Base58Check decoding):
//!
//! ```text
//! [0..4]   version
//! [4]      depth
//! [5..9]   parent fingerprint
//! [9..13]  child index
//! [13..45] chain code
//! [45..78] key data (0x00 || privkey, or compressed pubkey)
//! ```
//!
//! Fingerprints are always rendered as lowercase hex.

use crate::base58::{self, Base58Error};
use crate::network::Network;
use bitcoin::bip32::Fingerprint;
use bitcoin::hashes::{hash160, Hash};
use thiserror::Error;

/// Serialized extended key length, excluding the checksum
pub const XKEY_LEN: usize = 78;

pub const MAINNET_PRIVATE: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];
pub const MAINNET_PUBLIC: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
pub const TESTNET_PRIVATE: [u8; 4] = [0x04, 0x35, 0x83, 0x94];
pub const TESTNET_PUBLIC: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XkeyError {
    #[error("Base58Check: {0}")]
    Base58(#[from] Base58Error),

    #[error("Extended key must be {XKEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    #[error("Unknown extended key version {0:02x?}")]
    UnknownVersion([u8; 4]),

    #[error("Extended key is for {found}, expected {expected}")]
    WrongNetwork { expected: Network, found: Network },
}

/// One of the four recognized version prefixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyVersion {
    MainnetPrivate,
    MainnetPublic,
    TestnetPrivate,
    TestnetPublic,
}

impl KeyVersion {
    pub fn from_bytes(bytes: [u8; 4]) -> Result<Self, XkeyError> {
        match bytes {
            MAINNET_PRIVATE => Ok(KeyVersion::MainnetPrivate),
            MAINNET_PUBLIC => Ok(KeyVersion::MainnetPublic),
            TESTNET_PRIVATE => Ok(KeyVersion::TestnetPrivate),
            TESTNET_PUBLIC => Ok(KeyVersion::TestnetPublic),
            other => Err(XkeyError::UnknownVersion(other)),
        }
    }

    /// Public-key version for a network (regtest shares testnet's)
    pub fn public_for(network: Network) -> Self {
        if network.is_mainnet() {
            KeyVersion::MainnetPublic
        } else {
            KeyVersion::TestnetPublic
        }
    }

    pub fn private_for(network: Network) -> Self {
        if network.is_mainnet() {
            KeyVersion::MainnetPrivate
        } else {
            KeyVersion::TestnetPrivate
        }
    }

    pub fn bytes(self) -> [u8; 4] {
        match self {
            KeyVersion::MainnetPrivate => MAINNET_PRIVATE,
            KeyVersion::MainnetPublic => MAINNET_PUBLIC,
            KeyVersion::TestnetPrivate => TESTNET_PRIVATE,
            KeyVersion::TestnetPublic => TESTNET_PUBLIC,
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, KeyVersion::MainnetPrivate | KeyVersion::TestnetPrivate)
    }

    pub fn is_mainnet(self) -> bool {
        matches!(self, KeyVersion::MainnetPrivate | KeyVersion::MainnetPublic)
    }

    /// Whether keys of this version may be used on `network`
    pub fn matches_network(self, network: Network) -> bool {
        self.is_mainnet() == network.is_mainnet()
    }
}

/// A decoded extended key. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedKey {
    pub version: KeyVersion,
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_index: [u8; 4],
    pub chain_code: [u8; 32],
    /// Compressed public key, or the 32-byte private key followed by `0x01`
    pub key_material: [u8; 33],
}

impl ExtendedKey {
    /// Decode a Base58Check extended key of any recognized version.
    pub fn decode(encoded: &str) -> Result<Self, XkeyError> {
        let payload = base58::decode_check(encoded.trim())?;
        Self::from_payload(&payload)
    }

    /// Decode and require the key to belong to `network`.
    pub fn deserialize(encoded: &str, network: Network) -> Result<Self, XkeyError> {
        let key = Self::decode(encoded)?;
        if !key.version.matches_network(network) {
            let found = if key.version.is_mainnet() {
                Network::Mainnet
            } else {
                Network::Testnet
            };
            return Err(XkeyError::WrongNetwork {
                expected: network,
                found,
            });
        }
        Ok(key)
    }

    /// Parse the raw 78-byte payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, XkeyError> {
        if payload.len() != XKEY_LEN {
            return Err(XkeyError::InvalidLength(payload.len()));
        }
        let version = KeyVersion::from_bytes(fixed(&payload[0..4]))?;

        let mut key_material = [0u8; 33];
        if version.is_private() {
            // Skip the 0x00 pad and force the compressed-key convention
            key_material[..32].copy_from_slice(&payload[46..78]);
            key_material[32] = 0x01;
        } else {
            key_material.copy_from_slice(&payload[45..78]);
        }

        Ok(Self {
            version,
            depth: payload[4],
            parent_fingerprint: fixed(&payload[5..9]),
            child_index: fixed(&payload[9..13]),
            chain_code: fixed(&payload[13..45]),
            key_material,
        })
    }

    /// `RIPEMD160(SHA256(key_material))[..4]`
    pub fn fingerprint(&self) -> Fingerprint {
        let hash = hash160::Hash::hash(&self.key_material).to_byte_array();
        Fingerprint::from([hash[0], hash[1], hash[2], hash[3]])
    }

    pub fn is_private(&self) -> bool {
        self.version.is_private()
    }
}

fn fixed<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}

/// Fingerprint of an encoded extended key, as 8 lowercase hex characters.
pub fn fingerprint(xkey: &str) -> Result<String, XkeyError> {
    Ok(ExtendedKey::decode(xkey)?.fingerprint().to_string())
}
