//! Base58 and Base58Check
//!
//! Text encoding for extended keys, backed by `bitcoin::base58`. Base58Check
//! appends the first four bytes of `SHA256(SHA256(payload))` before encoding
//! and verifies them on decode.

use bitcoin::base58 as codec;
use thiserror::Error;

const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("Invalid base58 character {ch:?} at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("Base58Check checksum mismatch")]
    ChecksumMismatch,

    #[error("Base58Check data too short: {0} bytes")]
    TooShort(usize),
}

/// The first character of `s` outside the alphabet
fn invalid_character(s: &str) -> Base58Error {
    let (position, ch) = s
        .chars()
        .enumerate()
        .find(|(_, ch)| !ALPHABET.contains(*ch))
        .unwrap_or((0, '\0'));
    Base58Error::InvalidCharacter { ch, position }
}

/// Decode a Base58 string into bytes.
///
/// Each leading `'1'` (the zero digit) becomes one leading zero byte.
pub fn decode(s: &str) -> Result<Vec<u8>, Base58Error> {
    codec::decode(s).map_err(|_| invalid_character(s))
}

/// Encode bytes as Base58.
pub fn encode(data: &[u8]) -> String {
    codec::encode(data)
}

/// Decode a Base58Check string, returning the payload without its checksum.
pub fn decode_check(s: &str) -> Result<Vec<u8>, Base58Error> {
    codec::decode_check(s).map_err(|err| match err {
        codec::Error::IncorrectChecksum(_) => Base58Error::ChecksumMismatch,
        codec::Error::TooShort(_) => Base58Error::TooShort(decode(s).map_or(0, |d| d.len())),
        _ => invalid_character(s),
    })
}

/// Append the checksum to `payload` and encode.
pub fn encode_check(payload: &[u8]) -> String {
    codec::encode_check(payload)
}
