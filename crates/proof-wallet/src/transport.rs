//! Transport chunk handling
//!
//! PSBTs travel between machines as base64 text split over several QR
//! codes. Chunk boundaries carry no meaning: chunks are joined in the order
//! they were imported, with no delimiter.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Binary PSBT magic: `psbt` followed by `0xff`
pub const PSBT_MAGIC: [u8; 5] = [0x70, 0x73, 0x62, 0x74, 0xff];

/// Base64 prefix of every PSBT
pub const PSBT_BASE64_PREFIX: &str = "cHNidP8";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransportError {
    #[error("No PSBT data received")]
    Empty,

    #[error("PSBT is not valid base64: {0}")]
    Base64(String),

    #[error("Data is not a PSBT (missing magic bytes)")]
    NotAPsbt,
}

/// Concatenate chunks in import order. Surrounding whitespace on each chunk
/// is dropped.
pub fn join_chunks<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks.iter().map(|c| c.as_ref().trim()).collect()
}

/// Split `data` into chunks of at most `size` characters for export.
pub fn split_chunks(data: &str, size: usize) -> Vec<String> {
    if size == 0 {
        return vec![data.to_string()];
    }
    data.as_bytes()
        .chunks(size)
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}

/// Check that `text` is a base64 PSBT and return its bytes.
pub fn decode_base64_psbt(text: &str) -> Result<Vec<u8>, TransportError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(TransportError::Empty);
    }
    let bytes = STANDARD
        .decode(text)
        .map_err(|e| TransportError::Base64(e.to_string()))?;
    if !bytes.starts_with(&PSBT_MAGIC) {
        return Err(TransportError::NotAPsbt);
    }
    Ok(bytes)
}
