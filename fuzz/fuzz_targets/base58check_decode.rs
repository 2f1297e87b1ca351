#![no_main]

use libfuzzer_sys::fuzz_target;
use proof_core::base58;

fuzz_target!(|data: &[u8]| {
    // Any string decodes to Ok or Err; a valid checksum must re-encode
    // to the same text.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(payload) = base58::decode_check(s) {
            assert_eq!(base58::encode_check(&payload), s);
        }
    }
});
