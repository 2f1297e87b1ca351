#![no_main]

use libfuzzer_sys::fuzz_target;
use proof_core::{ExtendedKey, Network};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(key) = ExtendedKey::decode(s) {
            let _ = key.fingerprint();
            for network in Network::ALL {
                let _ = ExtendedKey::deserialize(s, network);
            }
        }
    }
});
