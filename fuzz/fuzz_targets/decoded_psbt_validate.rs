#![no_main]

use bitcoin::bip32::Fingerprint;
use libfuzzer_sys::fuzz_target;
use proof_psbt::{validate_psbt, Branch, DecodedPsbt, WalletPolicy};
use std::collections::BTreeSet;
use std::str::FromStr;

struct AnyWallet;

impl WalletPolicy for AnyWallet {
    type Error = String;

    fn fingerprints(&self) -> BTreeSet<Fingerprint> {
        ["aabbccdd", "11223344"]
            .iter()
            .filter_map(|fp| Fingerprint::from_str(fp).ok())
            .collect()
    }

    fn signer_count(&self) -> usize {
        2
    }

    fn derive_address(&self, branch: Branch, index: u32) -> Result<String, String> {
        Ok(format!("bcrt1q-{}-{}", branch, index))
    }
}

fuzz_target!(|data: &[u8]| {
    // Whatever the node hands back, validation returns a verdict
    if let Ok(json) = std::str::from_utf8(data) {
        if let Ok(decoded) = DecodedPsbt::from_json(json) {
            let result = validate_psbt(&decoded, &AnyWallet);
            assert!(result.errors.len() <= 1);
        }
    }
});
