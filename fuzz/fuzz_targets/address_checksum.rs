#![no_main]

use hwkeyring_core::{same_address, to_checksum_address};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(checksummed) = to_checksum_address(s) {
            // Normalization is idempotent and keeps the identity of the address.
            assert_eq!(to_checksum_address(&checksummed).ok(), Some(checksummed.clone()));
            assert!(same_address(s.trim(), &checksummed));
        }
    }
});
