#![no_main]

use hwkeyring_core::Signature;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(signature) = Signature::from_device_bytes(data) {
        let _ = signature.recovery_id();
        assert!(signature.to_hex().starts_with("0x"));
    }
});
