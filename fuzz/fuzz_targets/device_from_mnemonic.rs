#![no_main]

use hwkeyring_emulator::{parse_mnemonic, SoftwareDevice};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First line holds the words, the rest is the BIP-39 passphrase.
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (words, passphrase) = s.split_once('\n').unwrap_or((s, ""));

    match SoftwareDevice::from_mnemonic(words, passphrase) {
        Ok(device) => {
            assert!(parse_mnemonic(words).is_ok());
            assert_eq!(device.handshake_count(), 0);
        }
        // The passphrase never decides whether a device can be built.
        Err(_) => assert!(parse_mnemonic(words).is_err()),
    }
});
