#![no_main]

use hwkeyring_core::{KeyringSnapshot, Session};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Untrusted state files must be rejected cleanly.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(snapshot) = KeyringSnapshot::from_json(s) {
            if let Ok(session) = Session::from_snapshot(snapshot) {
                assert!(!session.is_unlocked());
                assert!(session.per_page() > 0);
            }
        }
    }
});
