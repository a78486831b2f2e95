//! End-to-end keyring lifecycle against the software device.
//!
//! Walks the flows a wallet front end drives:
//! 1. Unlock and add accounts
//! 2. Browse pages
//! 3. Persist, restore, and keep working without re-adding
//! 4. Switch HD path and forget the device

use hwkeyring_core::{
    Keyring, KeyringConfig, KeyringError, KeyringEvent, KeyringSnapshot, PageDirection,
    UnlockStatus,
};
use hwkeyring_emulator::SoftwareDevice;
use std::sync::{Arc, Mutex};

const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";

const DEV_ACCOUNTS: [&str; 6] = [
    "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
    "0x70997970C51812dc3A010C7d01b50e0d17dc79C8",
    "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC",
    "0x90F79bf6EB2c4f870365E785982E1f101E93b906",
    "0x15d34AAf54267DB7D7c367839AAf71A00a2C6A65",
    "0x9965507D1a55bcC2695C58ba16FB37d819B0A4dc",
];

fn device() -> Arc<SoftwareDevice> {
    Arc::new(SoftwareDevice::from_mnemonic(DEV_MNEMONIC, "").unwrap())
}

fn fast_config() -> KeyringConfig {
    KeyringConfig {
        popup_delay_ms: 0,
        ..Default::default()
    }
}

// ============================================================================
// 1. Unlock and accounts
// ============================================================================

#[tokio::test]
async fn test_unlock_once_then_cached() {
    let device = device();
    let mut keyring = Keyring::new(device.clone(), fast_config()).unwrap();

    assert_eq!(keyring.unlock().await.unwrap(), UnlockStatus::JustUnlocked);
    assert_eq!(keyring.unlock().await.unwrap(), UnlockStatus::AlreadyUnlocked);
    keyring.add_accounts(3).await.unwrap();
    keyring.get_first_page().await.unwrap();

    assert_eq!(device.handshake_count(), 1);
}

#[tokio::test]
async fn test_add_accounts_matches_known_addresses() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    let accounts = keyring.add_accounts(4).await.unwrap();
    assert_eq!(accounts, DEV_ACCOUNTS[..4].to_vec());
}

#[tokio::test]
async fn test_add_accounts_from_cursor_without_duplicates() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.add_accounts(2).await.unwrap();

    keyring.set_account_to_unlock(1);
    let accounts = keyring.add_accounts(3).await.unwrap();

    assert_eq!(accounts, DEV_ACCOUNTS[..4].to_vec());
    assert_eq!(keyring.session().index_of(DEV_ACCOUNTS[3]), Some(3));
}

// ============================================================================
// 2. Pagination
// ============================================================================

#[tokio::test]
async fn test_page_walk() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();

    let first = keyring.get_first_page().await.unwrap();
    assert_eq!(first.len(), 5);
    assert_eq!(first[0].address, DEV_ACCOUNTS[0]);
    assert_eq!(first[4].address, DEV_ACCOUNTS[4]);

    let second = keyring.get_next_page().await.unwrap();
    assert_eq!(second[0].index, 5);
    assert_eq!(second[0].address, DEV_ACCOUNTS[5]);

    let back = keyring.get_previous_page().await.unwrap();
    assert_eq!(back, first);

    // Never below the first page.
    let still_first = keyring.get_page(PageDirection::Previous).await.unwrap();
    assert_eq!(still_first, first);
}

#[tokio::test]
async fn test_adding_accounts_resets_page() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.get_first_page().await.unwrap();
    keyring.get_next_page().await.unwrap();
    assert_eq!(keyring.session().page(), 2);

    keyring.add_accounts(1).await.unwrap();
    assert_eq!(keyring.session().page(), 0);
}

// ============================================================================
// 3. Persistence
// ============================================================================

#[tokio::test]
async fn test_snapshot_json_roundtrip_keeps_bookkeeping() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.add_accounts(3).await.unwrap();
    keyring.get_first_page().await.unwrap();

    let json = keyring.serialize().to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["hdPath"], "m/44'/60'/0'/0");
    assert_eq!(value["perPage"], 5);
    assert_eq!(value["page"], 1);
    assert_eq!(value["paths"][DEV_ACCOUNTS[2]], 2);

    let restored = Keyring::from_snapshot(
        device(),
        fast_config(),
        KeyringSnapshot::from_json(&json).unwrap(),
    )
    .unwrap();
    assert!(!restored.is_unlocked());
    assert_eq!(restored.get_accounts(), DEV_ACCOUNTS[..3].to_vec());
    assert_eq!(restored.serialize(), keyring.serialize());
}

#[tokio::test]
async fn test_restored_keyring_locked_until_needed() {
    let snapshot = KeyringSnapshot {
        accounts: vec![DEV_ACCOUNTS[1].to_string()],
        ..Default::default()
    };
    let device = device();
    let mut keyring = Keyring::from_snapshot(device.clone(), fast_config(), snapshot).unwrap();

    assert!(matches!(keyring.address_at(0), Err(KeyringError::Locked)));
    assert_eq!(device.handshake_count(), 0);

    keyring.unlock().await.unwrap();
    assert_eq!(keyring.resolve_index(DEV_ACCOUNTS[1]).unwrap(), 1);
    assert_eq!(device.handshake_count(), 1);
}

// ============================================================================
// 4. HD path and forget
// ============================================================================

#[tokio::test]
async fn test_set_hd_path_changes_derivation() {
    let device = device();
    let mut keyring = Keyring::new(device.clone(), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    keyring.set_hd_path("m/44'/60'/1'/0").unwrap();
    assert!(!keyring.is_unlocked());
    assert!(keyring.get_accounts().is_empty());

    let accounts = keyring.add_accounts(1).await.unwrap();
    assert_ne!(accounts[0], DEV_ACCOUNTS[0]);
    assert_eq!(device.handshake_count(), 2);
}

#[tokio::test]
async fn test_forget_device_keeps_path_and_page_size() {
    let config = KeyringConfig {
        hd_path: "m/44'/60'/0'/0".into(),
        per_page: 3,
        ..fast_config()
    };
    let mut keyring = Keyring::new(device(), config).unwrap();
    keyring.add_accounts(2).await.unwrap();

    keyring.forget_device();

    let snapshot = keyring.serialize();
    assert!(!keyring.is_unlocked());
    assert!(snapshot.accounts.is_empty());
    assert!(snapshot.paths.is_empty());
    assert_eq!(snapshot.per_page, 3);
    assert_eq!(snapshot.hd_path, "m/44'/60'/0'/0");
}

#[tokio::test]
async fn test_events_follow_operations() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut keyring = Keyring::new(device(), fast_config())
        .unwrap()
        .with_listener(move |e: &KeyringEvent| sink.lock().unwrap().push(e.clone()));

    keyring.add_accounts(1).await.unwrap();
    keyring.remove_account(&DEV_ACCOUNTS[0].to_lowercase()).unwrap();
    keyring.forget_device();

    let events = events.lock().unwrap();
    assert_eq!(
        *events,
        vec![
            KeyringEvent::Unlocked {
                hd_path: "m/44'/60'/0'/0".into()
            },
            KeyringEvent::AccountsAdded {
                added: vec![DEV_ACCOUNTS[0].to_string()]
            },
            KeyringEvent::AccountRemoved {
                address: DEV_ACCOUNTS[0].to_string()
            },
            KeyringEvent::DeviceForgotten,
        ]
    );
}
