//! Signing paths and the guarantees around them.
//!
//! These tests verify:
//! 1. Signatures recover to the requested account, including after a restore
//! 2. A device signing with the wrong key is caught
//! 3. Device failures surface as the right error kind
//! 4. The popup delay follows a fresh unlock only

use async_trait::async_trait;
use bitcoin::bip32::DerivationPath;
use hwkeyring_core::{
    hash_personal_message, Device, DeviceFailure, ExtendedPublicKey, Keyring, KeyringConfig,
    KeyringError, KeyringSnapshot, Signature, TransactionFields, UnsignedTransaction,
};
use hwkeyring_emulator::{EmulatedTransaction, SoftwareDevice};
use std::sync::Arc;
use std::time::Duration;

const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";
const ACCOUNT_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const ACCOUNT_1: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
const ACCOUNT_3: &str = "0x90F79bf6EB2c4f870365E785982E1f101E93b906";

fn device() -> Arc<SoftwareDevice> {
    Arc::new(SoftwareDevice::from_mnemonic(DEV_MNEMONIC, "").unwrap())
}

fn fast_config() -> KeyringConfig {
    KeyringConfig {
        popup_delay_ms: 0,
        ..Default::default()
    }
}

fn transfer() -> EmulatedTransaction {
    EmulatedTransaction(TransactionFields {
        tx_type: 2,
        chain_id: 1,
        nonce: "0x7".into(),
        max_fee_per_gas: Some("0x59682f00".into()),
        max_priority_fee_per_gas: Some("0x3b9aca00".into()),
        gas_limit: "0x5208".into(),
        to: Some(ACCOUNT_1.into()),
        value: "0xde0b6b3a7640000".into(),
        ..Default::default()
    })
}

/// Serves public keys from one seed and signatures from another.
struct SwappedSigner {
    keys: SoftwareDevice,
    signer: SoftwareDevice,
}

impl SwappedSigner {
    fn new() -> Self {
        Self {
            keys: SoftwareDevice::from_mnemonic(DEV_MNEMONIC, "").unwrap(),
            signer: SoftwareDevice::from_mnemonic(DEV_MNEMONIC, "other").unwrap(),
        }
    }
}

#[async_trait]
impl Device for SwappedSigner {
    async fn get_extended_public_key(
        &self,
        path: &DerivationPath,
    ) -> Result<ExtendedPublicKey, DeviceFailure> {
        self.keys.get_extended_public_key(path).await
    }

    async fn sign_transaction(
        &self,
        path: &DerivationPath,
        fields: &TransactionFields,
    ) -> Result<Vec<u8>, DeviceFailure> {
        self.signer.sign_transaction(path, fields).await
    }

    async fn sign_message(
        &self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceFailure> {
        self.signer.sign_message(path, message).await
    }

    async fn get_address(&self, path: &DerivationPath) -> Result<String, DeviceFailure> {
        self.signer.get_address(path).await
    }
}

/// Never answers with anything but a broken connection.
struct Unplugged;

#[async_trait]
impl Device for Unplugged {
    async fn get_extended_public_key(
        &self,
        _path: &DerivationPath,
    ) -> Result<ExtendedPublicKey, DeviceFailure> {
        Err(DeviceFailure::Transport("no device found".into()))
    }

    async fn sign_transaction(
        &self,
        _path: &DerivationPath,
        _fields: &TransactionFields,
    ) -> Result<Vec<u8>, DeviceFailure> {
        Err(DeviceFailure::Transport("no device found".into()))
    }

    async fn sign_message(
        &self,
        _path: &DerivationPath,
        _message: &[u8],
    ) -> Result<Vec<u8>, DeviceFailure> {
        Err(DeviceFailure::Transport("no device found".into()))
    }

    async fn get_address(&self, _path: &DerivationPath) -> Result<String, DeviceFailure> {
        Err(DeviceFailure::Transport("no device found".into()))
    }
}

// ============================================================================
// 1. Honest signing
// ============================================================================

#[tokio::test]
async fn test_sign_transaction_recovers_to_account() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.add_accounts(2).await.unwrap();

    let signed = keyring.sign_transaction(ACCOUNT_0, transfer()).await.unwrap();
    // EIP-155 for chain 1.
    assert!(signed.v() == 37 || signed.v() == 38);
    assert_eq!(signed.transaction(), &transfer());

    let recovered = signed.signature().recover_address(
        &bitcoin::secp256k1::Secp256k1::verification_only(),
        transfer().signing_hash().unwrap(),
    );
    assert_eq!(recovered.unwrap(), ACCOUNT_0);
}

#[tokio::test]
async fn test_sign_on_chain_beyond_one_byte_v() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    let mut tx = transfer();
    tx.0.chain_id = 111;
    let signed = keyring.sign_transaction(ACCOUNT_0, tx).await.unwrap();
    assert!(signed.v() == 257 || signed.v() == 258);

    let secp = bitcoin::secp256k1::Secp256k1::verification_only();
    assert_eq!(signed.recover_signer(&secp).unwrap(), ACCOUNT_0);
}

#[tokio::test]
async fn test_restore_then_sign_at_index_three() {
    // Snapshot written by an older session that never cached indices.
    let json = format!(
        r#"{{"hdPath":"m/44'/60'/0'/0","accounts":["{}"],"page":0,"perPage":5}}"#,
        ACCOUNT_3.to_lowercase()
    );
    let snapshot = KeyringSnapshot::from_json(&json).unwrap();
    let mut keyring = Keyring::from_snapshot(device(), fast_config(), snapshot).unwrap();

    let signed = keyring.sign_transaction(ACCOUNT_3, transfer()).await.unwrap();
    let secp = bitcoin::secp256k1::Secp256k1::verification_only();
    assert_eq!(signed.recover_signer(&secp).unwrap(), ACCOUNT_3);
    assert_eq!(keyring.session().index_of(ACCOUNT_3), Some(3));
    assert_eq!(keyring.serialize().paths.get(ACCOUNT_3), Some(&3));
}

#[tokio::test]
async fn test_personal_message_signature() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    let hex_sig = keyring
        .sign_personal_message(&ACCOUNT_0.to_lowercase(), b"Example `personal_sign` message")
        .await
        .unwrap();
    assert!(hex_sig.starts_with("0x"));
    assert_eq!(hex_sig.len(), 132);

    let v = &hex_sig[130..];
    assert!(v == "1b" || v == "1c");
}

#[tokio::test]
async fn test_message_signature_matches_device_output() {
    let device = device();
    let mut keyring = Keyring::new(device.clone(), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    let from_keyring = keyring.sign_message(ACCOUNT_0, b"gm").await.unwrap();

    let path: DerivationPath = "m/44'/60'/0'/0/0".parse().unwrap();
    let raw = device.sign_message(&path, b"gm").await.unwrap();
    let direct = Signature::from_device_bytes(&raw).unwrap();
    assert_eq!(from_keyring, direct.to_hex());
    assert_eq!(
        direct
            .recover_address(
                &bitcoin::secp256k1::Secp256k1::verification_only(),
                hash_personal_message(b"gm")
            )
            .unwrap(),
        ACCOUNT_0
    );
}

#[tokio::test]
async fn test_confirm_address_on_device() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    keyring.add_accounts(2).await.unwrap();

    let shown = keyring
        .confirm_address_on_device(&ACCOUNT_1.to_lowercase())
        .await
        .unwrap();
    assert_eq!(shown, ACCOUNT_1);
}

// ============================================================================
// 2. Wrong signer
// ============================================================================

#[tokio::test]
async fn test_transaction_from_wrong_key_rejected() {
    let mut keyring = Keyring::new(Arc::new(SwappedSigner::new()), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    let err = keyring
        .sign_transaction(ACCOUNT_0, transfer())
        .await
        .unwrap_err();
    match err {
        KeyringError::SignerMismatch {
            expected,
            recovered,
        } => {
            assert_eq!(expected, ACCOUNT_0);
            assert_ne!(recovered, ACCOUNT_0);
        }
        other => panic!("expected SignerMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_message_from_wrong_key_rejected() {
    let mut keyring = Keyring::new(Arc::new(SwappedSigner::new()), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    let err = keyring.sign_message(ACCOUNT_0, b"hi").await.unwrap_err();
    assert!(matches!(err, KeyringError::SignerMismatch { .. }));
}

#[tokio::test]
async fn test_confirm_detects_disagreeing_device() {
    let mut keyring = Keyring::new(Arc::new(SwappedSigner::new()), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    let err = keyring.confirm_address_on_device(ACCOUNT_0).await.unwrap_err();
    assert!(matches!(err, KeyringError::SignerMismatch { .. }));
}

// ============================================================================
// 3. Failure kinds
// ============================================================================

#[tokio::test]
async fn test_user_rejection_is_device_error() {
    let device = device();
    let mut keyring = Keyring::new(device.clone(), fast_config()).unwrap();
    keyring.add_accounts(1).await.unwrap();

    device.set_rejecting(true);
    let err = keyring
        .sign_transaction(ACCOUNT_0, transfer())
        .await
        .unwrap_err();
    match err {
        KeyringError::Device(message) => assert_eq!(message, "Action cancelled by user"),
        other => panic!("expected Device error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unplugged_device_is_transport_error() {
    let mut keyring = Keyring::new(Arc::new(Unplugged), fast_config()).unwrap();
    let err = keyring.add_accounts(1).await.unwrap_err();
    assert!(matches!(err, KeyringError::Transport(_)));
    assert!(!keyring.is_unlocked());
    assert!(keyring.get_accounts().is_empty());
}

#[tokio::test]
async fn test_address_outside_scan_bound() {
    let config = KeyringConfig {
        max_scan_index: 3,
        ..fast_config()
    };
    let mut keyring = Keyring::new(device(), config).unwrap();

    let err = keyring
        .sign_transaction(ACCOUNT_3, transfer())
        .await
        .unwrap_err();
    assert!(matches!(err, KeyringError::UnknownAddress(_)));
}

#[tokio::test]
async fn test_unsupported_operations() {
    let mut keyring = Keyring::new(device(), fast_config()).unwrap();
    assert!(matches!(
        keyring
            .sign_typed_data(ACCOUNT_0, &serde_json::json!({}))
            .await,
        Err(KeyringError::NotSupported(_))
    ));
    assert!(matches!(
        keyring.export_account(ACCOUNT_0).await,
        Err(KeyringError::NotSupported(_))
    ));
}

// ============================================================================
// 4. Popup delay
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_delay_only_after_fresh_unlock() {
    let mut keyring = Keyring::new(device(), KeyringConfig::default()).unwrap();

    let start = tokio::time::Instant::now();
    keyring.sign_message(ACCOUNT_0, b"first").await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(1000));

    let second = tokio::time::Instant::now();
    keyring.sign_message(ACCOUNT_0, b"second").await.unwrap();
    assert!(second.elapsed() < Duration::from_millis(1000));
}
