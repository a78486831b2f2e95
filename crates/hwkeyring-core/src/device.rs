//! Signing device capability.
//!
//! The keyring never talks to hardware directly. Whatever drives the
//! physical device (USB/HID bridge, vendor SDK, software emulator) implements
//! [`Device`] and is handed to [`crate::Keyring::new`].

use crate::error::DeviceFailure;
use crate::transaction::TransactionFields;
use async_trait::async_trait;
use bitcoin::bip32::DerivationPath;
use serde::{Deserialize, Serialize};

/// Public key and chain code returned by the unlock handshake.
///
/// Bytes are kept as the device sent them and validated by the keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPublicKey {
    /// SEC1 encoded public key, compressed (33 bytes) or uncompressed (65 bytes).
    pub public_key: Vec<u8>,
    /// 32-byte BIP-32 chain code.
    pub chain_code: Vec<u8>,
}

/// Capability offered by a signing device.
///
/// Every call may suspend for as long as the user takes to confirm on the
/// device. Implementations must not retry on their own.
#[async_trait]
pub trait Device: Send + Sync {
    /// Public key and chain code at `path`. Usually triggers a device popup.
    async fn get_extended_public_key(
        &self,
        path: &DerivationPath,
    ) -> Result<ExtendedPublicKey, DeviceFailure>;

    /// Sign the transaction described by `fields` with the key at `path`.
    ///
    /// Returns `r || s || v`: 64 bytes followed by one or more bytes of `v`.
    async fn sign_transaction(
        &self,
        path: &DerivationPath,
        fields: &TransactionFields,
    ) -> Result<Vec<u8>, DeviceFailure>;

    /// Sign a personal message with the key at `path`. Returns 65 bytes `r || s || v`.
    async fn sign_message(
        &self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceFailure>;

    /// Address the device itself computes for `path`.
    async fn get_address(&self, path: &DerivationPath) -> Result<String, DeviceFailure>;
}
