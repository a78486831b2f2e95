//! Software signing device for hwkeyring.
//!
//! Holds a BIP-39 seed in memory and answers the same requests a hardware
//! wallet would. Meant for dry runs and tests: the seed lives in process
//! memory, so nothing here offers the guarantees of real hardware.
//!
//! Transaction digests use [`fields_digest`] (Keccak-256 of the JSON field
//! bag). Callers signing through the emulator use [`EmulatedTransaction`] as
//! their format class so the keyring recovers against the same digest.

use async_trait::async_trait;
use bip39::{Language, Mnemonic};
use bitcoin::bip32::{DerivationPath, Xpriv, Xpub};
use secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::Network;
use hwkeyring_core::{
    address_from_public_key, hash_personal_message, keccak256, Device, DeviceFailure,
    ExtendedPublicKey, KeyringError, TransactionFields, UnsignedTransaction,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
}

/// Parse a mnemonic from words
pub fn parse_mnemonic(words: &str) -> Result<Mnemonic, EmulatorError> {
    Mnemonic::parse_in(Language::English, words)
        .map_err(|e| EmulatorError::InvalidMnemonic(e.to_string()))
}

/// Digest the emulator signs for a transaction.
pub fn fields_digest(fields: &TransactionFields) -> Result<[u8; 32], serde_json::Error> {
    Ok(keccak256(&serde_json::to_vec(fields)?))
}

/// Format class matching the emulator's transaction digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatedTransaction(pub TransactionFields);

impl UnsignedTransaction for EmulatedTransaction {
    fn fields(&self) -> TransactionFields {
        self.0.clone()
    }

    fn signing_hash(&self) -> Result<[u8; 32], KeyringError> {
        fields_digest(&self.0).map_err(|e| KeyringError::Encoding(e.to_string()))
    }
}

/// In-memory device derived from a BIP-39 mnemonic.
pub struct SoftwareDevice {
    seed: Zeroizing<[u8; 64]>,
    rejecting: AtomicBool,
    handshakes: AtomicUsize,
}

impl SoftwareDevice {
    pub fn from_mnemonic(words: &str, passphrase: &str) -> Result<Self, EmulatorError> {
        let mnemonic = parse_mnemonic(words)?;
        Ok(Self {
            seed: Zeroizing::new(mnemonic.to_seed(passphrase)),
            rejecting: AtomicBool::new(false),
            handshakes: AtomicUsize::new(0),
        })
    }

    /// Make the device refuse every request, as if the user pressed cancel.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    /// Number of public key requests served so far.
    pub fn handshake_count(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    fn check_confirmed(&self) -> Result<(), DeviceFailure> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(DeviceFailure::rejected("Action cancelled by user"));
        }
        Ok(())
    }

    fn derive(&self, path: &DerivationPath) -> Result<Xpriv, DeviceFailure> {
        let secp = Secp256k1::new();
        let master = Xpriv::new_master(Network::Bitcoin, &self.seed[..])
            .map_err(|e| DeviceFailure::rejected(format!("derivation failed: {}", e)))?;
        master
            .derive_priv(&secp, path)
            .map_err(|e| DeviceFailure::rejected(format!("derivation failed: {}", e)))
    }

    /// `r || s || v`, with `v` as minimal big-endian bytes of `id + v_offset`.
    fn sign_digest(&self, key: &SecretKey, digest: [u8; 32], v_offset: u64) -> Vec<u8> {
        let secp = Secp256k1::new();
        let signature = secp.sign_ecdsa_recoverable(&Message::from_digest(digest), key);
        let (recovery_id, compact) = signature.serialize_compact();
        let v = (recovery_id.to_i32() as u64 + v_offset).to_be_bytes();
        let skip = v.iter().take(7).take_while(|b| **b == 0).count();

        let mut raw = Vec::with_capacity(64 + v.len() - skip);
        raw.extend_from_slice(&compact);
        raw.extend_from_slice(&v[skip..]);
        raw
    }
}

#[async_trait]
impl Device for SoftwareDevice {
    async fn get_extended_public_key(
        &self,
        path: &DerivationPath,
    ) -> Result<ExtendedPublicKey, DeviceFailure> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        self.check_confirmed()?;

        let secp = Secp256k1::new();
        let xpub = Xpub::from_priv(&secp, &self.derive(path)?);
        log::debug!("Emulator exported public key for {}", path);
        Ok(ExtendedPublicKey {
            public_key: xpub.public_key.serialize().to_vec(),
            chain_code: xpub.chain_code.to_bytes().to_vec(),
        })
    }

    async fn sign_transaction(
        &self,
        path: &DerivationPath,
        fields: &TransactionFields,
    ) -> Result<Vec<u8>, DeviceFailure> {
        self.check_confirmed()?;
        let digest = fields_digest(fields)
            .map_err(|e| DeviceFailure::rejected(format!("cannot encode transaction: {}", e)))?;
        // Full EIP-155 value, or legacy 27/28 without a chain id.
        let v_offset = match fields.chain_id {
            0 => 27,
            chain_id => chain_id
                .checked_mul(2)
                .and_then(|v| v.checked_add(35))
                .ok_or_else(|| {
                    DeviceFailure::rejected(format!("chain id {} out of range", chain_id))
                })?,
        };
        let key = self.derive(path)?;
        Ok(self.sign_digest(&key.private_key, digest, v_offset))
    }

    async fn sign_message(
        &self,
        path: &DerivationPath,
        message: &[u8],
    ) -> Result<Vec<u8>, DeviceFailure> {
        self.check_confirmed()?;
        let key = self.derive(path)?;
        Ok(self.sign_digest(&key.private_key, hash_personal_message(message), 27))
    }

    async fn get_address(&self, path: &DerivationPath) -> Result<String, DeviceFailure> {
        self.check_confirmed()?;
        let secp = Secp256k1::new();
        let key = self.derive(path)?;
        Ok(address_from_public_key(&key.private_key.public_key(&secp)))
    }
}
