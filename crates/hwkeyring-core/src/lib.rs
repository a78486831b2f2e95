//! hwkeyring core
//!
//! Account management and signing backed by a hardware signing device.
//!
//! # Flow
//!
//! 1. [`Keyring::unlock`] asks the device once for the public key and chain
//!    code of the base path (`m/44'/60'/0'/0` by default) and caches them.
//! 2. Account addresses are derived locally from that material, so browsing
//!    pages or adding accounts never needs another device prompt.
//! 3. Signing resolves the account's child index (cached, or found by a
//!    bounded scan), asks the device to sign, and recovers the signer from
//!    the returned signature. A signature recovering to any other address is
//!    rejected with [`KeyringError::SignerMismatch`].
//!
//! # Example
//!
//! ```ignore
//! use hwkeyring_core::{Keyring, KeyringConfig};
//! use std::sync::Arc;
//!
//! let mut keyring = Keyring::new(Arc::new(device), KeyringConfig::default())?;
//! let accounts = keyring.add_accounts(1).await?;
//! let signed = keyring.sign_transaction(&accounts[0], tx).await?;
//! let snapshot = keyring.serialize().to_json()?;
//! ```

pub mod address;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod keyring;
pub mod session;
pub mod signature;
pub mod transaction;


pub use address::{address_from_public_key, keccak256, same_address, to_checksum_address};
pub use config::{
    parse_hd_path, KeyringConfig, DEFAULT_HD_PATH, DEFAULT_PER_PAGE, DELAY_BETWEEN_POPUPS_MS,
    MAX_INDEX,
};
pub use device::{Device, ExtendedPublicKey};
pub use error::{DeviceFailure, KeyringError, UNKNOWN_ERROR};
pub use events::{KeyringEvent, Listener};
pub use keyring::{Keyring, PageAccount, PageDirection, UnlockStatus};
pub use session::{KeyringSnapshot, PublicKeyMaterial, Session};
pub use signature::{hash_personal_message, Signature};
pub use transaction::{AccessListItem, SignedTransaction, TransactionFields, UnsignedTransaction};
