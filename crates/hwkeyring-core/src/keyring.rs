//! The keyring: unlock coordination, account derivation and verified signing.
//!
//! All operations take `&mut self`, so one keyring serves one caller at a
//! time and the device never sees two overlapping requests from it.

use crate::address::{same_address, to_checksum_address};
use crate::config::{account_path, parse_hd_path, KeyringConfig};
use crate::device::Device;
use crate::error::KeyringError;
use crate::events::{KeyringEvent, Listener};
use crate::session::{KeyringSnapshot, PublicKeyMaterial, Session};
use crate::signature::{hash_personal_message, Signature};
use crate::transaction::{SignedTransaction, UnsignedTransaction};
use bitcoin::bip32::DerivationPath;
use bitcoin::secp256k1::{All, Secp256k1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Result of [`Keyring::unlock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockStatus {
    /// A device handshake just happened (and probably showed a popup).
    JustUnlocked,
    /// Key material was already cached; the device was not contacted.
    AlreadyUnlocked,
}

impl fmt::Display for UnlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnlockStatus::JustUnlocked => write!(f, "just unlocked"),
            UnlockStatus::AlreadyUnlocked => write!(f, "already unlocked"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDirection {
    First,
    Next,
    Previous,
}

/// One row of the account browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAccount {
    pub address: String,
    pub index: u32,
    /// Filled in by whoever looks up balances; the keyring leaves it empty.
    pub balance: Option<String>,
}

pub struct Keyring {
    device: Arc<dyn Device>,
    session: Session,
    max_scan_index: u32,
    popup_delay: Duration,
    listeners: Vec<Listener>,
    secp: Secp256k1<All>,
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("session", &self.session)
            .field("max_scan_index", &self.max_scan_index)
            .field("popup_delay", &self.popup_delay)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Keyring {
    pub const TYPE: &'static str = "Hardware Keyring";

    /// Create a locked keyring with an empty session.
    pub fn new(device: Arc<dyn Device>, config: KeyringConfig) -> Result<Self, KeyringError> {
        config.validate()?;
        Ok(Self {
            device,
            session: Session::new(config.hd_path.clone(), config.per_page),
            max_scan_index: config.max_scan_index,
            popup_delay: config.popup_delay(),
            listeners: Vec::new(),
            secp: Secp256k1::new(),
        })
    }

    /// Create a locked keyring restored from a snapshot.
    pub fn from_snapshot(
        device: Arc<dyn Device>,
        config: KeyringConfig,
        snapshot: KeyringSnapshot,
    ) -> Result<Self, KeyringError> {
        let mut keyring = Self::new(device, config)?;
        keyring.deserialize(snapshot)?;
        Ok(keyring)
    }

    /// Register a listener for [`KeyringEvent`]s.
    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&KeyringEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn keyring_type(&self) -> &'static str {
        Self::TYPE
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn emit(&self, event: KeyringEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    // ─── Serialization ──────────────────────────────────────────────────

    pub fn serialize(&self) -> KeyringSnapshot {
        self.session.snapshot()
    }

    /// Replace the session with the snapshot's bookkeeping.
    ///
    /// Never contacts the device; the keyring is locked afterwards.
    pub fn deserialize(&mut self, snapshot: KeyringSnapshot) -> Result<(), KeyringError> {
        self.session = Session::from_snapshot(snapshot)?;
        log::debug!(
            "Restored session: {} accounts, {} indexed",
            self.session.accounts.len(),
            self.session.path_index.len()
        );
        Ok(())
    }

    // ─── Unlock ─────────────────────────────────────────────────────────

    pub fn is_unlocked(&self) -> bool {
        self.session.is_unlocked()
    }

    /// Make sure the public key material is cached, asking the device at most once.
    pub async fn unlock(&mut self) -> Result<UnlockStatus, KeyringError> {
        if self.session.is_unlocked() {
            return Ok(UnlockStatus::AlreadyUnlocked);
        }

        let path = parse_hd_path(&self.session.hd_path)?;
        log::debug!("Requesting public key for {}", self.session.hd_path);
        let key = self.device.get_extended_public_key(&path).await?;
        self.session.public_key = Some(PublicKeyMaterial::from_device(&key)?);

        log::info!("Device unlocked for {}", self.session.hd_path);
        self.emit(KeyringEvent::Unlocked {
            hd_path: self.session.hd_path.clone(),
        });
        Ok(UnlockStatus::JustUnlocked)
    }

    /// Give the device time to close the unlock popup before showing the next one.
    async fn wait_after_unlock(&self, status: UnlockStatus) {
        if status == UnlockStatus::JustUnlocked && !self.popup_delay.is_zero() {
            log::debug!("Waiting {:?} between device popups", self.popup_delay);
            tokio::time::sleep(self.popup_delay).await;
        }
    }

    // ─── Derivation ─────────────────────────────────────────────────────

    /// Checksummed address of account `index`. Requires an unlocked keyring.
    pub fn address_at(&self, index: u32) -> Result<String, KeyringError> {
        let material = self
            .session
            .public_key
            .as_ref()
            .ok_or(KeyringError::Locked)?;
        material.address_at(&self.secp, index)
    }

    pub fn set_account_to_unlock(&mut self, index: u32) {
        self.session.unlocked_account = index;
    }

    /// Derive `n` accounts starting at the unlock cursor and add the unknown ones.
    ///
    /// Returns every account held after the call.
    pub async fn add_accounts(&mut self, n: u32) -> Result<Vec<String>, KeyringError> {
        self.unlock().await?;

        let from = self.session.unlocked_account;
        let to = from
            .checked_add(n)
            .ok_or_else(|| KeyringError::DerivationFailed("account range overflow".into()))?;

        let mut added = Vec::new();
        for index in from..to {
            let address = self.address_at(index)?;
            self.session.register(address.clone(), index);
            if self.session.push_account(address.clone()) {
                added.push(address);
            }
        }
        self.session.page = 0;

        log::info!("Added {} account(s), {} held", added.len(), self.session.accounts.len());
        self.emit(KeyringEvent::AccountsAdded { added });
        Ok(self.session.accounts.clone())
    }

    pub fn get_accounts(&self) -> Vec<String> {
        self.session.accounts.clone()
    }

    /// Move the page cursor and derive the accounts on that page.
    pub async fn get_page(
        &mut self,
        direction: PageDirection,
    ) -> Result<Vec<PageAccount>, KeyringError> {
        self.unlock().await?;

        let page = match direction {
            PageDirection::First => 1,
            PageDirection::Next => self.session.page.saturating_add(1),
            PageDirection::Previous => self.session.page.saturating_sub(1).max(1),
        };

        let per_page = self.session.per_page;
        let from = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| KeyringError::DerivationFailed("page out of range".into()))?;
        let to = from
            .checked_add(per_page)
            .ok_or_else(|| KeyringError::DerivationFailed("page out of range".into()))?;

        let mut accounts = Vec::with_capacity(per_page as usize);
        for index in from..to {
            accounts.push(PageAccount {
                address: self.address_at(index)?,
                index,
                balance: None,
            });
        }
        for account in &accounts {
            self.session.register(account.address.clone(), account.index);
        }
        self.session.page = page;
        log::debug!("Page {} covers indices {}..{}", page, from, to);
        Ok(accounts)
    }

    pub async fn get_first_page(&mut self) -> Result<Vec<PageAccount>, KeyringError> {
        self.get_page(PageDirection::First).await
    }

    pub async fn get_next_page(&mut self) -> Result<Vec<PageAccount>, KeyringError> {
        self.get_page(PageDirection::Next).await
    }

    pub async fn get_previous_page(&mut self) -> Result<Vec<PageAccount>, KeyringError> {
        self.get_page(PageDirection::Previous).await
    }

    /// Drop an account. Matching ignores case; the cached index is kept.
    pub fn remove_account(&mut self, address: &str) -> Result<(), KeyringError> {
        let position = self
            .session
            .accounts
            .iter()
            .position(|a| same_address(a, address))
            .ok_or_else(|| KeyringError::NotFound(address.to_string()))?;
        let removed = self.session.accounts.remove(position);

        log::info!("Removed account {}", removed);
        self.emit(KeyringEvent::AccountRemoved { address: removed });
        Ok(())
    }

    /// Child index of `address`, scanning `0..max_scan_index` if it is not cached.
    ///
    /// The scan needs the cached key material but never the device.
    pub fn resolve_index(&mut self, address: &str) -> Result<u32, KeyringError> {
        let checksummed = to_checksum_address(address)?;
        if let Some(index) = self.session.index_of(&checksummed) {
            return Ok(index);
        }

        for index in 0..self.max_scan_index {
            if self.address_at(index)? == checksummed {
                log::debug!("Found {} at index {} by scan", checksummed, index);
                self.session.register(checksummed, index);
                return Ok(index);
            }
        }

        log::warn!(
            "{} not derivable within the first {} indices",
            checksummed,
            self.max_scan_index
        );
        Err(KeyringError::UnknownAddress(checksummed))
    }

    /// Full derivation path of `address`.
    pub fn resolve_path_for_address(
        &mut self,
        address: &str,
    ) -> Result<DerivationPath, KeyringError> {
        let index = self.resolve_index(address)?;
        account_path(&self.session.hd_path, index)
    }

    /// Switch the base path. A different path invalidates everything derived so far.
    pub fn set_hd_path(&mut self, hd_path: &str) -> Result<(), KeyringError> {
        parse_hd_path(hd_path)?;
        if self.session.hd_path == hd_path {
            return Ok(());
        }

        self.session.reset();
        self.session.hd_path = hd_path.to_string();
        log::info!("HD path changed to {}", hd_path);
        self.emit(KeyringEvent::HdPathChanged {
            hd_path: hd_path.to_string(),
        });
        Ok(())
    }

    /// Change the page size. The page cursor restarts when the size changes.
    pub fn set_per_page(&mut self, per_page: u32) -> Result<(), KeyringError> {
        if per_page == 0 {
            return Err(KeyringError::InvalidConfig("per_page must be > 0".into()));
        }
        if self.session.per_page != per_page {
            self.session.per_page = per_page;
            self.session.page = 0;
            log::debug!("Page size set to {}", per_page);
        }
        Ok(())
    }

    /// Clear all session state. The next operation starts with a fresh unlock.
    pub fn forget_device(&mut self) {
        self.session.reset();
        log::info!("Device forgotten");
        self.emit(KeyringEvent::DeviceForgotten);
    }

    // ─── Signing ────────────────────────────────────────────────────────

    /// Sign `transaction` as `address` and verify the signature recovers to it.
    ///
    /// A signature that recovers to any other address is discarded and
    /// reported as [`KeyringError::SignerMismatch`].
    pub async fn sign_transaction<T: UnsignedTransaction>(
        &mut self,
        address: &str,
        transaction: T,
    ) -> Result<SignedTransaction<T>, KeyringError> {
        let expected = to_checksum_address(address)?;
        let status = self.unlock().await?;
        let path = self.resolve_path_for_address(&expected)?;
        self.wait_after_unlock(status).await;

        let fields = transaction.fields();
        log::debug!(
            "Requesting transaction signature (chain {}) for {}",
            fields.chain_id,
            expected
        );
        let raw = self.device.sign_transaction(&path, &fields).await?;
        let signature = Signature::from_transaction_bytes(&raw, fields.chain_id)?;

        let signed = SignedTransaction::new(transaction, signature);
        let recovered = signed.recover_signer(&self.secp)?;
        if recovered != expected {
            log::warn!(
                "Discarding transaction signature: signed by {}, requested {}",
                recovered,
                expected
            );
            return Err(KeyringError::SignerMismatch {
                expected,
                recovered,
            });
        }
        Ok(signed)
    }

    /// Sign a personal message and return `0x`-prefixed `r || s || v`.
    pub async fn sign_personal_message(
        &mut self,
        address: &str,
        message: &[u8],
    ) -> Result<String, KeyringError> {
        let expected = to_checksum_address(address)?;
        let status = self.unlock().await?;
        let path = self.resolve_path_for_address(&expected)?;
        self.wait_after_unlock(status).await;

        log::debug!("Requesting message signature for {}", expected);
        let raw = self.device.sign_message(&path, message).await?;
        let signature = Signature::from_device_bytes(&raw)?;

        let recovered = signature.recover_address(&self.secp, hash_personal_message(message))?;
        if recovered != expected {
            log::warn!(
                "Discarding message signature: signed by {}, requested {}",
                recovered,
                expected
            );
            return Err(KeyringError::SignerMismatch {
                expected,
                recovered,
            });
        }
        Ok(signature.to_hex())
    }

    /// Same as [`Keyring::sign_personal_message`].
    pub async fn sign_message(
        &mut self,
        address: &str,
        message: &[u8],
    ) -> Result<String, KeyringError> {
        self.sign_personal_message(address, message).await
    }

    pub async fn sign_typed_data(
        &mut self,
        _address: &str,
        _typed_data: &serde_json::Value,
    ) -> Result<String, KeyringError> {
        Err(KeyringError::NotSupported("signTypedData"))
    }

    pub async fn export_account(&mut self, _address: &str) -> Result<String, KeyringError> {
        Err(KeyringError::NotSupported("exportAccount"))
    }

    /// Ask the device to compute `address` itself and check it agrees.
    pub async fn confirm_address_on_device(
        &mut self,
        address: &str,
    ) -> Result<String, KeyringError> {
        let expected = to_checksum_address(address)?;
        let status = self.unlock().await?;
        let path = self.resolve_path_for_address(&expected)?;
        self.wait_after_unlock(status).await;

        let reported = self.device.get_address(&path).await?;
        let reported = to_checksum_address(&reported)?;
        if reported != expected {
            log::warn!("Device shows {} for {}", reported, expected);
            return Err(KeyringError::SignerMismatch {
                expected,
                recovered: reported,
            });
        }
        Ok(expected)
    }
}
