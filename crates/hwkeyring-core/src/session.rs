//! Session state of a keyring and its serializable snapshot.

use crate::address::{address_from_public_key, to_checksum_address};
use crate::config::DEFAULT_PER_PAGE;
use crate::device::ExtendedPublicKey;
use crate::error::KeyringError;
use bitcoin::bip32::{ChainCode, ChildNumber, Fingerprint, Xpub};
use bitcoin::secp256k1::{PublicKey, Secp256k1, Verification};
use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Public key and chain code cached after a successful unlock.
///
/// Deriving child addresses from this needs no further device interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyMaterial {
    xpub: Xpub,
}

impl PublicKeyMaterial {
    /// Validate what the device returned from the handshake.
    pub fn from_device(key: &ExtendedPublicKey) -> Result<Self, KeyringError> {
        let public_key = PublicKey::from_slice(&key.public_key)
            .map_err(|e| KeyringError::Device(format!("invalid public key from device: {}", e)))?;
        let chain_code: [u8; 32] = key.chain_code.as_slice().try_into().map_err(|_| {
            KeyringError::Device(format!(
                "chain code must be 32 bytes, device sent {}",
                key.chain_code.len()
            ))
        })?;

        Ok(Self {
            xpub: Xpub {
                network: NetworkKind::Main,
                depth: 0,
                parent_fingerprint: Fingerprint::from([0u8; 4]),
                child_number: ChildNumber::Normal { index: 0 },
                public_key,
                chain_code: ChainCode::from(chain_code),
            },
        })
    }

    /// Checksummed address of non-hardened child `index`.
    pub fn address_at<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        index: u32,
    ) -> Result<String, KeyringError> {
        let child_number = ChildNumber::from_normal_idx(index)
            .map_err(|e| KeyringError::DerivationFailed(format!("index {}: {}", index, e)))?;
        let child = self
            .xpub
            .ckd_pub(secp, child_number)
            .map_err(|e| KeyringError::DerivationFailed(e.to_string()))?;
        Ok(address_from_public_key(&child.public_key))
    }
}

/// Mutable bookkeeping of one keyring.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) hd_path: String,
    /// Known accounts, checksummed, in discovery order, no duplicates.
    pub(crate) accounts: Vec<String>,
    /// Checksummed address -> child index.
    pub(crate) path_index: BTreeMap<String, u32>,
    pub(crate) page: u32,
    pub(crate) per_page: u32,
    /// First index derived by the next `add_accounts`.
    pub(crate) unlocked_account: u32,
    pub(crate) public_key: Option<PublicKeyMaterial>,
}

impl Session {
    pub fn new(hd_path: impl Into<String>, per_page: u32) -> Self {
        Self {
            hd_path: hd_path.into(),
            accounts: Vec::new(),
            path_index: BTreeMap::new(),
            page: 0,
            per_page,
            unlocked_account: 0,
            public_key: None,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.public_key.is_some()
    }

    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    pub fn accounts(&self) -> &[String] {
        &self.accounts
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn unlocked_account(&self) -> u32 {
        self.unlocked_account
    }

    /// Cached index of an address, if any. `address` must already be checksummed.
    pub fn index_of(&self, address: &str) -> Option<u32> {
        self.path_index.get(address).copied()
    }

    pub(crate) fn register(&mut self, address: String, index: u32) {
        self.path_index.insert(address, index);
    }

    /// Append a checksummed address unless already known. Returns whether it was added.
    pub(crate) fn push_account(&mut self, address: String) -> bool {
        if self.accounts.contains(&address) {
            return false;
        }
        self.accounts.push(address);
        true
    }

    /// Back to the state of a freshly constructed session, keeping the
    /// configured path and page size.
    pub(crate) fn reset(&mut self) {
        self.accounts.clear();
        self.path_index.clear();
        self.page = 0;
        self.unlocked_account = 0;
        self.public_key = None;
    }

    pub fn snapshot(&self) -> KeyringSnapshot {
        KeyringSnapshot {
            hd_path: self.hd_path.clone(),
            accounts: self.accounts.clone(),
            page: self.page,
            paths: self.path_index.clone(),
            per_page: self.per_page,
            unlocked_account: self.unlocked_account,
        }
    }

    /// Rebuild a locked session from a snapshot.
    ///
    /// Addresses are re-checksummed and duplicates dropped; nothing is derived.
    pub fn from_snapshot(snapshot: KeyringSnapshot) -> Result<Self, KeyringError> {
        crate::config::parse_hd_path(&snapshot.hd_path)?;

        let mut session = Session::new(
            snapshot.hd_path,
            if snapshot.per_page == 0 {
                DEFAULT_PER_PAGE
            } else {
                snapshot.per_page
            },
        );
        session.page = snapshot.page;
        session.unlocked_account = snapshot.unlocked_account;

        for (address, index) in snapshot.paths {
            session.register(to_checksum_address(&address)?, index);
        }
        for address in snapshot.accounts {
            session.push_account(to_checksum_address(&address)?);
        }
        Ok(session)
    }
}

/// Plain structural snapshot of a session.
///
/// Never carries key material: a restored session is always locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringSnapshot {
    #[serde(default = "default_hd_path")]
    pub hd_path: String,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub paths: BTreeMap<String, u32>,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default)]
    pub unlocked_account: u32,
}

fn default_hd_path() -> String {
    crate::config::DEFAULT_HD_PATH.to_string()
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

impl Default for KeyringSnapshot {
    fn default() -> Self {
        Self {
            hd_path: default_hd_path(),
            accounts: Vec::new(),
            page: 0,
            paths: BTreeMap::new(),
            per_page: default_per_page(),
            unlocked_account: 0,
        }
    }
}

impl KeyringSnapshot {
    pub fn to_json(&self) -> Result<String, KeyringError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, KeyringError> {
        Ok(serde_json::from_str(json)?)
    }
}
