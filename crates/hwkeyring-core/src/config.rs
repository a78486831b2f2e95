//! Keyring configuration

use crate::error::KeyringError;
use bitcoin::bip32::DerivationPath;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// BIP-44 base path for Ethereum accounts.
pub const DEFAULT_HD_PATH: &str = "m/44'/60'/0'/0";

/// Accounts shown per page in the account browser.
pub const DEFAULT_PER_PAGE: u32 = 5;

/// Upper bound of the index scan used to locate an address with no cached index.
pub const MAX_INDEX: u32 = 1000;

/// Minimum gap between the unlock popup and a signing popup, in milliseconds.
pub const DELAY_BETWEEN_POPUPS_MS: u64 = 1000;

/// Tunables of a keyring instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringConfig {
    /// Base derivation path; account `i` lives at `<hd_path>/i`.
    #[serde(default = "default_hd_path")]
    pub hd_path: String,

    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Indices `0..max_scan_index` are tried when resolving an unindexed address.
    #[serde(default = "default_max_scan_index")]
    pub max_scan_index: u32,

    #[serde(default = "default_popup_delay_ms")]
    pub popup_delay_ms: u64,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            hd_path: default_hd_path(),
            per_page: default_per_page(),
            max_scan_index: default_max_scan_index(),
            popup_delay_ms: default_popup_delay_ms(),
        }
    }
}

fn default_hd_path() -> String {
    DEFAULT_HD_PATH.to_string()
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_max_scan_index() -> u32 {
    MAX_INDEX
}

fn default_popup_delay_ms() -> u64 {
    DELAY_BETWEEN_POPUPS_MS
}

impl KeyringConfig {
    pub fn popup_delay(&self) -> Duration {
        Duration::from_millis(self.popup_delay_ms)
    }

    pub fn validate(&self) -> Result<(), KeyringError> {
        parse_hd_path(&self.hd_path)?;
        if self.per_page == 0 {
            return Err(KeyringError::InvalidConfig("per_page must be > 0".into()));
        }
        if self.max_scan_index == 0 {
            return Err(KeyringError::InvalidConfig(
                "max_scan_index must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a base path such as `m/44'/60'/0'/0`.
pub fn parse_hd_path(path: &str) -> Result<DerivationPath, KeyringError> {
    DerivationPath::from_str(path)
        .map_err(|e| KeyringError::InvalidPath(format!("{}: {}", path, e)))
}

/// Path of account `index` below `hd_path`.
pub(crate) fn account_path(hd_path: &str, index: u32) -> Result<DerivationPath, KeyringError> {
    parse_hd_path(&format!("{}/{}", hd_path.trim_end_matches('/'), index))
}
