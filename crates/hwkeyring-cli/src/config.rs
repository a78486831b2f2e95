//! CLI configuration, parsed from a TOML file plus environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use hwkeyring_core::KeyringConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub cli: CliSection,

    /// Keyring tunables (HD path, page size, scan bound, popup delay)
    #[serde(default)]
    pub keyring: KeyringConfig,

    /// Device backing the keyring
    #[serde(default)]
    pub device: DeviceSection,
}

/// General CLI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliSection {
    /// JSON file holding the keyring snapshot between runs
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CliSection {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
            log_level: default_log_level(),
        }
    }
}

/// Software device settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSection {
    /// BIP-39 words for the emulated device
    #[serde(default)]
    pub mnemonic: String,

    #[serde(default)]
    pub passphrase: String,
}

fn default_state_path() -> PathBuf {
    PathBuf::from("hwkeyring-state.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `HWKEYRING_STATE_PATH`
    /// - `HWKEYRING_LOG_LEVEL`
    /// - `HWKEYRING_HD_PATH`
    /// - `HWKEYRING_PER_PAGE`
    /// - `HWKEYRING_MNEMONIC`
    /// - `HWKEYRING_PASSPHRASE`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("HWKEYRING_STATE_PATH") {
            self.cli.state_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("HWKEYRING_LOG_LEVEL") {
            self.cli.log_level = v;
        }
        if let Ok(v) = std::env::var("HWKEYRING_HD_PATH") {
            self.keyring.hd_path = v;
        }
        if let Ok(v) = std::env::var("HWKEYRING_PER_PAGE") {
            if let Ok(n) = v.parse::<u32>() {
                self.keyring.per_page = n;
            }
        }
        if let Ok(v) = std::env::var("HWKEYRING_MNEMONIC") {
            self.device.mnemonic = v;
        }
        if let Ok(v) = std::env::var("HWKEYRING_PASSPHRASE") {
            self.device.passphrase = v;
        }
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        self.keyring
            .validate()
            .context("invalid [keyring] section")?;

        anyhow::ensure!(
            !self.device.mnemonic.trim().is_empty(),
            "device.mnemonic must not be empty"
        );
        hwkeyring_emulator::parse_mnemonic(&self.device.mnemonic)
            .context("device.mnemonic is not a valid BIP-39 mnemonic")?;

        anyhow::ensure!(
            !self.cli.state_path.as_os_str().is_empty(),
            "cli.state_path must not be empty"
        );
        Ok(())
    }
}
