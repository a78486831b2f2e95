//! Keyring commands run by the CLI.
//!
//! Each invocation restores the session from the state file, runs one
//! command, and writes the session back. Key material never touches disk.

use crate::config::CliConfig;
use anyhow::{Context, Result};
use hwkeyring_core::{Keyring, KeyringEvent, KeyringSnapshot, PageAccount, PageDirection};
use hwkeyring_emulator::SoftwareDevice;
use std::path::Path;
use std::sync::Arc;

/// One keyring operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Unlock,
    Add(u32),
    Accounts,
    Page(PageDirection),
    Remove(String),
    SignMessage { address: String, message: String },
    Confirm(String),
    Forget,
}

impl Command {
    /// Parse the positional words following the options.
    pub fn parse(words: &[String]) -> Result<Self> {
        let (name, rest) = words
            .split_first()
            .context("missing command (try --help)")?;
        let arg = |i: usize, what: &str| -> Result<String> {
            rest.get(i)
                .cloned()
                .with_context(|| format!("{} requires <{}>", name, what))
        };

        let command = match name.as_str() {
            "unlock" => Command::Unlock,
            "add" => {
                let n = arg(0, "count")?;
                Command::Add(
                    n.parse()
                        .with_context(|| format!("invalid account count: {}", n))?,
                )
            }
            "accounts" => Command::Accounts,
            "page" => match arg(0, "first|next|prev")?.as_str() {
                "first" => Command::Page(PageDirection::First),
                "next" => Command::Page(PageDirection::Next),
                "prev" | "previous" => Command::Page(PageDirection::Previous),
                other => anyhow::bail!("unknown page direction: {}", other),
            },
            "remove" => Command::Remove(arg(0, "address")?),
            "sign-message" => Command::SignMessage {
                address: arg(0, "address")?,
                message: rest[1..].join(" "),
            },
            "confirm" => Command::Confirm(arg(0, "address")?),
            "forget" => Command::Forget,
            other => anyhow::bail!("Unknown command: {}", other),
        };

        if let Command::SignMessage { message, .. } = &command {
            anyhow::ensure!(!message.is_empty(), "sign-message requires <text>");
        }
        Ok(command)
    }
}

/// Load the snapshot stored at `path`, if any.
pub fn load_state(path: &Path) -> Result<Option<KeyringSnapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let snapshot = KeyringSnapshot::from_json(&json)
        .with_context(|| format!("Corrupt state file: {}", path.display()))?;
    Ok(Some(snapshot))
}

pub fn save_state(path: &Path, snapshot: &KeyringSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = snapshot.to_json()?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write state file: {}", path.display()))?;
    Ok(())
}

/// Build a keyring over the configured device, restoring saved state.
///
/// The configured HD path and page size win over the saved ones. A changed
/// path drops the restored accounts; a changed page size rewinds the cursor.
pub fn open_keyring(config: &CliConfig) -> Result<Keyring> {
    let device = SoftwareDevice::from_mnemonic(&config.device.mnemonic, &config.device.passphrase)
        .context("Failed to initialise device")?;
    let device = Arc::new(device);

    let mut keyring = match load_state(&config.cli.state_path)? {
        Some(snapshot) => Keyring::from_snapshot(device, config.keyring.clone(), snapshot)?,
        None => Keyring::new(device, config.keyring.clone())?,
    }
    .with_listener(log_event);
    keyring
        .set_hd_path(&config.keyring.hd_path)
        .context("invalid keyring.hd_path")?;
    keyring
        .set_per_page(config.keyring.per_page)
        .context("invalid keyring.per_page")?;
    Ok(keyring)
}

fn log_event(event: &KeyringEvent) {
    match event {
        KeyringEvent::Unlocked { hd_path } => log::debug!("Device unlocked at {}", hd_path),
        KeyringEvent::AccountsAdded { added } => log::debug!("Added {} account(s)", added.len()),
        KeyringEvent::AccountRemoved { address } => log::debug!("Removed {}", address),
        KeyringEvent::HdPathChanged { hd_path } => log::debug!("HD path set to {}", hd_path),
        KeyringEvent::DeviceForgotten => log::debug!("Device forgotten"),
    }
}

fn format_page(page: &[PageAccount]) -> Vec<String> {
    page.iter()
        .map(|a| format!("{:>4}  {}", a.index, a.address))
        .collect()
}

/// Run `command` and return the lines to print.
pub async fn execute(keyring: &mut Keyring, command: Command) -> Result<Vec<String>> {
    let lines = match command {
        Command::Unlock => {
            let status = keyring.unlock().await?;
            vec![format!("{} ({})", keyring.keyring_type(), status)]
        }
        Command::Add(n) => keyring.add_accounts(n).await?,
        Command::Accounts => keyring.get_accounts(),
        Command::Page(direction) => format_page(&keyring.get_page(direction).await?),
        Command::Remove(address) => {
            keyring.remove_account(&address)?;
            vec![format!("removed {}", address)]
        }
        Command::SignMessage { address, message } => {
            vec![keyring.sign_personal_message(&address, message.as_bytes()).await?]
        }
        Command::Confirm(address) => {
            let shown = keyring.confirm_address_on_device(&address).await?;
            vec![format!("device confirms {}", shown)]
        }
        Command::Forget => {
            keyring.forget_device();
            vec!["forgotten".to_string()]
        }
    };
    Ok(lines)
}

/// Open the keyring, run one command, persist the session.
pub async fn run(config: &CliConfig, command: Command) -> Result<Vec<String>> {
    let mut keyring = open_keyring(config)?;
    let result = execute(&mut keyring, command).await;
    // Bookkeeping changes made before a failure (an unlock, a resolved index) are kept.
    save_state(&config.cli.state_path, &keyring.serialize())?;
    result
}
