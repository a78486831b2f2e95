//! hwkeyring: run hardware keyring operations from the shell.
//!
//! Session bookkeeping (accounts, cached indices, page cursor) is kept in a
//! JSON state file between invocations.
//!
//! # Usage
//!
//! ```bash
//! hwkeyring --config hwkeyring.toml add 3
//! hwkeyring --config hwkeyring.toml page next
//! hwkeyring --config hwkeyring.toml sign-message 0xf39F... "hello"
//! hwkeyring --config hwkeyring.toml --validate
//! ```

mod commands;
mod config;

use anyhow::{Context, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = PathBuf::from("hwkeyring.toml");
    let mut validate_only = false;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = PathBuf::from(&args[i]);
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("hwkeyring {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other if other.starts_with("--") && positional.is_empty() => {
                anyhow::bail!("Unknown argument: {}", other);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let mut cli_config = if config_path.exists() {
        config::CliConfig::from_file(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        config::CliConfig::default()
    };
    cli_config.apply_env_overrides();
    cli_config
        .validate()
        .context("Configuration validation failed")?;

    std::env::set_var("RUST_LOG", &cli_config.cli.log_level);
    env_logger::init();

    if validate_only {
        println!("Configuration is valid.");
        println!("  State file:    {}", cli_config.cli.state_path.display());
        println!("  HD path:       {}", cli_config.keyring.hd_path);
        println!("  Per page:      {}", cli_config.keyring.per_page);
        println!("  Scan bound:    {}", cli_config.keyring.max_scan_index);
        println!("  Popup delay:   {} ms", cli_config.keyring.popup_delay_ms);
        return Ok(());
    }

    let command = commands::Command::parse(&positional)?;
    log::debug!("Running {:?}", command);

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    match rt.block_on(commands::run(&cli_config, command)) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"hwkeyring: hardware keyring operations

USAGE:
    hwkeyring [OPTIONS] <COMMAND> [ARGS]

OPTIONS:
    -c, --config <PATH>   Config file path (default: hwkeyring.toml)
    --validate            Validate config and exit
    -h, --help            Show this help message
    -V, --version         Show version

COMMANDS:
    unlock                          Fetch the base public key from the device
    add <n>                         Add n accounts from the unlock cursor
    accounts                        List held accounts
    page first|next|prev            Browse derivable accounts
    remove <address>                Drop an account
    sign-message <address> <text>   Sign a personal message
    confirm <address>               Have the device display an address
    forget                          Clear keys and accounts

ENVIRONMENT VARIABLES (override config file):
    HWKEYRING_STATE_PATH    Session state file
    HWKEYRING_LOG_LEVEL     Log level (error/warn/info/debug/trace)
    HWKEYRING_HD_PATH       Base derivation path
    HWKEYRING_PER_PAGE      Accounts per page
    HWKEYRING_MNEMONIC      Mnemonic of the software device
    HWKEYRING_PASSPHRASE    BIP-39 passphrase
"#
    );
}
