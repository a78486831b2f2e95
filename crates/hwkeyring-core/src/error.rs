//! Error taxonomy for the keyring

use thiserror::Error;

/// Message used when the device fails without saying why.
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Errors surfaced by every public keyring operation.
///
/// None of these are retried internally. `SignerMismatch` in particular is
/// always fatal to the call that produced it.
#[derive(Error, Debug)]
pub enum KeyringError {
    /// The device was reachable but reported an application-level failure
    /// (user rejection, unsupported request, locked app).
    #[error("Device error: {0}")]
    Device(String),

    /// The device could not be reached or the exchange broke down.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown address: {0}")]
    UnknownAddress(String),

    /// The recovered signer differs from the address the caller asked for.
    #[error("Signature doesn't match the right address: expected {expected}, recovered {recovered}")]
    SignerMismatch { expected: String, recovered: String },

    #[error("Address {0} not found in this keyring")]
    NotFound(String),

    #[error("Not supported on this device: {0}")]
    NotSupported(&'static str),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Invalid keyring configuration: {0}")]
    InvalidConfig(String),

    /// The caller's format class could not encode the transaction.
    #[error("Transaction encoding failed: {0}")]
    Encoding(String),

    #[error("Keyring is locked, unlock the device first")]
    Locked,

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// Failure reported by a [`crate::Device`] implementation.
///
/// Keeps application-level rejections apart from transport breakdowns so the
/// keyring can surface them as distinct error kinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceFailure {
    #[error("device rejected the request: {}", message.as_deref().unwrap_or(UNKNOWN_ERROR))]
    Rejected { message: Option<String> },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl DeviceFailure {
    /// Rejection carrying the device's own message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: Some(message.into()),
        }
    }
}

impl From<DeviceFailure> for KeyringError {
    fn from(failure: DeviceFailure) -> Self {
        match failure {
            DeviceFailure::Rejected { message } => {
                let message = message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| UNKNOWN_ERROR.to_string());
                KeyringError::Device(message)
            }
            DeviceFailure::Transport(description) => {
                let description = if description.is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    description
                };
                KeyringError::Transport(description)
            }
        }
    }
}
