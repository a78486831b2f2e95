//! Events delivered to listeners registered on a keyring

use serde::{Deserialize, Serialize};

/// State changes of a keyring, passed to every registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyringEvent {
    /// A fresh device handshake cached the public key material.
    Unlocked {
        hd_path: String,
    },

    /// `add_accounts` appended new addresses (possibly none).
    AccountsAdded {
        added: Vec<String>,
    },

    AccountRemoved {
        address: String,
    },

    /// The base derivation path changed and the session was reset.
    HdPathChanged {
        hd_path: String,
    },

    /// All session state was cleared.
    DeviceForgotten,
}

/// Callback invoked synchronously for each [`KeyringEvent`].
pub type Listener = Box<dyn Fn(&KeyringEvent) + Send + Sync>;
