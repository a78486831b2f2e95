//! Transactions as seen by the keyring.
//!
//! The keyring does not encode transactions. The caller's format class
//! (anything implementing [`UnsignedTransaction`]) knows how to describe itself
//! to the device and how to compute the digest a signature commits to. The
//! keyring forwards the field bag untouched and only uses the digest to
//! recover the signer.

use crate::error::KeyringError;
use crate::signature::Signature;
use bitcoin::secp256k1::{Secp256k1, Verification};
use serde::{Deserialize, Serialize};

/// One entry of an access list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: String,
    pub storage_keys: Vec<String>,
}

/// Semantic transaction fields sent to the device.
///
/// Quantities are hex strings exactly as the caller provided them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFields {
    /// Envelope type: 0 legacy, 1 access list, 2 dynamic fee.
    #[serde(rename = "type")]
    pub tx_type: u8,
    pub chain_id: u64,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
    pub gas_limit: String,
    /// `None` for contract creation.
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    #[serde(default)]
    pub access_list: Vec<AccessListItem>,
    #[serde(default)]
    pub data: String,
}

/// A caller-declared transaction format that can be signed by the keyring.
pub trait UnsignedTransaction: Send + Sync {
    /// Field bag forwarded to the device.
    fn fields(&self) -> TransactionFields;

    /// Digest the device signature commits to under this format.
    ///
    /// Fails with [`KeyringError::Encoding`] when the transaction cannot be
    /// encoded; the signature is then never accepted.
    fn signing_hash(&self) -> Result<[u8; 32], KeyringError>;
}

/// A transaction together with its verified signature.
///
/// Immutable once built: the caller's value is kept as-is and only exposed
/// by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction<T> {
    transaction: T,
    signature: Signature,
}

impl<T: UnsignedTransaction> SignedTransaction<T> {
    pub(crate) fn new(transaction: T, signature: Signature) -> Self {
        Self {
            transaction,
            signature,
        }
    }

    pub fn transaction(&self) -> &T {
        &self.transaction
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn r(&self) -> [u8; 32] {
        self.signature.r
    }

    pub fn s(&self) -> [u8; 32] {
        self.signature.s
    }

    pub fn v(&self) -> u64 {
        self.signature.v
    }

    /// Address that produced the signature.
    pub fn recover_signer<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
    ) -> Result<String, KeyringError> {
        self.signature
            .recover_address(secp, self.transaction.signing_hash()?)
    }

    pub fn into_parts(self) -> (T, Signature) {
        (self.transaction, self.signature)
    }
}
