//! Account addresses: derivation from public keys and EIP-55 checksums.
//!
//! Every address stored by the keyring goes through [`to_checksum_address`],
//! so lookups in the path index are insensitive to the caller's casing.

use crate::error::KeyringError;
use bitcoin::secp256k1::PublicKey;
use sha3::{Digest, Keccak256};

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Address owned by a secp256k1 public key.
///
/// Last 20 bytes of Keccak-256 over the uncompressed point without its
/// `0x04` prefix, rendered in checksummed form.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    checksum_encode(&hash[12..])
}

/// Parse a `0x`-prefixed (or bare) 40-hex-digit address and return its
/// EIP-55 checksummed form. Input casing is ignored.
pub fn to_checksum_address(address: &str) -> Result<String, KeyringError> {
    let bytes = parse_address(address)?;
    Ok(checksum_encode(&bytes))
}

/// Case-insensitive address comparison without validation.
///
/// Surrounding whitespace is ignored, as in [`to_checksum_address`].
pub fn same_address(a: &str, b: &str) -> bool {
    strip_hex_prefix(a.trim()).eq_ignore_ascii_case(strip_hex_prefix(b.trim()))
}

pub(crate) fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

fn parse_address(address: &str) -> Result<[u8; 20], KeyringError> {
    let digits = strip_hex_prefix(address.trim());
    if digits.len() != 40 {
        return Err(KeyringError::InvalidAddress(address.to_string()));
    }
    let decoded =
        hex::decode(digits).map_err(|_| KeyringError::InvalidAddress(address.to_string()))?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&decoded);
    Ok(out)
}

fn checksum_encode(bytes: &[u8]) -> String {
    let lower = hex::encode(bytes);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
