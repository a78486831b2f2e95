//! Raw device signatures and signer recovery

use crate::address::{address_from_public_key, keccak256};
use crate::error::KeyringError;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, Verification};

/// Prefix of personal messages (EIP-191 version `0x45`).
pub const PERSONAL_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Recoverable ECDSA signature split into its canonical components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u64,
}

impl Signature {
    /// Split a device signature: 32 bytes of `r`, 32 bytes of `s`, then
    /// the remaining 1..=8 bytes as big-endian `v`.
    pub fn from_device_bytes(raw: &[u8]) -> Result<Self, KeyringError> {
        if raw.len() < 65 {
            return Err(KeyringError::MalformedSignature(format!(
                "expected at least 65 bytes, got {}",
                raw.len()
            )));
        }
        let tail = &raw[64..];
        if tail.len() > 8 {
            return Err(KeyringError::MalformedSignature(format!(
                "recovery value of {} bytes",
                tail.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&raw[..32]);
        s.copy_from_slice(&raw[32..64]);
        let v = tail.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

        Ok(Self { r, s, v })
    }

    /// Split a transaction signature for `chain_id`.
    ///
    /// Some devices return only the low byte of an EIP-155 `v`. When the chain's
    /// `v` values (`chain_id * 2 + 35 + parity`) cannot fit in one byte, a
    /// single-byte `v` is matched against the low bytes of both candidates and
    /// the full value restored; a byte matching neither is rejected.
    pub fn from_transaction_bytes(raw: &[u8], chain_id: u64) -> Result<Self, KeyringError> {
        let mut signature = Self::from_device_bytes(raw)?;
        if raw.len() != 65 || chain_id == 0 {
            return Ok(signature);
        }

        let base = chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35))
            .ok_or_else(|| {
                KeyringError::MalformedSignature(format!("chain id {} out of range", chain_id))
            })?;
        if base < u64::from(u8::MAX) {
            return Ok(signature);
        }

        let truncated = signature.v;
        signature.v = [Some(base), base.checked_add(1)]
            .into_iter()
            .flatten()
            .find(|full| full & 0xff == truncated)
            .ok_or_else(|| {
                KeyringError::MalformedSignature(format!(
                    "recovery byte {} is not an EIP-155 value for chain {}",
                    truncated, chain_id
                ))
            })?;
        Ok(signature)
    }

    /// Normalise `v` to a secp256k1 recovery id.
    ///
    /// Accepts raw ids (0/1), legacy 27/28 and full EIP-155 values
    /// (`chain_id * 2 + 35 + id`). Truncated EIP-155 bytes need the chain id;
    /// see [`Signature::from_transaction_bytes`].
    pub fn recovery_id(&self) -> Result<RecoveryId, KeyringError> {
        let id = match self.v {
            0 | 1 => self.v,
            27 | 28 => self.v - 27,
            v if v >= 35 => (v - 35) % 2,
            v => {
                return Err(KeyringError::MalformedSignature(format!(
                    "unrecognised recovery value {}",
                    v
                )))
            }
        };
        RecoveryId::from_i32(id as i32)
            .map_err(|e| KeyringError::MalformedSignature(e.to_string()))
    }

    /// Recover the checksummed address that produced this signature over `digest`.
    pub fn recover_address<C: Verification>(
        &self,
        secp: &Secp256k1<C>,
        digest: [u8; 32],
    ) -> Result<String, KeyringError> {
        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&self.r);
        compact[32..].copy_from_slice(&self.s);

        let recoverable = RecoverableSignature::from_compact(&compact, self.recovery_id()?)
            .map_err(|e| KeyringError::MalformedSignature(e.to_string()))?;
        let public_key = secp
            .recover_ecdsa(&Message::from_digest(digest), &recoverable)
            .map_err(|e| KeyringError::MalformedSignature(e.to_string()))?;

        Ok(address_from_public_key(&public_key))
    }

    /// `0x`-prefixed hex of `r || s || v`, with `v` as a single byte when it fits.
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(72);
        bytes.extend_from_slice(&self.r);
        bytes.extend_from_slice(&self.s);
        if self.v <= u64::from(u8::MAX) {
            bytes.push(self.v as u8);
        } else {
            let v = self.v.to_be_bytes();
            let first = v.iter().position(|b| *b != 0).unwrap_or(7);
            bytes.extend_from_slice(&v[first..]);
        }
        format!("0x{}", hex::encode(bytes))
    }
}

/// Digest signed for a personal message.
pub fn hash_personal_message(message: &[u8]) -> [u8; 32] {
    let mut prefixed = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 20 + message.len());
    prefixed.extend_from_slice(PERSONAL_MESSAGE_PREFIX.as_bytes());
    prefixed.extend_from_slice(message.len().to_string().as_bytes());
    prefixed.extend_from_slice(message);
    keccak256(&prefixed)
}
