//! Account-chain (EVM) identity derived from the same seed.
//!
//! Only the address is produced; no account-chain transactions are built.

use sha3::{Digest, Keccak256};

use crate::error::WalletError;
use crate::keys::{derive_at, Seed, EVM_PATH};

/// An EVM account at `m/44'/60'/0'/0/0`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvmAccount {
    /// EIP-55 mixed-case `0x...` address.
    pub address: String,
    /// Compressed secp256k1 public key, hex.
    pub public_key: String,
}

/// Derive the account-chain identity for `seed`.
pub fn derive_account(seed: &Seed) -> Result<EvmAccount, WalletError> {
    let public_key = derive_at(seed, &EVM_PATH)?.public_key();
    let uncompressed = public_key.0.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    Ok(EvmAccount {
        address: checksum_address(&hash[12..]),
        public_key: hex::encode(public_key.to_bytes()),
    })
}

/// Apply the EIP-55 mixed-case checksum to a 20-byte address.
fn checksum_address(addr: &[u8]) -> String {
    let lower = hex::encode(addr);
    let hash = Keccak256::digest(lower.as_bytes());
    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (hash[i / 2] >> (4 * (1 - i % 2))) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
