//! Seed management, BIP-32 key derivation and the signing capability.
//!
//! Derivation walks one of a handful of fixed paths from the 64-byte BIP-39
//! seed down to a single secp256k1 key. Paths are compile-time constants, so
//! the only runtime failure is a malformed seed.

use std::fmt;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::secp256k1::{ecdsa, All, Message, Secp256k1, SecretKey};
use bitcoin::{CompressedPublicKey, NetworkKind, ScriptBuf};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::address::ScriptType;
use crate::error::WalletError;

/// Seed length in bytes (BIP-39 PBKDF2 output).
pub const SEED_LEN: usize = 64;

/// Native segwit receive path, `m/84'/0'/0'/0/0`.
pub const P2WPKH_PATH: [ChildNumber; 5] = [
    ChildNumber::Hardened { index: 84 },
    ChildNumber::Hardened { index: 0 },
    ChildNumber::Hardened { index: 0 },
    ChildNumber::Normal { index: 0 },
    ChildNumber::Normal { index: 0 },
];

/// Legacy receive path, `m/44'/1'/0'/0/0`.
pub const P2PKH_PATH: [ChildNumber; 5] = [
    ChildNumber::Hardened { index: 44 },
    ChildNumber::Hardened { index: 1 },
    ChildNumber::Hardened { index: 0 },
    ChildNumber::Normal { index: 0 },
    ChildNumber::Normal { index: 0 },
];

/// Account-chain (EVM) path, `m/44'/60'/0'/0/0`.
pub const EVM_PATH: [ChildNumber; 5] = [
    ChildNumber::Hardened { index: 44 },
    ChildNumber::Hardened { index: 60 },
    ChildNumber::Hardened { index: 0 },
    ChildNumber::Normal { index: 0 },
    ChildNumber::Normal { index: 0 },
];

/// A 64-byte BIP-39 seed, the root of all key derivation.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LEN],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
        Self { bytes }
    }

    /// Create a seed from a slice, rejecting any length other than 64.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WalletError> {
        let bytes: [u8; SEED_LEN] = bytes.try_into().map_err(|_| {
            WalletError::DerivationFailure(format!(
                "seed must be {SEED_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A BIP-32 extended private key at some depth below the master.
pub struct ExtendedKey {
    xpriv: Xpriv,
}

impl ExtendedKey {
    /// Compressed public key of this node.
    pub fn public_key(&self) -> CompressedPublicKey {
        let secp = Secp256k1::signing_only();
        CompressedPublicKey(self.xpriv.private_key.public_key(&secp))
    }

    /// Turn this node into a signing capability. The extended key itself is
    /// erased when it goes out of scope here.
    pub fn into_signer(self) -> Signer {
        Signer::from_secret_key(self.xpriv.private_key)
    }
}

impl Drop for ExtendedKey {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("depth", &self.xpriv.depth)
            .field("child_number", &self.xpriv.child_number)
            .finish_non_exhaustive()
    }
}

/// Walk `path` from the master key of `seed`.
///
/// The network kind only affects xprv serialization, which this crate never
/// exposes, so mainnet is used throughout.
pub fn derive_at(seed: &Seed, path: &[ChildNumber]) -> Result<ExtendedKey, WalletError> {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(NetworkKind::Main, seed.as_bytes())
        .map_err(|e| WalletError::DerivationFailure(e.to_string()))?;
    let path = DerivationPath::from(path.to_vec());
    let xpriv = master
        .derive_priv(&secp, &path)
        .map_err(|e| WalletError::DerivationFailure(e.to_string()))?;
    Ok(ExtendedKey { xpriv })
}

/// Check that `bytes` is a usable secp256k1 secret: 32 bytes, non-zero and
/// below the curve order.
pub fn validate_private_key(bytes: &[u8]) -> Result<SecretKey, WalletError> {
    if bytes.len() != 32 {
        return Err(WalletError::SigningFailure(format!(
            "private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    SecretKey::from_slice(bytes)
        .map_err(|_| WalletError::SigningFailure("private key out of range".into()))
}

/// The capability to sign 32-byte digests with one private key.
///
/// Constructed explicitly from a key; it never reaches for wallet state.
/// Not `Clone`: the key is held once and erased on drop.
pub struct Signer {
    secret: SecretKey,
    public: CompressedPublicKey,
    secp: Secp256k1<All>,
}

impl Signer {
    /// Build a signer from raw private key bytes.
    pub fn new(secret_bytes: &[u8]) -> Result<Self, WalletError> {
        Ok(Self::from_secret_key(validate_private_key(secret_bytes)?))
    }

    /// Build a signer from an already validated secret key.
    pub fn from_secret_key(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public = CompressedPublicKey(secret.public_key(&secp));
        Self {
            secret,
            public,
            secp,
        }
    }

    /// The public key matching this signer's private key.
    pub fn public_key(&self) -> CompressedPublicKey {
        self.public
    }

    /// Sign a sighash digest (RFC 6979 deterministic ECDSA, low-S).
    pub fn sign(&self, digest: [u8; 32]) -> ecdsa::Signature {
        let msg = Message::from_digest(digest);
        self.secp.sign_ecdsa(&msg, &self.secret)
    }

    /// The locking script this key can spend for a given script type.
    pub fn locking_script(&self, script_type: ScriptType) -> ScriptBuf {
        script_type.locking_script(&self.public)
    }
}

impl Drop for Signer {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("public_key", &self.public.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(byte: u8) -> Seed {
        Seed::from_bytes([byte; SEED_LEN])
    }

    #[test]
    fn seed_debug_hides_bytes() {
        let s = Seed::from_bytes([0xAB; SEED_LEN]);
        let debug = format!("{s:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ab"));
    }

    #[test]
    fn seed_from_slice_rejects_wrong_length() {
        let err = Seed::from_slice(&[1u8; 32]).unwrap_err();
        assert!(matches!(err, WalletError::DerivationFailure(_)));
        assert!(Seed::from_slice(&[1u8; 64]).is_ok());
    }

    #[test]
    fn derive_deterministic() {
        let a = derive_at(&seed(1), &P2WPKH_PATH).unwrap();
        let b = derive_at(&seed(1), &P2WPKH_PATH).unwrap();
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn master_differs_from_leaf() {
        let leaf = derive_at(&seed(2), &P2WPKH_PATH).unwrap();
        let master = derive_at(&seed(2), &[]).unwrap();
        assert_ne!(leaf.public_key(), master.public_key());
        assert!(format!("{leaf:?}").contains("depth: 5"));
    }

    #[test]
    fn paths_yield_distinct_keys() {
        let s = seed(3);
        let segwit = derive_at(&s, &P2WPKH_PATH).unwrap().public_key();
        let legacy = derive_at(&s, &P2PKH_PATH).unwrap().public_key();
        let evm = derive_at(&s, &EVM_PATH).unwrap().public_key();
        assert_ne!(segwit, legacy);
        assert_ne!(segwit, evm);
        assert_ne!(legacy, evm);
    }

    #[test]
    fn derive_unique_per_seed() {
        let a = derive_at(&seed(4), &P2WPKH_PATH).unwrap().public_key();
        let b = derive_at(&seed(5), &P2WPKH_PATH).unwrap().public_key();
        assert_ne!(a, b);
    }

    #[test]
    fn validate_private_key_bounds() {
        assert!(validate_private_key(&[0u8; 32]).is_err());
        assert!(validate_private_key(&[0xFF; 32]).is_err());
        assert!(validate_private_key(&[1u8; 31]).is_err());
        assert!(validate_private_key(&[1u8; 32]).is_ok());
    }

    #[test]
    fn signer_public_key_matches_derivation() {
        let key = derive_at(&seed(6), &P2WPKH_PATH).unwrap();
        let expected = key.public_key();
        let signer = key.into_signer();
        assert_eq!(signer.public_key(), expected);
    }

    #[test]
    fn signer_signature_verifies() {
        let signer = Signer::new(&[7u8; 32]).unwrap();
        let digest = [0x42u8; 32];
        let sig = signer.sign(digest);
        let secp = Secp256k1::verification_only();
        let msg = Message::from_digest(digest);
        assert!(secp.verify_ecdsa(&msg, &sig, &signer.public_key().0).is_ok());
    }

    #[test]
    fn signer_deterministic() {
        let signer = Signer::new(&[8u8; 32]).unwrap();
        assert_eq!(signer.sign([1u8; 32]), signer.sign([1u8; 32]));
    }

    #[test]
    fn signer_rejects_malformed_key() {
        let err = Signer::new(&[0u8; 32]).unwrap_err();
        assert!(matches!(err, WalletError::SigningFailure(_)));
    }

    #[test]
    fn signer_debug_hides_secret() {
        let signer = Signer::new(&[9u8; 32]).unwrap();
        let debug = format!("{signer:?}");
        assert!(debug.contains("Signer"));
        assert!(!debug.contains(&hex::encode([9u8; 32])));
    }
}
