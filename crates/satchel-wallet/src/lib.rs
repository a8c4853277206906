//! # satchel-wallet — self-custodial UTXO wallet engine.
//!
//! Derives a single deterministic key from a BIP-39 mnemonic, encodes it as a
//! P2WPKH or P2PKH address, selects coins with size-based fee estimation,
//! and builds, signs and finalizes transactions for broadcast through a
//! [`ChainClient`].
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`mnemonic`] — phrase generation, validation, seed derivation
//! - [`keys`] — Seed, BIP-32 derivation paths, the `Signer` capability
//! - [`address`] — Network, ScriptType, address encoding and parsing
//! - [`evm`] — account-chain address from the same seed
//! - [`coin_selection`] — greedy UTXO selection and fee estimation
//! - [`builder`] — transaction assembly, signing, finalization
//! - [`verify`] — independent input verification
//! - [`chain`] — `ChainClient` trait and indexer types
//! - [`history`] — sent/received summaries
//! - [`encryption`] — AES-256-GCM with Argon2id key derivation
//! - [`storage`] — `KeyValueStore` and its memory and file backends
//! - [`session`] — `WalletSession`, the caller-owned wallet state

pub mod address;
pub mod builder;
pub mod chain;
pub mod coin_selection;
pub mod encryption;
pub mod error;
pub mod evm;
pub mod history;
pub mod keys;
pub mod mnemonic;
pub mod session;
pub mod storage;
pub mod verify;

// Re-exports for convenient access
pub use address::{
    encode, format_coins, format_signed_coins, parse_address, to_locking_script, ChainConfig,
    Network, ScriptType, SATS_PER_COIN,
};
pub use builder::{
    build, finalize, sign_all, sign_input, InputSignature, PaymentOutput, SignedTransaction,
    TransactionBuilder, UnsignedTransaction,
};
pub use chain::{Balance, ChainClient, ObservedIo, ObservedTransaction, TxStatus};
pub use coin_selection::{
    estimate_vsize, CoinSelection, CoinSelector, FeePolicy, SelectionStrategy, Utxo,
    DUST_THRESHOLD,
};
pub use error::WalletError;
pub use evm::{derive_account, EvmAccount};
pub use history::{Direction, TransactionRecord};
pub use keys::{derive_at, validate_private_key, ExtendedKey, Seed, Signer};
pub use session::{SendReceipt, SendState, TransactionRequest, WalletIdentity, WalletSession};
pub use storage::{EncryptedFileStore, KeyValueStore, MemoryStore};
pub use verify::verify_input;
