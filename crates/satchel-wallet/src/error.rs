//! Wallet error types.

use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Invalid BIP-39 mnemonic phrase.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Key derivation failure (malformed seed).
    #[error("derivation failure: {0}")]
    DerivationFailure(String),

    /// Address does not parse, or does not match the expected network or
    /// script template.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Insufficient funds to cover the transaction amount plus fees.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Available value in satoshis.
        have: u64,
        /// Required value in satoshis.
        need: u64,
    },

    /// Invalid monetary amount or fee rate.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Key/hash mismatch, malformed key, or missing signature.
    #[error("signing failure: {0}")]
    SigningFailure(String),

    /// Encoding invariant violated (e.g. value overflow).
    #[error("serialization failure: {0}")]
    SerializationFailure(String),

    /// Chain indexer unreachable or returned an unusable response.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The network refused the transaction.
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    /// Persistence collaborator failure.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// Another send is already running on this session.
    #[error("a send operation is already in progress")]
    SendInProgress,

    /// Wrong password for an encrypted store entry.
    #[error("invalid password")]
    InvalidPassword,

    /// Stored data is corrupted or has an invalid format.
    #[error("corrupted data: {0}")]
    CorruptedData(String),

    /// Unrecognised network, script type or selection strategy name.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
