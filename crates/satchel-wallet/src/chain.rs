//! Chain indexer interface consumed by the wallet session.
//!
//! Implementations are remote data sources (see the `satchel-esplora` crate
//! for the REST client). Every call may fail with
//! [`WalletError::NetworkError`]; nothing here retries.

use async_trait::async_trait;
use bitcoin::Txid;
use serde::{Deserialize, Serialize};

use crate::coin_selection::Utxo;
use crate::error::WalletError;

/// Address balance as reported by the indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Chain funded minus chain spent.
    pub confirmed: u64,
    /// Mempool funded minus mempool spent; negative while a spend is pending.
    pub unconfirmed: i64,
}

impl Balance {
    /// Confirmed plus unconfirmed, clamped at zero.
    pub fn total(&self) -> u64 {
        let total = i128::from(self.confirmed) + i128::from(self.unconfirmed);
        u64::try_from(total.max(0)).unwrap_or(u64::MAX)
    }
}

/// One side (input or output) of an observed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedIo {
    /// Address of the script, when it has one.
    pub address: Option<String>,
    /// Value in satoshis.
    pub value: u64,
}

/// A transaction touching the wallet address, as the indexer reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransaction {
    pub txid: Txid,
    /// Spent outputs (inputs' prevouts).
    pub inputs: Vec<ObservedIo>,
    pub outputs: Vec<ObservedIo>,
    pub confirmed: bool,
    /// Block time in unix seconds, once confirmed.
    pub block_time: Option<i64>,
    pub fee: Option<u64>,
}

/// Confirmation status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Known to the indexer, not yet in a block.
    Pending,
    /// Included in a block.
    Confirmed {
        block_height: u32,
        block_time: Option<i64>,
    },
    /// Unknown to the indexer.
    NotFound,
}

/// Remote chain data source and broadcast endpoint.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Spendable outputs locked to `address`, locking scripts included.
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError>;

    /// Confirmed and unconfirmed balance of `address`.
    async fn get_balance(&self, address: &str) -> Result<Balance, WalletError>;

    /// Transactions that fund or spend `address`, newest first.
    async fn get_history(&self, address: &str) -> Result<Vec<ObservedTransaction>, WalletError>;

    /// Confirmation status of `txid`.
    async fn get_tx_status(&self, txid: &Txid) -> Result<TxStatus, WalletError>;

    /// Submit a serialized transaction. Returns the txid the network
    /// assigned, or [`WalletError::BroadcastRejected`] with its reason.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, WalletError>;
}
