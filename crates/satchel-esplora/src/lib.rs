//! # satchel-esplora — Esplora REST chain client.
//!
//! Implements [`satchel_wallet::ChainClient`] over the Esplora HTTP API
//! served by mempool.space and Blockstream:
//!
//! - `GET /address/{addr}` for balances
//! - `GET /address/{addr}/utxo` for UTXOs, completed with locking scripts
//!   from `GET /tx/{txid}`
//! - `GET /address/{addr}/txs` for history
//! - `GET /tx/{txid}` for confirmation status
//! - `POST /tx` for broadcast

pub mod client;
pub mod config;
pub mod error;
pub mod types;

pub use client::EsploraClient;
pub use config::{EsploraConfig, MAINNET_URL, TESTNET_URL};
pub use error::EsploraError;
