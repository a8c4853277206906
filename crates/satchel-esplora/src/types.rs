//! Esplora JSON payloads and their conversion into wallet types.

use std::str::FromStr;

use bitcoin::{ScriptBuf, Txid};
use satchel_wallet::{Balance, ObservedIo, ObservedTransaction, TxStatus};
use serde::Deserialize;

use crate::error::EsploraError;

/// Funded/spent totals for one side (chain or mempool).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressStats {
    #[serde(default)]
    pub funded_txo_sum: u64,
    #[serde(default)]
    pub spent_txo_sum: u64,
}

/// `GET /address/{addr}`
#[derive(Debug, Clone, Deserialize)]
pub struct AddressInfo {
    pub chain_stats: AddressStats,
    pub mempool_stats: AddressStats,
}

impl AddressInfo {
    pub fn balance(&self) -> Balance {
        let confirmed = self
            .chain_stats
            .funded_txo_sum
            .saturating_sub(self.chain_stats.spent_txo_sum);
        let unconfirmed = i128::from(self.mempool_stats.funded_txo_sum)
            - i128::from(self.mempool_stats.spent_txo_sum);
        Balance {
            confirmed,
            unconfirmed: unconfirmed.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64,
        }
    }
}

/// Confirmation block info attached to transactions and UTXOs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusJson {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_time: Option<i64>,
}

impl From<&StatusJson> for TxStatus {
    fn from(s: &StatusJson) -> Self {
        match (s.confirmed, s.block_height) {
            (true, Some(block_height)) => TxStatus::Confirmed {
                block_height,
                block_time: s.block_time,
            },
            (true, None) => TxStatus::Confirmed {
                block_height: 0,
                block_time: s.block_time,
            },
            (false, _) => TxStatus::Pending,
        }
    }
}

/// `GET /address/{addr}/utxo` element. No locking script; see [`TxJson`].
#[derive(Debug, Clone, Deserialize)]
pub struct UtxoJson {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: StatusJson,
}

/// A transaction output.
#[derive(Debug, Clone, Deserialize)]
pub struct VoutJson {
    /// Locking script, hex.
    pub scriptpubkey: String,
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

impl VoutJson {
    pub fn script(&self) -> Result<ScriptBuf, EsploraError> {
        hex::decode(&self.scriptpubkey)
            .map(ScriptBuf::from_bytes)
            .map_err(|e| EsploraError::Decode(format!("scriptpubkey: {e}")))
    }

    fn observed(&self) -> ObservedIo {
        ObservedIo {
            address: self.scriptpubkey_address.clone(),
            value: self.value,
        }
    }
}

/// A transaction input; `prevout` is absent for coinbase inputs.
#[derive(Debug, Clone, Deserialize)]
pub struct VinJson {
    pub txid: String,
    pub vout: u32,
    pub prevout: Option<VoutJson>,
    #[serde(default)]
    pub is_coinbase: bool,
}

/// `GET /tx/{txid}` and `GET /address/{addr}/txs` element.
#[derive(Debug, Clone, Deserialize)]
pub struct TxJson {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<VinJson>,
    #[serde(default)]
    pub vout: Vec<VoutJson>,
    #[serde(default)]
    pub status: StatusJson,
    pub fee: Option<u64>,
}

impl TxJson {
    pub fn into_observed(self) -> Result<ObservedTransaction, EsploraError> {
        Ok(ObservedTransaction {
            txid: parse_txid(&self.txid)?,
            inputs: self
                .vin
                .iter()
                .filter_map(|i| i.prevout.as_ref().map(VoutJson::observed))
                .collect(),
            outputs: self.vout.iter().map(VoutJson::observed).collect(),
            confirmed: self.status.confirmed,
            block_time: self.status.block_time,
            fee: self.fee,
        })
    }
}

pub fn parse_txid(s: &str) -> Result<Txid, EsploraError> {
    Txid::from_str(s.trim()).map_err(|e| EsploraError::Decode(format!("txid {s:?}: {e}")))
}
