//! `ChainClient` over the Esplora REST API (mempool.space, Blockstream).

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::{ScriptBuf, Txid};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use satchel_wallet::{Balance, ChainClient, ObservedTransaction, TxStatus, Utxo, WalletError};

use crate::config::EsploraConfig;
use crate::error::EsploraError;
use crate::types::{parse_txid, AddressInfo, TxJson, UtxoJson};

pub struct EsploraClient {
    client: Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(config: &EsploraConfig) -> Result<Self, EsploraError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EsploraError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, "GET");
        let resp = self.client.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EsploraError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| EsploraError::Decode(format!("{path}: {e}")))
    }

    /// `GET /address/{addr}`
    pub async fn address_info(&self, address: &str) -> Result<AddressInfo, EsploraError> {
        self.get_json(&format!("/address/{address}")).await
    }

    /// `GET /address/{addr}/utxo`
    pub async fn address_utxos(&self, address: &str) -> Result<Vec<UtxoJson>, EsploraError> {
        self.get_json(&format!("/address/{address}/utxo")).await
    }

    /// `GET /address/{addr}/txs`
    pub async fn address_txs(&self, address: &str) -> Result<Vec<TxJson>, EsploraError> {
        self.get_json(&format!("/address/{address}/txs")).await
    }

    /// `GET /tx/{txid}`; `None` if the indexer does not know it.
    pub async fn transaction(&self, txid: &Txid) -> Result<Option<TxJson>, EsploraError> {
        match self.get_json(&format!("/tx/{txid}")).await {
            Ok(tx) => Ok(Some(tx)),
            Err(EsploraError::Status { status, .. })
                if status == StatusCode::NOT_FOUND.as_u16() =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch UTXOs and fill in each one's locking script from its parent
    /// transaction. Each distinct parent is fetched once.
    async fn utxos_with_scripts(&self, address: &str) -> Result<Vec<Utxo>, EsploraError> {
        let entries = self.address_utxos(address).await?;
        let unconfirmed = entries.iter().filter(|e| !e.status.confirmed).count();
        let mut parents: HashMap<Txid, Vec<ScriptBuf>> = HashMap::new();
        let mut utxos = Vec::with_capacity(entries.len());

        for entry in entries {
            let txid = parse_txid(&entry.txid)?;
            if !parents.contains_key(&txid) {
                let tx = self.transaction(&txid).await?.ok_or_else(|| {
                    EsploraError::Decode(format!("parent transaction {txid} not found"))
                })?;
                let scripts = tx
                    .vout
                    .iter()
                    .map(|o| o.script())
                    .collect::<Result<Vec<_>, _>>()?;
                parents.insert(txid, scripts);
            }
            let script_pubkey = parents
                .get(&txid)
                .and_then(|scripts| scripts.get(entry.vout as usize))
                .cloned()
                .ok_or_else(|| {
                    EsploraError::Decode(format!("{txid} has no output {}", entry.vout))
                })?;
            utxos.push(Utxo {
                txid,
                vout: entry.vout,
                value: entry.value,
                script_pubkey,
            });
        }
        tracing::debug!(
            address,
            count = utxos.len(),
            unconfirmed,
            parents = parents.len(),
            "utxos fetched"
        );
        Ok(utxos)
    }

    /// `POST /tx` with a hex body.
    ///
    /// A 4xx other than 429 carries the node's reject reason. Server errors
    /// and rate limiting say nothing about the transaction itself.
    async fn post_tx(&self, raw_tx: &[u8]) -> Result<Txid, EsploraError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(hex::encode(raw_tx))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            return parse_txid(&body);
        }
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            let reason = if body.trim().is_empty() {
                format!("status {}", status.as_u16())
            } else {
                body.trim().to_string()
            };
            return Err(EsploraError::Rejected(reason));
        }
        Err(EsploraError::Status {
            path: "/tx".to_string(),
            status: status.as_u16(),
            body: body.trim().to_string(),
        })
    }
}

#[async_trait]
impl ChainClient for EsploraClient {
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        Ok(self.utxos_with_scripts(address).await?)
    }

    async fn get_balance(&self, address: &str) -> Result<Balance, WalletError> {
        Ok(self.address_info(address).await?.balance())
    }

    async fn get_history(&self, address: &str) -> Result<Vec<ObservedTransaction>, WalletError> {
        let txs = self.address_txs(address).await?;
        let observed = txs
            .into_iter()
            .map(TxJson::into_observed)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(observed)
    }

    async fn get_tx_status(&self, txid: &Txid) -> Result<TxStatus, WalletError> {
        Ok(match self.transaction(txid).await? {
            Some(tx) => TxStatus::from(&tx.status),
            None => TxStatus::NotFound,
        })
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid, WalletError> {
        match self.post_tx(raw_tx).await {
            Ok(txid) => {
                tracing::info!(%txid, "transaction accepted by indexer");
                Ok(txid)
            }
            Err(e @ EsploraError::Rejected(_)) => {
                tracing::warn!(error = %e, "broadcast rejected");
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(error = %e, "broadcast failed");
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for EsploraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsploraClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
