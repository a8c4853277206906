//! CLI configuration loaded from environment variables.
//!
//! Command-line flags override these; see `main.rs`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use satchel_esplora::EsploraConfig;
use satchel_wallet::{ChainConfig, Network, ScriptType};

/// Fee rate used when neither `--fee-rate` nor `SATCHEL_FEE_RATE` is given.
pub const DEFAULT_FEE_RATE: u64 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub network: Network,
    pub script_type: ScriptType,
    /// Indexer override; `None` uses the network default.
    pub esplora_url: Option<String>,
    /// Root directory for wallet stores. Each network gets a subdirectory.
    pub data_dir: PathBuf,
    /// Default fee rate in sat/vB.
    pub fee_rate: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let network = match lookup("SATCHEL_NETWORK") {
            Some(s) => s
                .parse::<Network>()
                .with_context(|| format!("SATCHEL_NETWORK: unknown network {s:?}"))?,
            None => Network::default(),
        };

        let script_type = match lookup("SATCHEL_SCRIPT_TYPE") {
            Some(s) => s
                .parse::<ScriptType>()
                .with_context(|| format!("SATCHEL_SCRIPT_TYPE: unknown script type {s:?}"))?,
            None => ScriptType::default(),
        };

        let esplora_url = lookup("SATCHEL_ESPLORA_URL").filter(|s| !s.trim().is_empty());

        let data_dir = lookup("SATCHEL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let fee_rate: u64 = match lookup("SATCHEL_FEE_RATE") {
            Some(s) => s
                .trim()
                .parse()
                .context("SATCHEL_FEE_RATE must be a positive integer")?,
            None => DEFAULT_FEE_RATE,
        };
        if fee_rate == 0 {
            anyhow::bail!("SATCHEL_FEE_RATE must be a positive integer");
        }

        Ok(Config {
            network,
            script_type,
            esplora_url,
            data_dir,
            fee_rate,
        })
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig::new(self.network, self.script_type)
    }

    pub fn esplora(&self) -> EsploraConfig {
        match &self.esplora_url {
            Some(url) => EsploraConfig::with_url(url.as_str()),
            None => EsploraConfig::for_network(self.network),
        }
    }

    /// Store directory for the configured network.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join(self.network.to_string())
    }
}

/// `~/.satchel`, or `./.satchel` when there is no home directory.
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".satchel")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.script_type, ScriptType::P2wpkh);
        assert_eq!(config.fee_rate, DEFAULT_FEE_RATE);
        assert!(config.esplora_url.is_none());
        assert!(config.data_dir.ends_with(".satchel"));
        assert_eq!(config.esplora().base_url, satchel_esplora::TESTNET_URL);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("SATCHEL_NETWORK", "mainnet"),
            ("SATCHEL_SCRIPT_TYPE", "p2pkh"),
            ("SATCHEL_ESPLORA_URL", "http://localhost:3002/"),
            ("SATCHEL_DATA_DIR", "/tmp/satchel-test"),
            ("SATCHEL_FEE_RATE", "12"),
        ])
        .unwrap();
        assert_eq!(
            config.chain_config(),
            ChainConfig::new(Network::Mainnet, ScriptType::P2pkh)
        );
        assert_eq!(config.esplora().base_url, "http://localhost:3002");
        assert_eq!(config.store_dir(), PathBuf::from("/tmp/satchel-test/mainnet"));
        assert_eq!(config.fee_rate, 12);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("SATCHEL_NETWORK", "regtest-ish")]).is_err());
        assert!(load(&[("SATCHEL_SCRIPT_TYPE", "p2tr")]).is_err());
        assert!(load(&[("SATCHEL_FEE_RATE", "fast")]).is_err());
        assert!(load(&[("SATCHEL_FEE_RATE", "0")]).is_err());
    }

    #[test]
    fn blank_url_uses_network_default() {
        let config = load(&[("SATCHEL_NETWORK", "mainnet"), ("SATCHEL_ESPLORA_URL", " ")]).unwrap();
        assert_eq!(config.esplora().base_url, satchel_esplora::MAINNET_URL);
    }
}
