//! Indexer endpoint configuration.

use std::time::Duration;

use satchel_wallet::Network;

/// Default mainnet indexer.
pub const MAINNET_URL: &str = "https://mempool.space/api";

/// Default testnet indexer.
pub const TESTNET_URL: &str = "https://mempool.space/testnet4/api";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Where and how to reach the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EsploraConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl EsploraConfig {
    /// Default endpoint for `network`.
    pub fn for_network(network: Network) -> Self {
        let base_url = match network {
            Network::Mainnet => MAINNET_URL,
            Network::Testnet => TESTNET_URL,
        };
        Self::with_url(base_url)
    }

    /// Custom endpoint with the default timeout.
    pub fn with_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Default for EsploraConfig {
    fn default() -> Self {
        Self::for_network(Network::default())
    }
}
