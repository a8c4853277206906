//! Address encoding for the wallet's UTXO chain.
//!
//! The wallet owns exactly one address, produced from the compressed public
//! key at the path selected by [`ScriptType`]:
//! - P2WPKH: bech32 `bc1q...` (mainnet) or `tb1q...` (testnet)
//! - P2PKH: base58check `1...` (mainnet) or `m...`/`n...` (testnet)
//!
//! Recipient addresses go the other way, through [`to_locking_script`], and
//! must belong to the configured [`Network`].

use std::fmt;
use std::str::FromStr;

use bitcoin::address::{AddressType, NetworkUnchecked};
use bitcoin::bip32::ChildNumber;
use bitcoin::{Address, CompressedPublicKey, KnownHrp, NetworkKind, Script, ScriptBuf};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::keys::{P2PKH_PATH, P2WPKH_PATH};

/// Satoshis per whole coin. Display only; the engine works in satoshis.
pub const SATS_PER_COIN: u64 = 100_000_000;

/// Network identifier determining address prefixes and version bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Mainnet (`bc1...`, `1...`).
    Mainnet,
    /// Testnet (`tb1...`, `m...`/`n...`).
    #[default]
    Testnet,
}

impl Network {
    /// Bech32 human-readable part for this network.
    pub fn hrp(self) -> KnownHrp {
        match self {
            Network::Mainnet => KnownHrp::Mainnet,
            Network::Testnet => KnownHrp::Testnets,
        }
    }

    /// Base58 version selector for this network.
    pub fn kind(self) -> NetworkKind {
        match self {
            Network::Mainnet => NetworkKind::Main,
            Network::Testnet => NetworkKind::Test,
        }
    }

    fn bitcoin_network(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => f.write_str("mainnet"),
            Network::Testnet => f.write_str("testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" | "testnet4" => Ok(Network::Testnet),
            other => Err(WalletError::InvalidConfig(format!("unknown network: {other}"))),
        }
    }
}

/// Locking-script template of the wallet's own address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    /// Pay-to-witness-pubkey-hash (native segwit).
    #[default]
    P2wpkh,
    /// Pay-to-pubkey-hash (legacy).
    P2pkh,
}

impl ScriptType {
    /// The fixed derivation path for this script type.
    pub fn derivation_path(self) -> &'static [ChildNumber] {
        match self {
            ScriptType::P2wpkh => &P2WPKH_PATH,
            ScriptType::P2pkh => &P2PKH_PATH,
        }
    }

    /// Locking script paying to `public_key` under this template.
    pub fn locking_script(self, public_key: &CompressedPublicKey) -> ScriptBuf {
        match self {
            ScriptType::P2wpkh => ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash()),
            ScriptType::P2pkh => ScriptBuf::new_p2pkh(&public_key.pubkey_hash()),
        }
    }

    /// Recognize a wallet-spendable template, if any.
    pub fn from_script(script: &Script) -> Option<Self> {
        if script.is_p2wpkh() {
            Some(ScriptType::P2wpkh)
        } else if script.is_p2pkh() {
            Some(ScriptType::P2pkh)
        } else {
            None
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptType::P2wpkh => f.write_str("p2wpkh"),
            ScriptType::P2pkh => f.write_str("p2pkh"),
        }
    }
}

impl FromStr for ScriptType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "p2wpkh" | "segwit" => Ok(ScriptType::P2wpkh),
            "p2pkh" | "legacy" => Ok(ScriptType::P2pkh),
            other => Err(WalletError::InvalidConfig(format!("unknown script type: {other}"))),
        }
    }
}

/// Network and address template the engine is parameterised over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub network: Network,
    pub script_type: ScriptType,
}

impl ChainConfig {
    pub fn new(network: Network, script_type: ScriptType) -> Self {
        Self {
            network,
            script_type,
        }
    }
}

/// Encode `public_key` as an address under `config`.
pub fn encode(public_key: &CompressedPublicKey, config: ChainConfig) -> Address {
    match config.script_type {
        ScriptType::P2wpkh => Address::p2wpkh(public_key, config.network.hrp()),
        ScriptType::P2pkh => Address::p2pkh(public_key.pubkey_hash(), config.network.kind()),
    }
}

/// Parse a recipient address and check it belongs to `network` and uses a
/// standard script template.
pub fn parse_address(address: &str, network: Network) -> Result<Address, WalletError> {
    let unchecked = address
        .trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| WalletError::InvalidAddress(format!("{address}: {e}")))?;
    let checked = unchecked
        .require_network(network.bitcoin_network())
        .map_err(|_| WalletError::InvalidAddress(format!("{address}: not a {network} address")))?;
    match checked.address_type() {
        Some(
            AddressType::P2pkh
            | AddressType::P2sh
            | AddressType::P2wpkh
            | AddressType::P2wsh
            | AddressType::P2tr,
        ) => Ok(checked),
        _ => Err(WalletError::InvalidAddress(format!(
            "{address}: non-standard script template"
        ))),
    }
}

/// The locking script a payment to `address` must carry.
pub fn to_locking_script(address: &str, network: Network) -> Result<ScriptBuf, WalletError> {
    Ok(parse_address(address, network)?.script_pubkey())
}

/// Render satoshis as whole coins with eight decimals.
pub fn format_coins(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_COIN, sats % SATS_PER_COIN)
}

/// Signed variant of [`format_coins`] for balance and history deltas.
pub fn format_signed_coins(sats: i64) -> String {
    let sign = if sats < 0 { "-" } else { "" };
    format!("{sign}{}", format_coins(sats.unsigned_abs()))
}
