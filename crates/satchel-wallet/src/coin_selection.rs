//! Greedy coin selection with size-based fee estimation.
//!
//! Selects UTXOs until the target plus the estimated fee is covered. The fee
//! estimate comes from fixed per-input and per-output virtual sizes for the
//! wallet's script type and always assumes two outputs (payment and change).
//! Change at or below [`DUST_THRESHOLD`] is not worth an output and is added
//! to the fee instead.

use std::fmt;
use std::str::FromStr;

use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

use crate::address::ScriptType;
use crate::error::WalletError;

/// Smallest change output worth creating, in satoshis.
pub const DUST_THRESHOLD: u64 = 546;

/// Outputs assumed by the fee estimate.
pub const ESTIMATED_OUTPUTS: usize = 2;

// Virtual sizes in bytes.
const P2WPKH_OVERHEAD_VSIZE: u64 = 11;
const P2WPKH_INPUT_VSIZE: u64 = 68;
const P2WPKH_OUTPUT_VSIZE: u64 = 31;
const P2PKH_OVERHEAD_VSIZE: u64 = 10;
const P2PKH_INPUT_VSIZE: u64 = 148;
const P2PKH_OUTPUT_VSIZE: u64 = 34;

/// An unspent output owned by the wallet address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Transaction that created the output.
    pub txid: Txid,
    /// Output index within that transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    /// Locking script of the output.
    pub script_pubkey: ScriptBuf,
}

impl Utxo {
    /// The outpoint an input spending this UTXO references.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

/// How the fee is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// Satoshis per virtual byte, multiplied by the estimated vsize.
    PerByte(u64),
    /// A fixed fee regardless of size.
    Absolute(u64),
}

impl FeePolicy {
    /// Fee for a transaction spending `inputs` inputs.
    pub fn fee_for(&self, inputs: usize, script_type: ScriptType) -> u64 {
        match *self {
            FeePolicy::PerByte(rate) => {
                estimate_vsize(script_type, inputs, ESTIMATED_OUTPUTS).saturating_mul(rate)
            }
            FeePolicy::Absolute(fee) => fee,
        }
    }

    fn validate(&self) -> Result<(), WalletError> {
        match *self {
            FeePolicy::PerByte(0) => Err(WalletError::InvalidAmount(
                "fee rate must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}

/// Order in which candidate UTXOs are consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Accumulate in the order supplied by the chain client.
    #[default]
    InOrder,
    /// Spend every available UTXO (sweep).
    All,
    /// Accumulate from the largest value down.
    LargestFirst,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionStrategy::InOrder => f.write_str("in-order"),
            SelectionStrategy::All => f.write_str("all"),
            SelectionStrategy::LargestFirst => f.write_str("largest-first"),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-order" | "inorder" => Ok(SelectionStrategy::InOrder),
            "all" => Ok(SelectionStrategy::All),
            "largest-first" | "largest" => Ok(SelectionStrategy::LargestFirst),
            other => Err(WalletError::InvalidConfig(format!(
                "unknown selection strategy: {other}"
            ))),
        }
    }
}

/// Estimated virtual size of a transaction with the given shape.
pub fn estimate_vsize(script_type: ScriptType, inputs: usize, outputs: usize) -> u64 {
    let (overhead, per_input, per_output) = match script_type {
        ScriptType::P2wpkh => (P2WPKH_OVERHEAD_VSIZE, P2WPKH_INPUT_VSIZE, P2WPKH_OUTPUT_VSIZE),
        ScriptType::P2pkh => (P2PKH_OVERHEAD_VSIZE, P2PKH_INPUT_VSIZE, P2PKH_OUTPUT_VSIZE),
    };
    overhead
        .saturating_add(per_input.saturating_mul(inputs as u64))
        .saturating_add(per_output.saturating_mul(outputs as u64))
}

/// Result of coin selection: which UTXOs to spend and the fee/change breakdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// Selected UTXOs, in spending order.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs.
    pub total_input: u64,
    /// Fee paid, including any change folded in as dust.
    pub fee: u64,
    /// Change returned to the wallet; zero when no change output is made.
    pub change: u64,
}

impl CoinSelection {
    /// Whether a change output should be created.
    pub fn has_change(&self) -> bool {
        self.change > 0
    }
}

/// Greedy coin selector.
pub struct CoinSelector;

impl CoinSelector {
    /// Select UTXOs to pay `target` satoshis.
    ///
    /// On success `total_input == target + fee + change` and the change is
    /// either zero or above the dust threshold. If every candidate is used
    /// and the total still falls short, nothing is selected and
    /// `InsufficientFunds` reports the full balance against the need.
    pub fn select(
        utxos: &[Utxo],
        target: u64,
        fee_policy: FeePolicy,
        strategy: SelectionStrategy,
        script_type: ScriptType,
    ) -> Result<CoinSelection, WalletError> {
        if target == 0 {
            return Err(WalletError::InvalidAmount("target must be non-zero".into()));
        }
        fee_policy.validate()?;

        let mut candidates: Vec<&Utxo> = utxos.iter().collect();
        if strategy == SelectionStrategy::LargestFirst {
            // Stable sort keeps supplied order among equal values.
            candidates.sort_by(|a, b| b.value.cmp(&a.value));
        }

        let mut selected = Vec::new();
        let mut total: u64 = 0;

        for utxo in candidates {
            selected.push(utxo.clone());
            total = total.saturating_add(utxo.value);

            if strategy == SelectionStrategy::All {
                continue;
            }
            let fee = fee_policy.fee_for(selected.len(), script_type);
            if total >= target.saturating_add(fee) {
                return Ok(Self::finish(selected, total, target, fee));
            }
        }

        let fee = fee_policy.fee_for(selected.len(), script_type);
        let need = target.saturating_add(fee);
        if strategy == SelectionStrategy::All && !selected.is_empty() && total >= need {
            return Ok(Self::finish(selected, total, target, fee));
        }

        tracing::debug!(have = total, need, inputs = selected.len(), "coin selection short");
        Err(WalletError::InsufficientFunds { have: total, need })
    }

    fn finish(selected: Vec<Utxo>, total: u64, target: u64, fee: u64) -> CoinSelection {
        let mut change = total.saturating_sub(target).saturating_sub(fee);
        let mut fee = fee;
        if change <= DUST_THRESHOLD {
            fee += change;
            change = 0;
        }
        tracing::debug!(
            inputs = selected.len(),
            total,
            target,
            fee,
            change,
            "coins selected"
        );
        CoinSelection {
            selected,
            total_input: total,
            fee,
            change,
        }
    }
}
