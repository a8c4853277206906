//! Per-address transaction history.

use serde::{Deserialize, Serialize};

use crate::chain::ObservedTransaction;

/// Whether a transaction moved value out of or into the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

/// A transaction summarised from the wallet's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction id, hex.
    pub id: String,
    /// Net change to the wallet's balance in satoshis.
    pub value_delta: i64,
    pub confirmed: bool,
    /// Block time in unix seconds, once confirmed.
    pub timestamp: Option<i64>,
    pub direction: Direction,
}

/// Summarise one observed transaction against `address`.
///
/// The delta is what the transaction paid to the address minus what it
/// spent from it, so a send's delta includes the fee.
pub fn summarize(tx: &ObservedTransaction, address: &str) -> TransactionRecord {
    let received: i128 = tx
        .outputs
        .iter()
        .filter(|o| o.address.as_deref() == Some(address))
        .map(|o| i128::from(o.value))
        .sum();
    let spent: i128 = tx
        .inputs
        .iter()
        .filter(|i| i.address.as_deref() == Some(address))
        .map(|i| i128::from(i.value))
        .sum();
    let delta = (received - spent).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;

    TransactionRecord {
        id: tx.txid.to_string(),
        value_delta: delta,
        confirmed: tx.confirmed,
        timestamp: tx.block_time,
        direction: if delta < 0 {
            Direction::Sent
        } else {
            Direction::Received
        },
    }
}

/// Summarise a history list, preserving its order.
pub fn summarize_all(txs: &[ObservedTransaction], address: &str) -> Vec<TransactionRecord> {
    txs.iter().map(|tx| summarize(tx, address)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ObservedIo;
    use bitcoin::hashes::Hash;
    use bitcoin::Txid;

    const ME: &str = "tb1qme";
    const THEM: &str = "tb1qthem";

    fn io(address: &str, value: u64) -> ObservedIo {
        ObservedIo {
            address: Some(address.to_string()),
            value,
        }
    }

    fn observed(
        inputs: Vec<ObservedIo>,
        outputs: Vec<ObservedIo>,
        confirmed: bool,
    ) -> ObservedTransaction {
        ObservedTransaction {
            txid: Txid::from_byte_array([7; 32]),
            inputs,
            outputs,
            confirmed,
            block_time: confirmed.then_some(1_700_000_000),
            fee: None,
        }
    }

    #[test]
    fn received_payment() {
        let tx = observed(vec![io(THEM, 60_000)], vec![io(ME, 50_000), io(THEM, 9_000)], true);
        let rec = summarize(&tx, ME);
        assert_eq!(rec.value_delta, 50_000);
        assert_eq!(rec.direction, Direction::Received);
        assert!(rec.confirmed);
        assert_eq!(rec.timestamp, Some(1_700_000_000));
    }

    #[test]
    fn sent_payment_includes_fee() {
        let tx = observed(
            vec![io(ME, 150_000)],
            vec![io(THEM, 100_000), io(ME, 48_000)],
            false,
        );
        let rec = summarize(&tx, ME);
        assert_eq!(rec.value_delta, -102_000);
        assert_eq!(rec.direction, Direction::Sent);
        assert!(!rec.confirmed);
        assert_eq!(rec.timestamp, None);
    }

    #[test]
    fn unrelated_transaction_is_zero_received() {
        let tx = observed(
            vec![ObservedIo {
                address: None,
                value: 1,
            }],
            vec![io(THEM, 1)],
            true,
        );
        let rec = summarize(&tx, ME);
        assert_eq!(rec.value_delta, 0);
        assert_eq!(rec.direction, Direction::Received);
    }

    #[test]
    fn summarize_all_preserves_order() {
        let a = observed(vec![], vec![io(ME, 1)], true);
        let mut b = observed(vec![io(ME, 5)], vec![], true);
        b.txid = Txid::from_byte_array([8; 32]);
        let records = summarize_all(&[a.clone(), b.clone()], ME);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, a.txid.to_string());
        assert_eq!(records[1].id, b.txid.to_string());
        assert_eq!(records[1].direction, Direction::Sent);
    }
}
