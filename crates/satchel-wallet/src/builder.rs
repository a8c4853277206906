//! Transaction assembly, signing and finalization.
//!
//! A send moves through three single-use values:
//! 1. [`UnsignedTransaction`], from [`build`] or [`TransactionBuilder`]
//! 2. one [`InputSignature`] per input, from [`sign_input`]
//! 3. [`SignedTransaction`], from [`finalize`], ready for broadcast
//!
//! Each step consumes or borrows the previous value, so a failure anywhere
//! simply drops the attempt.

use bitcoin::absolute::LockTime;
use bitcoin::consensus;
use bitcoin::hashes::Hash;
use bitcoin::script::PushBytesBuf;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    ecdsa, Amount, CompressedPublicKey, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};

use crate::address::{to_locking_script, ChainConfig, Network, ScriptType, SATS_PER_COIN};
use crate::coin_selection::{CoinSelector, FeePolicy, SelectionStrategy, Utxo};
use crate::error::WalletError;
use crate::keys::Signer;

/// Total supply cap; no output set may exceed it.
pub const MAX_MONEY: u64 = 21_000_000 * SATS_PER_COIN;

/// A payment: recipient address and value in satoshis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutput {
    /// Destination address.
    pub address: String,
    /// Value in satoshis.
    pub value: u64,
}

impl PaymentOutput {
    pub fn new(address: impl Into<String>, value: u64) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }
}

/// A transaction with empty spending data, plus the outputs it spends.
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    tx: Transaction,
    prevouts: Vec<Utxo>,
    fee: u64,
}

impl UnsignedTransaction {
    /// The transaction being built.
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    /// The UTXOs spent, index-aligned with the inputs.
    pub fn prevouts(&self) -> &[Utxo] {
        &self.prevouts
    }

    /// Inputs minus outputs.
    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Sum of the spent UTXO values.
    pub fn total_input(&self) -> u64 {
        self.prevouts.iter().map(|u| u.value).sum()
    }

    /// Sum of the output values.
    pub fn total_output(&self) -> u64 {
        self.tx.output.iter().map(|o| o.value.to_sat()).sum()
    }
}

/// One input's signature and the key that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSignature {
    /// Input index the signature commits to.
    pub index: usize,
    /// ECDSA signature with its sighash flag.
    pub signature: ecdsa::Signature,
    /// Public key to reveal alongside the signature.
    pub public_key: CompressedPublicKey,
    /// Template of the output being spent.
    pub script_type: ScriptType,
}

/// A fully signed transaction in consensus encoding.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    /// The signed transaction.
    pub tx: Transaction,
    /// Consensus serialization (with witness where present).
    pub bytes: Vec<u8>,
    /// Transaction id (hash of the serialization without witness).
    pub txid: Txid,
    /// Fee paid in satoshis.
    pub fee: u64,
}

impl SignedTransaction {
    /// Hex form of the serialization, as broadcast endpoints expect.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Assemble an unsigned transaction from explicit inputs and outputs.
///
/// Version 2, lock time 0, final sequence numbers. Every output address must
/// parse for `network`; the fee is whatever inputs exceed outputs by.
pub fn build(
    inputs: Vec<Utxo>,
    outputs: &[PaymentOutput],
    network: Network,
) -> Result<UnsignedTransaction, WalletError> {
    if inputs.is_empty() {
        return Err(WalletError::InvalidAmount("transaction has no inputs".into()));
    }
    if outputs.is_empty() {
        return Err(WalletError::InvalidAmount("transaction has no outputs".into()));
    }

    let mut tx_outputs = Vec::with_capacity(outputs.len());
    let mut total_out: u64 = 0;
    for out in outputs {
        if out.value == 0 {
            return Err(WalletError::InvalidAmount(format!(
                "output to {} has zero value",
                out.address
            )));
        }
        let script_pubkey = to_locking_script(&out.address, network)?;
        total_out = total_out
            .checked_add(out.value)
            .ok_or_else(|| WalletError::SerializationFailure("output value overflow".into()))?;
        tx_outputs.push(TxOut {
            value: Amount::from_sat(out.value),
            script_pubkey,
        });
    }

    let mut total_in: u64 = 0;
    for utxo in &inputs {
        total_in = total_in
            .checked_add(utxo.value)
            .ok_or_else(|| WalletError::SerializationFailure("input value overflow".into()))?;
    }
    if total_out > total_in {
        return Err(WalletError::InsufficientFunds {
            have: total_in,
            need: total_out,
        });
    }

    let tx_inputs = inputs
        .iter()
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: tx_inputs,
        output: tx_outputs,
    };

    Ok(UnsignedTransaction {
        tx,
        prevouts: inputs,
        fee: total_in - total_out,
    })
}

/// Builder running coin selection ahead of [`build`].
///
/// # Example
/// ```ignore
/// let mut builder = TransactionBuilder::new(config);
/// builder
///     .add_recipient("tb1q...", 100_000)
///     .set_fee_policy(FeePolicy::PerByte(5))
///     .set_change_address(own_address);
/// let unsigned = builder.build(&utxos)?;
/// let signed = sign_all(unsigned, &signer)?;
/// ```
pub struct TransactionBuilder {
    config: ChainConfig,
    recipients: Vec<PaymentOutput>,
    fee_policy: FeePolicy,
    strategy: SelectionStrategy,
    change_address: Option<String>,
}

impl TransactionBuilder {
    /// Create a builder with an absolute zero fee and in-order selection.
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            recipients: Vec::new(),
            fee_policy: FeePolicy::Absolute(0),
            strategy: SelectionStrategy::default(),
            change_address: None,
        }
    }

    /// Add a recipient to the transaction.
    pub fn add_recipient(&mut self, address: impl Into<String>, amount: u64) -> &mut Self {
        self.recipients.push(PaymentOutput::new(address, amount));
        self
    }

    /// Set how the fee is computed.
    pub fn set_fee_policy(&mut self, fee_policy: FeePolicy) -> &mut Self {
        self.fee_policy = fee_policy;
        self
    }

    /// Set the UTXO selection strategy.
    pub fn set_strategy(&mut self, strategy: SelectionStrategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Address that receives change (normally the wallet's own).
    pub fn set_change_address(&mut self, address: impl Into<String>) -> &mut Self {
        self.change_address = Some(address.into());
        self
    }

    /// Validate recipients, select coins and assemble the transaction.
    ///
    /// Recipients come first in output order; change, if any, is last.
    pub fn build(&self, utxos: &[Utxo]) -> Result<UnsignedTransaction, WalletError> {
        if self.recipients.is_empty() {
            return Err(WalletError::InvalidAmount("no recipients".into()));
        }

        let mut total_send: u64 = 0;
        for r in &self.recipients {
            if r.value == 0 {
                return Err(WalletError::InvalidAmount("recipient amount is zero".into()));
            }
            to_locking_script(&r.address, self.config.network)?;
            total_send = total_send
                .checked_add(r.value)
                .ok_or_else(|| WalletError::InvalidAmount("total amount overflow".into()))?;
        }
        let change_address = self
            .change_address
            .as_deref()
            .ok_or_else(|| WalletError::InvalidAddress("no change address set".into()))?;
        to_locking_script(change_address, self.config.network)?;

        let selection = CoinSelector::select(
            utxos,
            total_send,
            self.fee_policy,
            self.strategy,
            self.config.script_type,
        )?;

        let mut outputs = self.recipients.clone();
        if selection.has_change() {
            outputs.push(PaymentOutput::new(change_address, selection.change));
        }

        build(selection.selected, &outputs, self.config.network)
    }
}

/// Produce the signature for input `index`.
///
/// The signer's locking script must equal the script of the UTXO being
/// spent; a key that cannot spend the input is refused rather than producing
/// a signature the network would reject.
pub fn sign_input(
    unsigned: &UnsignedTransaction,
    index: usize,
    signer: &Signer,
) -> Result<InputSignature, WalletError> {
    let prevout = unsigned.prevouts.get(index).ok_or_else(|| {
        WalletError::SigningFailure(format!(
            "input index {index} out of range ({} inputs)",
            unsigned.prevouts.len()
        ))
    })?;
    let script_type = ScriptType::from_script(&prevout.script_pubkey).ok_or_else(|| {
        WalletError::SigningFailure(format!("input {index} spends an unsupported script"))
    })?;
    if signer.locking_script(script_type) != prevout.script_pubkey {
        return Err(WalletError::SigningFailure(format!(
            "signer key does not match the script of input {index}"
        )));
    }

    let digest = sighash(&unsigned.tx, index, prevout, script_type)?;
    let signature = ecdsa::Signature {
        signature: signer.sign(digest),
        sighash_type: EcdsaSighashType::All,
    };
    tracing::debug!(index, %script_type, "input signed");

    Ok(InputSignature {
        index,
        signature,
        public_key: signer.public_key(),
        script_type,
    })
}

/// SIGHASH_ALL digest for input `index`: BIP-143 for P2WPKH, legacy for P2PKH.
pub(crate) fn sighash(
    tx: &Transaction,
    index: usize,
    prevout: &Utxo,
    script_type: ScriptType,
) -> Result<[u8; 32], WalletError> {
    let mut cache = SighashCache::new(tx);
    match script_type {
        ScriptType::P2wpkh => cache
            .p2wpkh_signature_hash(
                index,
                &prevout.script_pubkey,
                Amount::from_sat(prevout.value),
                EcdsaSighashType::All,
            )
            .map(|h| h.to_byte_array())
            .map_err(|e| WalletError::SigningFailure(e.to_string())),
        ScriptType::P2pkh => cache
            .legacy_signature_hash(
                index,
                &prevout.script_pubkey,
                EcdsaSighashType::All.to_u32(),
            )
            .map(|h| h.to_byte_array())
            .map_err(|e| WalletError::SigningFailure(e.to_string())),
    }
}

/// Embed signatures, serialize and compute the txid.
///
/// Exactly one signature per input is required.
pub fn finalize(
    unsigned: UnsignedTransaction,
    signatures: Vec<InputSignature>,
) -> Result<SignedTransaction, WalletError> {
    let input_count = unsigned.tx.input.len();
    if signatures.len() != input_count {
        return Err(WalletError::SigningFailure(format!(
            "expected {input_count} signatures, got {}",
            signatures.len()
        )));
    }

    let total_out = unsigned
        .tx
        .output
        .iter()
        .try_fold(0u64, |acc, o| acc.checked_add(o.value.to_sat()))
        .ok_or_else(|| WalletError::SerializationFailure("output value overflow".into()))?;
    if total_out > MAX_MONEY {
        return Err(WalletError::SerializationFailure(format!(
            "outputs total {total_out} exceeds the money supply"
        )));
    }

    let UnsignedTransaction { mut tx, prevouts, fee } = unsigned;
    let mut seen = vec![false; input_count];
    for sig in signatures {
        let slot = seen.get_mut(sig.index).ok_or_else(|| {
            WalletError::SigningFailure(format!("signature for unknown input {}", sig.index))
        })?;
        if *slot {
            return Err(WalletError::SigningFailure(format!(
                "duplicate signature for input {}",
                sig.index
            )));
        }
        *slot = true;

        if sig.script_type.locking_script(&sig.public_key) != prevouts[sig.index].script_pubkey {
            return Err(WalletError::SigningFailure(format!(
                "signature for input {} does not match its locking script",
                sig.index
            )));
        }

        let input = &mut tx.input[sig.index];
        match sig.script_type {
            ScriptType::P2wpkh => {
                input.witness = Witness::p2wpkh(&sig.signature, &sig.public_key.0);
            }
            ScriptType::P2pkh => {
                let push = PushBytesBuf::try_from(sig.signature.to_vec())
                    .map_err(|e| WalletError::SerializationFailure(e.to_string()))?;
                input.script_sig = ScriptBuf::builder()
                    .push_slice(push)
                    .push_key(&PublicKey::new(sig.public_key.0))
                    .into_script();
            }
        }
    }

    let bytes = consensus::serialize(&tx);
    let txid = tx.compute_txid();
    tracing::debug!(%txid, size = bytes.len(), fee, "transaction finalized");

    Ok(SignedTransaction {
        tx,
        bytes,
        txid,
        fee,
    })
}

/// Sign every input with one key and finalize.
pub fn sign_all(
    unsigned: UnsignedTransaction,
    signer: &Signer,
) -> Result<SignedTransaction, WalletError> {
    let signatures = (0..unsigned.prevouts.len())
        .map(|i| sign_input(&unsigned, i, signer))
        .collect::<Result<Vec<_>, _>>()?;
    finalize(unsigned, signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::encode;

    const RECIPIENT: &str = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";

    fn signer(byte: u8) -> Signer {
        Signer::new(&[byte; 32]).unwrap()
    }

    fn config(script_type: ScriptType) -> ChainConfig {
        ChainConfig::new(Network::Testnet, script_type)
    }

    fn own_address(signer: &Signer, script_type: ScriptType) -> String {
        encode(&signer.public_key(), config(script_type)).to_string()
    }

    fn utxo_for(signer: &Signer, script_type: ScriptType, n: u8, value: u64) -> Utxo {
        Utxo {
            txid: Txid::from_byte_array([n; 32]),
            vout: 0,
            value,
            script_pubkey: signer.locking_script(script_type),
        }
    }

    #[test]
    fn build_conserves_value() {
        let s = signer(1);
        let inputs = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 150_000)];
        let outputs = vec![
            PaymentOutput::new(RECIPIENT, 100_000),
            PaymentOutput::new(own_address(&s, ScriptType::P2wpkh), 48_000),
        ];
        let unsigned = build(inputs, &outputs, Network::Testnet).unwrap();
        assert_eq!(unsigned.fee(), 2_000);
        assert_eq!(
            unsigned.total_input(),
            unsigned.total_output() + unsigned.fee()
        );
        assert_eq!(unsigned.tx().version, Version::TWO);
        assert_eq!(unsigned.tx().lock_time, LockTime::ZERO);
        assert!(unsigned.tx().input.iter().all(|i| i.sequence == Sequence::MAX));
    }

    #[test]
    fn build_rejects_bad_shapes() {
        let s = signer(1);
        let utxo = utxo_for(&s, ScriptType::P2wpkh, 1, 10_000);

        let err = build(vec![], &[PaymentOutput::new(RECIPIENT, 1)], Network::Testnet);
        assert!(matches!(err, Err(WalletError::InvalidAmount(_))));

        let err = build(vec![utxo.clone()], &[], Network::Testnet);
        assert!(matches!(err, Err(WalletError::InvalidAmount(_))));

        let err = build(
            vec![utxo.clone()],
            &[PaymentOutput::new(RECIPIENT, 0)],
            Network::Testnet,
        );
        assert!(matches!(err, Err(WalletError::InvalidAmount(_))));

        let err = build(
            vec![utxo.clone()],
            &[PaymentOutput::new(RECIPIENT, 10_001)],
            Network::Testnet,
        );
        assert!(matches!(err, Err(WalletError::InsufficientFunds { .. })));

        let err = build(
            vec![utxo],
            &[PaymentOutput::new(
                "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu",
                1_000,
            )],
            Network::Testnet,
        );
        assert!(matches!(err, Err(WalletError::InvalidAddress(_))));
    }

    #[test]
    fn builder_adds_change_last() {
        let s = signer(2);
        let utxos = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 150_000)];
        let own = own_address(&s, ScriptType::P2wpkh);
        let mut builder = TransactionBuilder::new(config(ScriptType::P2wpkh));
        builder
            .add_recipient(RECIPIENT, 100_000)
            .set_fee_policy(FeePolicy::Absolute(2_000))
            .set_change_address(own.clone());
        let unsigned = builder.build(&utxos).unwrap();

        let outs = &unsigned.tx().output;
        assert_eq!(outs.len(), 2);
        assert_eq!(outs[0].value.to_sat(), 100_000);
        assert_eq!(outs[1].value.to_sat(), 48_000);
        assert_eq!(outs[1].script_pubkey, s.locking_script(ScriptType::P2wpkh));
    }

    #[test]
    fn builder_omits_dust_change() {
        let s = signer(3);
        let utxos = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 102_300)];
        let mut builder = TransactionBuilder::new(config(ScriptType::P2wpkh));
        builder
            .add_recipient(RECIPIENT, 100_000)
            .set_fee_policy(FeePolicy::Absolute(2_000))
            .set_change_address(own_address(&s, ScriptType::P2wpkh));
        let unsigned = builder.build(&utxos).unwrap();
        assert_eq!(unsigned.tx().output.len(), 1);
        assert_eq!(unsigned.fee(), 2_300);
    }

    #[test]
    fn builder_insufficient_funds() {
        let s = signer(4);
        let utxos = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 150_000)];
        let mut builder = TransactionBuilder::new(config(ScriptType::P2wpkh));
        builder
            .add_recipient(RECIPIENT, 149_500)
            .set_fee_policy(FeePolicy::Absolute(2_000))
            .set_change_address(own_address(&s, ScriptType::P2wpkh));
        let err = builder.build(&utxos).unwrap_err();
        assert_eq!(
            err,
            WalletError::InsufficientFunds {
                have: 150_000,
                need: 151_500
            }
        );
    }

    #[test]
    fn builder_requires_recipient_and_change() {
        let s = signer(5);
        let utxos = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 150_000)];
        let builder = TransactionBuilder::new(config(ScriptType::P2wpkh));
        assert!(matches!(
            builder.build(&utxos),
            Err(WalletError::InvalidAmount(_))
        ));

        let mut builder = TransactionBuilder::new(config(ScriptType::P2wpkh));
        builder.add_recipient(RECIPIENT, 1_000);
        assert!(matches!(
            builder.build(&utxos),
            Err(WalletError::InvalidAddress(_))
        ));
    }

    #[test]
    fn sign_all_p2wpkh() {
        let s = signer(6);
        let inputs = vec![
            utxo_for(&s, ScriptType::P2wpkh, 1, 60_000),
            utxo_for(&s, ScriptType::P2wpkh, 2, 60_000),
        ];
        let outputs = vec![PaymentOutput::new(RECIPIENT, 110_000)];
        let unsigned = build(inputs, &outputs, Network::Testnet).unwrap();
        let signed = sign_all(unsigned, &s).unwrap();

        assert_eq!(signed.fee, 10_000);
        assert_eq!(signed.tx.compute_txid(), signed.txid);
        for input in &signed.tx.input {
            assert_eq!(input.witness.len(), 2);
            assert!(input.script_sig.is_empty());
        }
        let decoded: Transaction = consensus::deserialize(&signed.bytes).unwrap();
        assert_eq!(decoded, signed.tx);
        assert_eq!(signed.to_hex(), hex::encode(&signed.bytes));
    }

    #[test]
    fn sign_all_p2pkh() {
        let s = signer(7);
        let inputs = vec![utxo_for(&s, ScriptType::P2pkh, 1, 60_000)];
        let outputs = vec![PaymentOutput::new(RECIPIENT, 50_000)];
        let unsigned = build(inputs, &outputs, Network::Testnet).unwrap();
        let signed = sign_all(unsigned, &s).unwrap();

        let input = &signed.tx.input[0];
        assert!(input.witness.is_empty());
        assert!(!input.script_sig.is_empty());
        // Legacy-only transactions serialize without the segwit marker.
        assert_eq!(signed.bytes[4], 1);
    }

    #[test]
    fn signing_deterministic() {
        let s = signer(8);
        let make = || {
            let inputs = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 60_000)];
            build(inputs, &[PaymentOutput::new(RECIPIENT, 50_000)], Network::Testnet).unwrap()
        };
        let a = sign_all(make(), &s).unwrap();
        let b = sign_all(make(), &s).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.txid, b.txid);
    }

    #[test]
    fn sign_with_wrong_key_fails() {
        let owner = signer(9);
        let stranger = signer(10);
        let inputs = vec![utxo_for(&owner, ScriptType::P2wpkh, 1, 60_000)];
        let unsigned =
            build(inputs, &[PaymentOutput::new(RECIPIENT, 50_000)], Network::Testnet).unwrap();
        let err = sign_input(&unsigned, 0, &stranger).unwrap_err();
        assert!(matches!(err, WalletError::SigningFailure(_)));
    }

    #[test]
    fn sign_index_out_of_range() {
        let s = signer(11);
        let inputs = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 60_000)];
        let unsigned =
            build(inputs, &[PaymentOutput::new(RECIPIENT, 50_000)], Network::Testnet).unwrap();
        let err = sign_input(&unsigned, 1, &s).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn finalize_rejects_missing_and_duplicate_signatures() {
        let s = signer(12);
        let inputs = vec![
            utxo_for(&s, ScriptType::P2wpkh, 1, 60_000),
            utxo_for(&s, ScriptType::P2wpkh, 2, 60_000),
        ];
        let unsigned =
            build(inputs, &[PaymentOutput::new(RECIPIENT, 100_000)], Network::Testnet).unwrap();
        let first = sign_input(&unsigned, 0, &s).unwrap();

        let err = finalize(unsigned.clone(), vec![first.clone()]).unwrap_err();
        assert!(matches!(err, WalletError::SigningFailure(_)));

        let err = finalize(unsigned, vec![first.clone(), first]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn finalize_rejects_signature_for_other_script() {
        let s = signer(14);
        let inputs = vec![utxo_for(&s, ScriptType::P2wpkh, 1, 60_000)];
        let unsigned =
            build(inputs, &[PaymentOutput::new(RECIPIENT, 50_000)], Network::Testnet).unwrap();

        let mut wrong_type = sign_input(&unsigned, 0, &s).unwrap();
        wrong_type.script_type = ScriptType::P2pkh;
        let err = finalize(unsigned.clone(), vec![wrong_type]).unwrap_err();
        assert!(err.to_string().contains("does not match"));

        let mut wrong_key = sign_input(&unsigned, 0, &s).unwrap();
        wrong_key.public_key = signer(15).public_key();
        let err = finalize(unsigned, vec![wrong_key]).unwrap_err();
        assert!(matches!(err, WalletError::SigningFailure(_)));
    }

    #[test]
    fn finalize_rejects_value_above_money_supply() {
        let s = signer(13);
        let inputs = vec![utxo_for(&s, ScriptType::P2wpkh, 1, MAX_MONEY + 10_000)];
        let unsigned = build(
            inputs,
            &[PaymentOutput::new(RECIPIENT, MAX_MONEY + 1)],
            Network::Testnet,
        )
        .unwrap();
        let err = sign_all(unsigned, &s).unwrap_err();
        assert!(matches!(err, WalletError::SerializationFailure(_)));
    }
}
