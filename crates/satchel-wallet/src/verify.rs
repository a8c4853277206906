//! Independent verification of a finalized input.
//!
//! Recomputes the sighash from the signed transaction and checks the revealed
//! key and signature against the spent output's locking script, without
//! trusting anything recorded during signing.

use bitcoin::script::Instruction;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{ecdsa, CompressedPublicKey};

use crate::address::ScriptType;
use crate::builder::{sighash, SignedTransaction};
use crate::coin_selection::Utxo;
use crate::error::WalletError;

/// Verify input `index` of `signed` as a spend of `prevout`.
pub fn verify_input(
    signed: &SignedTransaction,
    index: usize,
    prevout: &Utxo,
) -> Result<(), WalletError> {
    let input = signed.tx.input.get(index).ok_or_else(|| {
        WalletError::SigningFailure(format!("input index {index} out of range"))
    })?;
    if input.previous_output != prevout.outpoint() {
        return Err(WalletError::SigningFailure(format!(
            "input {index} does not spend {}",
            prevout.outpoint()
        )));
    }
    let script_type = ScriptType::from_script(&prevout.script_pubkey).ok_or_else(|| {
        WalletError::SigningFailure(format!("input {index} spends an unsupported script"))
    })?;

    let (sig_bytes, key_bytes): (Vec<u8>, Vec<u8>) = match script_type {
        ScriptType::P2wpkh => {
            if input.witness.len() != 2 {
                return Err(WalletError::SigningFailure(format!(
                    "input {index} witness has {} items, expected 2",
                    input.witness.len()
                )));
            }
            let sig = input.witness.nth(0).unwrap_or_default();
            let key = input.witness.nth(1).unwrap_or_default();
            (sig.to_vec(), key.to_vec())
        }
        ScriptType::P2pkh => {
            let mut pushes = Vec::with_capacity(2);
            for instruction in input.script_sig.instructions() {
                match instruction {
                    Ok(Instruction::PushBytes(bytes)) => pushes.push(bytes.as_bytes().to_vec()),
                    _ => {
                        return Err(WalletError::SigningFailure(format!(
                            "input {index} scriptSig is not two pushes"
                        )));
                    }
                }
            }
            let [sig, key]: [Vec<u8>; 2] = pushes.try_into().map_err(|_| {
                WalletError::SigningFailure(format!("input {index} scriptSig is not two pushes"))
            })?;
            (sig, key)
        }
    };

    let public_key = CompressedPublicKey::from_slice(&key_bytes)
        .map_err(|e| WalletError::SigningFailure(format!("input {index}: {e}")))?;
    if script_type.locking_script(&public_key) != prevout.script_pubkey {
        return Err(WalletError::SigningFailure(format!(
            "input {index}: revealed key does not hash to the locking script"
        )));
    }
    let signature = ecdsa::Signature::from_slice(&sig_bytes)
        .map_err(|e| WalletError::SigningFailure(format!("input {index}: {e}")))?;
    if signature.sighash_type != EcdsaSighashType::All {
        return Err(WalletError::SigningFailure(format!(
            "input {index}: unexpected sighash type {}",
            signature.sighash_type
        )));
    }

    let digest = sighash(&signed.tx, index, prevout, script_type)?;
    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&Message::from_digest(digest), &signature.signature, &public_key.0)
        .map_err(|_| {
            WalletError::SigningFailure(format!("input {index}: signature does not verify"))
        })
}
