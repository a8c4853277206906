//! Wallet session: the caller-owned root of all wallet state.
//!
//! A [`WalletSession`] holds the wallet identity (address, public key,
//! mnemonic and the [`Signer`]), the chain client and the persistence store.
//! It permits at most one send at a time; a second concurrent send is
//! rejected with [`WalletError::SendInProgress`] rather than queued.

use std::fmt;
use std::sync::Arc;

use bip39::Mnemonic;
use bitcoin::{CompressedPublicKey, Txid};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::address::{encode, to_locking_script, ChainConfig};
use crate::builder::{finalize, sign_input, TransactionBuilder};
use crate::chain::{Balance, ChainClient, TxStatus};
use crate::coin_selection::{FeePolicy, SelectionStrategy};
use crate::error::WalletError;
use crate::evm::{derive_account, EvmAccount};
use crate::history::{summarize_all, TransactionRecord};
use crate::keys::{derive_at, Signer};
use crate::mnemonic;
use crate::storage::{KeyValueStore, ADDRESS_KEY, MNEMONIC_KEY};

/// A payment the caller asks the session to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Recipient address on the session's network.
    pub recipient: String,
    /// Amount in satoshis.
    pub amount: u64,
    /// Fee rate in satoshis per virtual byte.
    pub fee_rate: u64,
    /// UTXO selection strategy.
    pub strategy: SelectionStrategy,
}

impl TransactionRequest {
    pub fn new(recipient: impl Into<String>, amount: u64, fee_rate: u64) -> Self {
        Self {
            recipient: recipient.into(),
            amount,
            fee_rate,
            strategy: SelectionStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SelectionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Check amount, fee rate and recipient before anything touches the
    /// network.
    pub fn validate(&self, config: ChainConfig) -> Result<(), WalletError> {
        if self.amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be positive".into()));
        }
        if self.fee_rate == 0 {
            return Err(WalletError::InvalidAmount("fee rate must be positive".into()));
        }
        to_locking_script(&self.recipient, config.network)?;
        Ok(())
    }
}

/// Progress of one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendState {
    Building,
    Signed,
    Finalized,
    Broadcast,
    Confirmed,
    Pending,
    Rejected,
}

impl fmt::Display for SendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SendState::Building => "building",
            SendState::Signed => "signed",
            SendState::Finalized => "finalized",
            SendState::Broadcast => "broadcast",
            SendState::Confirmed => "confirmed",
            SendState::Pending => "pending",
            SendState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Outcome of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub txid: Txid,
    /// Fee paid, including any dust folded in.
    pub fee: u64,
    /// Amount delivered to the recipient.
    pub amount: u64,
    /// Change returned to the wallet address (zero when none).
    pub change: u64,
    pub status: SendState,
}

/// The wallet's single address and the key that controls it.
pub struct WalletIdentity {
    address: String,
    public_key: CompressedPublicKey,
    mnemonic: Zeroizing<String>,
    signer: Signer,
}

impl WalletIdentity {
    /// Derive the identity for `mnemonic` under `config`.
    pub fn derive(mnemonic: &Mnemonic, config: ChainConfig) -> Result<Self, WalletError> {
        let seed = mnemonic::to_seed(mnemonic, "");
        let key = derive_at(&seed, config.script_type.derivation_path())?;
        let public_key = key.public_key();
        let signer = key.into_signer();
        let address = encode(&public_key, config).to_string();
        Ok(Self {
            address,
            public_key,
            mnemonic: Zeroizing::new(mnemonic.to_string()),
            signer,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> CompressedPublicKey {
        self.public_key
    }

    /// The recovery phrase. Show it to the user once, at creation.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }
}

impl fmt::Debug for WalletIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletIdentity")
            .field("address", &self.address)
            .field("mnemonic", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// An open wallet: identity plus collaborators.
pub struct WalletSession {
    config: ChainConfig,
    identity: WalletIdentity,
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn KeyValueStore>,
    send_lock: Mutex<()>,
}

impl WalletSession {
    /// Create a brand-new wallet from fresh entropy and persist it.
    ///
    /// Persistence failures are logged and do not fail creation; call
    /// [`persist`](Self::persist) to retry.
    pub fn create(
        config: ChainConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, WalletError> {
        let mnemonic = mnemonic::generate();
        let session = Self::open(&mnemonic, config, chain, store)?;
        tracing::info!(address = %session.address(), "wallet created");
        session.persist_or_warn();
        Ok(session)
    }

    /// Import an existing recovery phrase and persist it, replacing any
    /// previously stored wallet.
    pub fn import(
        phrase: &str,
        config: ChainConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, WalletError> {
        let mnemonic = mnemonic::validate(phrase)?;
        let session = Self::open(&mnemonic, config, chain, store)?;
        tracing::info!(address = %session.address(), "wallet imported");
        session.persist_or_warn();
        Ok(session)
    }

    /// Reopen the wallet saved in `store`, if there is one.
    pub fn restore(
        config: ChainConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Option<Self>, WalletError> {
        let Some(bytes) = store.get(MNEMONIC_KEY)? else {
            return Ok(None);
        };
        let bytes = Zeroizing::new(bytes);
        let phrase = std::str::from_utf8(&bytes)
            .map_err(|_| WalletError::CorruptedData("stored mnemonic is not UTF-8".into()))?;
        let mnemonic = mnemonic::validate(phrase)?;
        let session = Self::open(&mnemonic, config, chain, store)?;

        // The address entry only caches what the phrase derives.
        let current = match session.store.get(ADDRESS_KEY) {
            Ok(stored) => stored.as_deref() == Some(session.address().as_bytes()),
            Err(e) => {
                tracing::warn!(error = %e, "stored address unreadable");
                false
            }
        };
        if !current {
            tracing::warn!(
                address = %session.address(),
                "stored address differs from derived address, updating"
            );
            if let Err(e) = session.store.set(ADDRESS_KEY, session.address().as_bytes()) {
                tracing::warn!(error = %e, "failed to update stored address");
            }
        }
        tracing::debug!(address = %session.address(), "wallet restored");
        Ok(Some(session))
    }

    fn open(
        mnemonic: &Mnemonic,
        config: ChainConfig,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, WalletError> {
        Ok(Self {
            config,
            identity: WalletIdentity::derive(mnemonic, config)?,
            chain,
            store,
            send_lock: Mutex::new(()),
        })
    }

    /// Write the mnemonic and address to the store.
    pub fn persist(&self) -> Result<(), WalletError> {
        self.store
            .set(MNEMONIC_KEY, self.identity.mnemonic().as_bytes())?;
        self.store.set(ADDRESS_KEY, self.identity.address().as_bytes())
    }

    fn persist_or_warn(&self) {
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "wallet not persisted; session continues in memory");
        }
    }

    /// Remove the persisted wallet and close the session.
    pub fn forget(self) -> Result<(), WalletError> {
        self.store.delete(MNEMONIC_KEY)?;
        self.store.delete(ADDRESS_KEY)?;
        tracing::info!(address = %self.address(), "wallet forgotten");
        Ok(())
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    pub fn identity(&self) -> &WalletIdentity {
        &self.identity
    }

    /// The wallet's receive (and change) address.
    pub fn address(&self) -> &str {
        self.identity.address()
    }

    /// Account-chain identity derived from the same phrase.
    pub fn evm_account(&self) -> Result<EvmAccount, WalletError> {
        let mnemonic = mnemonic::validate(self.identity.mnemonic())?;
        derive_account(&mnemonic::to_seed(&mnemonic, ""))
    }

    pub async fn balance(&self) -> Result<Balance, WalletError> {
        self.chain.get_balance(self.address()).await
    }

    /// Transaction history summarised against the wallet address.
    pub async fn history(&self) -> Result<Vec<TransactionRecord>, WalletError> {
        let observed = self.chain.get_history(self.address()).await?;
        Ok(summarize_all(&observed, self.address()))
    }

    /// Build, sign and broadcast a payment.
    ///
    /// The request is validated before any network call. Only one send may
    /// run at a time per session.
    pub async fn send(&self, request: &TransactionRequest) -> Result<SendReceipt, WalletError> {
        self.send_with_progress(request, |_| {}).await
    }

    /// [`send`](Self::send), reporting each state the attempt reaches:
    /// `Building`, `Signed`, `Finalized`, `Broadcast`. Nothing is reported
    /// past the step that failed.
    pub async fn send_with_progress<F>(
        &self,
        request: &TransactionRequest,
        mut on_state: F,
    ) -> Result<SendReceipt, WalletError>
    where
        F: FnMut(SendState) + Send,
    {
        let _guard = self
            .send_lock
            .try_lock()
            .map_err(|_| WalletError::SendInProgress)?;
        request.validate(self.config)?;

        on_state(SendState::Building);
        tracing::debug!(
            amount = request.amount,
            fee_rate = request.fee_rate,
            "send started"
        );

        let utxos = self.chain.get_utxos(self.address()).await?;
        let mut builder = TransactionBuilder::new(self.config);
        builder
            .add_recipient(request.recipient.clone(), request.amount)
            .set_fee_policy(FeePolicy::PerByte(request.fee_rate))
            .set_strategy(request.strategy)
            .set_change_address(self.address());
        let unsigned = builder.build(&utxos)?;
        let change = unsigned.total_output().saturating_sub(request.amount);

        let signatures = (0..unsigned.prevouts().len())
            .map(|i| sign_input(&unsigned, i, self.identity.signer()))
            .collect::<Result<Vec<_>, _>>()?;
        on_state(SendState::Signed);

        let signed = finalize(unsigned, signatures)?;
        on_state(SendState::Finalized);
        tracing::debug!(
            txid = %signed.txid,
            inputs = signed.tx.input.len(),
            "send finalized"
        );

        let accepted = match self.chain.broadcast(&signed.bytes).await {
            Ok(txid) => txid,
            Err(e) => {
                tracing::warn!(txid = %signed.txid, error = %e, "broadcast failed");
                return Err(e);
            }
        };
        if accepted != signed.txid {
            tracing::warn!(
                local = %signed.txid,
                remote = %accepted,
                "indexer reported a different txid"
            );
        }
        on_state(SendState::Broadcast);
        tracing::info!(
            txid = %signed.txid,
            amount = request.amount,
            fee = signed.fee,
            change,
            "transaction broadcast"
        );

        Ok(SendReceipt {
            txid: signed.txid,
            fee: signed.fee,
            amount: request.amount,
            change,
            status: SendState::Pending,
        })
    }

    /// Poll the confirmation state of a broadcast transaction.
    ///
    /// A transaction the indexer no longer knows about is reported as
    /// rejected.
    pub async fn check_status(&self, txid: &Txid) -> Result<SendState, WalletError> {
        let state = match self.chain.get_tx_status(txid).await? {
            TxStatus::Confirmed { .. } => SendState::Confirmed,
            TxStatus::Pending => SendState::Pending,
            TxStatus::NotFound => SendState::Rejected,
        };
        tracing::debug!(%txid, %state, "status checked");
        Ok(state)
    }
}

impl fmt::Debug for WalletSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSession")
            .field("config", &self.config)
            .field("address", &self.identity.address)
            .finish_non_exhaustive()
    }
}
