//! satchel-cli — command-line front end for the satchel wallet engine.
//!
//! One wallet per network, kept in an encrypted store under the data
//! directory. Chain data comes from an Esplora indexer.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use satchel_esplora::EsploraClient;
use satchel_wallet::{
    format_coins, format_signed_coins, Direction, EncryptedFileStore, Network, ScriptType,
    SelectionStrategy, TransactionRequest, WalletSession, SATS_PER_COIN,
};

use crate::config::Config;

/// Self-custodial UTXO wallet.
#[derive(Parser)]
#[command(name = "satchel")]
#[command(version, about = "Self-custodial UTXO wallet.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `SATCHEL_*` environment variables.
#[derive(Args)]
struct GlobalArgs {
    /// Network (mainnet or testnet).
    #[arg(short, long, global = true)]
    network: Option<Network>,

    /// Address type (p2wpkh or p2pkh).
    #[arg(long, global = true)]
    script_type: Option<ScriptType>,

    /// Esplora API root, e.g. https://mempool.space/api.
    #[arg(long, global = true)]
    esplora_url: Option<String>,

    /// Directory holding wallet stores (default: ~/.satchel).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet management subcommands.
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Show the receive address.
    Address(AddressArgs),
    /// Query the wallet balance from the indexer.
    Balance,
    /// List transactions touching the wallet address.
    History,
    /// Send a payment.
    Send(SendArgs),
    /// Check the confirmation status of a transaction.
    Status(StatusArgs),
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a new wallet and show its recovery phrase once.
    Create,
    /// Import a wallet from a 12-word recovery phrase.
    Import,
    /// Delete the stored wallet.
    Forget(ForgetArgs),
}

#[derive(Args)]
struct ForgetArgs {
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct AddressArgs {
    /// Show the account-chain (EVM) address instead.
    #[arg(long)]
    evm: bool,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    #[arg(short, long)]
    to: String,

    /// Amount in whole coins (e.g. 0.0015).
    #[arg(short, long)]
    amount: String,

    /// Fee rate in sat/vB (default: SATCHEL_FEE_RATE or 5).
    #[arg(short, long)]
    fee_rate: Option<u64>,

    /// UTXO selection strategy (in-order, all, largest-first).
    #[arg(short, long)]
    strategy: Option<SelectionStrategy>,
}

#[derive(Args)]
struct StatusArgs {
    /// Transaction id, hex.
    txid: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.global)?;

    match cli.command {
        Commands::Wallet { action } => match action {
            WalletAction::Create => wallet_create(&config),
            WalletAction::Import => wallet_import(&config),
            WalletAction::Forget(args) => wallet_forget(&config, args),
        },
        Commands::Address(args) => wallet_address(&config, args),
        Commands::Balance => wallet_balance(&config).await,
        Commands::History => wallet_history(&config).await,
        Commands::Send(args) => wallet_send(&config, args).await,
        Commands::Status(args) => tx_status(&config, args).await,
    }
}

/// Environment first, then flags on top.
fn load_config(global: GlobalArgs) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(network) = global.network {
        config.network = network;
    }
    if let Some(script_type) = global.script_type {
        config.script_type = script_type;
    }
    if let Some(url) = global.esplora_url {
        config.esplora_url = Some(url);
    }
    if let Some(dir) = global.data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

/// Create a new wallet from fresh entropy.
fn wallet_create(config: &Config) -> Result<()> {
    let store = open_store(config, true)?;
    let chain = connect(config)?;
    if WalletSession::restore(config.chain_config(), chain.clone(), store.clone())?.is_some() {
        bail!(
            "A wallet already exists in {} (use `wallet forget` first)",
            config.store_dir().display()
        );
    }

    let session = WalletSession::create(config.chain_config(), chain, store)
        .context("Failed to create wallet")?;
    session.persist().context("Failed to save wallet")?;

    println!("\n=== WALLET CREATED ===");
    println!("Network: {}", config.network);
    println!("Address: {}", session.address());
    println!("\nRECOVERY PHRASE (BACK THIS UP, 12 WORDS):");
    println!("  {}", session.identity().mnemonic());
    println!("\nWARNING: This phrase will NOT be shown again.");
    println!("Anyone with this phrase can spend your funds.");
    Ok(())
}

/// Import a wallet from a recovery phrase, replacing any stored one.
fn wallet_import(config: &Config) -> Result<()> {
    let phrase = prompt_secret("Enter 12-word recovery phrase")?;
    let store = open_store(config, true)?;
    let chain = connect(config)?;

    let session = WalletSession::import(phrase.trim(), config.chain_config(), chain, store)
        .context("Failed to import wallet")?;
    session.persist().context("Failed to save wallet")?;

    println!("\n=== WALLET IMPORTED ===");
    println!("Network: {}", config.network);
    println!("Address: {}", session.address());
    Ok(())
}

fn wallet_forget(config: &Config, args: ForgetArgs) -> Result<()> {
    let session = open_session(config)?;
    if !args.yes {
        let answer = prompt_secret(&format!(
            "Type the address {} to confirm deletion",
            session.address()
        ))?;
        if answer.trim() != session.address() {
            bail!("Confirmation did not match; wallet kept");
        }
    }
    session.forget().context("Failed to delete wallet")?;
    println!("Wallet removed from {}", config.store_dir().display());
    Ok(())
}

fn wallet_address(config: &Config, args: AddressArgs) -> Result<()> {
    let session = open_session(config)?;
    if args.evm {
        let account = session.evm_account().context("Failed to derive EVM account")?;
        println!("{}", account.address);
    } else {
        println!("{}", session.address());
    }
    Ok(())
}

async fn wallet_balance(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    let balance = session.balance().await.context("Failed to fetch balance")?;

    println!("Address:     {}", session.address());
    println!("Confirmed:   {} ({} sats)", format_coins(balance.confirmed), balance.confirmed);
    println!(
        "Unconfirmed: {} ({} sats)",
        format_signed_coins(balance.unconfirmed),
        balance.unconfirmed
    );
    println!("Total:       {}", format_coins(balance.total()));
    Ok(())
}

async fn wallet_history(config: &Config) -> Result<()> {
    let session = open_session(config)?;
    let records = session.history().await.context("Failed to fetch history")?;

    if records.is_empty() {
        println!("No transactions.");
        return Ok(());
    }
    for record in records {
        let direction = match record.direction {
            Direction::Sent => "sent",
            Direction::Received => "received",
        };
        let when = match record.timestamp.and_then(|t| chrono::DateTime::from_timestamp(t, 0)) {
            Some(time) => time.format("%Y-%m-%d %H:%M").to_string(),
            None => "unconfirmed".to_string(),
        };
        println!(
            "{}  {:<8}  {:>16}  {}",
            record.id,
            direction,
            format_signed_coins(record.value_delta),
            when
        );
    }
    Ok(())
}

async fn wallet_send(config: &Config, args: SendArgs) -> Result<()> {
    let amount = parse_coins(&args.amount).context("Invalid amount")?;
    let fee_rate = args.fee_rate.unwrap_or(config.fee_rate);
    let mut request = TransactionRequest::new(args.to, amount, fee_rate);
    if let Some(strategy) = args.strategy {
        request = request.with_strategy(strategy);
    }

    let session = open_session(config)?;
    request
        .validate(session.config())
        .context("Invalid payment request")?;

    let receipt = session.send(&request).await.context("Send failed")?;

    println!("\n=== TRANSACTION BROADCAST ===");
    println!("Txid:   {}", receipt.txid);
    println!("Amount: {}", format_coins(receipt.amount));
    println!("Fee:    {} ({} sats)", format_coins(receipt.fee), receipt.fee);
    if receipt.change > 0 {
        println!("Change: {}", format_coins(receipt.change));
    }
    println!("Status: {}", receipt.status);
    Ok(())
}

async fn tx_status(config: &Config, args: StatusArgs) -> Result<()> {
    let txid = args
        .txid
        .trim()
        .parse::<bitcoin::Txid>()
        .context("Invalid transaction id")?;
    let session = open_session(config)?;
    let state = session
        .check_status(&txid)
        .await
        .context("Failed to fetch transaction status")?;
    println!("{txid}: {state}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Open the encrypted store, prompting for its password.
fn open_store(config: &Config, confirm: bool) -> Result<Arc<EncryptedFileStore>> {
    let password = prompt_secret("Wallet password")?;
    if confirm {
        let again = prompt_secret("Confirm password")?;
        if password != again {
            bail!("Passwords do not match");
        }
    }
    let store = EncryptedFileStore::open(config.store_dir(), password.as_bytes())
        .with_context(|| format!("Failed to open store at {}", config.store_dir().display()))?;
    Ok(Arc::new(store))
}

fn connect(config: &Config) -> Result<Arc<EsploraClient>> {
    let client = EsploraClient::new(&config.esplora()).context("Failed to build indexer client")?;
    tracing::debug!(url = client.base_url(), "indexer");
    Ok(Arc::new(client))
}

/// Reopen the stored wallet or explain how to create one.
fn open_session(config: &Config) -> Result<WalletSession> {
    let store = open_store(config, false)?;
    let chain = connect(config)?;
    WalletSession::restore(config.chain_config(), chain, store)
        .context("Failed to load wallet (check password)")?
        .with_context(|| {
            format!(
                "No {} wallet found (run `satchel wallet create` or `wallet import`)",
                config.network
            )
        })
}

fn prompt_secret(prompt: &str) -> Result<String> {
    rpassword::prompt_password(format!("{prompt}: ")).context("Failed to read input")
}

/// Parse a decimal coin amount into satoshis without going through floats.
fn parse_coins(s: &str) -> Result<u64> {
    let s = s.trim();
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        bail!("empty amount");
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        bail!("{s:?} is not a decimal number");
    }
    if frac.len() > 8 {
        bail!("at most 8 decimal places");
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse()? };
    let frac_sats: u64 = if frac.is_empty() {
        0
    } else {
        format!("{frac:0<8}").parse()?
    };
    let sats = whole
        .checked_mul(SATS_PER_COIN)
        .and_then(|w| w.checked_add(frac_sats))
        .context("amount overflows")?;
    if sats == 0 {
        bail!("amount must be greater than zero");
    }
    Ok(sats)
}
