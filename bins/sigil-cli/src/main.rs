//! sigil — terminal-resident multi-chain HD wallet.
//!
//! Thin command layer: parses arguments, resolves authentication through
//! the orchestrator, and wires the library crates together. All policy and
//! chain logic lives in the `sigil-*` crates.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use sigil_chain::adapter::{BsvChainAdapter, EthChainAdapter, FeeStrategy, GasStrategy};
use sigil_chain::cache::{ActivityClass, BalanceCache, CacheEntry};
use sigil_chain::eth::{EthProvider, EthRpcAdapter, EtherscanAdapter};
use sigil_chain::utxo::UtxoStore;
use sigil_chain::woc::WhatsOnChainAdapter;
use sigil_core::chain::Chain;
use sigil_core::config::{EthProviderKind, OutputFormat, SigilConfig};
use sigil_core::constants::DIR_MODE;
use sigil_core::error::{ErrorCode, SigilError};
use sigil_core::secret::SecretBytes;
use sigil_core::{fsutil, shamir};
use sigil_keys::derivation::{self, CHANGE_INTERNAL};
use sigil_keys::{discovery, mnemonic, xpub};
use sigil_store::agent::AgentPolicy;
use sigil_store::auth::{AuthEnv, AuthOrchestrator, PromptFn};
use sigil_store::session::SessionManager;
use sigil_store::vault::WalletVault;
use sigil_store::wallet::Wallet;
use sigil_store::{agent, backup};
use sigil_tx::bsv::{self, TxOutput};
use sigil_tx::eth as ethtx;
use sigil_tx::selection;

/// Sigil command-line wallet.
#[derive(Parser)]
#[command(name = "sigil")]
#[command(version, about = "Local-custody multi-chain HD wallet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet management.
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Show or extend receive addresses.
    Address(AddressArgs),
    /// Query balances for a wallet.
    Balance(BalanceArgs),
    /// Send funds.
    Send(SendArgs),
    /// Session management.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Agent credential management.
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Split or combine Shamir secret shares.
    Shamir {
        #[command(subcommand)]
        action: ShamirAction,
    },
    /// Encrypted wallet backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
    /// Export an account xpub.
    Xpub(XpubArgs),
    /// Scan legacy derivation schemes for funds.
    Discover(DiscoverArgs),
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a new HD wallet with a fresh mnemonic.
    Create(WalletCreateArgs),
    /// Restore a wallet from a mnemonic phrase.
    Restore(WalletRestoreArgs),
    /// List wallet names.
    List,
    /// Delete a wallet file (irreversible).
    Delete(NameArg),
}

#[derive(Args)]
struct WalletCreateArgs {
    /// Wallet name.
    name: String,
    /// Mnemonic length (12 or 24).
    #[arg(long, default_value_t = 12)]
    words: usize,
    /// Chains to enable (default: bsv,eth).
    #[arg(long, value_delimiter = ',', default_values_t = vec!["bsv".to_string(), "eth".to_string()])]
    chains: Vec<String>,
}

#[derive(Args)]
struct WalletRestoreArgs {
    /// Wallet name.
    name: String,
    /// Optional BIP-39 passphrase.
    #[arg(long)]
    passphrase: Option<String>,
    /// Chains to enable (default: bsv,eth).
    #[arg(long, value_delimiter = ',', default_values_t = vec!["bsv".to_string(), "eth".to_string()])]
    chains: Vec<String>,
}

#[derive(Args)]
struct NameArg {
    name: String,
}

#[derive(Args)]
struct AddressArgs {
    name: String,
    /// Chain to show an address for.
    #[arg(long, default_value = "bsv")]
    chain: String,
    /// Derive a fresh address instead of showing the latest.
    #[arg(long)]
    new: bool,
}

#[derive(Args)]
struct BalanceArgs {
    name: String,
    /// Bypass the balance cache.
    #[arg(long)]
    refresh: bool,
}

#[derive(Args)]
struct SendArgs {
    name: String,
    /// Chain to send on.
    #[arg(long)]
    chain: String,
    /// Destination address.
    #[arg(long)]
    to: String,
    /// Amount in the chain's minimal unit; "all" sends everything.
    #[arg(long)]
    amount: String,
    /// ERC-20 token contract address (ETH only).
    #[arg(long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Unlock a wallet and start a session for it.
    Start(NameArg),
    /// End the session for one wallet.
    End(NameArg),
    /// End every session.
    EndAll,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Create a scoped agent credential; prints the token once.
    Create(AgentCreateArgs),
    /// List agent credentials for a wallet.
    List(NameArg),
    /// Revoke one credential by id.
    Revoke(AgentRevokeArgs),
    /// Revoke every credential for a wallet.
    RevokeAll(NameArg),
}

#[derive(Args)]
struct AgentCreateArgs {
    name: String,
    /// Human label for the agent.
    #[arg(long)]
    label: String,
    /// Chains the agent may use.
    #[arg(long, value_delimiter = ',', default_values_t = vec!["bsv".to_string()])]
    chains: Vec<String>,
    /// Per-transaction cap in satoshis.
    #[arg(long)]
    max_per_tx_sat: Option<u64>,
    /// Daily aggregate cap in satoshis.
    #[arg(long)]
    max_daily_sat: Option<u64>,
    /// Per-transaction cap in wei.
    #[arg(long)]
    max_per_tx_wei: Option<u128>,
    /// Daily aggregate cap in wei.
    #[arg(long)]
    max_daily_wei: Option<u128>,
    /// Destination allowlist (empty = any).
    #[arg(long, value_delimiter = ',')]
    allow: Vec<String>,
    /// Expiry in days.
    #[arg(long)]
    expires_days: Option<i64>,
}

#[derive(Args)]
struct AgentRevokeArgs {
    name: String,
    id: String,
}

#[derive(Subcommand)]
enum ShamirAction {
    /// Split a secret into n shares, k required.
    Split(ShamirSplitArgs),
    /// Combine shares back into the secret.
    Combine(ShamirCombineArgs),
}

#[derive(Args)]
struct ShamirSplitArgs {
    /// The secret text to split.
    secret: String,
    #[arg(long, short)]
    n: usize,
    #[arg(long, short)]
    k: usize,
}

#[derive(Args)]
struct ShamirCombineArgs {
    /// Shares in `sigil-v1-…` form.
    shares: Vec<String>,
}

#[derive(Subcommand)]
enum BackupAction {
    /// Export an encrypted bundle.
    Export(NameArg),
    /// Verify a bundle without restoring it.
    Verify(PathArg),
    /// Restore a bundle into the vault.
    Restore(PathArg),
}

#[derive(Args)]
struct PathArg {
    path: std::path::PathBuf,
}

#[derive(Args)]
struct XpubArgs {
    name: String,
    #[arg(long, default_value = "bsv")]
    chain: String,
    #[arg(long, default_value_t = 0)]
    account: u32,
}

#[derive(Args)]
struct DiscoverArgs {
    name: String,
    /// Gap limit.
    #[arg(long, default_value_t = 20)]
    gap: u32,
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("SIGIL_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match SigilConfig::load() {
        Ok(config) => config,
        Err(err) => exit_with(&err, OutputFormat::Text),
    };
    let output = config.output_format;
    // Ctrl-C drops the in-flight command future, so any live seed or key
    // buffers zeroize before the process leaves.
    tokio::select! {
        result = run(cli, config) => {
            if let Err(err) = result {
                exit_with(&err, output);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted");
            std::process::exit(130);
        }
    }
}

fn exit_with(err: &SigilError, output: OutputFormat) -> ! {
    match output {
        OutputFormat::Text => eprintln!("{}", err.render_text()),
        OutputFormat::Json => println!("{}", err.render_json()),
    }
    std::process::exit(err.exit_code());
}

fn orchestrator(config: &SigilConfig) -> AuthOrchestrator {
    AuthOrchestrator::new(
        WalletVault::new(config.wallets_dir()),
        SessionManager::new(config.sessions_dir()),
        agent::AgentStore::new(config.agents_dir()),
        AuthEnv::from_env(),
        config.sessions_enabled,
        Duration::from_secs(config.session_ttl_secs),
    )
}

fn password_prompt() -> Box<PromptFn> {
    Box::new(|message: &str| {
        rpassword::prompt_password(format!("{message}: "))
            .map(SecretBytes::from_string)
            .map_err(|e| sigil_store::StoreError::PromptUnavailable(e.to_string()))
    })
}

fn bsv_adapter(config: &SigilConfig) -> Result<WhatsOnChainAdapter, SigilError> {
    WhatsOnChainAdapter::new(config.bsv_api_key.clone(), config.bsv_min_miners)
        .map_err(SigilError::from)
}

fn eth_adapter(config: &SigilConfig) -> Result<EthProvider, SigilError> {
    let urls = config
        .eth_rpc
        .clone()
        .map(|primary| vec![primary])
        .unwrap_or_else(|| vec!["https://eth.llamarpc.com".to_string()]);
    let rpc = EthRpcAdapter::new(urls)?;
    let etherscan = match (&config.eth_provider, &config.etherscan_api_key) {
        (EthProviderKind::Etherscan, Some(key)) => Some(EtherscanAdapter::new(key.clone())?),
        _ => None,
    };
    Ok(EthProvider::new(etherscan, rpc))
}

fn parse_chains(names: &[String]) -> Result<Vec<Chain>, SigilError> {
    names.iter().map(|n| Chain::from_str(n)).collect()
}

async fn run(cli: Cli, config: SigilConfig) -> Result<(), SigilError> {
    fsutil::ensure_dir(&config.home, DIR_MODE)
        .map_err(|e| SigilError::new(ErrorCode::Internal, e.to_string()))?;

    match cli.command {
        Commands::Wallet { action } => wallet_command(action, &config),
        Commands::Address(args) => address_command(args, &config),
        Commands::Balance(args) => balance_command(args, &config).await,
        Commands::Send(args) => send_command(args, &config).await,
        Commands::Session { action } => session_command(action, &config),
        Commands::Agent { action } => agent_command(action, &config),
        Commands::Shamir { action } => shamir_command(action),
        Commands::Backup { action } => backup_command(action, &config),
        Commands::Xpub(args) => xpub_command(args, &config),
        Commands::Discover(args) => discover_command(args, &config).await,
    }
}

fn wallet_command(action: WalletAction, config: &SigilConfig) -> Result<(), SigilError> {
    let vault = WalletVault::new(config.wallets_dir());
    match action {
        WalletAction::Create(args) => {
            let chains = parse_chains(&args.chains)?;
            let phrase = mnemonic::generate(args.words)?;
            let seed = mnemonic::to_seed(&phrase, "")?;
            let wallet = Wallet::new(&args.name, chains)?;

            let password = password_prompt()(&format!("Password for wallet '{}'", args.name))?;
            vault.save(&wallet, &seed, password.as_bytes())?;

            println!("Wallet '{}' created.", args.name);
            println!("\nRecovery phrase (write this down, it is shown once):\n");
            println!("  {phrase}");
            Ok(())
        }
        WalletAction::Restore(args) => {
            let chains = parse_chains(&args.chains)?;
            let phrase = rpassword::prompt_password("Recovery phrase: ").map_err(|e| {
                SigilError::new(ErrorCode::InvalidInput, format!("cannot read phrase: {e}"))
            })?;

            if let Err(err) = mnemonic::validate(&phrase) {
                // Offer typo suggestions before giving up.
                for typo in mnemonic::detect_typos(&phrase) {
                    if let Some(suggestion) = typo.suggestion {
                        eprintln!("  '{}': did you mean '{}'?", typo.token, suggestion);
                    }
                }
                return Err(err.into());
            }
            let seed = mnemonic::to_seed(&phrase, args.passphrase.as_deref().unwrap_or(""))?;
            let wallet = Wallet::new(&args.name, chains)?;
            let password = password_prompt()(&format!("Password for wallet '{}'", args.name))?;
            vault.save(&wallet, &seed, password.as_bytes())?;
            println!("Wallet '{}' restored.", args.name);
            Ok(())
        }
        WalletAction::List => {
            for name in vault.list()? {
                println!("{name}");
            }
            Ok(())
        }
        WalletAction::Delete(args) => {
            vault.delete(&args.name)?;
            println!("Wallet '{}' deleted.", args.name);
            Ok(())
        }
    }
}

fn address_command(args: AddressArgs, config: &SigilConfig) -> Result<(), SigilError> {
    let chain = Chain::from_str(&args.chain)?;
    let orchestrator = orchestrator(config);
    let prompt = password_prompt();
    let ctx = orchestrator.resolve(&args.name, Some(&*prompt))?;

    let mut wallet = ctx.wallet;
    if !wallet.chain_enabled(chain) {
        return Err(SigilError::new(
            ErrorCode::InvalidInput,
            format!("chain {chain} is not enabled for wallet {}", wallet.name),
        ));
    }

    if args.new || wallet.next_receive_index(chain) == 0 {
        let seed = ctx.seed.as_ref().ok_or_else(|| {
            SigilError::from(sigil_store::StoreError::AgentXpubWriteDenied)
        })?;
        let index = wallet.next_receive_index(chain);
        let record =
            derivation::derive_address(seed, chain, wallet.derivation.account, index)?;
        wallet.push_receive_address(chain, record)?;
        orchestrator.vault().update_metadata(&wallet)?;
    }

    let record = wallet
        .receive_addresses
        .get(&chain)
        .and_then(|list| list.last())
        .ok_or_else(|| {
            SigilError::new(ErrorCode::Internal, format!("no address derived for {chain}"))
        })?;
    println!("{} ({})", record.address, record.derivation_path);
    Ok(())
}

async fn balance_command(args: BalanceArgs, config: &SigilConfig) -> Result<(), SigilError> {
    let vault = WalletVault::new(config.wallets_dir());
    let wallet = vault.load_metadata(&args.name)?;
    let (cache, was_corrupt) = BalanceCache::load(config.cache_dir())?;
    if was_corrupt {
        eprintln!("warning: balance cache was corrupt and has been reset");
    }
    let bsv = bsv_adapter(config)?;
    let eth = eth_adapter(config)?;

    for &chain in &wallet.enabled_chains {
        let mut total: u128 = 0;
        for record in wallet.all_addresses(chain).cloned().collect::<Vec<_>>() {
            let amount = if !args.refresh && !cache.is_stale(chain, &record.address, "") {
                cache
                    .get(chain, &record.address, "")
                    .map(|(entry, _)| entry.balance_value())
                    .unwrap_or(0)
            } else {
                let fetched: u128 = match chain {
                    Chain::Eth => eth.get_balance(&record.address).await?,
                    Chain::Bsv | Chain::Btc | Chain::Bch => {
                        bsv.get_balance(&record.address).await?.total()
                    }
                };
                cache.put(CacheEntry {
                    chain,
                    address: record.address.clone(),
                    token: String::new(),
                    balance: fetched.to_string(),
                    symbol: chain.symbol().to_string(),
                    decimals: chain.decimals(),
                    updated_at: chrono::Utc::now(),
                    activity_class: ActivityClass::classify(fetched > 0, false, i64::MAX),
                })?;
                fetched
            };
            total += amount;
        }
        println!("{}: {} {}", chain.symbol(), total, chain.minimal_unit());
    }
    Ok(())
}

async fn send_command(args: SendArgs, config: &SigilConfig) -> Result<(), SigilError> {
    let chain = Chain::from_str(&args.chain)?;
    let orchestrator = orchestrator(config);
    let prompt = password_prompt();
    let ctx = orchestrator.resolve(&args.name, Some(&*prompt))?;
    let seed = ctx.require_seed()?;

    // Agent policy gate runs before any network traffic.
    let amount_for_policy: Option<u128> = match args.amount.as_str() {
        "all" => None,
        value => Some(value.parse().map_err(|_| {
            SigilError::new(ErrorCode::InvalidInput, format!("bad amount: {value}"))
        })?),
    };
    if let (Some(credential), Some(amount)) = (&ctx.agent, amount_for_policy) {
        orchestrator.agents().check_policy(
            credential,
            chain,
            &args.to,
            amount,
            chrono::Utc::now().date_naive(),
        )?;
    }

    let (cache, _) = BalanceCache::load(config.cache_dir())?;
    let mut wallet = ctx.wallet.clone();

    let tx_id = match chain {
        // BTC/BCH exist for discovery only; spending is BSV and ETH.
        Chain::Btc | Chain::Bch => {
            return Err(SigilError::new(
                ErrorCode::UnsupportedChain,
                format!("sending on {chain} is not supported"),
            )
            .with_suggestion("sweep discovered funds with a chain-native wallet"));
        }
        Chain::Bsv => {
            let adapter = bsv_adapter(config)?;
            let store = UtxoStore::open(config.utxo_dir(), &wallet.name)?;

            // Refresh the UTXO view for every known address.
            for record in wallet.all_addresses(chain).cloned().collect::<Vec<_>>() {
                let observed = adapter.get_utxos(&record.address).await?;
                store.reconcile(&record.address, &observed)?;
            }

            let strategy: FeeStrategy = config.bsv_fee_strategy.parse()?;
            let fee_rate = adapter.fee_rate(strategy).await?;
            let unspent = store.unspent();

            let (coin_selection, send_amount) = match amount_for_policy {
                Some(amount) => {
                    let amount_sat = u64::try_from(amount).map_err(|_| {
                        SigilError::new(ErrorCode::InvalidInput, "amount exceeds u64 satoshis")
                    })?;
                    (selection::select_coins(&unspent, amount_sat, fee_rate)?, amount_sat)
                }
                None => selection::select_all(&unspent, fee_rate)?,
            };

            // Fresh internal-chain change address, persisted before use.
            let change_record = if coin_selection.change > 0 {
                let index = wallet.next_change_index(chain);
                let record = derivation::derive_address_at(
                    seed,
                    derivation::DerivationScheme::Bip44 {
                        chain,
                        account: wallet.derivation.account,
                    },
                    CHANGE_INTERNAL,
                    index,
                )?;
                wallet.push_change_address(chain, record.clone())?;
                orchestrator.vault().update_metadata(&wallet)?;
                Some(record)
            } else {
                None
            };

            let account = wallet.derivation.account;
            let lookup_wallet = wallet.clone();
            let signed = bsv::build_signed(
                &coin_selection,
                &[TxOutput { address: args.to.clone(), amount_sat: send_amount }],
                change_record.as_ref().map(|r| r.address.as_str()),
                |address| {
                    let record = lookup_wallet
                        .all_addresses(chain)
                        .find(|r| r.address == address)
                        .ok_or_else(|| {
                            sigil_tx::TxError::Signing(format!("unknown address {address}"))
                        })?;
                    let change = if record.is_change { 1 } else { 0 };
                    derivation::derive_private_key(seed, chain, account, change, record.index)
                        .map_err(|e| sigil_tx::TxError::Signing(e.to_string()))
                },
            )?;

            let tx_id = adapter.broadcast(&signed.raw).await?;
            store.mark_spent(&signed.spent_outpoints)?;
            for record in wallet.all_addresses(chain) {
                let _ = cache.invalidate(chain, &record.address);
            }

            if let Some(credential) = &ctx.agent {
                orchestrator.agents().record_send(
                    credential,
                    chain,
                    u128::from(send_amount),
                    chrono::Utc::now().date_naive(),
                )?;
            }
            tx_id
        }
        Chain::Eth => {
            let adapter = eth_adapter(config)?;
            let from = derivation::derive_address(seed, chain, wallet.derivation.account, 0)?;
            let key = derivation::derive_private_key(seed, chain, wallet.derivation.account, 0, 0)?;

            let nonce = adapter.get_nonce(&from.address).await?;
            let strategy = GasStrategy::default();
            let fees = adapter.gas_fees(strategy).await?;
            let chain_id = adapter.chain_id().await?;

            let amount = match amount_for_policy {
                Some(amount) => amount,
                None => {
                    let balance = adapter.get_balance(&from.address).await?;
                    ethtx::send_all_value(
                        balance,
                        ethtx::GAS_LIMIT_TRANSFER,
                        fees.max_fee_per_gas,
                    )?
                }
            };

            // Token transfers go to the contract with zero native value.
            let (to, value, data, gas_limit) = match &args.token {
                Some(contract) => {
                    let recipient = ethtx::parse_eth_address(&args.to)?;
                    (
                        ethtx::parse_eth_address(contract)?,
                        0u128,
                        ethtx::erc20_transfer_data(&recipient, amount),
                        ethtx::GAS_LIMIT_ERC20,
                    )
                }
                None => (
                    ethtx::parse_eth_address(&args.to)?,
                    amount,
                    Vec::new(),
                    ethtx::GAS_LIMIT_TRANSFER,
                ),
            };

            let request = ethtx::EthTxRequest {
                chain_id,
                nonce,
                to,
                value,
                data,
                gas_limit,
                gas_price: fees.gas_price,
                max_fee_per_gas: fees.max_fee_per_gas,
                max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            };
            let raw = ethtx::build_eip1559_raw(&request, &key)?;
            let tx_hash = adapter.broadcast(&raw).await?;
            let _ = cache.invalidate(chain, &from.address);

            if let Some(credential) = &ctx.agent {
                orchestrator.agents().record_send(
                    credential,
                    chain,
                    amount,
                    chrono::Utc::now().date_naive(),
                )?;
            }
            tx_hash
        }
    };

    println!("Broadcast: {tx_id}");
    Ok(())
}

fn session_command(action: SessionAction, config: &SigilConfig) -> Result<(), SigilError> {
    let sessions = SessionManager::new(config.sessions_dir());
    match action {
        SessionAction::Start(args) => {
            if !sessions.keyring_available() {
                return Err(
                    SigilError::from(sigil_store::StoreError::KeyringUnavailable).with_suggestion(
                        "sessions need a working OS keyring; use per-command passwords instead",
                    ),
                );
            }
            let vault = WalletVault::new(config.wallets_dir());
            let password = password_prompt()(&format!("Password for wallet '{}'", args.name))?;
            let (_, seed) = vault.load(&args.name, password.as_bytes())?;
            let session = sessions.start_session(
                &args.name,
                &seed,
                Duration::from_secs(config.session_ttl_secs),
            )?;
            println!(
                "Session for '{}' started, expires in {} min.",
                args.name,
                session.remaining().as_secs() / 60
            );
        }
        SessionAction::End(args) => {
            sessions.end_session(&args.name)?;
            println!("Session for '{}' ended.", args.name);
        }
        SessionAction::EndAll => {
            let ended = sessions.end_all_sessions()?;
            println!("Ended {ended} session(s).");
        }
    }
    Ok(())
}

fn agent_command(action: AgentAction, config: &SigilConfig) -> Result<(), SigilError> {
    let orchestrator = orchestrator(config);
    match action {
        AgentAction::Create(args) => {
            let chains = parse_chains(&args.chains)?;
            let prompt = password_prompt();
            let ctx = orchestrator.resolve(&args.name, Some(&*prompt))?;
            let seed = ctx.require_seed()?;

            let token = SecretBytes::random(32);
            let token_display = hex::encode(token.as_bytes());
            let expires_at = args
                .expires_days
                .map(|days| chrono::Utc::now() + chrono::Duration::days(days));

            let credential = orchestrator.agents().create_credential(
                &args.label,
                &args.name,
                chains,
                expires_at,
                AgentPolicy {
                    max_per_tx_sat: args.max_per_tx_sat,
                    max_daily_sat: args.max_daily_sat,
                    max_per_tx_wei: args.max_per_tx_wei,
                    max_daily_wei: args.max_daily_wei,
                    allowed_addresses: args.allow,
                },
                &token,
                seed,
            )?;

            println!("Agent '{}' created (id {}).", credential.label, credential.id);
            println!("\nToken (shown once, never stored):\n");
            println!("  {token_display}");
            println!("\nExport SIGIL_AGENT_TOKEN to use it non-interactively.");
        }
        AgentAction::List(args) => {
            for credential in orchestrator.agents().list(&args.name)? {
                let expiry = credential
                    .expires_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{}  {}  chains={:?}  expires={}",
                    credential.id, credential.label, credential.chains, expiry
                );
            }
        }
        AgentAction::Revoke(args) => {
            orchestrator.agents().revoke(&args.name, &args.id)?;
            println!("Agent {} revoked.", args.id);
        }
        AgentAction::RevokeAll(args) => {
            let count = orchestrator.agents().revoke_all(&args.name)?;
            println!("Revoked {count} agent(s).");
        }
    }
    Ok(())
}

fn shamir_command(action: ShamirAction) -> Result<(), SigilError> {
    match action {
        ShamirAction::Split(args) => {
            let shares = shamir::split(args.secret.as_bytes(), args.n, args.k)
                .map_err(|e| SigilError::new(ErrorCode::InvalidInput, e.to_string()))?;
            for share in shares {
                println!("{share}");
            }
        }
        ShamirAction::Combine(args) => {
            let secret = shamir::combine_strings(&args.shares)
                .map_err(|e| SigilError::new(ErrorCode::InvalidInput, e.to_string()))?;
            match String::from_utf8(secret.clone()) {
                Ok(text) => println!("{text}"),
                Err(_) => println!("{}", hex::encode(secret)),
            }
        }
    }
    Ok(())
}

fn backup_command(action: BackupAction, config: &SigilConfig) -> Result<(), SigilError> {
    let vault = WalletVault::new(config.wallets_dir());
    let prompt = password_prompt();
    match action {
        BackupAction::Export(args) => {
            let password = prompt("Backup password")?;
            let path = backup::export(
                &vault,
                &args.name,
                password.as_bytes(),
                &config.backups_dir(),
                Default::default(),
            )?;
            println!("Backup written to {}", path.display());
        }
        BackupAction::Verify(args) => {
            let password = prompt("Backup password")?;
            let info = backup::verify(&args.path, password.as_bytes())?;
            println!(
                "OK: wallet '{}', exported {}",
                info.wallet_name,
                info.exported_at.to_rfc3339()
            );
        }
        BackupAction::Restore(args) => {
            let password = prompt("Backup password")?;
            let info = backup::restore(&args.path, password.as_bytes(), &vault)?;
            println!("Restored wallet '{}'.", info.wallet_name);
        }
    }
    Ok(())
}

fn xpub_command(args: XpubArgs, config: &SigilConfig) -> Result<(), SigilError> {
    let chain = Chain::from_str(&args.chain)?;
    let orchestrator = orchestrator(config);
    let prompt = password_prompt();
    let ctx = orchestrator.resolve(&args.name, Some(&*prompt))?;
    let seed = ctx.require_seed()?;
    let exported = xpub::derive_account_xpub(seed, chain, args.account)?;
    println!("{exported}");
    Ok(())
}

async fn discover_command(args: DiscoverArgs, config: &SigilConfig) -> Result<(), SigilError> {
    let orchestrator = orchestrator(config);
    let prompt = password_prompt();
    let ctx = orchestrator.resolve(&args.name, Some(&*prompt))?;
    let seed = ctx.require_seed()?;

    // Every discovery scheme is BSV-family; WhatsOnChain probes them all.
    // Note: "used" includes mempool-unconfirmed activity.
    let probe: Arc<dyn discovery::UsageProbe> = Arc::new(bsv_adapter(config)?);
    let reports = discovery::discover(seed, args.gap, probe).await?;

    for report in &reports {
        if report.is_empty() {
            continue;
        }
        println!(
            "{}: {} address(es), {} satoshis",
            report.scheme.label(),
            report.addresses.len(),
            report.total_balance
        );
        for found in &report.addresses {
            println!("  {} ({})", found.record.address, found.record.derivation_path);
        }
    }
    if reports.iter().all(|r| r.is_empty()) {
        println!("No funds found in any legacy scheme.");
    }
    Ok(())
}
