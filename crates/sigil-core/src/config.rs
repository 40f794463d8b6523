//! Home layout and layered configuration.
//!
//! Settings come from `<home>/config.yaml` overlaid with `SIGIL_*`
//! environment variables; a missing file is fine and leaves the defaults.
//! `SIGIL_HOME` relocates the entire state directory (used heavily by
//! tests).

use serde::Deserialize;
use std::path::PathBuf;

use crate::constants::{DEFAULT_MIN_MINERS, HOME_DIR_NAME, SESSION_TTL_DEFAULT_SECS};
use crate::error::{ErrorCode, SigilError};

/// Which provider answers ETH balance queries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EthProviderKind {
    /// Etherscan API first, JSON-RPC fallback.
    Etherscan,
    /// JSON-RPC only.
    Rpc,
}

/// Output rendering selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
}

/// Resolved configuration for a Sigil process.
#[derive(Debug, Clone)]
pub struct SigilConfig {
    /// State directory, default `~/.sigil`.
    pub home: PathBuf,
    /// ETH JSON-RPC endpoint.
    pub eth_rpc: Option<String>,
    /// ETH balance provider preference.
    pub eth_provider: EthProviderKind,
    /// Etherscan API key.
    pub etherscan_api_key: Option<String>,
    /// WhatsOnChain API key.
    pub bsv_api_key: Option<String>,
    /// BSV fee strategy name (`economy`, `normal`, `priority`).
    pub bsv_fee_strategy: String,
    /// Miner quorum for the `normal` fee strategy.
    pub bsv_min_miners: usize,
    /// Output format.
    pub output_format: OutputFormat,
    /// Session TTL in seconds.
    pub session_ttl_secs: u64,
    /// Whether sessions are enabled at all.
    pub sessions_enabled: bool,
    /// Log filter string.
    pub log_level: String,
}

/// Subset of fields accepted from `config.yaml`.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    eth_rpc: Option<String>,
    eth_provider: Option<EthProviderKind>,
    etherscan_api_key: Option<String>,
    bsv_api_key: Option<String>,
    bsv_fee_strategy: Option<String>,
    bsv_min_miners: Option<usize>,
    output_format: Option<OutputFormat>,
    session_ttl_minutes: Option<u64>,
    sessions_enabled: Option<bool>,
    log_level: Option<String>,
}

impl SigilConfig {
    /// Resolve the configuration from `config.yaml` and the environment.
    pub fn load() -> Result<Self, SigilError> {
        let home = resolve_home()?;
        let file: FileConfig = config::Config::builder()
            .add_source(
                config::File::from(home.join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| {
                SigilError::new(ErrorCode::InvalidInput, format!("bad config.yaml: {e}"))
                    .with_detail("path", home.join("config.yaml").display())
            })?;

        let eth_provider = match env_var("SIGIL_ETH_PROVIDER").as_deref() {
            Some("etherscan") => EthProviderKind::Etherscan,
            Some("rpc") => EthProviderKind::Rpc,
            Some(other) => {
                return Err(SigilError::new(
                    ErrorCode::InvalidInput,
                    format!("invalid SIGIL_ETH_PROVIDER: {other}"),
                )
                .with_suggestion("use one of: etherscan, rpc"));
            }
            None => file.eth_provider.unwrap_or(EthProviderKind::Etherscan),
        };

        let output_format = match env_var("SIGIL_OUTPUT_FORMAT").as_deref() {
            Some("json") => OutputFormat::Json,
            Some(_) => OutputFormat::Text,
            None => file.output_format.unwrap_or(OutputFormat::Text),
        };

        let session_ttl_secs = env_var("SIGIL_SESSION_TTL")
            .and_then(|v| v.parse::<u64>().ok())
            .map(|minutes| minutes * 60)
            .or(file.session_ttl_minutes.map(|m| m * 60))
            .unwrap_or(SESSION_TTL_DEFAULT_SECS);

        Ok(Self {
            home,
            eth_rpc: env_var("SIGIL_ETH_RPC").or(file.eth_rpc),
            eth_provider,
            etherscan_api_key: env_var("ETHERSCAN_API_KEY").or(file.etherscan_api_key),
            bsv_api_key: env_var("SIGIL_BSV_API_KEY")
                .or_else(|| env_var("WHATS_ON_CHAIN_API_KEY"))
                .or(file.bsv_api_key),
            bsv_fee_strategy: env_var("SIGIL_BSV_FEE_STRATEGY")
                .or(file.bsv_fee_strategy)
                .unwrap_or_else(|| "normal".to_string()),
            bsv_min_miners: env_var("SIGIL_BSV_MIN_MINERS")
                .and_then(|v| v.parse().ok())
                .or(file.bsv_min_miners)
                .unwrap_or(DEFAULT_MIN_MINERS),
            output_format,
            session_ttl_secs,
            sessions_enabled: file.sessions_enabled.unwrap_or(true),
            log_level: env_var("SIGIL_LOG_LEVEL")
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Configuration rooted at an explicit home, defaults elsewhere.
    /// Used by tests and by callers that manage their own environment.
    pub fn with_home(home: PathBuf) -> Self {
        Self {
            home,
            eth_rpc: None,
            eth_provider: EthProviderKind::Etherscan,
            etherscan_api_key: None,
            bsv_api_key: None,
            bsv_fee_strategy: "normal".to_string(),
            bsv_min_miners: DEFAULT_MIN_MINERS,
            output_format: OutputFormat::Text,
            session_ttl_secs: SESSION_TTL_DEFAULT_SECS,
            sessions_enabled: true,
            log_level: "info".to_string(),
        }
    }

    // --- Home layout ---

    pub fn wallets_dir(&self) -> PathBuf {
        self.home.join("wallets")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.home.join("agents")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.home.join("cache")
    }

    pub fn utxo_dir(&self) -> PathBuf {
        self.home.join("utxo")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.home.join("backups")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("sigil.log")
    }
}

/// Resolve the home directory: `SIGIL_HOME` or `~/.sigil`.
pub fn resolve_home() -> Result<PathBuf, SigilError> {
    if let Some(home) = env_var("SIGIL_HOME") {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|h| h.join(HOME_DIR_NAME))
        .ok_or_else(|| SigilError::new(ErrorCode::Internal, "cannot locate home directory"))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
