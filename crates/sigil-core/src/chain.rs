//! Chain identities supported by Sigil.
//!
//! `Chain` is a closed sum type: every supported chain is a variant with its
//! own BIP-44 coin type, display symbol, and minimal-unit naming. Code that
//! needs per-chain behavior matches exhaustively, so adding a chain is a
//! compile-time event rather than a runtime string comparison.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorCode, SigilError};

/// A supported blockchain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// Ethereum (account model, EIP-55 addresses).
    Eth,
    /// Bitcoin-SV (UTXO model, legacy P2PKH addresses).
    Bsv,
    /// Bitcoin (UTXO model, used for cross-wallet discovery).
    Btc,
    /// Bitcoin Cash (UTXO model, used for cross-wallet discovery).
    Bch,
}

impl Chain {
    /// All chains, in canonical order.
    pub const ALL: [Chain; 4] = [Chain::Eth, Chain::Bsv, Chain::Btc, Chain::Bch];

    /// BIP-44 coin type (SLIP-44 registry).
    pub fn coin_type(&self) -> u32 {
        match self {
            Chain::Eth => 60,
            Chain::Bsv => 236,
            Chain::Btc => 0,
            Chain::Bch => 145,
        }
    }

    /// Ticker symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bsv => "BSV",
            Chain::Btc => "BTC",
            Chain::Bch => "BCH",
        }
    }

    /// Decimal places between the display unit and the minimal unit.
    pub fn decimals(&self) -> u32 {
        match self {
            Chain::Eth => 18,
            Chain::Bsv | Chain::Btc | Chain::Bch => 8,
        }
    }

    /// Name of the minimal unit amounts are denominated in.
    pub fn minimal_unit(&self) -> &'static str {
        match self {
            Chain::Eth => "wei",
            Chain::Bsv | Chain::Btc | Chain::Bch => "satoshi",
        }
    }

    /// Whether balances on this chain are tracked as UTXOs.
    pub fn is_utxo_chain(&self) -> bool {
        !matches!(self, Chain::Eth)
    }

    /// Canonical lowercase name used in file keys and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Eth => "eth",
            Chain::Bsv => "bsv",
            Chain::Btc => "btc",
            Chain::Bch => "bch",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = SigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eth" | "ethereum" => Ok(Chain::Eth),
            "bsv" => Ok(Chain::Bsv),
            "btc" | "bitcoin" => Ok(Chain::Btc),
            "bch" => Ok(Chain::Bch),
            other => Err(SigilError::new(
                ErrorCode::UnsupportedChain,
                format!("unsupported chain: {other}"),
            )
            .with_suggestion("supported chains: eth, bsv, btc, bch")),
        }
    }
}
