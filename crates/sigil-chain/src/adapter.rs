//! Chain adapter capability traits.
//!
//! Builders and refresh loops never talk HTTP; they take one of these
//! capability sets. Mock implementations drive the transaction-pipeline
//! tests, and the real providers ([`crate::woc`], [`crate::eth`]) implement
//! them with retries and failover inside.

use async_trait::async_trait;
use std::str::FromStr;

use sigil_core::base58::base58check_decode;

use crate::error::ChainError;

/// Confirmed and unconfirmed balance in minimal units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub confirmed: u128,
    pub unconfirmed: i128,
}

impl Balance {
    /// Total including mempool activity (can be lower than confirmed when
    /// spends are pending).
    pub fn total(&self) -> u128 {
        let total = self.confirmed as i128 + self.unconfirmed;
        total.max(0) as u128
    }
}

/// One unspent output as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub tx_id: String,
    pub output_index: u32,
    pub address: String,
    pub amount_sat: u64,
    /// Locking script, hex.
    pub script_pubkey: String,
}

/// BSV miner fee-rate strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeStrategy {
    /// Cheapest quoted rate.
    Economy,
    /// Quorum rate (most-quoted among `min_miners`+ miners).
    #[default]
    Normal,
    /// Highest quoted rate.
    Priority,
}

impl FromStr for FeeStrategy {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "economy" => Ok(FeeStrategy::Economy),
            "normal" => Ok(FeeStrategy::Normal),
            "priority" => Ok(FeeStrategy::Priority),
            other => Err(ChainError::Provider(format!("unknown fee strategy: {other}"))),
        }
    }
}

/// ETH gas tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasStrategy {
    Slow,
    #[default]
    Medium,
    Fast,
}

impl FromStr for GasStrategy {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(GasStrategy::Slow),
            "medium" => Ok(GasStrategy::Medium),
            "fast" => Ok(GasStrategy::Fast),
            other => Err(ChainError::Provider(format!("unknown gas strategy: {other}"))),
        }
    }
}

/// Fee quote for an ETH transaction, covering both encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasFees {
    /// Legacy gas price in wei.
    pub gas_price: u128,
    /// EIP-1559 fee cap in wei.
    pub max_fee_per_gas: u128,
    /// EIP-1559 priority tip in wei.
    pub max_priority_fee_per_gas: u128,
}

/// BSV-family chain capabilities.
#[async_trait]
pub trait BsvChainAdapter: Send + Sync {
    async fn get_balance(&self, address: &str) -> Result<Balance, ChainError>;
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainError>;
    /// Returns the new transaction ID.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ChainError>;
    /// Fee rate in satoshis per byte.
    async fn fee_rate(&self, strategy: FeeStrategy) -> Result<u64, ChainError>;
}

/// Ethereum capabilities.
#[async_trait]
pub trait EthChainAdapter: Send + Sync {
    /// Balance in wei.
    async fn get_balance(&self, address: &str) -> Result<u128, ChainError>;
    /// Next pending nonce.
    async fn get_nonce(&self, address: &str) -> Result<u64, ChainError>;
    async fn gas_fees(&self, strategy: GasStrategy) -> Result<GasFees, ChainError>;
    async fn chain_id(&self) -> Result<u64, ChainError>;
    /// Returns the new transaction hash.
    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ChainError>;
}

/// Reconstruct the P2PKH locking script for a legacy address, hex-encoded.
///
/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script_hex(address: &str) -> Result<String, ChainError> {
    let payload = base58check_decode(address)
        .map_err(|e| ChainError::Provider(format!("bad address {address}: {e}")))?;
    if payload.len() != 21 || payload[0] != 0x00 {
        return Err(ChainError::Provider(format!(
            "not a P2PKH address: {address}"
        )));
    }
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[0x76, 0xA9, 0x14]);
    script.extend_from_slice(&payload[1..]);
    script.extend_from_slice(&[0x88, 0xAC]);
    Ok(hex::encode(script))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_total() {
        let b = Balance { confirmed: 1_000, unconfirmed: 250 };
        assert_eq!(b.total(), 1_250);
        let pending_spend = Balance { confirmed: 1_000, unconfirmed: -400 };
        assert_eq!(pending_spend.total(), 600);
        let overdrawn = Balance { confirmed: 100, unconfirmed: -500 };
        assert_eq!(overdrawn.total(), 0);
    }

    #[test]
    fn fee_strategy_parse() {
        assert_eq!("economy".parse::<FeeStrategy>().unwrap(), FeeStrategy::Economy);
        assert_eq!("NORMAL".parse::<FeeStrategy>().unwrap(), FeeStrategy::Normal);
        assert_eq!("priority".parse::<FeeStrategy>().unwrap(), FeeStrategy::Priority);
        assert!("turbo".parse::<FeeStrategy>().is_err());
    }

    #[test]
    fn gas_strategy_parse() {
        assert_eq!("slow".parse::<GasStrategy>().unwrap(), GasStrategy::Slow);
        assert_eq!("Fast".parse::<GasStrategy>().unwrap(), GasStrategy::Fast);
        assert!("ludicrous".parse::<GasStrategy>().is_err());
    }

    #[test]
    fn p2pkh_script_known_vector() {
        let script = p2pkh_script_hex("1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH").unwrap();
        assert_eq!(
            script,
            "76a914751e76e8199196d454941c45d1b3a323f1433bd688ac"
        );
    }

    #[test]
    fn p2pkh_script_rejects_non_p2pkh() {
        assert!(p2pkh_script_hex("garbage").is_err());
        assert!(p2pkh_script_hex("0x9858EfFD232B4033E47d90003D41EC34EcaEda94").is_err());
    }
}
