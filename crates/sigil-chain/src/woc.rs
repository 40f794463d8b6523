//! WhatsOnChain BSV provider.
//!
//! Implements [`BsvChainAdapter`] over the public WhatsOnChain REST API and
//! [`UsageProbe`] for discovery scans (WhatsOnChain history includes
//! mempool-unconfirmed activity, so "used" here sees the mempool).
//!
//! Response parsing is split into pure functions so the wire formats are
//! testable without a network.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use tracing::debug;

use sigil_core::chain::Chain;
use sigil_keys::discovery::{AddressActivity, UsageProbe};
use sigil_keys::error::KeyError;

use crate::adapter::{p2pkh_script_hex, Balance, BsvChainAdapter, FeeStrategy, Utxo};
use crate::backoff::{retry, RetryPolicy};
use crate::error::ChainError;

/// Production API root.
const DEFAULT_BASE_URL: &str = "https://api.whatsonchain.com/v1/bsv/main";

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct BalanceResponse {
    confirmed: i128,
    unconfirmed: i128,
}

#[derive(Deserialize)]
struct UnspentResponse {
    tx_hash: String,
    tx_pos: u32,
    value: u64,
}

#[derive(Deserialize)]
struct FeeQuotesResponse {
    quotes: Vec<MinerQuote>,
}

#[derive(Deserialize)]
struct MinerQuote {
    #[serde(rename = "providerName")]
    provider_name: String,
    quote: QuoteBody,
}

#[derive(Deserialize)]
struct QuoteBody {
    fees: Vec<FeeEntry>,
}

#[derive(Deserialize)]
struct FeeEntry {
    #[serde(rename = "feeType")]
    fee_type: String,
    #[serde(rename = "miningFee")]
    mining_fee: FeeRate,
}

#[derive(Deserialize)]
struct FeeRate {
    satoshis: u64,
    bytes: u64,
}

/// Parse a balance response body.
fn parse_balance(body: &str) -> Result<Balance, ChainError> {
    let parsed: BalanceResponse = serde_json::from_str(body)
        .map_err(|e| ChainError::Provider(format!("balance response: {e}")))?;
    Ok(Balance {
        confirmed: parsed.confirmed.max(0) as u128,
        unconfirmed: parsed.unconfirmed,
    })
}

/// Parse an unspent-outputs response body into [`Utxo`]s for `address`.
fn parse_utxos(body: &str, address: &str) -> Result<Vec<Utxo>, ChainError> {
    let parsed: Vec<UnspentResponse> = serde_json::from_str(body)
        .map_err(|e| ChainError::Provider(format!("unspent response: {e}")))?;
    let script_pubkey = p2pkh_script_hex(address)?;
    Ok(parsed
        .into_iter()
        .map(|u| Utxo {
            tx_id: u.tx_hash,
            output_index: u.tx_pos,
            address: address.to_string(),
            amount_sat: u.value,
            script_pubkey: script_pubkey.clone(),
        })
        .collect())
}

/// Per-miner standard fee rates in sat/byte (ceiling, floor 1),
/// `(provider, rate)` pairs.
fn parse_miner_rates(body: &str) -> Result<Vec<(String, u64)>, ChainError> {
    let parsed: FeeQuotesResponse = serde_json::from_str(body)
        .map_err(|e| ChainError::Provider(format!("fee quotes response: {e}")))?;
    let mut rates = Vec::new();
    for quote in parsed.quotes {
        let Some(standard) = quote.quote.fees.iter().find(|f| f.fee_type == "standard") else {
            continue;
        };
        if standard.mining_fee.bytes == 0 {
            continue;
        }
        let rate = standard
            .mining_fee
            .satoshis
            .div_ceil(standard.mining_fee.bytes)
            .max(1);
        rates.push((quote.provider_name, rate));
    }
    if rates.is_empty() {
        return Err(ChainError::Provider("no usable miner fee quotes".into()));
    }
    Ok(rates)
}

/// Pick a rate from miner quotes per strategy.
///
/// `normal` needs at least `min_miners` miners quoting the same rate; the
/// most-quoted rate wins, lowest rate breaking ties.
fn select_fee_rate(
    rates: &[(String, u64)],
    strategy: FeeStrategy,
    min_miners: usize,
) -> Result<u64, ChainError> {
    match strategy {
        FeeStrategy::Economy => Ok(rates.iter().map(|(_, r)| *r).min().unwrap_or(1)),
        FeeStrategy::Priority => Ok(rates.iter().map(|(_, r)| *r).max().unwrap_or(1)),
        FeeStrategy::Normal => {
            let mut counts: std::collections::BTreeMap<u64, usize> = Default::default();
            for (_, rate) in rates {
                *counts.entry(*rate).or_default() += 1;
            }
            counts
                .iter()
                .filter(|&(_, &count)| count >= min_miners)
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(&rate, _)| rate)
                .ok_or_else(|| {
                    ChainError::Provider(format!(
                        "no fee-rate quorum of {min_miners} miners among {} quotes",
                        rates.len()
                    ))
                })
        }
    }
}

/// WhatsOnChain-backed BSV adapter.
pub struct WhatsOnChainAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    min_miners: usize,
    retry_policy: RetryPolicy,
}

impl WhatsOnChainAdapter {
    pub fn new(api_key: Option<String>, min_miners: usize) -> Result<Self, ChainError> {
        Self::with_base_url(DEFAULT_BASE_URL.to_string(), api_key, min_miners)
    }

    /// Override the API root (tests point this at a local stub).
    pub fn with_base_url(
        base_url: String,
        api_key: Option<String>,
        min_miners: usize,
    ) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            min_miners,
            retry_policy: RetryPolicy::default(),
        })
    }

    async fn get_text(&self, path: &str) -> Result<String, ChainError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("woc-api-key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<String, ChainError> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ChainError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ChainError::AuthFailed(format!("whatsonchain: {status}")));
        }
        if !status.is_success() {
            return Err(ChainError::Network(format!("whatsonchain: {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))
    }
}

#[async_trait]
impl BsvChainAdapter for WhatsOnChainAdapter {
    async fn get_balance(&self, address: &str) -> Result<Balance, ChainError> {
        let path = format!("/address/{address}/balance");
        let body = retry(self.retry_policy, "woc.balance", || self.get_text(&path)).await?;
        parse_balance(&body)
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ChainError> {
        let path = format!("/address/{address}/unspent");
        let body = retry(self.retry_policy, "woc.unspent", || self.get_text(&path)).await?;
        parse_utxos(&body, address)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ChainError> {
        // Broadcast is never retried: bytes may already be on the wire.
        let url = format!("{}/tx/raw", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "txhex": hex::encode(raw_tx) }));
        if let Some(key) = &self.api_key {
            request = request.header("woc-api-key", key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ChainError::Broadcast(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Broadcast(e.to_string()))?;
        if !status.is_success() {
            return Err(ChainError::Broadcast(format!("{status}: {body}")));
        }
        // The endpoint returns the txid as a JSON string.
        let tx_id: String = serde_json::from_str(&body)
            .unwrap_or_else(|_| body.trim().trim_matches('"').to_string());
        debug!(%tx_id, "transaction broadcast");
        Ok(tx_id)
    }

    async fn fee_rate(&self, strategy: FeeStrategy) -> Result<u64, ChainError> {
        let body = retry(self.retry_policy, "woc.fees", || {
            self.get_text("/mapi/feeQuotes")
        })
        .await?;
        let rates = parse_miner_rates(&body)?;
        select_fee_rate(&rates, strategy, self.min_miners)
    }
}

#[async_trait]
impl UsageProbe for WhatsOnChainAdapter {
    async fn probe(&self, _chain: Chain, address: &str) -> Result<AddressActivity, KeyError> {
        let path = format!("/address/{address}/history");
        let body = retry(self.retry_policy, "woc.history", || self.get_text(&path))
            .await
            .map_err(|e| KeyError::Probe(e.to_string()))?;
        let history: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| KeyError::Probe(e.to_string()))?;
        if history.is_empty() {
            return Ok(AddressActivity::default());
        }
        let balance = self
            .get_balance(address)
            .await
            .map_err(|e| KeyError::Probe(e.to_string()))?;
        Ok(AddressActivity {
            used: true,
            balance: balance.total(),
        })
    }
}
