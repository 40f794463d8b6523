//! Ethereum providers: JSON-RPC with fallback endpoints, plus Etherscan
//! for balance queries.
//!
//! Failover order for balances follows the configured provider preference
//! (Etherscan first by default, JSON-RPC as fallback); nonce, gas, chain id,
//! and broadcast always go over JSON-RPC. Endpoint failover walks the URL
//! list on retryable errors only.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use tracing::{debug, warn};

use sigil_core::chain::Chain;
use sigil_keys::discovery::{AddressActivity, UsageProbe};
use sigil_keys::error::KeyError;

use crate::adapter::{EthChainAdapter, GasFees, GasStrategy};
use crate::backoff::{retry, RetryPolicy};
use crate::error::ChainError;

/// Per-request deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Fallback priority tip when the node does not answer
/// `eth_maxPriorityFeePerGas`: 1.5 gwei.
const DEFAULT_PRIORITY_FEE_WEI: u128 = 1_500_000_000;

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_quantity(value: &str) -> Result<u128, ChainError> {
    let stripped = value
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Provider(format!("not a hex quantity: {value}")))?;
    u128::from_str_radix(stripped, 16)
        .map_err(|e| ChainError::Provider(format!("bad hex quantity {value}: {e}")))
}

/// Scale a gas price for a tier: slow 90%, medium 100%, fast 125%.
fn tier_price(base: u128, strategy: GasStrategy) -> u128 {
    match strategy {
        GasStrategy::Slow => base * 90 / 100,
        GasStrategy::Medium => base,
        GasStrategy::Fast => base * 125 / 100,
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// JSON-RPC client over a primary URL plus fallbacks.
pub struct EthRpcAdapter {
    client: reqwest::Client,
    urls: Vec<String>,
    retry_policy: RetryPolicy,
}

impl EthRpcAdapter {
    pub fn new(urls: Vec<String>) -> Result<Self, ChainError> {
        if urls.is_empty() {
            return Err(ChainError::Provider("no ETH RPC endpoint configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(Self {
            client,
            urls,
            retry_policy: RetryPolicy::default(),
        })
    }

    async fn call_url(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        if response.status().as_u16() == 429 {
            return Err(ChainError::RateLimited);
        }
        if !response.status().is_success() {
            return Err(ChainError::Network(format!("rpc: {}", response.status())));
        }
        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Provider(format!("rpc response: {e}")))?;
        if let Some(err) = parsed.error {
            // -32005 is the conventional "limit exceeded" code.
            if err.code == -32005 {
                return Err(ChainError::RateLimited);
            }
            return Err(ChainError::Provider(format!(
                "rpc error {}: {}",
                err.code, err.message
            )));
        }
        parsed
            .result
            .ok_or_else(|| ChainError::Provider("rpc response missing result".into()))
    }

    /// Call with endpoint failover: retryable failures walk the URL list.
    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let mut last_err = ChainError::Provider("no ETH RPC endpoint configured".into());
        for url in &self.urls {
            let result = retry(self.retry_policy, method, || {
                self.call_url(url, method, params.clone())
            })
            .await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    warn!(url, method, %err, "rpc endpoint failed; trying next");
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }

    async fn call_quantity(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<u128, ChainError> {
        let value = self.call(method, params).await?;
        let text = value
            .as_str()
            .ok_or_else(|| ChainError::Provider(format!("{method}: result not a string")))?;
        parse_hex_quantity(text)
    }
}

#[async_trait]
impl EthChainAdapter for EthRpcAdapter {
    async fn get_balance(&self, address: &str) -> Result<u128, ChainError> {
        self.call_quantity("eth_getBalance", json!([address, "latest"]))
            .await
    }

    async fn get_nonce(&self, address: &str) -> Result<u64, ChainError> {
        let nonce = self
            .call_quantity("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        Ok(nonce as u64)
    }

    async fn gas_fees(&self, strategy: GasStrategy) -> Result<GasFees, ChainError> {
        let base = self.call_quantity("eth_gasPrice", json!([])).await?;
        let priority = match self
            .call_quantity("eth_maxPriorityFeePerGas", json!([]))
            .await
        {
            Ok(tip) => tip,
            Err(err) => {
                debug!(%err, "node lacks eth_maxPriorityFeePerGas; using default tip");
                DEFAULT_PRIORITY_FEE_WEI
            }
        };
        let gas_price = tier_price(base, strategy);
        let priority = tier_price(priority, strategy);
        Ok(GasFees {
            gas_price,
            // Room for the base fee to double before the cap binds.
            max_fee_per_gas: gas_price.saturating_mul(2).saturating_add(priority),
            max_priority_fee_per_gas: priority,
        })
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.call_quantity("eth_chainId", json!([])).await? as u64)
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ChainError> {
        // No retry and no failover walk: the first endpoint may have
        // accepted the bytes even if the response was lost.
        let url = &self.urls[0];
        let params = json!([format!("0x{}", hex::encode(raw_tx))]);
        let value = self
            .call_url(url, "eth_sendRawTransaction", params)
            .await
            .map_err(|e| match e {
                ChainError::Provider(msg) => ChainError::Broadcast(msg),
                ChainError::Network(msg) => ChainError::Broadcast(msg),
                other => other,
            })?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| ChainError::Broadcast("no transaction hash returned".into()))
    }
}

// --- Etherscan ---

#[derive(Deserialize)]
struct EtherscanResponse {
    status: String,
    message: String,
    result: String,
}

/// Classify an Etherscan envelope into a balance or an error.
fn parse_etherscan_balance(body: &str) -> Result<u128, ChainError> {
    let parsed: EtherscanResponse = serde_json::from_str(body)
        .map_err(|e| ChainError::Provider(format!("etherscan response: {e}")))?;
    if parsed.status == "1" {
        return parsed
            .result
            .parse()
            .map_err(|_| ChainError::Provider(format!("etherscan balance: {}", parsed.result)));
    }
    let lowered = parsed.result.to_lowercase();
    if lowered.contains("rate limit") {
        return Err(ChainError::RateLimited);
    }
    if lowered.contains("api key") {
        return Err(ChainError::AuthFailed(parsed.result));
    }
    Err(ChainError::Provider(format!(
        "etherscan: {} ({})",
        parsed.message, parsed.result
    )))
}

/// Etherscan API client (balance queries only).
pub struct EtherscanAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EtherscanAdapter {
    pub fn new(api_key: String) -> Result<Self, ChainError> {
        Self::with_base_url("https://api.etherscan.io/api".to_string(), api_key)
    }

    pub fn with_base_url(base_url: String, api_key: String) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub async fn get_balance(&self, address: &str) -> Result<u128, ChainError> {
        let balance = retry(RetryPolicy::default(), "etherscan.balance", || async {
            let response = self
                .client
                .get(&self.base_url)
                .query(&[
                    ("module", "account"),
                    ("action", "balance"),
                    ("address", address),
                    ("tag", "latest"),
                    ("apikey", &self.api_key),
                ])
                .send()
                .await
                .map_err(|e| ChainError::Network(e.to_string()))?;
            if !response.status().is_success() {
                return Err(ChainError::Network(format!("etherscan: {}", response.status())));
            }
            let body = response
                .text()
                .await
                .map_err(|e| ChainError::Network(e.to_string()))?;
            parse_etherscan_balance(&body)
        })
        .await?;
        Ok(balance)
    }

    /// Whether an address has any transactions (Etherscan `txlist`).
    /// Confirmed history only; mempool activity is not visible here.
    pub async fn has_history(&self, address: &str) -> Result<bool, ChainError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("module", "account"),
                ("action", "txlist"),
                ("address", address),
                ("page", "1"),
                ("offset", "1"),
                ("apikey", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        Ok(body["result"].as_array().is_some_and(|txs| !txs.is_empty()))
    }
}

/// Balance provider preference with failover.
pub struct EthProvider {
    etherscan: Option<EtherscanAdapter>,
    rpc: EthRpcAdapter,
}

impl EthProvider {
    pub fn new(etherscan: Option<EtherscanAdapter>, rpc: EthRpcAdapter) -> Self {
        Self { etherscan, rpc }
    }
}

#[async_trait]
impl EthChainAdapter for EthProvider {
    async fn get_balance(&self, address: &str) -> Result<u128, ChainError> {
        if let Some(etherscan) = &self.etherscan {
            match etherscan.get_balance(address).await {
                Ok(balance) => return Ok(balance),
                Err(err) if err.is_retryable() => {
                    warn!(%err, "etherscan balance failed; falling back to rpc");
                }
                Err(err) => return Err(err),
            }
        }
        self.rpc.get_balance(address).await
    }

    async fn get_nonce(&self, address: &str) -> Result<u64, ChainError> {
        self.rpc.get_nonce(address).await
    }

    async fn gas_fees(&self, strategy: GasStrategy) -> Result<GasFees, ChainError> {
        self.rpc.gas_fees(strategy).await
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.rpc.chain_id().await
    }

    async fn broadcast(&self, raw_tx: &[u8]) -> Result<String, ChainError> {
        self.rpc.broadcast(raw_tx).await
    }
}

#[async_trait]
impl UsageProbe for EthProvider {
    async fn probe(&self, _chain: Chain, address: &str) -> Result<AddressActivity, KeyError> {
        let has_history = match &self.etherscan {
            // Confirmed history only: Etherscan does not see the mempool.
            Some(etherscan) => etherscan
                .has_history(address)
                .await
                .map_err(|e| KeyError::Probe(e.to_string()))?,
            // Without Etherscan, a nonzero nonce is the best usage signal
            // JSON-RPC offers.
            None => {
                self.rpc
                    .get_nonce(address)
                    .await
                    .map_err(|e| KeyError::Probe(e.to_string()))?
                    > 0
            }
        };
        let balance = self
            .get_balance(address)
            .await
            .map_err(|e| KeyError::Probe(e.to_string()))?;
        // A funded address counts as used even with no outgoing history.
        Ok(AddressActivity {
            used: has_history || balance > 0,
            balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Hex quantities ---

    #[test]
    fn parse_hex_quantities() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn parse_hex_quantity_rejects_bare() {
        assert!(parse_hex_quantity("123").is_err());
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    // --- Gas tiers ---

    #[test]
    fn gas_tiers_ordered() {
        let base = 20_000_000_000u128;
        let slow = tier_price(base, GasStrategy::Slow);
        let medium = tier_price(base, GasStrategy::Medium);
        let fast = tier_price(base, GasStrategy::Fast);
        assert!(slow < medium && medium < fast);
        assert_eq!(medium, base);
        assert_eq!(slow, 18_000_000_000);
        assert_eq!(fast, 25_000_000_000);
    }

    // --- Etherscan envelope ---

    #[test]
    fn etherscan_ok_balance() {
        let body = r#"{"status":"1","message":"OK","result":"40891626854930000000000"}"#;
        assert_eq!(
            parse_etherscan_balance(body).unwrap(),
            40_891_626_854_930_000_000_000
        );
    }

    #[test]
    fn etherscan_rate_limit() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Max rate limit reached"}"#;
        assert!(matches!(
            parse_etherscan_balance(body).unwrap_err(),
            ChainError::RateLimited
        ));
    }

    #[test]
    fn etherscan_bad_key_is_fatal() {
        let body = r#"{"status":"0","message":"NOTOK","result":"Invalid API Key"}"#;
        let err = parse_etherscan_balance(body).unwrap_err();
        assert!(matches!(err, ChainError::AuthFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn etherscan_other_failure() {
        let body = r#"{"status":"0","message":"NOTOK","result":"something else"}"#;
        assert!(matches!(
            parse_etherscan_balance(body).unwrap_err(),
            ChainError::Provider(_)
        ));
    }

    #[test]
    fn rpc_adapter_requires_urls() {
        assert!(EthRpcAdapter::new(vec![]).is_err());
        assert!(EthRpcAdapter::new(vec!["http://localhost:8545".into()]).is_ok());
    }
}
