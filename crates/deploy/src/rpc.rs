//! JSON-RPC connection to EVM chains over HTTP.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use anyhow::{Context, Result};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
    ChainConnection, ChainError, ChainMap, ChainMetadata, ChainName, ReadError, TransactionSpec,
    TxReceipt,
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

impl RpcError {
    /// Geth reports reverts with code 3; other nodes only say so in the message.
    fn is_revert(&self) -> bool {
        self.code == 3 || self.message.to_lowercase().contains("revert")
    }
}

/// Send one JSON-RPC request, separating error responses from transport failures.
async fn send_request(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<Result<Value, RpcError>> {
    let response = client
        .post(url)
        .json(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let mut result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        let error: RpcError = serde_json::from_value(error.clone())
            .with_context(|| format!("Malformed {} error", method))?;
        return Ok(Err(error));
    }

    result
        .get_mut("result")
        .map(|value| Ok(value.take()))
        .context("No result in response")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let result_value = send_request(client, url, method, params)
        .await?
        .map_err(|error| anyhow::anyhow!("RPC error: {}", error.message))?;

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// How long to wait for a submitted transaction to land.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPolicy {
    /// Delay between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Number of polls before giving up.
    pub max_attempts: usize,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            max_attempts: 90,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<U256>,
}

async fn fetch_receipt(client: &reqwest::Client, url: &str, hash: B256) -> Result<RpcReceipt> {
    let receipt: Option<RpcReceipt> =
        json_rpc_call(client, url, "eth_getTransactionReceipt", vec![json!(hash)]).await?;
    receipt.context("Transaction is still pending")
}

/// [`ChainConnection`] backed by node-managed accounts (`eth_sendTransaction`).
#[derive(Debug, Clone)]
pub struct JsonRpcConnection {
    client: reqwest::Client,
    chains: ChainMap<ChainMetadata>,
    confirmation: ConfirmationPolicy,
}

impl JsonRpcConnection {
    pub fn new(chains: ChainMap<ChainMetadata>) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            chains,
            confirmation: ConfirmationPolicy::default(),
        })
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    fn rpc_url(&self, chain: &ChainName) -> Result<&str> {
        self.chains
            .get(chain)
            .with_context(|| format!("Unknown chain {chain}"))?
            .rpc_url
            .as_deref()
            .with_context(|| format!("No rpc_url configured for {chain}"))
    }

    async fn wait_for_receipt(&self, chain: &ChainName, hash: B256) -> Result<TxReceipt> {
        let client = &self.client;
        let url = self.rpc_url(chain)?;
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.confirmation.poll_interval_ms))
            .with_max_times(self.confirmation.max_attempts);

        let receipt = (move || fetch_receipt(client, url, hash))
            .retry(backoff)
            .notify(|error, delay| {
                tracing::trace!(
                    chain = %chain,
                    tx = %hash,
                    error = %error,
                    ?delay,
                    "Waiting for receipt"
                );
            })
            .await
            .with_context(|| format!("Transaction {hash} on {chain} was not confirmed"))?;

        Ok(TxReceipt {
            transaction_hash: receipt.transaction_hash,
            contract_address: receipt.contract_address,
            success: receipt.status.is_none_or(|status| status == U256::from(1)),
        })
    }
}

impl ChainConnection for JsonRpcConnection {
    fn metadata(&self, chain: &ChainName) -> Result<ChainMetadata, ChainError> {
        self.chains
            .get(chain)
            .cloned()
            .ok_or_else(|| ChainError::configuration(chain, "chain has no metadata"))
    }

    fn chain_for_domain(&self, domain: u32) -> Option<ChainName> {
        self.chains
            .iter()
            .find(|(_, metadata)| metadata.domain_id == domain)
            .map(|(name, _)| name.clone())
    }

    async fn signer_address(&self, chain: &ChainName) -> Result<Address> {
        if let Some(signer) = self.chains.get(chain).and_then(|m| m.signer) {
            return Ok(signer);
        }
        let accounts: Vec<Address> =
            json_rpc_call(&self.client, self.rpc_url(chain)?, "eth_accounts", vec![]).await?;
        accounts
            .first()
            .copied()
            .with_context(|| format!("Node for {chain} manages no accounts"))
    }

    async fn read(&self, chain: &ChainName, to: Address, data: Bytes) -> Result<Bytes, ReadError> {
        let response = send_request(
            &self.client,
            self.rpc_url(chain)?,
            "eth_call",
            vec![json!({ "to": to, "data": data }), json!("latest")],
        )
        .await?;

        match response {
            Ok(value) => Ok(serde_json::from_value(value)
                .context("Failed to deserialize eth_call result")?),
            Err(error) if error.is_revert() => Err(ReadError::Reverted(error.message)),
            Err(error) => Err(anyhow::anyhow!("RPC error: {}", error.message).into()),
        }
    }

    async fn submit(&self, chain: &ChainName, tx: &TransactionSpec) -> Result<TxReceipt> {
        let from = self.signer_address(chain).await?;
        let mut request = json!({ "from": from, "data": tx.data });
        if let Some(to) = tx.to {
            request["to"] = json!(to);
        }
        if let Some(value) = tx.value {
            request["value"] = json!(value);
        }

        let hash: B256 = json_rpc_call(
            &self.client,
            self.rpc_url(chain)?,
            "eth_sendTransaction",
            vec![request],
        )
        .await
        .with_context(|| format!("Failed to submit: {}", tx.annotation))?;

        tracing::debug!(
            chain = %chain,
            tx = %hash,
            annotation = %tx.annotation,
            "Transaction sent"
        );
        self.wait_for_receipt(chain, hash).await
    }

    async fn code_hash(&self, chain: &ChainName, address: Address) -> Result<B256> {
        let code: Bytes = json_rpc_call(
            &self.client,
            self.rpc_url(chain)?,
            "eth_getCode",
            vec![json!(address), json!("latest")],
        )
        .await?;
        Ok(keccak256(&code))
    }

    async fn storage_at(&self, chain: &ChainName, address: Address, slot: B256) -> Result<B256> {
        json_rpc_call(
            &self.client,
            self.rpc_url(chain)?,
            "eth_getStorageAt",
            vec![json!(address), json!(slot), json!("latest")],
        )
        .await
    }

    async fn balance(&self, chain: &ChainName, address: Address) -> Result<U256> {
        json_rpc_call(
            &self.client,
            self.rpc_url(chain)?,
            "eth_getBalance",
            vec![json!(address), json!("latest")],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_status_parsing() {
        let receipt: RpcReceipt = serde_json::from_value(json!({
            "transactionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "contractAddress": null,
            "status": "0x0"
        }))
        .unwrap();
        assert_eq!(receipt.status, Some(U256::ZERO));
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_revert_detection() {
        let geth: RpcError = serde_json::from_value(json!({
            "code": 3,
            "message": "execution reverted",
            "data": "0x"
        }))
        .unwrap();
        assert!(geth.is_revert());

        let anvil: RpcError =
            serde_json::from_value(json!({"code": -32003, "message": "Execution Reverted"}))
                .unwrap();
        assert!(anvil.is_revert());

        let overloaded: RpcError =
            serde_json::from_value(json!({"code": -32005, "message": "rate limit exceeded"}))
                .unwrap();
        assert!(!overloaded.is_revert());
    }

    #[test]
    fn test_unknown_chain_is_configuration_error() {
        let connection = JsonRpcConnection::new(ChainMap::new()).unwrap();
        let error = connection.metadata(&"nowhere".into()).unwrap_err();
        assert!(matches!(error, ChainError::Configuration { .. }));
        assert!(connection.rpc_url(&"nowhere".into()).is_err());
    }
}
