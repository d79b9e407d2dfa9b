//! Per-chain connection seam: read state, submit transactions.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::{ChainError, ChainName, ReadError, TransactionSpec, TxReceipt};

/// Execution environment family of a chain.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProtocolType {
    #[default]
    Ethereum,
    Sealevel,
    Cosmos,
    Starknet,
}

/// Name, symbol and decimals of a fungible token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Static description of one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub chain_id: u64,
    /// Cross-chain addressing identifier, distinct from `chain_id`.
    pub domain_id: u32,
    #[serde(default)]
    pub protocol: ProtocolType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Account used to sign. Falls back to the node's first account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_token: Option<TokenMetadata>,
}

/// Access to every chain a run touches.
///
/// Confirmation polling and retries live behind [`ChainConnection::submit`]; callers treat
/// it as one await that yields a receipt or fails.
pub trait ChainConnection: Send + Sync {
    /// Static metadata of `chain`. Unknown chains are a configuration error.
    fn metadata(&self, chain: &ChainName) -> Result<ChainMetadata, ChainError>;

    /// Reverse lookup of a domain id.
    fn chain_for_domain(&self, domain: u32) -> Option<ChainName>;

    /// Address transactions on `chain` are sent from.
    fn signer_address(&self, chain: &ChainName) -> impl Future<Output = Result<Address>> + Send;

    /// Execute a view call. Reverts are reported apart from transport failures.
    fn read(
        &self,
        chain: &ChainName,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, ReadError>> + Send;

    /// Submit a transaction and wait for its receipt.
    fn submit(
        &self,
        chain: &ChainName,
        tx: &TransactionSpec,
    ) -> impl Future<Output = Result<TxReceipt>> + Send;

    /// Keccak hash of the runtime code at `address`.
    fn code_hash(
        &self,
        chain: &ChainName,
        address: Address,
    ) -> impl Future<Output = Result<B256>> + Send;

    fn storage_at(
        &self,
        chain: &ChainName,
        address: Address,
        slot: B256,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// Native balance of `address`.
    fn balance(
        &self,
        chain: &ChainName,
        address: Address,
    ) -> impl Future<Output = Result<U256>> + Send;
}
