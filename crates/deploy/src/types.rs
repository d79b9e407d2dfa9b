//! Identifiers and records shared by every stage of a deployment run.

use std::collections::BTreeMap;

use alloy_core::{
    primitives::{Address, B256, Bytes, U256},
    sol_types::SolCall,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Opaque identifier of one target chain.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ChainName(String);

impl ChainName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ChainName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Key identifying a logical contract within a chain's deployment.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
)]
#[serde(transparent)]
pub struct ContractRole(String);

impl ContractRole {
    pub fn new(role: impl Into<String>) -> Self {
        Self(role.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContractRole {
    fn from(role: &str) -> Self {
        Self(role.to_string())
    }
}

/// Well-known contract roles.
pub mod roles {
    pub const PROXY_ADMIN: &str = "proxyAdmin";
    pub const TIMELOCK_CONTROLLER: &str = "timelockController";
    pub const TRANSPARENT_PROXY: &str = "transparentUpgradeableProxy";
    pub const MAILBOX: &str = "mailbox";

    pub const TEST_ISM: &str = "testIsm";
    pub const TRUSTED_RELAYER_ISM: &str = "trustedRelayerIsm";
    pub const PAUSABLE_ISM: &str = "pausableIsm";
    pub const DOMAIN_ROUTING_ISM: &str = "domainRoutingIsm";
    pub const MERKLE_ROOT_MULTISIG_ISM: &str = "merkleRootMultisigIsm";
    pub const MESSAGE_ID_MULTISIG_ISM: &str = "messageIdMultisigIsm";
    pub const STATIC_AGGREGATION_ISM: &str = "staticAggregationIsm";

    pub const MERKLE_TREE_HOOK: &str = "merkleTreeHook";
    pub const PAUSABLE_HOOK: &str = "pausableHook";
    pub const STATIC_AGGREGATION_HOOK: &str = "staticAggregationHook";
}

/// Per-chain values keyed by chain name.
pub type ChainMap<T> = BTreeMap<ChainName, T>;

/// Peer router addresses for chains without a local contract object, keyed by chain.
///
/// Values are hex strings of either 20 or 32 bytes.
pub type ForeignDeployments = ChainMap<String>;

/// The unit of corrective or deploying action on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSpec {
    pub chain_id: u64,
    /// Target contract. `None` for contract creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    pub annotation: String,
}

impl TransactionSpec {
    /// A call to `to` with ABI-encoded `call` as calldata.
    pub fn call<T: SolCall>(
        chain_id: u64,
        to: Address,
        call: &T,
        annotation: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            to: Some(to),
            data: call.abi_encode().into(),
            value: None,
            annotation: annotation.into(),
        }
    }

    /// A contract creation carrying init code.
    pub fn create(chain_id: u64, init_code: Bytes, annotation: impl Into<String>) -> Self {
        Self {
            chain_id,
            to: None,
            data: init_code,
            value: None,
            annotation: annotation.into(),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }
}

/// Confirmation of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub contract_address: Option<Address>,
    pub success: bool,
}

/// Left-pad an EVM address to a 32-byte router identifier.
pub fn address_to_bytes32(address: Address) -> B256 {
    address.into_word()
}

/// Lowercase `0x`-prefixed rendering used in normalized configs and annotations.
pub fn format_address(address: Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Parse a 20- or 32-byte hex router identifier.
pub fn parse_router_id(value: &str) -> anyhow::Result<B256> {
    let raw = hex::decode(value.trim_start_matches("0x"))
        .with_context(|| format!("Router address {value} is not valid hex"))?;
    match raw.len() {
        20 => Ok(Address::from_slice(&raw).into_word()),
        32 => Ok(B256::from_slice(&raw)),
        len => anyhow::bail!("Router address {value} has unsupported length {len}"),
    }
}
