use alloy_core::{
    primitives::{Address, Bytes},
    sol_types::SolValue,
};
use futures::{FutureExt, future::LocalBoxFuture};
use serde::{Deserialize, Serialize};

use super::ModuleManager;
use crate::{
    ChainConnection, ChainError, ChainName, ContractRole, Deployer, TransactionSpec,
    abi::{IAggregationHook, IPausable, IPostDispatchHook},
    diff::{ConfigNode, NodeBuilder, ToConfigNode},
    roles, transfer_ownership_transaction,
};

/// Post-dispatch hook configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum HookConfig {
    MerkleTreeHook,
    PausableHook {
        owner: Address,
        #[serde(default)]
        paused: bool,
    },
    StaticAggregationHook { hooks: Vec<HookConfig> },
}

impl HookConfig {
    pub fn type_name(&self) -> &'static str {
        self.into()
    }
}

impl ToConfigNode for HookConfig {
    fn to_config_node(&self) -> ConfigNode {
        let builder = NodeBuilder::new();
        let builder = match self {
            Self::MerkleTreeHook => builder,
            Self::PausableHook { owner, paused } => {
                builder.field("owner", *owner).field("paused", *paused)
            }
            Self::StaticAggregationHook { hooks } => builder.node(
                "hooks",
                ConfigNode::list(hooks.iter().map(ToConfigNode::to_config_node)),
            ),
        };
        builder.variant(self.type_name())
    }
}

/// On-chain `hookType()` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum HookType {
    Unused = 0,
    Routing = 1,
    Aggregation = 2,
    MerkleTree = 3,
    InterchainGasPaymaster = 4,
    FallbackRouting = 5,
    IdAuthIsm = 6,
    Pausable = 7,
    ProtocolFee = 8,
}

/// Hook operations on one chain.
pub struct HookModule<'a, C> {
    deployer: &'a Deployer<C>,
    chain: &'a ChainName,
    mailbox: Address,
}

impl<'a, C: ChainConnection> HookModule<'a, C> {
    pub fn new(deployer: &'a Deployer<C>, chain: &'a ChainName, mailbox: Address) -> Self {
        Self {
            deployer,
            chain,
            mailbox,
        }
    }

    async fn derive_hook(&self, address: Address) -> Result<HookConfig, ChainError> {
        let raw = self
            .deployer
            .read(self.chain, address, &IPostDispatchHook::hookTypeCall {})
            .await?
            ._0;
        let hook_type = HookType::from_repr(raw).ok_or_else(|| {
            ChainError::remote_read(
                self.chain,
                format!("hook at {address}"),
                format!("unknown hook type {raw}"),
            )
        })?;

        match hook_type {
            HookType::MerkleTree => Ok(HookConfig::MerkleTreeHook),
            HookType::Pausable => {
                let paused = self
                    .deployer
                    .read(self.chain, address, &IPausable::pausedCall {})
                    .await?
                    ._0;
                let owner = self.deployer.owner_of(self.chain, address).await?;
                Ok(HookConfig::PausableHook { owner, paused })
            }
            HookType::Aggregation => {
                let addresses = self
                    .deployer
                    .read(
                        self.chain,
                        address,
                        &IAggregationHook::hooksCall { message: Bytes::new() },
                    )
                    .await?
                    ._0;
                let mut hooks = Vec::with_capacity(addresses.len());
                for hook in addresses {
                    hooks.push(self.derive(hook).await?);
                }
                Ok(HookConfig::StaticAggregationHook { hooks })
            }
            other => Err(ChainError::remote_read(
                self.chain,
                format!("hook at {address}"),
                format!("unsupported hook type {other}"),
            )),
        }
    }

    async fn deploy_hook(&self, config: &HookConfig) -> Result<Address, ChainError> {
        let chain = self.chain;
        let address = match config {
            HookConfig::MerkleTreeHook => {
                let args = (self.mailbox,).abi_encode_params();
                self.deployer
                    .deploy_contract_from_factory(
                        chain,
                        &roles::MERKLE_TREE_HOOK.into(),
                        args.into(),
                    )
                    .await?
            }
            HookConfig::PausableHook { owner, paused } => {
                let role = ContractRole::from(roles::PAUSABLE_HOOK);
                let signer = self.deployer.signer(chain).await?;
                let address = self
                    .deployer
                    .deploy_contract_from_factory(chain, &role, Bytes::new())
                    .await?;
                if *paused {
                    self.deployer
                        .send(chain, address, &IPausable::pauseCall {}, "Pausing hook")
                        .await?;
                }
                if let Some(tx) = transfer_ownership_transaction(
                    self.deployer.chain_id(chain)?,
                    role.as_str(),
                    address,
                    signer,
                    *owner,
                ) {
                    self.deployer.submit(chain, tx).await?;
                }
                address
            }
            HookConfig::StaticAggregationHook { hooks } => {
                let mut addresses = Vec::with_capacity(hooks.len());
                for hook in hooks {
                    addresses.push(self.deploy(hook).await?);
                }
                let args = (addresses,).abi_encode_params();
                self.deployer
                    .deploy_contract_from_factory(
                        chain,
                        &roles::STATIC_AGGREGATION_HOOK.into(),
                        args.into(),
                    )
                    .await?
            }
        };

        tracing::info!(
            chain = %chain,
            hook = config.type_name(),
            address = %address,
            "Hook deployed"
        );
        Ok(address)
    }

    fn patch_hook(
        &self,
        address: Address,
        current: &HookConfig,
        desired: &HookConfig,
    ) -> Result<Option<Vec<TransactionSpec>>, ChainError> {
        let (
            HookConfig::PausableHook {
                owner: current_owner,
                paused: current_paused,
            },
            HookConfig::PausableHook { owner, paused },
        ) = (current, desired)
        else {
            return Ok(None);
        };

        let chain_id = self.deployer.chain_id(self.chain)?;
        let mut txs = Vec::new();
        if current_paused != paused {
            txs.push(if *paused {
                TransactionSpec::call(
                    chain_id,
                    address,
                    &IPausable::pauseCall {},
                    format!("Pausing hook {address}"),
                )
            } else {
                TransactionSpec::call(
                    chain_id,
                    address,
                    &IPausable::unpauseCall {},
                    format!("Unpausing hook {address}"),
                )
            });
        }
        txs.extend(transfer_ownership_transaction(
            chain_id,
            "pausable hook",
            address,
            *current_owner,
            *owner,
        ));
        Ok(Some(txs))
    }
}

impl<C: ChainConnection> ModuleManager for HookModule<'_, C> {
    type Config = HookConfig;

    const LABEL: &'static str = "hook";

    fn derive(&self, address: Address) -> LocalBoxFuture<'_, Result<HookConfig, ChainError>> {
        self.derive_hook(address).boxed_local()
    }

    fn deploy<'b>(
        &'b self,
        config: &'b HookConfig,
    ) -> LocalBoxFuture<'b, Result<Address, ChainError>> {
        self.deploy_hook(config).boxed_local()
    }

    fn patch<'b>(
        &'b self,
        address: Address,
        current: &'b HookConfig,
        desired: &'b HookConfig,
    ) -> LocalBoxFuture<'b, Result<Option<Vec<TransactionSpec>>, ChainError>> {
        let patch = self.patch_hook(address, current, desired);
        async move { patch }.boxed_local()
    }
}
