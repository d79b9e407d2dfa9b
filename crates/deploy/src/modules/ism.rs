use std::collections::BTreeMap;

use alloy_core::{
    primitives::{Address, Bytes},
    sol_types::{SolType, SolValue, sol_data},
};
use futures::{FutureExt, future::LocalBoxFuture};
use serde::{Deserialize, Serialize};

use super::ModuleManager;
use crate::{
    ChainConnection, ChainError, ChainName, ContractRole, Deployer, TransactionSpec,
    abi::{
        IAggregationIsm, IInterchainSecurityModule, IMultisigIsm, IPausable, IRoutingIsm,
        ITrustedRelayerIsm,
    },
    diff::{ConfigNode, NodeBuilder, ToConfigNode, check_against},
    roles, transfer_ownership_transaction,
};

/// Interchain security module configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum IsmConfig {
    /// Accepts every message.
    TestIsm,
    TrustedRelayerIsm { relayer: Address },
    PausableIsm {
        owner: Address,
        #[serde(default)]
        paused: bool,
    },
    /// Delegates to a per-origin module.
    DomainRoutingIsm {
        owner: Address,
        domains: BTreeMap<ChainName, IsmConfig>,
    },
    MerkleRootMultisigIsm { validators: Vec<Address>, threshold: u8 },
    MessageIdMultisigIsm { validators: Vec<Address>, threshold: u8 },
    /// Requires `threshold` of `modules` to accept.
    StaticAggregationIsm { modules: Vec<IsmConfig>, threshold: u8 },
}

impl IsmConfig {
    pub fn type_name(&self) -> &'static str {
        self.into()
    }
}

impl ToConfigNode for IsmConfig {
    fn to_config_node(&self) -> ConfigNode {
        let builder = NodeBuilder::new();
        let builder = match self {
            Self::TestIsm => builder,
            Self::TrustedRelayerIsm { relayer } => builder.field("relayer", *relayer),
            Self::PausableIsm { owner, paused } => {
                builder.field("owner", *owner).field("paused", *paused)
            }
            Self::DomainRoutingIsm { owner, domains } => builder.field("owner", *owner).node(
                "domains",
                ConfigNode::table(domains.iter().map(|(chain, ism)| (chain, ism.to_config_node()))),
            ),
            Self::MerkleRootMultisigIsm { validators, threshold }
            | Self::MessageIdMultisigIsm { validators, threshold } => builder
                .node("validators", ConfigNode::addresses(validators.iter().copied()))
                .field("threshold", *threshold),
            Self::StaticAggregationIsm { modules, threshold } => builder
                .node("modules", ConfigNode::list(modules.iter().map(ToConfigNode::to_config_node)))
                .field("threshold", *threshold),
        };
        builder.variant(self.type_name())
    }
}

/// On-chain `moduleType()` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum ModuleType {
    Unused = 0,
    Routing = 1,
    Aggregation = 2,
    LegacyMultisig = 3,
    MerkleRootMultisig = 4,
    MessageIdMultisig = 5,
    Null = 6,
    CcipRead = 7,
    ArbL2ToL1 = 8,
    WeightedMerkleRootMultisig = 9,
    WeightedMessageIdMultisig = 10,
    OpL2ToL1 = 11,
}

/// ISM operations on one chain.
pub struct IsmModule<'a, C> {
    deployer: &'a Deployer<C>,
    chain: &'a ChainName,
    mailbox: Address,
}

impl<'a, C: ChainConnection> IsmModule<'a, C> {
    pub fn new(deployer: &'a Deployer<C>, chain: &'a ChainName, mailbox: Address) -> Self {
        Self {
            deployer,
            chain,
            mailbox,
        }
    }

    fn domain_of(&self, chain: &ChainName) -> Result<u32, ChainError> {
        match self.deployer.connection().metadata(chain) {
            Ok(metadata) => Ok(metadata.domain_id),
            Err(error) => chain.as_str().parse().map_err(|_| error),
        }
    }

    fn chain_of(&self, domain: u32) -> ChainName {
        self.deployer
            .connection()
            .chain_for_domain(domain)
            .unwrap_or_else(|| ChainName::new(domain.to_string()))
    }

    async fn derive_ism(&self, address: Address) -> Result<IsmConfig, ChainError> {
        let raw = self
            .deployer
            .read(self.chain, address, &IInterchainSecurityModule::moduleTypeCall {})
            .await?
            ._0;
        let module_type = ModuleType::from_repr(raw).ok_or_else(|| {
            ChainError::remote_read(
                self.chain,
                format!("ISM at {address}"),
                format!("unknown module type {raw}"),
            )
        })?;
        tracing::trace!(
            chain = %self.chain,
            address = %address,
            module_type = %module_type,
            "Deriving ISM"
        );

        let config = match module_type {
            ModuleType::Routing => {
                let owner = self.deployer.owner_of(self.chain, address).await?;
                let domain_ids = self
                    .deployer
                    .read(self.chain, address, &IRoutingIsm::domainsCall {})
                    .await?
                    ._0;
                let mut domains = BTreeMap::new();
                for domain in domain_ids {
                    let module = self
                        .deployer
                        .read(self.chain, address, &IRoutingIsm::moduleCall { origin: domain })
                        .await?
                        ._0;
                    domains.insert(self.chain_of(domain), self.derive(module).await?);
                }
                IsmConfig::DomainRoutingIsm { owner, domains }
            }
            ModuleType::Aggregation => {
                let ret = self
                    .deployer
                    .read(
                        self.chain,
                        address,
                        &IAggregationIsm::modulesAndThresholdCall { message: Bytes::new() },
                    )
                    .await?;
                let mut modules = Vec::with_capacity(ret.modules.len());
                for module in ret.modules {
                    modules.push(self.derive(module).await?);
                }
                IsmConfig::StaticAggregationIsm {
                    modules,
                    threshold: ret.threshold,
                }
            }
            ModuleType::MerkleRootMultisig | ModuleType::MessageIdMultisig => {
                let ret = self
                    .deployer
                    .read(
                        self.chain,
                        address,
                        &IMultisigIsm::validatorsAndThresholdCall { message: Bytes::new() },
                    )
                    .await?;
                if module_type == ModuleType::MerkleRootMultisig {
                    IsmConfig::MerkleRootMultisigIsm {
                        validators: ret.validators,
                        threshold: ret.threshold,
                    }
                } else {
                    IsmConfig::MessageIdMultisigIsm {
                        validators: ret.validators,
                        threshold: ret.threshold,
                    }
                }
            }
            ModuleType::Null => {
                if let Some(ret) = self
                    .deployer
                    .try_read(self.chain, address, &ITrustedRelayerIsm::trustedRelayerCall {})
                    .await?
                {
                    IsmConfig::TrustedRelayerIsm { relayer: ret._0 }
                } else if let Some(ret) = self
                    .deployer
                    .try_read(self.chain, address, &IPausable::pausedCall {})
                    .await?
                {
                    IsmConfig::PausableIsm {
                        owner: self.deployer.owner_of(self.chain, address).await?,
                        paused: ret._0,
                    }
                } else {
                    IsmConfig::TestIsm
                }
            }
            other => {
                return Err(ChainError::remote_read(
                    self.chain,
                    format!("ISM at {address}"),
                    format!("unsupported module type {other}"),
                ));
            }
        };
        Ok(config)
    }

    async fn deploy_ism(&self, config: &IsmConfig) -> Result<Address, ChainError> {
        let chain = self.chain;
        let role = ContractRole::from(match config {
            IsmConfig::TestIsm => roles::TEST_ISM,
            IsmConfig::TrustedRelayerIsm { .. } => roles::TRUSTED_RELAYER_ISM,
            IsmConfig::PausableIsm { .. } => roles::PAUSABLE_ISM,
            IsmConfig::DomainRoutingIsm { .. } => roles::DOMAIN_ROUTING_ISM,
            IsmConfig::MerkleRootMultisigIsm { .. } => roles::MERKLE_ROOT_MULTISIG_ISM,
            IsmConfig::MessageIdMultisigIsm { .. } => roles::MESSAGE_ID_MULTISIG_ISM,
            IsmConfig::StaticAggregationIsm { .. } => roles::STATIC_AGGREGATION_ISM,
        });

        let address = match config {
            IsmConfig::TestIsm => {
                self.deployer
                    .deploy_contract_from_factory(chain, &role, Bytes::new())
                    .await?
            }
            IsmConfig::TrustedRelayerIsm { relayer } => {
                let args = (self.mailbox, *relayer).abi_encode_params();
                self.deployer
                    .deploy_contract_from_factory(chain, &role, args.into())
                    .await?
            }
            IsmConfig::PausableIsm { owner, paused } => {
                let signer = self.deployer.signer(chain).await?;
                let args = (signer,).abi_encode_params();
                let address = self
                    .deployer
                    .deploy_contract_from_factory(chain, &role, args.into())
                    .await?;
                if *paused {
                    self.deployer
                        .send(chain, address, &IPausable::pauseCall {}, "Pausing ISM")
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
            IsmConfig::DomainRoutingIsm { owner, domains } => {
                let mut domain_ids = Vec::with_capacity(domains.len());
                let mut modules = Vec::with_capacity(domains.len());
                for (origin, module) in domains {
                    domain_ids.push(self.domain_of(origin)?);
                    modules.push(self.deploy(module).await?);
                }
                let address = self
                    .deployer
                    .deploy_contract_from_factory(chain, &role, Bytes::new())
                    .await?;
                self.deployer
                    .send(
                        chain,
                        address,
                        &IRoutingIsm::initializeCall {
                            owner: *owner,
                            domains: domain_ids,
                            modules,
                        },
                        "Initializing routing ISM",
                    )
                    .await?;
                address
            }
            IsmConfig::MerkleRootMultisigIsm { validators, threshold }
            | IsmConfig::MessageIdMultisigIsm { validators, threshold } => {
                let args =
                    <(sol_data::Array<sol_data::Address>, sol_data::Uint<8>)>::abi_encode_params(
                        &(validators.clone(), *threshold),
                    );
                self.deployer
                    .deploy_contract_from_factory(chain, &role, args.into())
                    .await?
            }
            IsmConfig::StaticAggregationIsm { modules, threshold } => {
                let mut addresses = Vec::with_capacity(modules.len());
                for module in modules {
                    addresses.push(self.deploy(module).await?);
                }
                let args =
                    <(sol_data::Array<sol_data::Address>, sol_data::Uint<8>)>::abi_encode_params(
                        &(addresses, *threshold),
                    );
                self.deployer
                    .deploy_contract_from_factory(chain, &role, args.into())
                    .await?
            }
        };

        tracing::info!(
            chain = %chain,
            ism = config.type_name(),
            address = %address,
            "ISM deployed"
        );
        Ok(address)
    }

    async fn patch_ism(
        &self,
        address: Address,
        current: &IsmConfig,
        desired: &IsmConfig,
    ) -> Result<Option<Vec<TransactionSpec>>, ChainError> {
        let chain_id = self.deployer.chain_id(self.chain)?;
        match (current, desired) {
            (
                IsmConfig::DomainRoutingIsm {
                    owner: current_owner,
                    domains: current_domains,
                },
                IsmConfig::DomainRoutingIsm { owner, domains },
            ) => {
                let mut txs = Vec::new();
                for (origin, module) in domains {
                    let unchanged = current_domains.get(origin).is_some_and(|existing| {
                        check_against(&module.to_config_node(), &existing.to_config_node())
                            .is_empty()
                    });
                    if unchanged {
                        continue;
                    }
                    let domain = self.domain_of(origin)?;
                    let replacement = self.deploy(module).await?;
                    txs.push(TransactionSpec::call(
                        chain_id,
                        address,
                        &IRoutingIsm::setCall { domain, module: replacement },
                        format!("Setting ISM for origin {origin} to {replacement}"),
                    ));
                }
                for origin in current_domains
                    .keys()
                    .filter(|origin| !domains.contains_key(*origin))
                {
                    let domain = self.domain_of(origin)?;
                    txs.push(TransactionSpec::call(
                        chain_id,
                        address,
                        &IRoutingIsm::removeCall { domain },
                        format!("Removing ISM for origin {origin}"),
                    ));
                }
                txs.extend(transfer_ownership_transaction(
                    chain_id,
                    "routing ISM",
                    address,
                    *current_owner,
                    *owner,
                ));
                Ok(Some(txs))
            }
            (
                IsmConfig::PausableIsm {
                    owner: current_owner,
                    paused: current_paused,
                },
                IsmConfig::PausableIsm { owner, paused },
            ) => {
                let mut txs = Vec::new();
                if current_paused != paused {
                    txs.push(if *paused {
                        TransactionSpec::call(
                            chain_id,
                            address,
                            &IPausable::pauseCall {},
                            format!("Pausing ISM {address}"),
                        )
                    } else {
                        TransactionSpec::call(
                            chain_id,
                            address,
                            &IPausable::unpauseCall {},
                            format!("Unpausing ISM {address}"),
                        )
                    });
                }
                txs.extend(transfer_ownership_transaction(
                    chain_id,
                    "pausable ISM",
                    address,
                    *current_owner,
                    *owner,
                ));
                Ok(Some(txs))
            }
            _ => Ok(None),
        }
    }
}

impl<C: ChainConnection> ModuleManager for IsmModule<'_, C> {
    type Config = IsmConfig;

    const LABEL: &'static str = "interchainSecurityModule";

    fn derive(&self, address: Address) -> LocalBoxFuture<'_, Result<IsmConfig, ChainError>> {
        self.derive_ism(address).boxed_local()
    }

    fn deploy<'b>(
        &'b self,
        config: &'b IsmConfig,
    ) -> LocalBoxFuture<'b, Result<Address, ChainError>> {
        self.deploy_ism(config).boxed_local()
    }

    fn patch<'b>(
        &'b self,
        address: Address,
        current: &'b IsmConfig,
        desired: &'b IsmConfig,
    ) -> LocalBoxFuture<'b, Result<Option<Vec<TransactionSpec>>, ChainError>> {
        self.patch_ism(address, current, desired).boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ism_config_deserializes_tagged() {
        let config: IsmConfig = serde_json::from_str(
            r#"{
                "type": "domainRoutingIsm",
                "owner": "0x0101010101010101010101010101010101010101",
                "domains": {
                    "alpha": {"type": "testIsm"},
                    "beta": {"type": "messageIdMultisigIsm", "validators": [], "threshold": 1}
                }
            }"#,
        )
        .unwrap();

        match &config {
            IsmConfig::DomainRoutingIsm { domains, .. } => {
                assert_eq!(domains.len(), 2);
                assert_eq!(domains[&ChainName::from("alpha")], IsmConfig::TestIsm);
            }
            other => panic!("unexpected config {other:?}"),
        }
        assert_eq!(config.type_name(), "domainRoutingIsm");
    }

    #[test]
    fn test_module_ref_accepts_address_or_config() {
        let by_address: super::super::IsmRef =
            serde_json::from_str(r#""0x0202020202020202020202020202020202020202""#).unwrap();
        assert_eq!(by_address, super::super::ModuleRef::Address(Address::repeat_byte(2)));

        let by_config: super::super::IsmRef =
            serde_json::from_str(r#"{"type": "testIsm"}"#).unwrap();
        assert_eq!(by_config, super::super::ModuleRef::Config(IsmConfig::TestIsm));
    }

    #[test]
    fn test_multisig_validator_order_is_irrelevant() {
        let left = IsmConfig::MessageIdMultisigIsm {
            validators: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            threshold: 1,
        };
        let right = IsmConfig::MessageIdMultisigIsm {
            validators: vec![Address::repeat_byte(2), Address::repeat_byte(1)],
            threshold: 1,
        };
        assert_eq!(left.to_config_node(), right.to_config_node());
    }

    #[test]
    fn test_module_type_from_repr() {
        assert_eq!(ModuleType::from_repr(1), Some(ModuleType::Routing));
        assert_eq!(ModuleType::from_repr(6), Some(ModuleType::Null));
        assert_eq!(ModuleType::from_repr(42), None);
    }
}
