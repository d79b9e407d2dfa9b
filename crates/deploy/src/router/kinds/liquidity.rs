//! Liquidity layer routers with optional Circle and Portal bridge adapters.

use alloy_core::{
    primitives::{Address, Bytes},
    sol_types::{SolCall, SolValue},
};
use serde::{Deserialize, Serialize};

use crate::{
    ChainConnection, ChainError, ChainName, ContractRole, Deployer, RouterConfig, RouterContext,
    RouterKind,
    abi::{ICircleBridgeAdapter, ILiquidityLayerRouter, IMailboxClient, IPortalAdapter},
};

pub const LIQUIDITY_LAYER_ROUTER: &str = "liquidityLayerRouter";
pub const CIRCLE_BRIDGE_ADAPTER: &str = "circleBridgeAdapter";
pub const PORTAL_ADAPTER: &str = "portalAdapter";

const CIRCLE_BRIDGE: &str = "Circle";
const PORTAL_BRIDGE: &str = "Portal";
const USDC: &str = "USDC";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleDomainMapping {
    pub aetherium_domain: u32,
    pub circle_domain: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WormholeDomainMapping {
    pub aetherium_domain: u32,
    pub wormhole_domain: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircleBridgeConfig {
    pub token_messenger_address: Address,
    pub message_transmitter_address: Address,
    pub usdc_address: Address,
    #[serde(default)]
    pub circle_domain_mapping: Vec<CircleDomainMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBridgeConfig {
    pub portal_bridge_address: Address,
    #[serde(default)]
    pub wormhole_domain_mapping: Vec<WormholeDomainMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityLayerConfig {
    #[serde(flatten)]
    pub router: RouterConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circle: Option<CircleBridgeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portal: Option<PortalBridgeConfig>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LiquidityLayerRouterKind;

impl LiquidityLayerRouterKind {
    async fn configure_circle<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        context: &RouterContext<'_>,
        config: &CircleBridgeConfig,
        router: Address,
    ) -> Result<Address, ChainError> {
        let chain = context.chain;
        let adapter = deployer
            .deploy_contract_and_initialize(
                chain,
                &CIRCLE_BRIDGE_ADAPTER.into(),
                (context.mailbox,).abi_encode_params().into(),
                ICircleBridgeAdapter::initializeCall {
                    owner: context.signer,
                    tokenMessenger: config.token_messenger_address,
                    messageTransmitter: config.message_transmitter_address,
                    liquidityLayerRouter: router,
                }
                .abi_encode()
                .into(),
            )
            .await?;

        for mapping in &config.circle_domain_mapping {
            let current = deployer
                .read(
                    chain,
                    adapter,
                    &ICircleBridgeAdapter::aetheriumDomainToCircleDomainCall {
                        domain: mapping.aetherium_domain,
                    },
                )
                .await?
                ._0;
            if current == mapping.circle_domain {
                tracing::debug!(
                    chain = %chain,
                    domain = mapping.aetherium_domain,
                    "Circle domain already mapped"
                );
                continue;
            }
            deployer
                .run_if_owner(chain, adapter, || async move {
                    deployer.send(
                        chain,
                        adapter,
                        &ICircleBridgeAdapter::addDomainCall {
                            domain: mapping.aetherium_domain,
                            circleDomain: mapping.circle_domain,
                        },
                        format!(
                            "Mapping domain {} to Circle domain {}",
                            mapping.aetherium_domain, mapping.circle_domain
                        ),
                    )
                    .await
                })
                .await?;
        }

        let token = deployer
            .read(
                chain,
                adapter,
                &ICircleBridgeAdapter::tokenSymbolToAddressCall {
                    symbol: USDC.to_string(),
                },
            )
            .await?
            ._0;
        if token != config.usdc_address {
            deployer
                .run_if_owner(chain, adapter, || async move {
                    deployer.send(
                        chain,
                        adapter,
                        &ICircleBridgeAdapter::addTokenCall {
                            token: config.usdc_address,
                            symbol: USDC.to_string(),
                        },
                        format!("Adding {USDC} token {}", config.usdc_address),
                    )
                    .await
                })
                .await?;
        }
        Ok(adapter)
    }

    async fn configure_portal<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        context: &RouterContext<'_>,
        config: &PortalBridgeConfig,
        router: Address,
    ) -> Result<Address, ChainError> {
        let chain = context.chain;
        let adapter = deployer
            .deploy_contract_and_initialize(
                chain,
                &PORTAL_ADAPTER.into(),
                (context.mailbox,).abi_encode_params().into(),
                IPortalAdapter::initializeCall {
                    owner: context.signer,
                    portalBridge: config.portal_bridge_address,
                    liquidityLayerRouter: router,
                }
                .abi_encode()
                .into(),
            )
            .await?;

        for mapping in &config.wormhole_domain_mapping {
            let current = deployer
                .read(
                    chain,
                    adapter,
                    &IPortalAdapter::aetheriumDomainToWormholeDomainCall {
                        domain: mapping.aetherium_domain,
                    },
                )
                .await?
                ._0;
            if current == mapping.wormhole_domain {
                tracing::debug!(
                    chain = %chain,
                    domain = mapping.aetherium_domain,
                    "Wormhole domain already mapped"
                );
                continue;
            }
            deployer
                .run_if_owner(chain, adapter, || async move {
                    deployer.send(
                        chain,
                        adapter,
                        &IPortalAdapter::addDomainCall {
                            domain: mapping.aetherium_domain,
                            wormholeDomain: mapping.wormhole_domain,
                        },
                        format!(
                            "Mapping domain {} to Wormhole domain {}",
                            mapping.aetherium_domain, mapping.wormhole_domain
                        ),
                    )
                    .await
                })
                .await?;
        }
        Ok(adapter)
    }

    /// Point the router's `bridge` slot at `adapter` unless it already is.
    async fn register_adapter<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        router: Address,
        bridge: &str,
        adapter: Address,
    ) -> Result<(), ChainError> {
        let current = deployer
            .read(
                chain,
                router,
                &ILiquidityLayerRouter::liquidityLayerAdaptersCall {
                    bridge: bridge.to_string(),
                },
            )
            .await?
            ._0;
        if current == adapter {
            tracing::debug!(
                chain = %chain,
                bridge,
                adapter = %adapter,
                "Adapter already registered"
            );
            return Ok(());
        }

        let sent = deployer
            .run_if_owner(chain, router, || async move {
                deployer.send(
                    chain,
                    router,
                    &ILiquidityLayerRouter::setLiquidityLayerAdapterCall {
                        bridge: bridge.to_string(),
                        adapter,
                    },
                    format!("Registering {bridge} adapter {adapter}"),
                )
                .await
            })
            .await?;
        if sent.is_none() {
            tracing::warn!(
                chain = %chain,
                bridge,
                "Signer no longer owns router, adapter not registered"
            );
        }
        Ok(())
    }
}

impl RouterKind for LiquidityLayerRouterKind {
    type Config = LiquidityLayerConfig;

    const KIND_NAME: &'static str = "liquidity-layer";

    fn router_config(config: &LiquidityLayerConfig) -> &RouterConfig {
        &config.router
    }

    fn router_contract_key(&self, _config: &LiquidityLayerConfig) -> ContractRole {
        LIQUIDITY_LAYER_ROUTER.into()
    }

    fn router_contract_name(&self, _config: &LiquidityLayerConfig) -> String {
        "LiquidityLayerRouter".to_string()
    }

    fn constructor_args(
        &self,
        context: &RouterContext<'_>,
        _config: &LiquidityLayerConfig,
    ) -> Result<Bytes, ChainError> {
        Ok((context.mailbox,).abi_encode_params().into())
    }

    fn initialize_args(
        &self,
        context: &RouterContext<'_>,
        _config: &LiquidityLayerConfig,
    ) -> Result<Bytes, ChainError> {
        Ok(IMailboxClient::initializeCall {
            hook: context.hook,
            interchainSecurityModule: context.interchain_security_module,
            owner: context.signer,
        }
        .abi_encode()
        .into())
    }

    async fn deploy_extensions<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        context: &RouterContext<'_>,
        config: &LiquidityLayerConfig,
        router: Address,
    ) -> Result<(), ChainError> {
        if let Some(circle) = &config.circle {
            let adapter = self.configure_circle(deployer, context, circle, router).await?;
            self.register_adapter(deployer, context.chain, router, CIRCLE_BRIDGE, adapter)
                .await?;
        }
        if let Some(portal) = &config.portal {
            let adapter = self.configure_portal(deployer, context, portal, router).await?;
            self.register_adapter(deployer, context.chain, router, PORTAL_BRIDGE, adapter)
                .await?;
        }
        Ok(())
    }

    fn auxiliary_roles(&self, config: &LiquidityLayerConfig) -> Vec<ContractRole> {
        let mut roles = Vec::new();
        if config.circle.is_some() {
            roles.push(CIRCLE_BRIDGE_ADAPTER.into());
        }
        if config.portal.is_some() {
            roles.push(PORTAL_ADAPTER.into());
        }
        roles
    }
}
