//! Warp routes: token bridges with one router per chain.

use alloy_core::{
    primitives::{Address, Bytes, U256},
    sol_types::{SolCall, SolType, SolValue, sol_data},
};
use serde::{Deserialize, Serialize};

use crate::{
    ChainConnection, ChainError, ChainMap, ChainName, ContractRole, Deployer, ProtocolType,
    RouterConfig, RouterContext, RouterKind, TokenConfig, TokenMetadata,
    abi::{IErc20, IErc4626, IMailboxClient, ISyntheticToken, IXerc20Lockbox},
};

fn default_scale() -> u64 {
    1
}

fn is_default_scale(scale: &u64) -> bool {
    *scale == 1
}

/// Desired config of one chain of a warp route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpRouteConfig {
    #[serde(flatten)]
    pub router: RouterConfig,
    #[serde(flatten)]
    pub token: TokenConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    /// Multiplier from local to message amounts.
    #[serde(default = "default_scale", skip_serializing_if = "is_default_scale")]
    pub scale: u64,
}

impl WarpRouteConfig {
    pub fn new(router: RouterConfig, token: TokenConfig) -> Self {
        Self {
            router,
            token,
            name: None,
            symbol: None,
            decimals: None,
            scale: default_scale(),
        }
    }

    fn metadata(&self) -> Option<TokenMetadata> {
        Some(TokenMetadata {
            name: self.name.clone()?,
            symbol: self.symbol.clone()?,
            decimals: self.decimals?,
        })
    }

    fn has_metadata(&self) -> bool {
        self.name.is_some() && self.symbol.is_some() && self.decimals.is_some()
    }

    fn fill_metadata(&mut self, metadata: &TokenMetadata) {
        self.name.get_or_insert_with(|| metadata.name.clone());
        self.symbol.get_or_insert_with(|| metadata.symbol.clone());
        self.decimals.get_or_insert(metadata.decimals);
    }
}

/// Router kind deploying `Aet*` token routers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenRouterKind;

impl TokenRouterKind {
    /// Metadata of the route's token, from the first source that has it.
    ///
    /// Explicit config wins, then a native chain's configured currency, then the ERC20
    /// getters of a collateral token on an EVM chain.
    async fn derive_metadata<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        configs: &ChainMap<WarpRouteConfig>,
    ) -> Option<TokenMetadata> {
        if let Some(metadata) = configs.values().find_map(WarpRouteConfig::metadata) {
            return Some(metadata);
        }

        for (chain, config) in configs {
            let Ok(metadata) = deployer.connection().metadata(chain) else {
                continue;
            };
            if metadata.protocol != ProtocolType::Ethereum {
                continue;
            }

            if matches!(config.token, TokenConfig::Native) {
                if let Some(native) = metadata.native_token {
                    return Some(native);
                }
                continue;
            }

            match self.erc20_metadata(deployer, chain, &config.token).await {
                Ok(Some(metadata)) => return Some(metadata),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(chain = %chain, error = %error, "Could not read token metadata");
                }
            }
        }
        None
    }

    /// Name, symbol and decimals of the ERC20 behind `token`, when it exposes all three.
    async fn erc20_metadata<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        token: &TokenConfig,
    ) -> Result<Option<TokenMetadata>, ChainError> {
        let Some(token) = self.erc20_behind(deployer, chain, token).await? else {
            return Ok(None);
        };
        let name = deployer.try_read(chain, token, &IErc20::nameCall {}).await?;
        let symbol = deployer.try_read(chain, token, &IErc20::symbolCall {}).await?;
        let decimals = deployer.try_read(chain, token, &IErc20::decimalsCall {}).await?;
        let (Some(name), Some(symbol), Some(decimals)) = (name, symbol, decimals) else {
            return Ok(None);
        };
        tracing::debug!(
            chain = %chain,
            token = %token,
            symbol = %symbol._0,
            "Derived token metadata"
        );
        Ok(Some(TokenMetadata {
            name: name._0,
            symbol: symbol._0,
            decimals: decimals._0,
        }))
    }

    /// The ERC20 whose metadata the route mirrors, unwrapping lockboxes and vaults.
    async fn erc20_behind<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        token: &TokenConfig,
    ) -> Result<Option<Address>, ChainError> {
        Ok(match token {
            TokenConfig::Collateral { token }
            | TokenConfig::CollateralFiat { token }
            | TokenConfig::Xerc20 { token } => Some(*token),
            TokenConfig::Xerc20Lockbox { token } => deployer
                .try_read(chain, *token, &IXerc20Lockbox::ERC20Call {})
                .await?
                .map(|ret| ret._0),
            TokenConfig::CollateralVault { token } => deployer
                .try_read(chain, *token, &IErc4626::assetCall {})
                .await?
                .map(|ret| ret._0),
            TokenConfig::Native
            | TokenConfig::Synthetic { .. }
            | TokenConfig::SyntheticRebase { .. } => None,
        })
    }

    fn required_decimals(
        context: &RouterContext<'_>,
        config: &WarpRouteConfig,
    ) -> Result<u8, ChainError> {
        config.decimals.ok_or_else(|| {
            ChainError::configuration(
                context.chain,
                "token decimals are required and could not be derived",
            )
        })
    }
}

impl RouterKind for TokenRouterKind {
    type Config = WarpRouteConfig;

    const KIND_NAME: &'static str = "warp";

    fn router_config(config: &WarpRouteConfig) -> &RouterConfig {
        &config.router
    }

    fn router_contract_key(&self, config: &WarpRouteConfig) -> ContractRole {
        ContractRole::from(config.token.type_name())
    }

    fn router_contract_name(&self, config: &WarpRouteConfig) -> String {
        match config.token {
            TokenConfig::Native => "AetNative",
            TokenConfig::Collateral { .. } => "AetERC20Collateral",
            TokenConfig::CollateralVault { .. } => "AetERC4626OwnerCollateral",
            TokenConfig::CollateralFiat { .. } => "AetFiatToken",
            TokenConfig::Xerc20 { .. } => "AetXERC20",
            TokenConfig::Xerc20Lockbox { .. } => "AetXERC20Lockbox",
            TokenConfig::Synthetic { .. } => "AetERC20",
            TokenConfig::SyntheticRebase { .. } => "AetERC4626",
        }
        .to_string()
    }

    fn constructor_args(
        &self,
        context: &RouterContext<'_>,
        config: &WarpRouteConfig,
    ) -> Result<Bytes, ChainError> {
        let scale = U256::from(config.scale);
        let args = match &config.token {
            TokenConfig::Native => (scale, context.mailbox).abi_encode_params(),
            TokenConfig::Collateral { token }
            | TokenConfig::CollateralVault { token }
            | TokenConfig::CollateralFiat { token }
            | TokenConfig::Xerc20 { token }
            | TokenConfig::Xerc20Lockbox { token } => {
                (*token, scale, context.mailbox).abi_encode_params()
            }
            TokenConfig::Synthetic { .. } => {
                let decimals = Self::required_decimals(context, config)?;
                <(sol_data::Uint<8>, sol_data::Uint<256>, sol_data::Address)>::abi_encode_params(
                    &(decimals, scale, context.mailbox),
                )
            }
            TokenConfig::SyntheticRebase {
                collateral_chain_name,
            } => {
                let decimals = Self::required_decimals(context, config)?;
                let collateral_domain = context
                    .domains
                    .get(collateral_chain_name)
                    .copied()
                    .ok_or_else(|| {
                        ChainError::configuration(
                            context.chain,
                            format!("collateral chain {collateral_chain_name} has no known domain"),
                        )
                    })?;
                <(
                    sol_data::Uint<8>,
                    sol_data::Uint<256>,
                    sol_data::Address,
                    sol_data::Uint<32>,
                )>::abi_encode_params(
                    &(decimals, scale, context.mailbox, collateral_domain),
                )
            }
        };
        Ok(args.into())
    }

    fn initialize_args(
        &self,
        context: &RouterContext<'_>,
        config: &WarpRouteConfig,
    ) -> Result<Bytes, ChainError> {
        let data = match &config.token {
            TokenConfig::Synthetic { .. } | TokenConfig::SyntheticRebase { .. } => {
                let (Some(name), Some(symbol)) = (&config.name, &config.symbol) else {
                    return Err(ChainError::configuration(
                        context.chain,
                        "synthetic token name and symbol are required",
                    ));
                };
                let total_supply = match &config.token {
                    TokenConfig::Synthetic { initial_supply } => *initial_supply,
                    _ => U256::ZERO,
                };
                ISyntheticToken::initializeCall {
                    totalSupply: total_supply,
                    name: name.clone(),
                    symbol: symbol.clone(),
                    hook: context.hook,
                    interchainSecurityModule: context.interchain_security_module,
                    owner: context.signer,
                }
                .abi_encode()
            }
            _ => IMailboxClient::initializeCall {
                hook: context.hook,
                interchainSecurityModule: context.interchain_security_module,
                owner: context.signer,
            }
            .abi_encode(),
        };
        Ok(data.into())
    }

    async fn prepare_configs<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        configs: &ChainMap<WarpRouteConfig>,
    ) -> ChainMap<WarpRouteConfig> {
        let mut configs = configs.clone();
        if configs.values().all(WarpRouteConfig::has_metadata) {
            return configs;
        }

        match self.derive_metadata(deployer, &configs).await {
            Some(metadata) => {
                tracing::info!(
                    name = %metadata.name,
                    symbol = %metadata.symbol,
                    decimals = metadata.decimals,
                    "Using token metadata"
                );
                for config in configs.values_mut() {
                    config.fill_metadata(&metadata);
                }
            }
            None => tracing::warn!("Could not derive token metadata for warp route"),
        }
        configs
    }
}
