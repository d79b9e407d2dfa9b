//! Token flavours a warp route can bridge, and the capability adapters that read and move
//! them.

use alloy_core::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::ChainName;

mod adapter;

pub use adapter::{
    AetRouter, BalanceQuery, BridgedSupply, Erc20Token, Holding, NativeToken, RateLimitState,
    RateLimits, RemoteTransfer, Supply, TokenAdapter, TokenTransfer, Xerc20Limits,
};

/// What a warp route router wraps on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::IntoStaticStr)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum TokenConfig {
    /// The chain's native currency, escrowed by the router.
    Native,
    /// An ERC20 escrowed by the router.
    Collateral { token: Address },
    /// An ERC4626 vault share escrowed by the router.
    CollateralVault { token: Address },
    /// A fiat-backed token the router burns and mints.
    CollateralFiat { token: Address },
    /// An xERC20 the router mints and burns within its rate limits.
    Xerc20 { token: Address },
    /// An xERC20 lockbox; `token` is the lockbox.
    Xerc20Lockbox { token: Address },
    /// A token minted by the router itself.
    Synthetic {
        #[serde(default)]
        initial_supply: U256,
    },
    /// A synthetic tracking the yield of a vault on `collateral_chain_name`.
    SyntheticRebase { collateral_chain_name: ChainName },
}

impl TokenConfig {
    pub fn type_name(&self) -> &'static str {
        self.into()
    }

    /// Escrowed or wrapped token, if any.
    pub fn collateral_token(&self) -> Option<Address> {
        match self {
            Self::Collateral { token }
            | Self::CollateralVault { token }
            | Self::CollateralFiat { token }
            | Self::Xerc20 { token }
            | Self::Xerc20Lockbox { token } => Some(*token),
            Self::Native | Self::Synthetic { .. } | Self::SyntheticRebase { .. } => None,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Synthetic { .. } | Self::SyntheticRebase { .. })
    }
}

/// Token standards an adapter can be assembled for.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum TokenStandard {
    Native,
    Erc20,
    AetNative,
    AetCollateral,
    AetOwnerCollateral,
    AetCollateralFiat,
    AetXerc20,
    AetXerc20Lockbox,
    AetSynthetic,
    AetSyntheticRebase,
}

impl From<&TokenConfig> for TokenStandard {
    fn from(config: &TokenConfig) -> Self {
        match config {
            TokenConfig::Native => Self::AetNative,
            TokenConfig::Collateral { .. } => Self::AetCollateral,
            TokenConfig::CollateralVault { .. } => Self::AetOwnerCollateral,
            TokenConfig::CollateralFiat { .. } => Self::AetCollateralFiat,
            TokenConfig::Xerc20 { .. } => Self::AetXerc20,
            TokenConfig::Xerc20Lockbox { .. } => Self::AetXerc20Lockbox,
            TokenConfig::Synthetic { .. } => Self::AetSynthetic,
            TokenConfig::SyntheticRebase { .. } => Self::AetSyntheticRebase,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_config_tags() {
        let config: TokenConfig = serde_json::from_str(
            r#"{"type": "syntheticRebase", "collateralChainName": "alpha"}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            TokenConfig::SyntheticRebase {
                collateral_chain_name: "alpha".into()
            }
        );
        assert_eq!(config.type_name(), "syntheticRebase");
        assert!(config.is_synthetic());

        let lockbox: TokenConfig = serde_json::from_str(
            r#"{"type": "xerc20Lockbox", "token": "0x0101010101010101010101010101010101010101"}"#,
        )
        .unwrap();
        assert_eq!(lockbox.collateral_token(), Some(Address::repeat_byte(1)));
    }

    #[test]
    fn test_standard_for_every_router_type() {
        assert_eq!(TokenStandard::from(&TokenConfig::Native), TokenStandard::AetNative);
        assert_eq!(
            TokenStandard::from(&TokenConfig::Synthetic {
                initial_supply: U256::ZERO
            }),
            TokenStandard::AetSynthetic
        );
        assert_eq!("aetXerc20".parse::<TokenStandard>().unwrap(), TokenStandard::AetXerc20);
    }
}
