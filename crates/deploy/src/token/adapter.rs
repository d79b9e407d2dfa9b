use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes, U256};

use super::TokenStandard;
use crate::{
    ChainConnection, ChainError, ChainName, Deployer, TransactionSpec,
    abi::{IErc20, ILockboxTokenRouter, ITokenRouter, IXerc20},
};

/// Balance of an account in one token.
pub trait BalanceQuery {
    fn balance_of(&self, account: Address) -> impl Future<Output = Result<U256, ChainError>>;
}

/// Local transfer of one token.
pub trait TokenTransfer {
    fn transfer_transaction(
        &self,
        chain_id: u64,
        recipient: Address,
        amount: U256,
    ) -> TransactionSpec;
}

/// Cross-chain transfer through a warp route router.
pub trait RemoteTransfer {
    /// Interchain gas owed for a transfer to `destination`.
    fn quote_gas_payment(&self, destination: u32) -> impl Future<Output = Result<U256, ChainError>>;

    fn transfer_remote_transaction(
        &self,
        chain_id: u64,
        destination: u32,
        recipient: B256,
        amount: U256,
        gas_payment: U256,
    ) -> TransactionSpec;
}

/// Amount of the token currently bridged through the route on this chain.
pub trait BridgedSupply {
    fn bridged_supply(&self) -> impl Future<Output = Result<U256, ChainError>>;
}

/// Current and maximum xERC20 limits of one bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    pub minting_current: U256,
    pub minting_max: U256,
    pub burning_current: U256,
    pub burning_max: U256,
}

/// Minting and burning limits of a bridge on an xERC20.
pub trait RateLimits {
    fn rate_limits(&self) -> impl Future<Output = Result<RateLimitState, ChainError>>;

    fn set_limits_transaction(
        &self,
        chain_id: u64,
        minting: U256,
        burning: U256,
    ) -> TransactionSpec;
}

/// The chain's native currency.
pub struct NativeToken<'a, C> {
    deployer: &'a Deployer<C>,
    chain: &'a ChainName,
}

impl<C: ChainConnection> BalanceQuery for NativeToken<'_, C> {
    async fn balance_of(&self, account: Address) -> Result<U256, ChainError> {
        self.deployer
            .connection()
            .balance(self.chain, account)
            .await
            .map_err(|e| {
                ChainError::remote_read(self.chain, format!("native balance of {account}"), e)
            })
    }
}

impl<C> TokenTransfer for NativeToken<'_, C> {
    fn transfer_transaction(
        &self,
        chain_id: u64,
        recipient: Address,
        amount: U256,
    ) -> TransactionSpec {
        TransactionSpec {
            chain_id,
            to: Some(recipient),
            data: Bytes::new(),
            value: Some(amount),
            annotation: format!("Transferring {amount} native to {recipient}"),
        }
    }
}

/// A plain ERC20.
pub struct Erc20Token<'a, C> {
    deployer: &'a Deployer<C>,
    chain: &'a ChainName,
    pub address: Address,
}

impl<C: ChainConnection> BalanceQuery for Erc20Token<'_, C> {
    async fn balance_of(&self, account: Address) -> Result<U256, ChainError> {
        Ok(self
            .deployer
            .read(self.chain, self.address, &IErc20::balanceOfCall { account })
            .await?
            ._0)
    }
}

impl<C> TokenTransfer for Erc20Token<'_, C> {
    fn transfer_transaction(
        &self,
        chain_id: u64,
        recipient: Address,
        amount: U256,
    ) -> TransactionSpec {
        TransactionSpec::call(
            chain_id,
            self.address,
            &IErc20::transferCall { to: recipient, amount },
            format!("Transferring {amount} of {} to {recipient}", self.address),
        )
    }
}

/// How a user holds the route's token on this chain.
pub enum Holding<'a, C> {
    Native(NativeToken<'a, C>),
    Erc20(Erc20Token<'a, C>),
}

impl<C: ChainConnection> BalanceQuery for Holding<'_, C> {
    async fn balance_of(&self, account: Address) -> Result<U256, ChainError> {
        match self {
            Self::Native(token) => token.balance_of(account).await,
            Self::Erc20(token) => token.balance_of(account).await,
        }
    }
}

impl<C> TokenTransfer for Holding<'_, C> {
    fn transfer_transaction(
        &self,
        chain_id: u64,
        recipient: Address,
        amount: U256,
    ) -> TransactionSpec {
        match self {
            Self::Native(token) => token.transfer_transaction(chain_id, recipient, amount),
            Self::Erc20(token) => token.transfer_transaction(chain_id, recipient, amount),
        }
    }
}

/// The warp route router itself.
pub struct AetRouter<'a, C> {
    deployer: &'a Deployer<C>,
    chain: &'a ChainName,
    pub address: Address,
    /// Native routers take the amount as call value.
    native: bool,
}

impl<C: ChainConnection> RemoteTransfer for AetRouter<'_, C> {
    async fn quote_gas_payment(&self, destination: u32) -> Result<U256, ChainError> {
        Ok(self
            .deployer
            .read(self.chain, self.address, &ITokenRouter::quoteGasPaymentCall { destination })
            .await?
            ._0)
    }

    fn transfer_remote_transaction(
        &self,
        chain_id: u64,
        destination: u32,
        recipient: B256,
        amount: U256,
        gas_payment: U256,
    ) -> TransactionSpec {
        let value = if self.native { gas_payment + amount } else { gas_payment };
        TransactionSpec::call(
            chain_id,
            self.address,
            &ITokenRouter::transferRemoteCall {
                destination,
                recipient,
                amount,
            },
            format!("Transferring {amount} to domain {destination}"),
        )
        .with_value(value)
    }
}

/// Where the bridged amount is measured.
pub enum Supply<'a, C> {
    /// Total supply of a token the route mints.
    Minted(Erc20Token<'a, C>),
    /// Balance held in escrow by the router.
    Escrowed { holding: Holding<'a, C>, escrow: Address },
}

impl<C: ChainConnection> BridgedSupply for Supply<'_, C> {
    async fn bridged_supply(&self) -> Result<U256, ChainError> {
        match self {
            Self::Minted(token) => Ok(token
                .deployer
                .read(token.chain, token.address, &IErc20::totalSupplyCall {})
                .await?
                ._0),
            Self::Escrowed { holding, escrow } => holding.balance_of(*escrow).await,
        }
    }
}

/// Limits of `bridge` on `xerc20`.
pub struct Xerc20Limits<'a, C> {
    deployer: &'a Deployer<C>,
    chain: &'a ChainName,
    pub xerc20: Address,
    pub bridge: Address,
}

impl<C: ChainConnection> RateLimits for Xerc20Limits<'_, C> {
    async fn rate_limits(&self) -> Result<RateLimitState, ChainError> {
        let bridge = self.bridge;
        Ok(RateLimitState {
            minting_current: self
                .deployer
                .read(self.chain, self.xerc20, &IXerc20::mintingCurrentLimitOfCall { bridge })
                .await?
                ._0,
            minting_max: self
                .deployer
                .read(self.chain, self.xerc20, &IXerc20::mintingMaxLimitOfCall { bridge })
                .await?
                ._0,
            burning_current: self
                .deployer
                .read(self.chain, self.xerc20, &IXerc20::burningCurrentLimitOfCall { bridge })
                .await?
                ._0,
            burning_max: self
                .deployer
                .read(self.chain, self.xerc20, &IXerc20::burningMaxLimitOfCall { bridge })
                .await?
                ._0,
        })
    }

    fn set_limits_transaction(
        &self,
        chain_id: u64,
        minting: U256,
        burning: U256,
    ) -> TransactionSpec {
        TransactionSpec::call(
            chain_id,
            self.xerc20,
            &IXerc20::setLimitsCall {
                bridge: self.bridge,
                mintingLimit: minting,
                burningLimit: burning,
            },
            format!("Setting xERC20 limits of {} to mint {minting} / burn {burning}", self.bridge),
        )
    }
}

/// Capabilities available for one token standard on one chain.
///
/// `None` means the standard does not support that capability.
pub struct TokenAdapter<'a, C> {
    pub standard: TokenStandard,
    pub holding: Holding<'a, C>,
    pub remote: Option<AetRouter<'a, C>>,
    pub supply: Option<Supply<'a, C>>,
    pub limits: Option<Xerc20Limits<'a, C>>,
}

impl<'a, C: ChainConnection> TokenAdapter<'a, C> {
    /// Assemble the adapter for `standard` at `address`.
    ///
    /// `address` is the token for [`TokenStandard::Native`] and [`TokenStandard::Erc20`]
    /// (ignored for native) and the router for every warp route standard. Wrapped tokens are
    /// read from the router.
    pub async fn for_standard(
        deployer: &'a Deployer<C>,
        chain: &'a ChainName,
        standard: TokenStandard,
        address: Address,
    ) -> Result<Self, ChainError> {
        let native = || Holding::Native(NativeToken { deployer, chain });
        let erc20 = |address| Erc20Token {
            deployer,
            chain,
            address,
        };
        let router = |native| {
            Some(AetRouter {
                deployer,
                chain,
                address,
                native,
            })
        };
        let wrapped = || async {
            Ok::<_, ChainError>(
                deployer
                    .read(chain, address, &ITokenRouter::wrappedTokenCall {})
                    .await?
                    ._0,
            )
        };

        let adapter = match standard {
            TokenStandard::Native => Self {
                standard,
                holding: native(),
                remote: None,
                supply: None,
                limits: None,
            },
            TokenStandard::Erc20 => Self {
                standard,
                holding: Holding::Erc20(erc20(address)),
                remote: None,
                supply: Some(Supply::Minted(erc20(address))),
                limits: None,
            },
            TokenStandard::AetNative => Self {
                standard,
                holding: native(),
                remote: router(true),
                supply: Some(Supply::Escrowed {
                    holding: native(),
                    escrow: address,
                }),
                limits: None,
            },
            TokenStandard::AetCollateral | TokenStandard::AetOwnerCollateral => {
                let token = wrapped().await?;
                Self {
                    standard,
                    holding: Holding::Erc20(erc20(token)),
                    remote: router(false),
                    supply: Some(Supply::Escrowed {
                        holding: Holding::Erc20(erc20(token)),
                        escrow: address,
                    }),
                    limits: None,
                }
            }
            TokenStandard::AetCollateralFiat => {
                let token = wrapped().await?;
                Self {
                    standard,
                    holding: Holding::Erc20(erc20(token)),
                    remote: router(false),
                    supply: Some(Supply::Minted(erc20(token))),
                    limits: None,
                }
            }
            TokenStandard::AetXerc20 => {
                let token = wrapped().await?;
                Self {
                    standard,
                    holding: Holding::Erc20(erc20(token)),
                    remote: router(false),
                    supply: Some(Supply::Minted(erc20(token))),
                    limits: Some(Xerc20Limits {
                        deployer,
                        chain,
                        xerc20: token,
                        bridge: address,
                    }),
                }
            }
            TokenStandard::AetXerc20Lockbox => {
                let xerc20 = deployer
                    .read(chain, address, &ILockboxTokenRouter::xERC20Call {})
                    .await?
                    ._0;
                let lockbox = deployer
                    .read(chain, address, &ILockboxTokenRouter::lockboxCall {})
                    .await?
                    ._0;
                let token = wrapped().await?;
                Self {
                    standard,
                    holding: Holding::Erc20(erc20(token)),
                    remote: router(false),
                    supply: Some(Supply::Escrowed {
                        holding: Holding::Erc20(erc20(token)),
                        escrow: lockbox,
                    }),
                    limits: Some(Xerc20Limits {
                        deployer,
                        chain,
                        xerc20,
                        bridge: address,
                    }),
                }
            }
            TokenStandard::AetSynthetic | TokenStandard::AetSyntheticRebase => Self {
                standard,
                holding: Holding::Erc20(erc20(address)),
                remote: router(false),
                supply: Some(Supply::Minted(erc20(address))),
                limits: None,
            },
        };
        Ok(adapter)
    }
}
