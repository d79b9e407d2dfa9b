//! Contract interfaces the engine reads and writes, plus typed call helpers.
//!
//! Only the functions the engine touches are declared. Bytecode comes from the
//! [`FactoryRegistry`](crate::FactoryRegistry), never from here.

use alloy_core::{
    primitives::{Address, B256, b256, keccak256},
    sol_types::SolCall,
};

use crate::{ChainConnection, ChainError, ChainName, ReadError};

/// EIP-1967 admin slot of a transparent proxy.
pub const EIP1967_ADMIN_SLOT: B256 =
    b256!("b53127684a568b3173ae13b9f8a6016e243e63b6e8ee1178d6a717850b5d6103");

/// EIP-1967 implementation slot of a transparent proxy.
pub const EIP1967_IMPLEMENTATION_SLOT: B256 =
    b256!("360894a13ba1a3210667c828492db98dca3e2076cc3735a920a3ca505d382bbc");

/// Timelock role allowed to schedule operations.
pub fn proposer_role() -> B256 {
    keccak256("PROPOSER_ROLE")
}

/// Timelock role allowed to execute ready operations.
pub fn executor_role() -> B256 {
    keccak256("EXECUTOR_ROLE")
}

alloy_core::sol! {
    interface IOwnable {
        function owner() external view returns (address);
        function transferOwnership(address newOwner) external;
    }

    interface IProxyAdmin {
        function changeProxyAdmin(address proxy, address newAdmin) external;
        function upgrade(address proxy, address implementation) external;
    }

    interface ITimelockController {
        function getMinDelay() external view returns (uint256);
        function hasRole(bytes32 role, address account) external view returns (bool);
    }

    interface IRouter {
        function domains() external view returns (uint32[]);
        function routers(uint32 domain) external view returns (bytes32);
        function enrollRemoteRouters(uint32[] domains, bytes32[] addresses) external;
        function unenrollRemoteRouters(uint32[] domains) external;
    }

    interface IMailboxClient {
        function mailbox() external view returns (address);
        function hook() external view returns (address);
        function interchainSecurityModule() external view returns (address);
        function setHook(address hook) external;
        function setInterchainSecurityModule(address module) external;
        function initialize(address hook, address interchainSecurityModule, address owner) external;
    }

    interface ISyntheticToken {
        function initialize(
            uint256 totalSupply,
            string name,
            string symbol,
            address hook,
            address interchainSecurityModule,
            address owner
        ) external;
    }

    interface IMailbox {
        function localDomain() external view returns (uint32);
        function defaultIsm() external view returns (address);
        function defaultHook() external view returns (address);
        function requiredHook() external view returns (address);
        function setDefaultIsm(address module) external;
        function setDefaultHook(address hook) external;
        function setRequiredHook(address hook) external;
        function initialize(
            address owner,
            address defaultIsm,
            address defaultHook,
            address requiredHook
        ) external;
    }

    interface IInterchainSecurityModule {
        function moduleType() external view returns (uint8);
    }

    interface IRoutingIsm {
        function domains() external view returns (uint32[]);
        function module(uint32 origin) external view returns (address);
        function set(uint32 domain, address module) external;
        function remove(uint32 domain) external;
        function initialize(address owner, uint32[] domains, address[] modules) external;
    }

    interface IMultisigIsm {
        function validatorsAndThreshold(bytes message)
            external
            view
            returns (address[] validators, uint8 threshold);
    }

    interface IAggregationIsm {
        function modulesAndThreshold(bytes message)
            external
            view
            returns (address[] modules, uint8 threshold);
    }

    interface ITrustedRelayerIsm {
        function trustedRelayer() external view returns (address);
    }

    interface IPausable {
        function paused() external view returns (bool);
        function pause() external;
        function unpause() external;
    }

    interface IPostDispatchHook {
        function hookType() external view returns (uint8);
    }

    interface IAggregationHook {
        function hooks(bytes message) external view returns (address[]);
    }

    interface IErc20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    interface IErc4626 {
        function asset() external view returns (address);
    }

    interface IXerc20Lockbox {
        function ERC20() external view returns (address);
        function XERC20() external view returns (address);
    }

    interface ITokenRouter {
        function wrappedToken() external view returns (address);
        function quoteGasPayment(uint32 destination) external view returns (uint256);
        function transferRemote(uint32 destination, bytes32 recipient, uint256 amount)
            external
            payable
            returns (bytes32);
    }

    interface ILockboxTokenRouter {
        function lockbox() external view returns (address);
        function xERC20() external view returns (address);
    }

    interface IXerc20 {
        function mintingCurrentLimitOf(address bridge) external view returns (uint256);
        function mintingMaxLimitOf(address bridge) external view returns (uint256);
        function burningCurrentLimitOf(address bridge) external view returns (uint256);
        function burningMaxLimitOf(address bridge) external view returns (uint256);
        function setLimits(address bridge, uint256 mintingLimit, uint256 burningLimit) external;
    }

    interface ILiquidityLayerRouter {
        function liquidityLayerAdapters(string bridge) external view returns (address);
        function setLiquidityLayerAdapter(string bridge, address adapter) external;
    }

    interface ICircleBridgeAdapter {
        function initialize(
            address owner,
            address tokenMessenger,
            address messageTransmitter,
            address liquidityLayerRouter
        ) external;
        function tokenSymbolToAddress(string symbol) external view returns (address);
        function addToken(address token, string symbol) external;
        function aetheriumDomainToCircleDomain(uint32 domain) external view returns (uint32);
        function addDomain(uint32 domain, uint32 circleDomain) external;
    }

    interface IPortalAdapter {
        function initialize(
            address owner,
            address portalBridge,
            address liquidityLayerRouter
        ) external;
        function aetheriumDomainToWormholeDomain(uint32 domain) external view returns (uint16);
        function addDomain(uint32 domain, uint16 wormholeDomain) external;
    }
}

/// Execute a view call and decode its return values.
pub async fn read_call<C: ChainConnection, T: SolCall>(
    connection: &C,
    chain: &ChainName,
    to: Address,
    call: &T,
) -> Result<T::Return, ChainError> {
    let target = || format!("{} at {to}", T::SIGNATURE);
    let output = connection
        .read(chain, to, call.abi_encode().into())
        .await
        .map_err(|e| ChainError::remote_read(chain, target(), e))?;
    T::abi_decode_returns(&output, true).map_err(|e| ChainError::remote_read(chain, target(), e))
}

/// Like [`read_call`], but a revert is an answer rather than an error.
///
/// Used for type-specific getters: `None` when the contract reverts or returns data that
/// does not decode. Transport failures still surface as [`ChainError::RemoteRead`].
pub async fn try_read_call<C: ChainConnection, T: SolCall>(
    connection: &C,
    chain: &ChainName,
    to: Address,
    call: &T,
) -> Result<Option<T::Return>, ChainError> {
    let output = match connection.read(chain, to, call.abi_encode().into()).await {
        Ok(output) => output,
        Err(ReadError::Reverted(reason)) => {
            tracing::trace!(chain = %chain, address = %to, reason = %reason, "Getter reverted");
            return Ok(None);
        }
        Err(error @ ReadError::Transport(_)) => {
            return Err(ChainError::remote_read(chain, format!("{} at {to}", T::SIGNATURE), error));
        }
    };
    Ok(T::abi_decode_returns(&output, true).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors_are_distinct_for_initializers() {
        assert_ne!(
            IMailboxClient::initializeCall::SELECTOR,
            ISyntheticToken::initializeCall::SELECTOR
        );
    }

    #[test]
    fn test_timelock_roles() {
        assert_ne!(proposer_role(), executor_role());
        assert_eq!(
            proposer_role(),
            b256!("b09aa5aeb3702cfd50b6b62bc4532604938f21248a27a1d5ca736082b6819cc1")
        );
    }
}
