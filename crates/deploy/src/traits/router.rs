//! Extension points a concrete router kind supplies to the proxied router machinery.

use std::{fmt::Debug, future::Future};

use alloy_core::primitives::{Address, Bytes};

use crate::{
    ChainConnection, ChainError, ChainMap, ChainName, ContractRole, Deployer, RouterConfig,
};

/// Resolved per-chain values handed to a kind when it encodes its arguments.
#[derive(Debug, Clone, Copy)]
pub struct RouterContext<'a> {
    pub chain: &'a ChainName,
    pub signer: Address,
    pub mailbox: Address,
    /// Zero when unset.
    pub hook: Address,
    /// Zero when unset.
    pub interchain_security_module: Address,
    /// Domain id of every chain in the application.
    pub domains: &'a ChainMap<u32>,
}

/// A family of routers (token bridges, interchain accounts, queries, ...) deployed behind
/// transparent proxies.
///
/// Encoding errors are [`ChainError::Configuration`] and fail only the chain at hand.
pub trait RouterKind {
    /// Desired per-chain config; embeds a [`RouterConfig`].
    type Config: Clone + Debug;

    const KIND_NAME: &'static str;

    /// Shared router fields of `config`.
    fn router_config(config: &Self::Config) -> &RouterConfig;

    /// Role the router proxy is recorded under.
    fn router_contract_key(&self, config: &Self::Config) -> ContractRole;

    /// Contract name used in annotations and verification artifacts.
    fn router_contract_name(&self, config: &Self::Config) -> String;

    fn constructor_args(
        &self,
        context: &RouterContext<'_>,
        config: &Self::Config,
    ) -> Result<Bytes, ChainError>;

    /// Calldata the proxy calls its implementation with on construction.
    fn initialize_args(
        &self,
        context: &RouterContext<'_>,
        config: &Self::Config,
    ) -> Result<Bytes, ChainError>;

    /// Fill in fields derivable from other chains before anything is deployed.
    fn prepare_configs<C: ChainConnection>(
        &self,
        _deployer: &Deployer<C>,
        configs: &ChainMap<Self::Config>,
    ) -> impl Future<Output = ChainMap<Self::Config>> {
        let configs = configs.clone();
        async move { configs }
    }

    /// ISM to use when the config names none.
    fn deploy_default_ism<C: ChainConnection>(
        &self,
        _deployer: &Deployer<C>,
        _chain: &ChainName,
        _mailbox: Address,
    ) -> impl Future<Output = Result<Option<Address>, ChainError>> {
        async { Ok(None) }
    }

    /// Contracts attached to the router once it exists.
    fn deploy_extensions<C: ChainConnection>(
        &self,
        _deployer: &Deployer<C>,
        _context: &RouterContext<'_>,
        _config: &Self::Config,
        _router: Address,
    ) -> impl Future<Output = Result<(), ChainError>> {
        async { Ok(()) }
    }

    /// Roles besides the router that are enrolled with their remote counterparts.
    fn auxiliary_roles(&self, _config: &Self::Config) -> Vec<ContractRole> {
        Vec::new()
    }
}
