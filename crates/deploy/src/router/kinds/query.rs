use alloy_core::{
    primitives::Bytes,
    sol_types::{SolCall, SolValue},
};

use crate::{ChainError, ContractRole, RouterConfig, RouterContext, RouterKind, abi::IMailboxClient};

pub const INTERCHAIN_QUERY_ROUTER: &str = "interchainQueryRouter";

#[derive(Debug, Clone, Copy, Default)]
pub struct InterchainQueryRouterKind;

impl RouterKind for InterchainQueryRouterKind {
    type Config = RouterConfig;

    const KIND_NAME: &'static str = "query";

    fn router_config(config: &RouterConfig) -> &RouterConfig {
        config
    }

    fn router_contract_key(&self, _config: &RouterConfig) -> ContractRole {
        INTERCHAIN_QUERY_ROUTER.into()
    }

    fn router_contract_name(&self, _config: &RouterConfig) -> String {
        "InterchainQueryRouter".to_string()
    }

    fn constructor_args(
        &self,
        context: &RouterContext<'_>,
        _config: &RouterConfig,
    ) -> Result<Bytes, ChainError> {
        Ok((context.mailbox,).abi_encode_params().into())
    }

    fn initialize_args(
        &self,
        context: &RouterContext<'_>,
        _config: &RouterConfig,
    ) -> Result<Bytes, ChainError> {
        Ok(IMailboxClient::initializeCall {
            hook: context.hook,
            interchainSecurityModule: context.interchain_security_module,
            owner: context.signer,
        }
        .abi_encode()
        .into())
    }
}
