use alloy_core::{
    primitives::{Address, Bytes},
    sol_types::{SolCall, SolValue},
};

use crate::{
    ChainConnection, ChainError, ChainName, ContractRole, Deployer, RouterConfig, RouterContext,
    RouterKind, abi::IMailboxClient,
};

pub const INTERCHAIN_ACCOUNT_ROUTER: &str = "interchainAccountRouter";
pub const INTERCHAIN_ACCOUNT_ISM: &str = "interchainAccountIsm";

/// Interchain account routers. Without a configured ISM they verify through a dedicated
/// `InterchainAccountIsm`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterchainAccountRouterKind;

impl RouterKind for InterchainAccountRouterKind {
    type Config = RouterConfig;

    const KIND_NAME: &'static str = "ica";

    fn router_config(config: &RouterConfig) -> &RouterConfig {
        config
    }

    fn router_contract_key(&self, _config: &RouterConfig) -> ContractRole {
        INTERCHAIN_ACCOUNT_ROUTER.into()
    }

    fn router_contract_name(&self, _config: &RouterConfig) -> String {
        "InterchainAccountRouter".to_string()
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

    async fn deploy_default_ism<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        mailbox: Address,
    ) -> Result<Option<Address>, ChainError> {
        let ism = deployer
            .deploy_contract(
                chain,
                &INTERCHAIN_ACCOUNT_ISM.into(),
                (mailbox,).abi_encode_params().into(),
            )
            .await?;
        Ok(Some(ism))
    }
}
