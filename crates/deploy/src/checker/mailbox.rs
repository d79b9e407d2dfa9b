//! Mailbox drift: owner, default and required modules, proxy admin.

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use super::{CheckReport, ViolationRecord, change_proxy_admin_transaction};
use crate::{
    ChainConnection, ChainError, ChainMap, ChainName, ContractRole, Deployer, HookConfig,
    HookModule, HookRef, IsmConfig, IsmModule, IsmRef, MultiChainError, ProxyAdminConfig,
    TransactionSpec,
    abi::IMailbox,
    collect_chain_results,
    diff::{NodeBuilder, check_against},
    format_address,
    modules::{DerivedModule, ModuleManager, update_module},
    roles, transfer_ownership_transaction,
};

/// Desired mailbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    pub owner: Address,
    pub default_ism: IsmRef,
    pub default_hook: HookRef,
    pub required_hook: HookRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_admin: Option<ProxyAdminConfig>,
}

/// Live state of one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedCoreConfig {
    pub mailbox: Address,
    pub owner: Address,
    pub default_ism: DerivedModule<IsmConfig>,
    pub default_hook: DerivedModule<HookConfig>,
    pub required_hook: DerivedModule<HookConfig>,
    pub proxy_admin: Address,
    pub proxy_admin_owner: Address,
}

/// Checks and updates mailboxes recorded under the `mailbox` role.
pub struct CoreChecker<'a, C> {
    deployer: &'a Deployer<C>,
}

impl<'a, C: ChainConnection> CoreChecker<'a, C> {
    pub fn new(deployer: &'a Deployer<C>) -> Self {
        Self { deployer }
    }

    fn mailbox(&self, chain: &ChainName) -> Result<Address, ChainError> {
        self.deployer
            .known_address(chain, &roles::MAILBOX.into())
            .ok_or_else(|| ChainError::configuration(chain, "no mailbox address known"))
    }

    pub async fn derive(&self, chain: &ChainName) -> Result<DerivedCoreConfig, ChainError> {
        let mailbox = self.mailbox(chain)?;
        let deployer = self.deployer;

        let owner = deployer.owner_of(chain, mailbox).await?;
        let default_ism = deployer.read(chain, mailbox, &IMailbox::defaultIsmCall {}).await?._0;
        let default_hook = deployer.read(chain, mailbox, &IMailbox::defaultHookCall {}).await?._0;
        let required_hook = deployer.read(chain, mailbox, &IMailbox::requiredHookCall {}).await?._0;

        let isms = IsmModule::new(deployer, chain, mailbox);
        let hooks = HookModule::new(deployer, chain, mailbox);
        let proxy_admin = deployer.proxy_admin_of(chain, mailbox).await?;
        let proxy_admin_owner = if proxy_admin.is_zero() {
            Address::ZERO
        } else {
            deployer.owner_of(chain, proxy_admin).await?
        };

        Ok(DerivedCoreConfig {
            mailbox,
            owner,
            default_ism: isms.derive_pointer(default_ism).await?,
            default_hook: hooks.derive_pointer(default_hook).await?,
            required_hook: hooks.derive_pointer(required_hook).await?,
            proxy_admin,
            proxy_admin_owner,
        })
    }

    async fn check_chain(
        &self,
        chain: &ChainName,
        config: &CoreConfig,
    ) -> Result<Vec<ViolationRecord>, ChainError> {
        let derived = self.derive(chain).await?;

        let (expected_ism, actual_ism) = derived.default_ism.compare_nodes(&config.default_ism);
        let (expected_default, actual_default) =
            derived.default_hook.compare_nodes(&config.default_hook);
        let (expected_required, actual_required) =
            derived.required_hook.compare_nodes(&config.required_hook);

        let mut desired = NodeBuilder::new()
            .field("owner", config.owner)
            .node("defaultIsm", expected_ism)
            .node("defaultHook", expected_default)
            .node("requiredHook", expected_required);
        // An unproxied mailbox only has an admin to compare when one is asked for.
        if !derived.proxy_admin.is_zero() || config.proxy_admin.is_some() {
            let admin = config.proxy_admin.clone().unwrap_or_default();
            desired = desired
                .optional("proxyAdmin", admin.address.as_ref())
                .field("proxyAdminOwner", admin.owner.unwrap_or(config.owner));
        }
        let desired = desired.record();
        let actual = NodeBuilder::new()
            .field("owner", derived.owner)
            .node("defaultIsm", actual_ism)
            .node("defaultHook", actual_default)
            .node("requiredHook", actual_required)
            .field("proxyAdmin", derived.proxy_admin)
            .field("proxyAdminOwner", derived.proxy_admin_owner)
            .record();

        let violations = ViolationRecord::from_differences(
            chain,
            &ContractRole::from(roles::MAILBOX),
            check_against(&desired, &actual),
        );
        tracing::info!(chain = %chain, violations = violations.len(), "Mailbox checked");
        Ok(violations)
    }

    pub async fn check(&self, configs: &ChainMap<CoreConfig>) -> CheckReport {
        let outcomes = self
            .deployer
            .run_per_chain(configs.keys(), move |chain| async move {
                let config = configs
                    .get(chain)
                    .ok_or_else(|| ChainError::configuration(chain, "no config for chain"))?;
                self.check_chain(chain, config).await
            })
            .await;
        CheckReport::from_outcomes(outcomes)
    }

    async fn update_chain(
        &self,
        chain: &ChainName,
        config: &CoreConfig,
    ) -> Result<Vec<TransactionSpec>, ChainError> {
        let derived = self.derive(chain).await?;
        let chain_id = self.deployer.chain_id(chain)?;
        let mailbox = derived.mailbox;
        let setter = |label: &'static str, address: Address| {
            format!("Setting {label} of mailbox to {}", format_address(address))
        };
        let mut transactions = Vec::new();

        let isms = IsmModule::new(self.deployer, chain, mailbox);
        transactions.extend(
            update_module(&isms, &derived.default_ism, &config.default_ism, |address| {
                TransactionSpec::call(
                    chain_id,
                    mailbox,
                    &IMailbox::setDefaultIsmCall { module: address },
                    setter("defaultIsm", address),
                )
            })
            .await?,
        );

        let hooks = HookModule::new(self.deployer, chain, mailbox);
        transactions.extend(
            update_module(&hooks, &derived.default_hook, &config.default_hook, |address| {
                TransactionSpec::call(
                    chain_id,
                    mailbox,
                    &IMailbox::setDefaultHookCall { hook: address },
                    setter("defaultHook", address),
                )
            })
            .await?,
        );
        transactions.extend(
            update_module(&hooks, &derived.required_hook, &config.required_hook, |address| {
                TransactionSpec::call(
                    chain_id,
                    mailbox,
                    &IMailbox::setRequiredHookCall { hook: address },
                    setter("requiredHook", address),
                )
            })
            .await?,
        );

        if !derived.proxy_admin.is_zero() {
            let admin = config.proxy_admin.clone().unwrap_or_default();
            let mut current_admin = derived.proxy_admin;
            let mut current_owner = derived.proxy_admin_owner;
            if let Some(desired) = admin.address {
                if let Some(tx) =
                    change_proxy_admin_transaction(chain_id, mailbox, current_admin, desired)
                {
                    transactions.push(tx);
                    current_owner = self.deployer.owner_of(chain, desired).await?;
                    current_admin = desired;
                }
            }
            transactions.extend(transfer_ownership_transaction(
                chain_id,
                roles::PROXY_ADMIN,
                current_admin,
                current_owner,
                admin.owner.unwrap_or(config.owner),
            ));
        }

        transactions.extend(transfer_ownership_transaction(
            chain_id,
            roles::MAILBOX,
            mailbox,
            derived.owner,
            config.owner,
        ));
        Ok(transactions)
    }

    pub async fn update(
        &self,
        configs: &ChainMap<CoreConfig>,
    ) -> Result<ChainMap<Vec<TransactionSpec>>, MultiChainError<ChainMap<Vec<TransactionSpec>>>> {
        let outcomes = self
            .deployer
            .run_per_chain(configs.keys(), move |chain| async move {
                let config = configs
                    .get(chain)
                    .ok_or_else(|| ChainError::configuration(chain, "no config for chain"))?;
                self.update_chain(chain, config).await
            })
            .await;
        collect_chain_results(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_config_accepts_addresses_and_nested_modules() {
        let config: CoreConfig = serde_json::from_str(
            r#"{
                "owner": "0x0101010101010101010101010101010101010101",
                "defaultIsm": {"type": "testIsm"},
                "defaultHook": "0x0202020202020202020202020202020202020202",
                "requiredHook": {"type": "merkleTreeHook"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.default_ism, IsmRef::Config(IsmConfig::TestIsm));
        assert_eq!(config.default_hook, HookRef::Address(Address::repeat_byte(2)));
        assert_eq!(config.required_hook, HookRef::Config(HookConfig::MerkleTreeHook));
        assert!(config.proxy_admin.is_none());
    }
}
