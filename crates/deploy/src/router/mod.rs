//! Routers deployed behind transparent proxies, sharing proxy-admin, timelock, module and
//! enrollment machinery across every [`RouterKind`].

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::{
    ChainConnection, ChainDeployment, ChainError, ChainMap, ChainName, ContractAddressMap,
    ContractRole, Deployer, ForeignDeployments, HookModule, HookRef, IsmModule, IsmRef,
    MultiChainError, RouterContext, RouterKind, TimelockConfig, collect_chain_results,
    modules::resolve_module, roles,
};

pub mod enrollment;
pub mod kinds;

use enrollment::{PeerDirectory, enroll_router, parse_foreign_deployments};

/// Existing proxy admin to attach, and who should own it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyAdminConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Defaults to the router owner, or the timelock when one is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Address>,
}

/// Fields every router kind shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    pub owner: Address,
    /// Required. Kept optional so a missing value surfaces as a per-chain error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailbox: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<HookRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interchain_security_module: Option<IsmRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_admin: Option<ProxyAdminConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timelock: Option<TimelockConfig>,
}

impl RouterConfig {
    pub fn new(owner: Address, mailbox: Address) -> Self {
        Self {
            owner,
            mailbox: Some(mailbox),
            hook: None,
            interchain_security_module: None,
            proxy_admin: None,
            timelock: None,
        }
    }

    /// Mailbox address, rejecting a missing or zero value.
    pub fn required_mailbox(&self, chain: &ChainName) -> Result<Address, ChainError> {
        self.mailbox
            .filter(|mailbox| !mailbox.is_zero())
            .ok_or_else(|| ChainError::configuration(chain, "no mailbox configured"))
    }
}

/// Router proxy addresses recorded for `kind` in `addresses`.
pub fn router_addresses<K: RouterKind>(
    kind: &K,
    configs: &ChainMap<K::Config>,
    addresses: &ContractAddressMap,
) -> ChainMap<Address> {
    configs
        .iter()
        .filter_map(|(chain, config)| {
            addresses
                .get(chain, &kind.router_contract_key(config))
                .map(|address| (chain.clone(), address))
        })
        .collect()
}

/// Addresses recorded for `role` on each chain of `configs`.
pub fn role_addresses<T>(
    role: &ContractRole,
    configs: &ChainMap<T>,
    addresses: &ContractAddressMap,
) -> ChainMap<Address> {
    configs
        .keys()
        .filter_map(|chain| addresses.get(chain, role).map(|address| (chain.clone(), address)))
        .collect()
}

struct RouterDeployment<'a, K> {
    kind: &'a K,
    domains: ChainMap<u32>,
}

impl<C: ChainConnection, K: RouterKind> ChainDeployment<C> for RouterDeployment<'_, K> {
    type Config = K::Config;

    async fn deploy_contracts(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        config: &K::Config,
    ) -> Result<(), ChainError> {
        let router_config = K::router_config(config);
        let mailbox = router_config.required_mailbox(chain)?;
        let signer = deployer.signer(chain).await?;

        let proxy_admin = self
            .resolve_proxy_admin(deployer, chain, router_config)
            .await?;

        let role = self.kind.router_contract_key(config);
        let name = self.kind.router_contract_name(config);
        let fresh = deployer.known_address(chain, &role).is_none();

        // Modules and arguments only matter to a fresh deployment.
        let (hook, interchain_security_module) = if fresh {
            let hook = resolve_module(
                &HookModule::new(deployer, chain, mailbox),
                router_config.hook.as_ref(),
            )
            .await?;
            let mut ism = resolve_module(
                &IsmModule::new(deployer, chain, mailbox),
                router_config.interchain_security_module.as_ref(),
            )
            .await?;
            if ism.is_zero() {
                if let Some(default) =
                    self.kind.deploy_default_ism(deployer, chain, mailbox).await?
                {
                    ism = default;
                }
            }
            (hook, ism)
        } else {
            (Address::ZERO, Address::ZERO)
        };

        let context = RouterContext {
            chain,
            signer,
            mailbox,
            hook,
            interchain_security_module,
            domains: &self.domains,
        };
        let (constructor_args, initialize_args) = if fresh {
            (
                self.kind.constructor_args(&context, config)?,
                self.kind.initialize_args(&context, config)?,
            )
        } else {
            (Bytes::new(), Bytes::new())
        };

        let router = deployer
            .deploy_proxied_contract(
                chain,
                &role,
                &name,
                proxy_admin,
                constructor_args,
                initialize_args,
            )
            .await?;
        tracing::info!(chain = %chain, kind = K::KIND_NAME, router = %router, "Router ready");

        self.kind
            .deploy_extensions(deployer, &context, config, router)
            .await
    }
}

impl<K: RouterKind> RouterDeployment<'_, K> {
    /// Attach or deploy the proxy admin, deploy the timelock if configured, then hand the
    /// admin to its resolved owner.
    async fn resolve_proxy_admin<C: ChainConnection>(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        config: &RouterConfig,
    ) -> Result<Address, ChainError> {
        let role = ContractRole::from(roles::PROXY_ADMIN);
        let configured = config.proxy_admin.as_ref().and_then(|admin| admin.address);

        let proxy_admin = match configured {
            Some(address) => {
                tracing::info!(
                    chain = %chain,
                    proxy_admin = %address,
                    "Attaching existing proxy admin"
                );
                deployer.record(chain, &role, address);
                address
            }
            None => deployer.deploy_contract(chain, &role, Bytes::new()).await?,
        };

        let admin_owner = match &config.timelock {
            Some(timelock) => deployer.deploy_timelock(chain, timelock, config.owner).await?,
            None => config
                .proxy_admin
                .as_ref()
                .and_then(|admin| admin.owner)
                .unwrap_or(config.owner),
        };

        deployer
            .transfer_ownership(chain, roles::PROXY_ADMIN, proxy_admin, admin_owner)
            .await?;
        Ok(proxy_admin)
    }
}

/// Deploys, enrolls and hands over ownership of one router application.
pub struct ProxiedRouterDeployer<C, K> {
    deployer: Deployer<C>,
    kind: K,
    foreign: ChainMap<B256>,
}

impl<C: ChainConnection, K: RouterKind> ProxiedRouterDeployer<C, K> {
    /// Fails when the registry cannot build the shared proxy machinery.
    pub fn new(deployer: Deployer<C>, kind: K) -> anyhow::Result<Self> {
        let missing = deployer.factories().missing(&[
            roles::PROXY_ADMIN,
            roles::TIMELOCK_CONTROLLER,
            roles::TRANSPARENT_PROXY,
        ]);
        if !missing.is_empty() {
            anyhow::bail!("Factory registry is missing required roles: {}", missing.join(", "));
        }
        Ok(Self {
            deployer,
            kind,
            foreign: ChainMap::new(),
        })
    }

    /// Peers with no local contract object, known only by router address.
    pub fn with_foreign_deployments(
        mut self,
        foreign: &ForeignDeployments,
    ) -> anyhow::Result<Self> {
        self.foreign = parse_foreign_deployments(foreign)?;
        Ok(self)
    }

    pub fn deployer(&self) -> &Deployer<C> {
        &self.deployer
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn foreign(&self) -> &ChainMap<B256> {
        &self.foreign
    }

    pub fn into_deployer(self) -> Deployer<C> {
        self.deployer
    }

    fn domains(&self, chains: impl IntoIterator<Item = ChainName>) -> ChainMap<u32> {
        chains
            .into_iter()
            .filter_map(|chain| {
                let domain = self.deployer.domain_id(&chain).ok()?;
                Some((chain, domain))
            })
            .collect()
    }

    /// Deploy the application, enroll the full mesh and transfer router ownership.
    ///
    /// Each stage runs only on the chains that survived the previous one.
    pub async fn deploy(
        &self,
        configs: &ChainMap<K::Config>,
    ) -> Result<ContractAddressMap, MultiChainError<ContractAddressMap>> {
        let configs = self.kind.prepare_configs(&self.deployer, configs).await;
        let app = RouterDeployment {
            kind: &self.kind,
            domains: self.domains(configs.keys().cloned().chain(self.foreign.keys().cloned())),
        };

        let mut failures = match self.deployer.deploy(&app, &configs).await {
            Ok(_) => BTreeMap::new(),
            Err(error) => error.failures,
        };

        let healthy: Vec<_> = configs
            .keys()
            .filter(|chain| !failures.contains_key(*chain))
            .collect();
        failures.extend(self.enroll_chains(&configs, healthy).await);

        let healthy: Vec<_> = configs
            .keys()
            .filter(|chain| !failures.contains_key(*chain))
            .collect();
        failures.extend(self.transfer_router_ownership(&configs, healthy).await);

        let deployed = self.deployer.deployed_contracts();
        if failures.is_empty() {
            Ok(deployed)
        } else {
            Err(MultiChainError::new(failures, deployed))
        }
    }

    /// Enroll the router and every auxiliary role of `chains` with their peers.
    pub async fn enroll(
        &self,
        configs: &ChainMap<K::Config>,
    ) -> Result<(), MultiChainError<()>> {
        let failures = self.enroll_chains(configs, configs.keys().collect()).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MultiChainError::new(failures, ()))
        }
    }

    async fn enroll_chains(
        &self,
        configs: &ChainMap<K::Config>,
        chains: Vec<&ChainName>,
    ) -> BTreeMap<ChainName, ChainError> {
        let known = self.deployer.address_book().clone();
        let mut addresses = self.deployer.deployed_contracts();
        addresses.merge(&known);

        let mut directories: BTreeMap<ContractRole, PeerDirectory> = BTreeMap::new();
        for config in configs.values() {
            let role = self.kind.router_contract_key(config);
            directories.entry(role.clone()).or_insert_with(|| {
                PeerDirectory::new(
                    &router_addresses(&self.kind, configs, &addresses),
                    &self.foreign,
                )
            });
            for auxiliary in self.kind.auxiliary_roles(config) {
                directories.entry(auxiliary.clone()).or_insert_with(|| {
                    PeerDirectory::new(
                        &role_addresses(&auxiliary, configs, &addresses),
                        &ChainMap::new(),
                    )
                });
            }
        }

        let addresses = &addresses;
        let directories = &directories;
        let outcomes = self
            .deployer
            .run_per_chain(chains, move |chain| {
                async move {
                    let config = configs
                        .get(chain)
                        .ok_or_else(|| ChainError::configuration(chain, "no config for chain"))?;
                    let mut targets = vec![self.kind.router_contract_key(config)];
                    targets.extend(self.kind.auxiliary_roles(config));

                    for role in targets {
                        let Some(contract) = addresses.get(chain, &role) else {
                            return Err(ChainError::configuration(
                                chain,
                                format!("no address recorded for {role}"),
                            ));
                        };
                        let Some(directory) = directories.get(&role) else {
                            continue;
                        };
                        enroll_router(&self.deployer, chain, contract, directory).await?;
                    }
                    Ok(())
                }
            })
            .await;

        match collect_chain_results(outcomes) {
            Ok(_) => BTreeMap::new(),
            Err(error) => error.failures,
        }
    }

    async fn transfer_router_ownership(
        &self,
        configs: &ChainMap<K::Config>,
        chains: Vec<&ChainName>,
    ) -> BTreeMap<ChainName, ChainError> {
        let outcomes = self
            .deployer
            .run_per_chain(chains, move |chain| async move {
                let config = configs
                    .get(chain)
                    .ok_or_else(|| ChainError::configuration(chain, "no config for chain"))?;
                let owner = K::router_config(config).owner;
                let mut targets = vec![self.kind.router_contract_key(config)];
                targets.extend(self.kind.auxiliary_roles(config));

                self.deployer
                    .transfer_ownership_of_contracts(chain, owner, &targets)
                    .await?;
                Ok(())
            })
            .await;

        match collect_chain_results(outcomes) {
            Ok(_) => BTreeMap::new(),
            Err(error) => error.failures,
        }
    }
}
