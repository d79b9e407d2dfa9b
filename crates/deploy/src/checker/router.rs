//! Router drift: owner, mailbox, modules, proxy admin, timelock and the peer mesh.

use alloy_core::primitives::{Address, B256};

use super::{CheckReport, ViolationRecord, change_proxy_admin_transaction};
use crate::{
    ChainConnection, ChainError, ChainMap, ChainName, ContractAddressMap, ContractRole, Deployer,
    HookConfig, HookModule, IsmConfig, IsmModule, MultiChainError, RouterConfig, RouterKind,
    TimelockConfig, TransactionSpec,
    abi::{IMailboxClient, ITimelockController, executor_role, proposer_role},
    collect_chain_results,
    diff::{ConfigNode, NodeBuilder, check_against},
    format_address,
    modules::{DerivedModule, ModuleManager, update_module},
    roles,
    router::{
        enrollment::{
            PeerDirectory, PeerSet, desired_peers, enroll_transaction, extra_enrollments,
            missing_enrollments, registered_peers, unenroll_transaction,
        },
        router_addresses,
    },
    transfer_ownership_transaction,
};

/// Timelock found as the owner of a proxy admin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedTimelock {
    pub address: Address,
    pub delay: u64,
    /// The expected proposer, if it holds the proposer role.
    pub proposer: Option<Address>,
    /// The expected executor, if it holds the executor role.
    pub executor: Option<Address>,
}

impl DerivedTimelock {
    fn node(&self) -> ConfigNode {
        let granted = |account: Option<Address>| {
            account
                .map(ConfigNode::address)
                .unwrap_or_else(|| ConfigNode::leaf("unassigned"))
        };
        NodeBuilder::new()
            .field("delay", self.delay)
            .node("proposer", granted(self.proposer))
            .node("executor", granted(self.executor))
            .record()
    }

    fn satisfies(&self, config: &TimelockConfig) -> bool {
        self.delay == config.delay && self.proposer.is_some() && self.executor.is_some()
    }
}

fn timelock_node(config: &TimelockConfig, owner: Address) -> ConfigNode {
    NodeBuilder::new()
        .field("delay", config.delay)
        .field("proposer", config.proposer_or(owner))
        .field("executor", config.executor_or_open())
        .record()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProxyAdmin {
    /// Zero when the router is not behind a transparent proxy.
    pub address: Address,
    pub owner: Address,
    pub timelock: Option<DerivedTimelock>,
}

/// Live state of one router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRouterConfig {
    pub router: Address,
    pub owner: Address,
    pub mailbox: Address,
    pub hook: DerivedModule<HookConfig>,
    pub interchain_security_module: DerivedModule<IsmConfig>,
    pub proxy_admin: DerivedProxyAdmin,
    pub remote_routers: PeerSet,
}

fn peers_node(peers: &PeerSet) -> ConfigNode {
    ConfigNode::table(
        peers
            .iter()
            .map(|(domain, id)| (domain, ConfigNode::leaf(id))),
    )
}

/// Checks and updates deployed routers of one kind against their desired configs.
pub struct RouterChecker<'a, C, K> {
    deployer: &'a Deployer<C>,
    kind: &'a K,
    addresses: ContractAddressMap,
    foreign: ChainMap<B256>,
}

impl<'a, C: ChainConnection, K: RouterKind> RouterChecker<'a, C, K> {
    /// Routers are looked up in what `deployer` recorded this run, then in its address book.
    pub fn new(deployer: &'a Deployer<C>, kind: &'a K) -> Self {
        let mut addresses = deployer.deployed_contracts();
        addresses.merge(deployer.address_book());
        Self {
            deployer,
            kind,
            addresses,
            foreign: ChainMap::new(),
        }
    }

    /// Peers on chains without a local router, which the mesh must include.
    pub fn with_foreign(mut self, foreign: &ChainMap<B256>) -> Self {
        self.foreign = foreign.clone();
        self
    }

    fn directory(&self, configs: &ChainMap<K::Config>) -> PeerDirectory {
        PeerDirectory::new(&router_addresses(self.kind, configs, &self.addresses), &self.foreign)
    }

    fn router(
        &self,
        chain: &ChainName,
        config: &K::Config,
    ) -> Result<(ContractRole, Address), ChainError> {
        let role = self.kind.router_contract_key(config);
        let address = self
            .addresses
            .get(chain, &role)
            .ok_or_else(|| {
                ChainError::configuration(chain, format!("no address recorded for {role}"))
            })?;
        Ok((role, address))
    }

    async fn derive_timelock(
        &self,
        chain: &ChainName,
        address: Address,
        desired: Option<(&TimelockConfig, Address)>,
    ) -> Result<Option<DerivedTimelock>, ChainError> {
        let Some(delay) = self
            .deployer
            .try_read(chain, address, &ITimelockController::getMinDelayCall {})
            .await?
        else {
            return Ok(None);
        };
        let delay = u64::try_from(delay._0)
            .map_err(|e| {
                ChainError::remote_read(chain, format!("timelock delay at {address}"), e)
            })?;

        let (proposer, executor) = match desired {
            Some((config, owner)) => {
                let proposer = config.proposer_or(owner);
                let executor = config.executor_or_open();
                let has_role = |role: B256, account: Address| async move {
                    self.deployer
                        .read(chain, address, &ITimelockController::hasRoleCall { role, account })
                        .await
                        .map(|granted| granted._0.then_some(account))
                };
                (
                    has_role(proposer_role(), proposer).await?,
                    has_role(executor_role(), executor).await?,
                )
            }
            None => (None, None),
        };

        Ok(Some(DerivedTimelock {
            address,
            delay,
            proposer,
            executor,
        }))
    }

    async fn derive_proxy_admin(
        &self,
        chain: &ChainName,
        router: Address,
        config: &RouterConfig,
    ) -> Result<DerivedProxyAdmin, ChainError> {
        let address = self.deployer.proxy_admin_of(chain, router).await?;
        if address.is_zero() {
            tracing::debug!(chain = %chain, router = %router, "Router is not behind a proxy");
            return Ok(DerivedProxyAdmin {
                address,
                owner: Address::ZERO,
                timelock: None,
            });
        }

        let owner = self.deployer.owner_of(chain, address).await?;
        let timelock = self
            .derive_timelock(
                chain,
                owner,
                config.timelock.as_ref().map(|timelock| (timelock, config.owner)),
            )
            .await?;
        Ok(DerivedProxyAdmin {
            address,
            owner,
            timelock,
        })
    }

    /// Read the router of `chain` back from chain, recursing into its modules.
    pub async fn derive(
        &self,
        chain: &ChainName,
        config: &K::Config,
    ) -> Result<DerivedRouterConfig, ChainError> {
        let router_config = K::router_config(config);
        let (_, router) = self.router(chain, config)?;
        let deployer = self.deployer;

        let owner = deployer.owner_of(chain, router).await?;
        let mailbox = deployer.read(chain, router, &IMailboxClient::mailboxCall {}).await?._0;
        let hook = deployer.read(chain, router, &IMailboxClient::hookCall {}).await?._0;
        let ism = deployer
            .read(chain, router, &IMailboxClient::interchainSecurityModuleCall {})
            .await?
            ._0;

        let hook = HookModule::new(deployer, chain, mailbox).derive_pointer(hook).await?;
        let interchain_security_module = IsmModule::new(deployer, chain, mailbox)
            .derive_pointer(ism)
            .await?;
        let proxy_admin = self.derive_proxy_admin(chain, router, router_config).await?;
        let remote_routers = registered_peers(deployer, chain, router).await?;

        Ok(DerivedRouterConfig {
            router,
            owner,
            mailbox,
            hook,
            interchain_security_module,
            proxy_admin,
            remote_routers,
        })
    }

    /// Desired and actual trees, with one top-level field per violation type.
    fn nodes(
        &self,
        chain: &ChainName,
        config: &RouterConfig,
        derived: &DerivedRouterConfig,
        directory: &PeerDirectory,
    ) -> Result<(ConfigNode, ConfigNode), ChainError> {
        let mut desired = NodeBuilder::new()
            .field("owner", config.owner)
            .optional("mailbox", config.mailbox.as_ref());
        let mut actual = NodeBuilder::new()
            .field("owner", derived.owner)
            .field("mailbox", derived.mailbox)
            .field("proxyAdmin", derived.proxy_admin.address)
            .field("proxyAdminOwner", derived.proxy_admin.owner)
            .node("remoteRouter", peers_node(&derived.remote_routers));

        match &config.hook {
            Some(hook) => {
                let (expected, found) = derived.hook.compare_nodes(hook);
                desired = desired.node("hook", expected);
                actual = actual.node("hook", found);
            }
            None => actual = actual.node("hook", derived.hook.node()),
        }
        match &config.interchain_security_module {
            Some(ism) => {
                let (expected, found) = derived.interchain_security_module.compare_nodes(ism);
                desired = desired.node("interchainSecurityModule", expected);
                actual = actual.node("interchainSecurityModule", found);
            }
            None => {
                actual = actual.node(
                    "interchainSecurityModule",
                    derived.interchain_security_module.node(),
                )
            }
        }

        if let Some(address) = config.proxy_admin.as_ref().and_then(|admin| admin.address) {
            desired = desired.field("proxyAdmin", address);
        }
        match &config.timelock {
            Some(timelock) => {
                desired = desired.node("timelock", timelock_node(timelock, config.owner));
                actual = actual.node(
                    "timelock",
                    derived
                        .proxy_admin
                        .timelock
                        .as_ref()
                        .map(DerivedTimelock::node)
                        .unwrap_or_else(|| ConfigNode::leaf("none")),
                );
            }
            None => {
                let owner = config
                    .proxy_admin
                    .as_ref()
                    .and_then(|admin| admin.owner)
                    .unwrap_or(config.owner);
                desired = desired.field("proxyAdminOwner", owner);
            }
        }

        let peers = desired_peers(self.deployer, chain, directory)?;
        desired = desired.node("remoteRouter", peers_node(&peers));

        Ok((desired.record(), actual.record()))
    }

    async fn check_chain(
        &self,
        chain: &ChainName,
        config: &K::Config,
        directory: &PeerDirectory,
    ) -> Result<Vec<ViolationRecord>, ChainError> {
        let (role, _) = self.router(chain, config)?;
        let derived = self.derive(chain, config).await?;
        let (desired, actual) = self.nodes(chain, K::router_config(config), &derived, directory)?;
        let violations =
            ViolationRecord::from_differences(chain, &role, check_against(&desired, &actual));
        tracing::info!(
            chain = %chain,
            role = %role,
            violations = violations.len(),
            "Router checked"
        );
        Ok(violations)
    }

    /// Compare every configured chain with its live router.
    ///
    /// A chain that cannot be read lands in [`CheckReport::errors`]; the rest are still
    /// checked.
    pub async fn check(&self, configs: &ChainMap<K::Config>) -> CheckReport {
        let directory = self.directory(configs);
        let directory = &directory;
        let outcomes = self
            .deployer
            .run_per_chain(configs.keys(), move |chain| async move {
                let config = configs
                    .get(chain)
                    .ok_or_else(|| ChainError::configuration(chain, "no config for chain"))?;
                self.check_chain(chain, config, directory).await
            })
            .await;
        CheckReport::from_outcomes(outcomes)
    }

    /// Proxy admin swap, then the admin's ownership, deploying a timelock first when the
    /// admin should be owned by one and is not.
    async fn proxy_admin_transactions(
        &self,
        chain: &ChainName,
        chain_id: u64,
        router: Address,
        config: &RouterConfig,
        derived: &DerivedProxyAdmin,
    ) -> Result<Vec<TransactionSpec>, ChainError> {
        let mut transactions = Vec::new();
        if derived.address.is_zero() {
            return Ok(transactions);
        }

        let mut admin = derived.address;
        let mut current_owner = derived.owner;
        if let Some(desired) = config.proxy_admin.as_ref().and_then(|admin| admin.address) {
            if let Some(tx) = change_proxy_admin_transaction(chain_id, router, admin, desired) {
                transactions.push(tx);
                current_owner = self.deployer.owner_of(chain, desired).await?;
                admin = desired;
            }
        }

        let expected_owner = match &config.timelock {
            Some(timelock) => match &derived.timelock {
                Some(existing) if existing.satisfies(timelock) && admin == derived.address => {
                    existing.address
                }
                _ => {
                    let address = self
                        .deployer
                        .deploy_contract_from_factory(
                            chain,
                            &roles::TIMELOCK_CONTROLLER.into(),
                            timelock.constructor_args(config.owner),
                        )
                        .await?;
                    tracing::info!(
                        chain = %chain,
                        timelock = %address,
                        "Deployed timelock for proxy admin"
                    );
                    address
                }
            },
            None => config
                .proxy_admin
                .as_ref()
                .and_then(|admin| admin.owner)
                .unwrap_or(config.owner),
        };

        transactions.extend(transfer_ownership_transaction(
            chain_id,
            roles::PROXY_ADMIN,
            admin,
            current_owner,
            expected_owner,
        ));
        Ok(transactions)
    }

    async fn update_chain(
        &self,
        chain: &ChainName,
        config: &K::Config,
        directory: &PeerDirectory,
    ) -> Result<Vec<TransactionSpec>, ChainError> {
        let router_config = K::router_config(config);
        let (role, router) = self.router(chain, config)?;
        let derived = self.derive(chain, config).await?;
        let chain_id = self.deployer.chain_id(chain)?;
        let mut transactions = Vec::new();

        if let Some(mailbox) = router_config.mailbox {
            if mailbox != derived.mailbox {
                tracing::warn!(
                    chain = %chain,
                    expected = %mailbox,
                    actual = %derived.mailbox,
                    "Router mailbox is immutable, redeploy to change it"
                );
            }
        }

        if let Some(desired) = &router_config.interchain_security_module {
            let module = IsmModule::new(self.deployer, chain, derived.mailbox);
            transactions.extend(
                update_module(&module, &derived.interchain_security_module, desired, |address| {
                    TransactionSpec::call(
                        chain_id,
                        router,
                        &IMailboxClient::setInterchainSecurityModuleCall { module: address },
                        format!(
                            "Setting interchainSecurityModule of {role} to {}",
                            format_address(address)
                        ),
                    )
                })
                .await?,
            );
        }
        if let Some(desired) = &router_config.hook {
            let module = HookModule::new(self.deployer, chain, derived.mailbox);
            transactions.extend(
                update_module(&module, &derived.hook, desired, |address| {
                    TransactionSpec::call(
                        chain_id,
                        router,
                        &IMailboxClient::setHookCall { hook: address },
                        format!("Setting hook of {role} to {}", format_address(address)),
                    )
                })
                .await?,
            );
        }

        let peers = desired_peers(self.deployer, chain, directory)?;
        transactions.extend(enroll_transaction(
            chain_id,
            router,
            &missing_enrollments(&peers, &derived.remote_routers),
        ));
        transactions.extend(unenroll_transaction(
            chain_id,
            router,
            &extra_enrollments(&peers, &derived.remote_routers),
        ));

        transactions.extend(
            self.proxy_admin_transactions(
                chain,
                chain_id,
                router,
                router_config,
                &derived.proxy_admin,
            )
            .await?,
        );

        transactions.extend(transfer_ownership_transaction(
            chain_id,
            role.as_str(),
            router,
            derived.owner,
            router_config.owner,
        ));

        tracing::info!(
            chain = %chain,
            role = %role,
            transactions = transactions.len(),
            "Router update planned"
        );
        Ok(transactions)
    }

    /// Corrective transactions per chain, in submission order.
    ///
    /// Replacement modules and timelocks are deployed while planning; the returned
    /// transactions only repoint, enroll and transfer.
    pub async fn update(
        &self,
        configs: &ChainMap<K::Config>,
    ) -> Result<ChainMap<Vec<TransactionSpec>>, MultiChainError<ChainMap<Vec<TransactionSpec>>>> {
        let directory = self.directory(configs);
        let directory = &directory;
        let outcomes = self
            .deployer
            .run_per_chain(configs.keys(), move |chain| async move {
                let config = configs
                    .get(chain)
                    .ok_or_else(|| ChainError::configuration(chain, "no config for chain"))?;
                self.update_chain(chain, config, directory).await
            })
            .await;
        collect_chain_results(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;

    fn timelock() -> TimelockConfig {
        TimelockConfig {
            delay: 1000,
            proposer: None,
            executor: None,
        }
    }

    #[test]
    fn test_timelock_nodes_agree_when_roles_granted() {
        let owner = Address::repeat_byte(1);
        let derived = DerivedTimelock {
            address: Address::repeat_byte(5),
            delay: 1000,
            proposer: Some(owner),
            executor: Some(Address::ZERO),
        };
        assert!(diff(&timelock_node(&timelock(), owner), &derived.node()).is_empty());
        assert!(derived.satisfies(&timelock()));
    }

    #[test]
    fn test_timelock_missing_role_is_reported() {
        let owner = Address::repeat_byte(1);
        let derived = DerivedTimelock {
            address: Address::repeat_byte(5),
            delay: 1000,
            proposer: None,
            executor: Some(Address::ZERO),
        };
        let differences = diff(&timelock_node(&timelock(), owner), &derived.node());
        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].path, "proposer");
        assert!(!derived.satisfies(&timelock()));
    }

    #[test]
    fn test_peers_node_keys_by_domain() {
        let mut peers = PeerSet::new();
        peers.insert(42, Address::repeat_byte(3).into_word());
        let node = peers_node(&peers);
        assert!(node.field("42").is_none(), "tables are not records");
        let ConfigNode::Table(entries) = node else {
            panic!("expected a table");
        };
        assert!(entries.contains_key("42"));
    }
}
