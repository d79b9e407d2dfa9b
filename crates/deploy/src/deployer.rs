//! Idempotent per-chain deployment, ownership-guarded mutation and artifact collection.

use std::{future::Future, sync::Mutex};

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::{SolCall, SolValue},
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{
    ChainConnection, ChainDeployment, ChainError, ChainMap, ChainName, ContractAddressMap,
    ContractFactory, ContractRole, FactoryRegistry, TransactionSpec, TxReceipt,
    VerificationArtifact, VerificationLog,
    abi::{self, EIP1967_ADMIN_SLOT, EIP1967_IMPLEMENTATION_SLOT, IOwnable},
    collect_chain_results, format_address, roles, MultiChainError,
};

/// Knobs of a deployment run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployerOptions {
    /// Fan out across chains instead of walking them one by one.
    #[serde(default)]
    pub concurrent: bool,
}

/// Timelock controller parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelockConfig {
    /// Minimum delay in seconds.
    pub delay: u64,
    /// Defaults to the configured owner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposer: Option<Address>,
    /// Defaults to the zero address, which lets anyone execute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<Address>,
}

impl TimelockConfig {
    pub fn proposer_or(&self, owner: Address) -> Address {
        self.proposer.unwrap_or(owner)
    }

    pub fn executor_or_open(&self) -> Address {
        self.executor.unwrap_or(Address::ZERO)
    }

    /// `(minDelay, proposers, executors, admin)` with no extra admin.
    pub fn constructor_args(&self, owner: Address) -> Bytes {
        (
            U256::from(self.delay),
            vec![self.proposer_or(owner)],
            vec![self.executor_or_open()],
            Address::ZERO,
        )
            .abi_encode_params()
            .into()
    }
}

/// Ownership transfer call, or `None` when `actual` already equals `expected`.
pub fn transfer_ownership_transaction(
    chain_id: u64,
    label: &str,
    contract: Address,
    actual: Address,
    expected: Address,
) -> Option<TransactionSpec> {
    if actual == expected {
        return None;
    }
    Some(TransactionSpec::call(
        chain_id,
        contract,
        &IOwnable::transferOwnershipCall { newOwner: expected },
        format!(
            "Transferring ownership of {label} from {} to {}",
            format_address(actual),
            format_address(expected)
        ),
    ))
}

/// Drives contract creation on many chains.
///
/// Holds the connection, the factory registry, the caller's address book and everything
/// recorded during the run.
pub struct Deployer<C> {
    connection: C,
    factories: FactoryRegistry,
    options: DeployerOptions,
    address_book: ContractAddressMap,
    deployed: Mutex<ContractAddressMap>,
    verification: VerificationLog,
}

impl<C: ChainConnection> Deployer<C> {
    pub(crate) fn from_parts(
        connection: C,
        factories: FactoryRegistry,
        options: DeployerOptions,
        address_book: ContractAddressMap,
    ) -> Self {
        Self {
            connection,
            factories,
            options,
            address_book,
            deployed: Mutex::new(ContractAddressMap::new()),
            verification: VerificationLog::new(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    pub fn options(&self) -> &DeployerOptions {
        &self.options
    }

    pub fn address_book(&self) -> &ContractAddressMap {
        &self.address_book
    }

    pub fn verification(&self) -> &VerificationLog {
        &self.verification
    }

    /// Everything recorded so far in this run, seeded entries included.
    pub fn deployed_contracts(&self) -> ContractAddressMap {
        self.deployed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Address recorded this run for `(chain, role)`.
    pub fn recorded(&self, chain: &ChainName, role: &ContractRole) -> Option<Address> {
        self.deployed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(chain, role)
    }

    /// Record an attached or deployed address.
    pub fn record(&self, chain: &ChainName, role: &ContractRole, address: Address) {
        self.deployed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(chain, role, address);
    }

    /// Address recorded this run, else the one seeded by the address book.
    pub fn known_address(&self, chain: &ChainName, role: &ContractRole) -> Option<Address> {
        self.recorded(chain, role)
            .or_else(|| self.address_book.get(chain, role))
    }

    pub fn chain_id(&self, chain: &ChainName) -> Result<u64, ChainError> {
        Ok(self.connection.metadata(chain)?.chain_id)
    }

    pub fn domain_id(&self, chain: &ChainName) -> Result<u32, ChainError> {
        Ok(self.connection.metadata(chain)?.domain_id)
    }

    pub async fn signer(&self, chain: &ChainName) -> Result<Address, ChainError> {
        self.connection
            .signer_address(chain)
            .await
            .map_err(|e| ChainError::remote_read(chain, "signer address", e))
    }

    pub async fn read<T: SolCall>(
        &self,
        chain: &ChainName,
        to: Address,
        call: &T,
    ) -> Result<T::Return, ChainError> {
        abi::read_call(&self.connection, chain, to, call).await
    }

    /// View call whose revert means "not supported by this contract".
    pub async fn try_read<T: SolCall>(
        &self,
        chain: &ChainName,
        to: Address,
        call: &T,
    ) -> Result<Option<T::Return>, ChainError> {
        abi::try_read_call(&self.connection, chain, to, call).await
    }

    pub async fn owner_of(
        &self,
        chain: &ChainName,
        contract: Address,
    ) -> Result<Address, ChainError> {
        Ok(self.read(chain, contract, &IOwnable::ownerCall {}).await?._0)
    }

    async fn storage_address(
        &self,
        chain: &ChainName,
        contract: Address,
        slot: B256,
    ) -> Result<Address, ChainError> {
        let word = self
            .connection
            .storage_at(chain, contract, slot)
            .await
            .map_err(|e| {
                ChainError::remote_read(chain, format!("storage slot {slot} of {contract}"), e)
            })?;
        Ok(Address::from_word(word))
    }

    /// Admin of a transparent proxy, or zero when `proxy` is not one.
    pub async fn proxy_admin_of(
        &self,
        chain: &ChainName,
        proxy: Address,
    ) -> Result<Address, ChainError> {
        self.storage_address(chain, proxy, EIP1967_ADMIN_SLOT).await
    }

    pub async fn proxy_implementation_of(
        &self,
        chain: &ChainName,
        proxy: Address,
    ) -> Result<Address, ChainError> {
        self.storage_address(chain, proxy, EIP1967_IMPLEMENTATION_SLOT).await
    }

    /// Submit `tx` and require a successful receipt.
    pub async fn submit(
        &self,
        chain: &ChainName,
        tx: TransactionSpec,
    ) -> Result<TxReceipt, ChainError> {
        tracing::info!(chain = %chain, annotation = %tx.annotation, "Submitting transaction");
        let receipt = self
            .connection
            .submit(chain, &tx)
            .await
            .map_err(|e| ChainError::deployment(chain, format!("{}: {e:#}", tx.annotation)))?;

        if !receipt.success {
            return Err(ChainError::deployment(
                chain,
                format!("transaction {} reverted: {}", receipt.transaction_hash, tx.annotation),
            ));
        }
        Ok(receipt)
    }

    /// Submit a typed call to `to`.
    pub async fn send<T: SolCall>(
        &self,
        chain: &ChainName,
        to: Address,
        call: &T,
        annotation: impl Into<String>,
    ) -> Result<TxReceipt, ChainError> {
        let tx = TransactionSpec::call(self.chain_id(chain)?, to, call, annotation);
        self.submit(chain, tx).await
    }

    pub fn add_verification_artifacts(
        &self,
        chain: &ChainName,
        artifacts: impl IntoIterator<Item = VerificationArtifact>,
    ) {
        self.verification.append(chain, artifacts);
    }

    fn factory(
        &self,
        chain: &ChainName,
        role: &ContractRole,
    ) -> Result<&ContractFactory, ChainError> {
        self.factories.get(chain, role)
    }

    /// Reject a seeded address whose code does not come from `role`'s factory.
    async fn verify_code(
        &self,
        chain: &ChainName,
        role: &ContractRole,
        factory: &ContractFactory,
        address: Address,
    ) -> Result<(), ChainError> {
        let code_hash = self
            .connection
            .code_hash(chain, address)
            .await
            .map_err(|e| ChainError::remote_read(chain, format!("code at {address}"), e))?;

        if code_hash == keccak256([]) {
            return Err(ChainError::deployment(
                chain,
                format!("seeded {role} address {address} has no code"),
            ));
        }
        if code_hash != factory.runtime_code_hash {
            return Err(ChainError::deployment(
                chain,
                format!(
                    "seeded {role} at {address} does not match {} (code hash {code_hash})",
                    factory.contract_name
                ),
            ));
        }
        Ok(())
    }

    async fn create(
        &self,
        chain: &ChainName,
        name: &str,
        factory: &ContractFactory,
        constructor_args: &[u8],
    ) -> Result<Address, ChainError> {
        let tx = TransactionSpec::create(
            self.chain_id(chain)?,
            factory.deploy_data(constructor_args),
            format!("Deploying {name}"),
        );
        let receipt = self.submit(chain, tx).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            ChainError::deployment(chain, format!("receipt for {name} has no contract address"))
        })?;

        tracing::info!(chain = %chain, contract = %name, address = %address, "Contract deployed");
        Ok(address)
    }

    /// Deploy `role` on `chain`, or reuse the address already known for it.
    ///
    /// A seeded address is only reused after its code is checked against the factory.
    pub async fn deploy_contract(
        &self,
        chain: &ChainName,
        role: &ContractRole,
        constructor_args: Bytes,
    ) -> Result<Address, ChainError> {
        let factory = self.factory(chain, role)?;

        if let Some(address) = self.recorded(chain, role) {
            tracing::debug!(
                chain = %chain,
                role = %role,
                address = %address,
                "Already deployed in this run"
            );
            return Ok(address);
        }

        if let Some(address) = self.address_book.get(chain, role) {
            self.verify_code(chain, role, factory, address).await?;
            tracing::info!(
                chain = %chain,
                role = %role,
                address = %address,
                "Reusing seeded deployment"
            );
            self.record(chain, role, address);
            return Ok(address);
        }

        let address = self
            .create(chain, &factory.contract_name, factory, &constructor_args)
            .await?;
        self.add_verification_artifacts(
            chain,
            [VerificationArtifact {
                name: factory.contract_name.clone(),
                address,
                constructor_arguments: constructor_args,
                is_proxy: false,
                expected_implementation: None,
            }],
        );
        self.record(chain, role, address);
        Ok(address)
    }

    /// [`Deployer::deploy_contract`] followed by an initializer call on fresh deployments.
    pub async fn deploy_contract_and_initialize(
        &self,
        chain: &ChainName,
        role: &ContractRole,
        constructor_args: Bytes,
        initialize: Bytes,
    ) -> Result<Address, ChainError> {
        let fresh =
            self.recorded(chain, role).is_none() && self.address_book.get(chain, role).is_none();
        let address = self.deploy_contract(chain, role, constructor_args).await?;

        if fresh {
            let tx = TransactionSpec {
                chain_id: self.chain_id(chain)?,
                to: Some(address),
                data: initialize,
                value: None,
                annotation: format!("Initializing {role}"),
            };
            self.submit(chain, tx).await?;
        }
        Ok(address)
    }

    /// Always deploy a new instance of `role`; nothing is recorded in the address map.
    ///
    /// Used for nested modules, where several instances of one role may coexist.
    pub async fn deploy_contract_from_factory(
        &self,
        chain: &ChainName,
        role: &ContractRole,
        constructor_args: Bytes,
    ) -> Result<Address, ChainError> {
        let factory = self.factory(chain, role)?;
        let address = self
            .create(chain, &factory.contract_name, factory, &constructor_args)
            .await?;
        self.add_verification_artifacts(
            chain,
            [VerificationArtifact {
                name: factory.contract_name.clone(),
                address,
                constructor_arguments: constructor_args,
                is_proxy: false,
                expected_implementation: None,
            }],
        );
        Ok(address)
    }

    /// Deploy `role` behind a transparent proxy administered by `proxy_admin`.
    ///
    /// The proxy address is what gets recorded for `role`. A seeded proxy is validated
    /// through the implementation stored in its EIP-1967 slot.
    pub async fn deploy_proxied_contract(
        &self,
        chain: &ChainName,
        role: &ContractRole,
        contract_name: &str,
        proxy_admin: Address,
        constructor_args: Bytes,
        initialize: Bytes,
    ) -> Result<Address, ChainError> {
        let factory = self.factory(chain, role)?;

        if let Some(proxy) = self.recorded(chain, role) {
            tracing::debug!(
                chain = %chain,
                role = %role,
                proxy = %proxy,
                "Proxy already deployed in this run"
            );
            return Ok(proxy);
        }

        if let Some(proxy) = self.address_book.get(chain, role) {
            let implementation = self.proxy_implementation_of(chain, proxy).await?;
            self.verify_code(chain, role, factory, implementation).await?;
            tracing::info!(
                chain = %chain,
                role = %role,
                proxy = %proxy,
                implementation = %implementation,
                "Reusing seeded proxy"
            );
            self.record(chain, role, proxy);
            return Ok(proxy);
        }

        let implementation = self
            .create(chain, contract_name, factory, &constructor_args)
            .await?;

        let proxy_role = ContractRole::from(roles::TRANSPARENT_PROXY);
        let proxy_factory = self.factory(chain, &proxy_role)?;
        let proxy_args: Bytes = (implementation, proxy_admin, initialize)
            .abi_encode_params()
            .into();
        let proxy = self
            .create(chain, &proxy_factory.contract_name, proxy_factory, &proxy_args)
            .await?;

        self.add_verification_artifacts(
            chain,
            [
                VerificationArtifact {
                    name: contract_name.to_string(),
                    address: implementation,
                    constructor_arguments: constructor_args,
                    is_proxy: false,
                    expected_implementation: None,
                },
                VerificationArtifact {
                    name: proxy_factory.contract_name.clone(),
                    address: proxy,
                    constructor_arguments: proxy_args,
                    is_proxy: true,
                    expected_implementation: Some(implementation),
                },
            ],
        );
        self.record(chain, role, proxy);
        Ok(proxy)
    }

    /// Deploy a TimelockController for `owner`.
    pub async fn deploy_timelock(
        &self,
        chain: &ChainName,
        timelock: &TimelockConfig,
        owner: Address,
    ) -> Result<Address, ChainError> {
        self.deploy_contract(
            chain,
            &roles::TIMELOCK_CONTROLLER.into(),
            timelock.constructor_args(owner),
        )
        .await
    }

    /// Run `action` only if the signer currently owns `contract`.
    ///
    /// Returns `None` (after logging) when ownership has already moved elsewhere.
    pub async fn run_if_owner<T, F, Fut>(
        &self,
        chain: &ChainName,
        contract: Address,
        action: F,
    ) -> Result<Option<T>, ChainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let signer = self.signer(chain).await?;
        let owner = self.owner_of(chain, contract).await?;
        if owner != signer {
            tracing::warn!(
                chain = %chain,
                contract = %contract,
                owner = %owner,
                signer = %signer,
                "Signer does not own contract, skipping"
            );
            return Ok(None);
        }
        action().await.map(Some)
    }

    /// Move ownership of `contract` to `new_owner` if the signer still holds it and the
    /// owners differ.
    pub async fn transfer_ownership(
        &self,
        chain: &ChainName,
        label: &str,
        contract: Address,
        new_owner: Address,
    ) -> Result<Option<TxReceipt>, ChainError> {
        let chain_id = self.chain_id(chain)?;
        let outcome = self
            .run_if_owner(chain, contract, || async {
                let current = self.owner_of(chain, contract).await?;
                match transfer_ownership_transaction(chain_id, label, contract, current, new_owner)
                {
                    Some(tx) => self.submit(chain, tx).await.map(Some),
                    None => {
                        tracing::debug!(
                            chain = %chain,
                            contract = %label,
                            owner = %current,
                            "Owner already correct"
                        );
                        Ok(None)
                    }
                }
            })
            .await?;
        Ok(outcome.flatten())
    }

    /// Hand each of `roles` known on `chain` to `owner`. Roles without an address are
    /// skipped.
    pub async fn transfer_ownership_of_contracts(
        &self,
        chain: &ChainName,
        owner: Address,
        roles: &[ContractRole],
    ) -> Result<Vec<TxReceipt>, ChainError> {
        let mut receipts = Vec::new();
        for role in roles {
            let Some(contract) = self.known_address(chain, role) else {
                tracing::debug!(
                    chain = %chain,
                    role = %role,
                    "No address for role, skipping transfer"
                );
                continue;
            };
            if let Some(receipt) = self
                .transfer_ownership(chain, role.as_str(), contract, owner)
                .await?
            {
                receipts.push(receipt);
            }
        }
        Ok(receipts)
    }

    async fn deploy_chain<D: ChainDeployment<C>>(
        &self,
        app: &D,
        chain: &ChainName,
        config: &D::Config,
    ) -> Result<(), ChainError> {
        tracing::info!(chain = %chain, "Deploying contracts");
        app.deploy_contracts(self, chain, config).await?;
        tracing::info!(chain = %chain, "Chain deployment complete");
        Ok(())
    }

    /// Run `step` for each chain, concurrently when the run is configured so.
    ///
    /// Every chain gets its own outcome; one chain's failure never cancels another.
    pub async fn run_per_chain<'a, T, F, Fut>(
        &self,
        chains: impl IntoIterator<Item = &'a ChainName>,
        step: F,
    ) -> Vec<(ChainName, Result<T, ChainError>)>
    where
        F: Fn(&'a ChainName) -> Fut,
        Fut: Future<Output = Result<T, ChainError>>,
    {
        let step = &step;
        if self.options.concurrent {
            join_all(
                chains
                    .into_iter()
                    .map(|chain| async move { (chain.clone(), step(chain).await) }),
            )
            .await
        } else {
            let mut outcomes = Vec::new();
            for chain in chains {
                outcomes.push((chain.clone(), step(chain).await));
            }
            outcomes
        }
    }

    /// Deploy `app` on every chain of `configs`.
    ///
    /// Chains fail independently: the error names each failed chain and carries the
    /// address map recorded so far, including contracts a failed chain managed to deploy.
    pub async fn deploy<D: ChainDeployment<C>>(
        &self,
        app: &D,
        configs: &ChainMap<D::Config>,
    ) -> Result<ContractAddressMap, MultiChainError<ContractAddressMap>> {
        let outcomes = self
            .run_per_chain(configs.keys(), move |chain| async move {
                match configs.get(chain) {
                    Some(config) => self.deploy_chain(app, chain, config).await,
                    None => Err(ChainError::configuration(chain, "no config for chain")),
                }
            })
            .await;

        match collect_chain_results(outcomes) {
            Ok(_) => Ok(self.deployed_contracts()),
            Err(error) => Err(error.map_partial(|_| self.deployed_contracts())),
        }
    }
}
