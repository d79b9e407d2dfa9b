//! Builder module for creating a [`Deployer`].
//!
//! The [`DeployerBuilder`] collects the connection, factory registry and the caller's
//! address book, and sanitizes the address book before the first chain is touched.

use anyhow::Result;

use crate::{ChainConnection, ContractAddressMap, Deployer, DeployerOptions, FactoryRegistry};

/// Builder for a [`Deployer`].
///
/// # Example
///
/// ```no_run
/// use warpdeck_deploy::{ChainMap, DeployerBuilder, FactoryRegistry, JsonRpcConnection};
///
/// # fn example() -> anyhow::Result<()> {
/// let connection = JsonRpcConnection::new(ChainMap::new())?;
/// let deployer = DeployerBuilder::new(connection, FactoryRegistry::new())
///     .concurrent(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeployerBuilder<C> {
    connection: C,
    factories: FactoryRegistry,
    /// Addresses from a previous run, reused instead of redeploying.
    address_book: ContractAddressMap,
    options: DeployerOptions,
}

impl<C: ChainConnection> DeployerBuilder<C> {
    pub fn new(connection: C, factories: FactoryRegistry) -> Self {
        Self {
            connection,
            factories,
            address_book: ContractAddressMap::new(),
            options: DeployerOptions::default(),
        }
    }

    /// Seed the run with previously deployed addresses.
    pub fn address_book(mut self, address_book: ContractAddressMap) -> Self {
        self.address_book = address_book;
        self
    }

    /// Deploy all chains concurrently instead of one after another.
    pub fn concurrent(mut self, concurrent: bool) -> Self {
        self.options.concurrent = concurrent;
        self
    }

    pub fn options(mut self, options: DeployerOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the [`Deployer`].
    ///
    /// Address book entries for chains the connection does not know, or for roles the
    /// registry cannot build, are dropped with a warning.
    pub fn build(self) -> Result<Deployer<C>> {
        let mut address_book = self.address_book.retain_known_roles(&self.factories);
        let unknown_chains: Vec<_> = address_book
            .keys()
            .filter(|chain| self.connection.metadata(chain).is_err())
            .cloned()
            .collect();
        if !unknown_chains.is_empty() {
            tracing::warn!(
                chains = ?unknown_chains,
                "Ignoring address book entries for unknown chains"
            );
            let mut known = ContractAddressMap::new();
            for (chain, roles) in address_book.iter() {
                if unknown_chains.contains(chain) {
                    continue;
                }
                for (role, address) in roles {
                    known.insert(chain, role, *address);
                }
            }
            address_book = known;
        }

        tracing::info!(
            roles = self.factories.roles().count(),
            seeded_chains = address_book.len(),
            concurrent = self.options.concurrent,
            "Building deployer"
        );

        Ok(Deployer::from_parts(
            self.connection,
            self.factories,
            self.options,
            address_book,
        ))
    }
}
