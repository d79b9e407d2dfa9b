//! Per-chain deployment hook driven by [`Deployer::deploy`](crate::Deployer::deploy).

use std::future::Future;

use crate::{ChainConnection, ChainError, ChainName, Deployer};

/// An application that knows how to materialize its contracts on one chain.
///
/// Implementations record what they deploy through the [`Deployer`] they are handed;
/// nothing they do on one chain may depend on another chain's in-progress state.
pub trait ChainDeployment<C: ChainConnection> {
    /// Desired per-chain configuration.
    type Config;

    /// Deploy (or attach) every contract `config` calls for on `chain`.
    fn deploy_contracts(
        &self,
        deployer: &Deployer<C>,
        chain: &ChainName,
        config: &Self::Config,
    ) -> impl Future<Output = Result<(), ChainError>>;
}
