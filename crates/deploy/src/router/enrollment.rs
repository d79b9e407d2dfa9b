//! Full-mesh peer enrollment between the routers of one application.
//!
//! The peer projection is a parameter, so the same diff drives the main router and any
//! auxiliary role (bridge adapters) that keeps its own peer table.

use std::collections::BTreeMap;

use alloy_core::primitives::{Address, B256};

use crate::{
    ChainConnection, ChainError, ChainMap, ChainName, Deployer, ForeignDeployments, TransactionSpec,
    TxReceipt, abi::IRouter, parse_router_id,
};

/// Domain → 32-byte router id.
pub type PeerSet = BTreeMap<u32, B256>;

/// Router ids of every chain in an application, local or foreign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerDirectory {
    peers: ChainMap<B256>,
}

impl PeerDirectory {
    /// Local addresses win over foreign entries for the same chain.
    pub fn new(local: &ChainMap<Address>, foreign: &ChainMap<B256>) -> Self {
        let mut peers = foreign.clone();
        peers.extend(local.iter().map(|(chain, address)| (chain.clone(), address.into_word())));
        Self { peers }
    }

    pub fn get(&self, chain: &ChainName) -> Option<B256> {
        self.peers.get(chain).copied()
    }

    pub fn chains(&self) -> impl Iterator<Item = &ChainName> {
        self.peers.keys()
    }
}

/// Parse foreign router ids given as 20- or 32-byte hex.
pub fn parse_foreign_deployments(foreign: &ForeignDeployments) -> anyhow::Result<ChainMap<B256>> {
    foreign
        .iter()
        .map(|(chain, value)| {
            parse_router_id(value)
                .map(|id| (chain.clone(), id))
                .map_err(|e| e.context(format!("Invalid foreign deployment for {chain}")))
        })
        .collect()
}

/// Peer routers currently registered on `router`.
pub async fn registered_peers<C: ChainConnection>(
    deployer: &Deployer<C>,
    chain: &ChainName,
    router: Address,
) -> Result<PeerSet, ChainError> {
    let domains = deployer.read(chain, router, &IRouter::domainsCall {}).await?._0;
    let mut peers = PeerSet::new();
    for domain in domains {
        let id = deployer
            .read(chain, router, &IRouter::routersCall { domain })
            .await?
            ._0;
        peers.insert(domain, id);
    }
    Ok(peers)
}

/// The mesh `local` should hold: every other chain of `directory`, by domain.
pub fn desired_peers<C: ChainConnection>(
    deployer: &Deployer<C>,
    local: &ChainName,
    directory: &PeerDirectory,
) -> Result<PeerSet, ChainError> {
    let mut peers = PeerSet::new();
    for peer in directory.chains().filter(|peer| *peer != local) {
        let Some(id) = directory.get(peer) else {
            continue;
        };
        let domain = deployer
            .domain_id(peer)
            .map_err(|_| {
                ChainError::configuration(local, format!("no domain known for peer {peer}"))
            })?;
        peers.insert(domain, id);
    }
    Ok(peers)
}

/// Desired entries that are absent or point elsewhere.
pub fn missing_enrollments(desired: &PeerSet, registered: &PeerSet) -> PeerSet {
    desired
        .iter()
        .filter(|(domain, id)| registered.get(*domain) != Some(*id))
        .map(|(domain, id)| (*domain, *id))
        .collect()
}

/// Registered domains that are not part of the mesh.
pub fn extra_enrollments(desired: &PeerSet, registered: &PeerSet) -> Vec<u32> {
    registered
        .keys()
        .filter(|domain| !desired.contains_key(*domain))
        .copied()
        .collect()
}

pub fn enroll_transaction(
    chain_id: u64,
    router: Address,
    entries: &PeerSet,
) -> Option<TransactionSpec> {
    if entries.is_empty() {
        return None;
    }
    let domains: Vec<u32> = entries.keys().copied().collect();
    Some(TransactionSpec::call(
        chain_id,
        router,
        &IRouter::enrollRemoteRoutersCall {
            domains: domains.clone(),
            addresses: entries.values().copied().collect(),
        },
        format!("Enrolling remote routers for domains {domains:?} on {router}"),
    ))
}

pub fn unenroll_transaction(
    chain_id: u64,
    router: Address,
    domains: &[u32],
) -> Option<TransactionSpec> {
    if domains.is_empty() {
        return None;
    }
    Some(TransactionSpec::call(
        chain_id,
        router,
        &IRouter::unenrollRemoteRoutersCall {
            domains: domains.to_vec(),
        },
        format!("Unenrolling remote routers for domains {domains:?} on {router}"),
    ))
}

/// Register every missing or mismatched peer of `router` in one transaction.
///
/// Correct entries are left alone, and nothing is sent unless the signer owns `router`.
pub async fn enroll_router<C: ChainConnection>(
    deployer: &Deployer<C>,
    chain: &ChainName,
    router: Address,
    directory: &PeerDirectory,
) -> Result<Option<TxReceipt>, ChainError> {
    let desired = desired_peers(deployer, chain, directory)?;
    let registered = registered_peers(deployer, chain, router).await?;
    let missing = missing_enrollments(&desired, &registered);

    let Some(tx) = enroll_transaction(deployer.chain_id(chain)?, router, &missing) else {
        tracing::debug!(
            chain = %chain,
            router = %router,
            peers = desired.len(),
            "Remote routers already enrolled"
        );
        return Ok(None);
    };

    tracing::info!(
        chain = %chain,
        router = %router,
        count = missing.len(),
        "Enrolling remote routers"
    );
    let receipt = deployer
        .run_if_owner(chain, router, || deployer.submit(chain, tx))
        .await?;
    if receipt.is_none() {
        tracing::warn!(
            chain = %chain,
            router = %router,
            "Signer no longer owns router, enrollment skipped"
        );
    }
    Ok(receipt)
}
