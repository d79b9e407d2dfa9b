//! Security modules and post-dispatch hooks: derivation from chain, fresh deployment and
//! the replace-or-patch update policy shared by both.

use std::fmt::Debug;

use alloy_core::primitives::Address;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    ChainError, TransactionSpec,
    diff::{ConfigNode, ToConfigNode, check_against},
};

mod hook;
mod ism;

pub use hook::{HookConfig, HookModule, HookType};
pub use ism::{IsmConfig, IsmModule, ModuleType};

/// A module given either as an existing address or as a config to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleRef<T> {
    Address(Address),
    Config(T),
}

pub type IsmRef = ModuleRef<IsmConfig>;
pub type HookRef = ModuleRef<HookConfig>;

/// A module pointer read from chain, with the config recovered behind it.
///
/// `config` is `None` when the pointer is unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedModule<T> {
    pub address: Address,
    pub config: Option<T>,
}

impl<T: ToConfigNode> DerivedModule<T> {
    /// Canonical nodes for comparing `self` against `desired`.
    ///
    /// A desired address compares by address; a desired config compares by shape, since
    /// equivalent modules may live at different addresses.
    pub fn compare_nodes(&self, desired: &ModuleRef<T>) -> (ConfigNode, ConfigNode) {
        match desired {
            ModuleRef::Address(address) => {
                (ConfigNode::address(*address), ConfigNode::address(self.address))
            }
            ModuleRef::Config(config) => (
                config.to_config_node(),
                self.config
                    .as_ref()
                    .map(ToConfigNode::to_config_node)
                    .unwrap_or_else(|| ConfigNode::address(self.address)),
            ),
        }
    }

    /// Canonical node when nothing is desired: the shape if known, else the address.
    pub fn node(&self) -> ConfigNode {
        self.config
            .as_ref()
            .map(ToConfigNode::to_config_node)
            .unwrap_or_else(|| ConfigNode::address(self.address))
    }
}

/// Chain-bound operations over one module family.
pub trait ModuleManager {
    type Config: ToConfigNode + Clone + Debug;

    /// Name used in logs and annotations.
    const LABEL: &'static str;

    /// Recover the config of the module deployed at `address`.
    fn derive(&self, address: Address) -> LocalBoxFuture<'_, Result<Self::Config, ChainError>>;

    /// Deploy a fresh module, nested modules included.
    fn deploy<'a>(
        &'a self,
        config: &'a Self::Config,
    ) -> LocalBoxFuture<'a, Result<Address, ChainError>>;

    /// Leaf-pointer patches turning `current` into `desired` in place, or `None` when the
    /// shapes differ and a replacement is required.
    fn patch<'a>(
        &'a self,
        address: Address,
        current: &'a Self::Config,
        desired: &'a Self::Config,
    ) -> LocalBoxFuture<'a, Result<Option<Vec<TransactionSpec>>, ChainError>>;

    /// Derive the module behind a pointer, treating zero as unset.
    fn derive_pointer(
        &self,
        address: Address,
    ) -> LocalBoxFuture<'_, Result<DerivedModule<Self::Config>, ChainError>> {
        Box::pin(async move {
            let config = if address.is_zero() {
                None
            } else {
                Some(self.derive(address).await?)
            };
            Ok(DerivedModule { address, config })
        })
    }
}

/// Address to point at for `desired`, deploying it when given as a config.
pub async fn resolve_module<M: ModuleManager>(
    manager: &M,
    desired: Option<&ModuleRef<M::Config>>,
) -> Result<Address, ChainError> {
    match desired {
        None => Ok(Address::ZERO),
        Some(ModuleRef::Address(address)) => Ok(*address),
        Some(ModuleRef::Config(config)) => manager.deploy(config).await,
    }
}

/// Corrective transactions moving the pointer at `current` to `desired`.
///
/// Equal modules yield nothing; a desired address yields a setter; a same-shape mutable
/// module is patched in place; anything else is deployed fresh and pointed at. A
/// replacement landing on the current address is reported as a deviation and no setter is
/// emitted.
pub async fn update_module<M: ModuleManager>(
    manager: &M,
    current: &DerivedModule<M::Config>,
    desired: &ModuleRef<M::Config>,
    point_to: impl FnOnce(Address) -> TransactionSpec,
) -> Result<Vec<TransactionSpec>, ChainError> {
    let (expected, actual) = current.compare_nodes(desired);
    if check_against(&expected, &actual).is_empty() {
        tracing::debug!(module = M::LABEL, address = %current.address, "Module already matches");
        return Ok(Vec::new());
    }

    let config = match desired {
        ModuleRef::Address(address) => return Ok(vec![point_to(*address)]),
        ModuleRef::Config(config) => config,
    };

    if let Some(existing) = &current.config {
        if let Some(patches) = manager.patch(current.address, existing, config).await? {
            tracing::info!(
                module = M::LABEL,
                address = %current.address,
                patches = patches.len(),
                "Patching module in place"
            );
            return Ok(patches);
        }
    }

    let replacement = manager.deploy(config).await?;
    if replacement == current.address {
        tracing::warn!(
            module = M::LABEL,
            address = %replacement,
            "Replacement module was deployed at the current address, not repointing"
        );
        return Ok(Vec::new());
    }

    tracing::info!(
        module = M::LABEL,
        from = %current.address,
        to = %replacement,
        "Replacing module"
    );
    Ok(vec![point_to(replacement)])
}
