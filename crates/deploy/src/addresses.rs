//! The durable output of a deployment run: chain → role → address.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{ChainMap, ChainName, ContractRole, FactoryRegistry};

/// Deployed (or seeded) addresses, serialized as a plain nested table.
///
/// Grows monotonically during a run and is handed back to the caller for persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Deref)]
#[serde(transparent)]
pub struct ContractAddressMap(ChainMap<BTreeMap<ContractRole, Address>>);

impl ContractAddressMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chain: &ChainName, role: &ContractRole) -> Option<Address> {
        self.0.get(chain).and_then(|roles| roles.get(role)).copied()
    }

    pub fn chain(&self, chain: &ChainName) -> Option<&BTreeMap<ContractRole, Address>> {
        self.0.get(chain)
    }

    /// Record `address` for `(chain, role)`.
    ///
    /// An existing entry is kept; the conflicting address is returned instead.
    pub fn insert(
        &mut self,
        chain: &ChainName,
        role: &ContractRole,
        address: Address,
    ) -> Option<Address> {
        let roles = self.0.entry(chain.clone()).or_default();
        match roles.get(role) {
            Some(existing) if *existing != address => {
                tracing::warn!(
                    chain = %chain,
                    role = %role,
                    existing = %existing,
                    rejected = %address,
                    "Address map already holds a different address for this role"
                );
                Some(address)
            }
            Some(_) => None,
            None => {
                roles.insert(role.clone(), address);
                None
            }
        }
    }

    /// Union of `self` and `other`, keeping `self` on conflict.
    pub fn merge(&mut self, other: &ContractAddressMap) {
        for (chain, roles) in other.iter() {
            for (role, address) in roles {
                self.insert(chain, role, *address);
            }
        }
    }

    /// Drop roles the registry does not know.
    pub fn retain_known_roles(&self, registry: &FactoryRegistry) -> Self {
        let mut filtered = Self::new();
        for (chain, roles) in self.iter() {
            for (role, address) in roles {
                if registry.knows(role) {
                    filtered.insert(chain, role, *address);
                } else {
                    tracing::warn!(
                        chain = %chain,
                        role = %role,
                        "Dropping address for unknown role"
                    );
                }
            }
        }
        filtered
    }

    /// Save the map as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize address map")?;
        std::fs::write(path, json)
            .context(format!("Failed to write address map to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Address map saved");
        Ok(())
    }

    /// Load a map written by [`ContractAddressMap::save_to_file`].
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Address map file does not exist: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read address map from {}", path.display()))?;
        let map: Self = serde_json::from_str(&content).context("Failed to parse address map JSON")?;
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContractFactory;
    use alloy_core::primitives::Bytes;
    use tempdir::TempDir;

    fn chain() -> ChainName {
        "alpha".into()
    }

    #[test]
    fn test_insert_is_append_only() {
        let mut map = ContractAddressMap::new();
        let role = ContractRole::from("router");
        assert_eq!(map.insert(&chain(), &role, Address::repeat_byte(1)), None);
        assert_eq!(map.insert(&chain(), &role, Address::repeat_byte(1)), None);
        assert_eq!(
            map.insert(&chain(), &role, Address::repeat_byte(2)),
            Some(Address::repeat_byte(2))
        );
        assert_eq!(map.get(&chain(), &role), Some(Address::repeat_byte(1)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new("addresses").unwrap();
        let path = dir.path().join("addresses.json");

        let mut map = ContractAddressMap::new();
        map.insert(&chain(), &"proxyAdmin".into(), Address::repeat_byte(7));
        map.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(
            raw["alpha"]["proxyAdmin"].is_string(),
            "map should serialize as a plain nested table"
        );

        let loaded = ContractAddressMap::load_from_file(&path).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ContractAddressMap::load_from_file(Path::new("/nonexistent/addresses.json"));
        assert!(result.is_err());
    }

    #[test]
    fn test_retain_known_roles() {
        let registry = FactoryRegistry::new().with(
            "proxyAdmin",
            ContractFactory::new("ProxyAdmin", Bytes::new(), &[]),
        );
        let mut map = ContractAddressMap::new();
        map.insert(&chain(), &"proxyAdmin".into(), Address::repeat_byte(1));
        map.insert(&chain(), &"legacyThing".into(), Address::repeat_byte(2));

        let filtered = map.retain_known_roles(&registry);
        assert_eq!(filtered.chain(&chain()).map(|roles| roles.len()), Some(1));
    }

    #[test]
    fn test_merge_keeps_existing() {
        let mut left = ContractAddressMap::new();
        left.insert(&chain(), &"router".into(), Address::repeat_byte(1));
        let mut right = ContractAddressMap::new();
        right.insert(&chain(), &"router".into(), Address::repeat_byte(2));
        right.insert(&"beta".into(), &"router".into(), Address::repeat_byte(3));

        left.merge(&right);
        assert_eq!(left.get(&chain(), &"router".into()), Some(Address::repeat_byte(1)));
        assert_eq!(left.get(&"beta".into(), &"router".into()), Some(Address::repeat_byte(3)));
    }
}
