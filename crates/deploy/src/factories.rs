//! Role → contract factory registry.

use std::{collections::BTreeMap, path::Path};

use alloy_core::primitives::{B256, Bytes, keccak256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{ChainError, ChainName, ContractRole};

/// Creation and runtime code of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFactory {
    pub contract_name: String,
    /// Init code, constructor arguments excluded.
    pub bytecode: Bytes,
    /// Keccak hash of the deployed runtime code, used to validate seeded addresses.
    pub runtime_code_hash: B256,
}

impl ContractFactory {
    pub fn new(
        contract_name: impl Into<String>,
        bytecode: Bytes,
        deployed_bytecode: &[u8],
    ) -> Self {
        Self {
            contract_name: contract_name.into(),
            bytecode,
            runtime_code_hash: keccak256(deployed_bytecode),
        }
    }

    /// Init code followed by ABI-encoded constructor arguments.
    pub fn deploy_data(&self, constructor_args: &[u8]) -> Bytes {
        let mut data = Vec::with_capacity(self.bytecode.len() + constructor_args.len());
        data.extend_from_slice(&self.bytecode);
        data.extend_from_slice(constructor_args);
        data.into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FoundryArtifact {
    bytecode: FoundryCode,
    deployed_bytecode: FoundryCode,
}

#[derive(Debug, Deserialize)]
struct FoundryCode {
    object: Bytes,
}

/// Every role a run may deploy or attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactoryRegistry {
    factories: BTreeMap<ContractRole, ContractFactory>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: impl Into<ContractRole>, factory: ContractFactory) -> Self {
        self.insert(role, factory);
        self
    }

    pub fn insert(&mut self, role: impl Into<ContractRole>, factory: ContractFactory) {
        self.factories.insert(role.into(), factory);
    }

    pub fn knows(&self, role: &ContractRole) -> bool {
        self.factories.contains_key(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &ContractRole> {
        self.factories.keys()
    }

    /// Factory for `role`; an unknown role is a configuration error on `chain`.
    pub fn get(
        &self,
        chain: &ChainName,
        role: &ContractRole,
    ) -> Result<&ContractFactory, ChainError> {
        self.factories
            .get(role)
            .ok_or_else(|| {
                ChainError::configuration(chain, format!("unknown contract role {role}"))
            })
    }

    /// Roles from `required` that have no factory.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|role| !self.factories.contains_key(&ContractRole::from(*role)))
            .collect()
    }

    /// Load factories from a Foundry `out/` directory.
    ///
    /// `contracts` maps each role to its contract name; the artifact is read from
    /// `<dir>/<Name>.sol/<Name>.json`.
    pub fn load_foundry_artifacts(
        dir: &Path,
        contracts: &BTreeMap<ContractRole, String>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (role, name) in contracts {
            let path = dir.join(format!("{name}.sol")).join(format!("{name}.json"));
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read artifact {}", path.display()))?;
            let artifact: FoundryArtifact = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

            if artifact.bytecode.object.is_empty() {
                anyhow::bail!(
                    "Artifact {} has no creation code (abstract contract?)",
                    path.display()
                );
            }

            registry.insert(
                role.clone(),
                ContractFactory::new(
                    name.clone(),
                    artifact.bytecode.object,
                    &artifact.deployed_bytecode.object,
                ),
            );
            tracing::debug!(role = %role, contract = %name, "Loaded contract artifact");
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_deploy_data_appends_args() {
        let factory = ContractFactory::new("Thing", Bytes::from(vec![0x60, 0x80]), &[0x01]);
        assert_eq!(factory.deploy_data(&[0xaa]).as_ref(), &[0x60, 0x80, 0xaa]);
        assert_eq!(factory.runtime_code_hash, keccak256([0x01]));
    }

    #[test]
    fn test_unknown_role_is_configuration_error() {
        let registry = FactoryRegistry::new();
        let error = registry.get(&"alpha".into(), &"router".into()).unwrap_err();
        assert!(matches!(error, ChainError::Configuration { .. }));
        assert_eq!(registry.missing(&["proxyAdmin"]), vec!["proxyAdmin"]);
    }

    #[test]
    fn test_load_foundry_artifacts() {
        let dir = TempDir::new("artifacts").unwrap();
        let contract_dir = dir.path().join("ProxyAdmin.sol");
        std::fs::create_dir_all(&contract_dir).unwrap();
        std::fs::write(
            contract_dir.join("ProxyAdmin.json"),
            r#"{
                "abi": [],
                "bytecode": {"object": "0x6080"},
                "deployedBytecode": {"object": "0x6001"}
            }"#,
        )
        .unwrap();

        let contracts =
            BTreeMap::from([(ContractRole::from("proxyAdmin"), "ProxyAdmin".to_string())]);
        let registry = FactoryRegistry::load_foundry_artifacts(dir.path(), &contracts).unwrap();

        let factory = registry.get(&"alpha".into(), &"proxyAdmin".into()).unwrap();
        assert_eq!(factory.contract_name, "ProxyAdmin");
        assert_eq!(factory.bytecode.as_ref(), &[0x60, 0x80]);
        assert_eq!(factory.runtime_code_hash, keccak256([0x60, 0x01]));
    }

    #[test]
    fn test_load_missing_artifact_fails() {
        let dir = TempDir::new("artifacts").unwrap();
        let contracts = BTreeMap::from([(ContractRole::from("router"), "Missing".to_string())]);
        assert!(FactoryRegistry::load_foundry_artifacts(dir.path(), &contracts).is_err());
    }
}
