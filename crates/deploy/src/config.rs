//! Engine configuration file and desired-config loading.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    ChainMap, ChainMetadata, ConfirmationPolicy, ContractRole, DeployerOptions, FactoryRegistry,
    JsonRpcConnection,
    router::kinds::{
        CIRCLE_BRIDGE_ADAPTER, INTERCHAIN_ACCOUNT_ISM, INTERCHAIN_ACCOUNT_ROUTER,
        INTERCHAIN_QUERY_ROUTER, LIQUIDITY_LAYER_ROUTER, PORTAL_ADAPTER,
    },
    roles,
};

/// Default name of the engine configuration file.
pub const ENGINE_CONFIG_FILENAME: &str = "warpdeck.toml";

/// Contract name behind every role the engine knows how to deploy.
pub fn default_contract_names() -> BTreeMap<ContractRole, String> {
    [
        (roles::PROXY_ADMIN, "ProxyAdmin"),
        (roles::TIMELOCK_CONTROLLER, "TimelockController"),
        (roles::TRANSPARENT_PROXY, "TransparentUpgradeableProxy"),
        (roles::MAILBOX, "Mailbox"),
        (roles::TEST_ISM, "TestIsm"),
        (roles::TRUSTED_RELAYER_ISM, "TrustedRelayerIsm"),
        (roles::PAUSABLE_ISM, "PausableIsm"),
        (roles::DOMAIN_ROUTING_ISM, "DomainRoutingIsm"),
        (roles::MERKLE_ROOT_MULTISIG_ISM, "StaticMerkleRootMultisigIsm"),
        (roles::MESSAGE_ID_MULTISIG_ISM, "StaticMessageIdMultisigIsm"),
        (roles::STATIC_AGGREGATION_ISM, "StaticAggregationIsm"),
        (roles::MERKLE_TREE_HOOK, "MerkleTreeHook"),
        (roles::PAUSABLE_HOOK, "PausableHook"),
        (roles::STATIC_AGGREGATION_HOOK, "StaticAggregationHook"),
        ("native", "AetNative"),
        ("collateral", "AetERC20Collateral"),
        ("collateralVault", "AetERC4626OwnerCollateral"),
        ("collateralFiat", "AetFiatToken"),
        ("xerc20", "AetXERC20"),
        ("xerc20Lockbox", "AetXERC20Lockbox"),
        ("synthetic", "AetERC20"),
        ("syntheticRebase", "AetERC4626"),
        (INTERCHAIN_ACCOUNT_ROUTER, "InterchainAccountRouter"),
        (INTERCHAIN_ACCOUNT_ISM, "InterchainAccountIsm"),
        (INTERCHAIN_QUERY_ROUTER, "InterchainQueryRouter"),
        (LIQUIDITY_LAYER_ROUTER, "LiquidityLayerRouter"),
        (CIRCLE_BRIDGE_ADAPTER, "CircleBridgeAdapter"),
        (PORTAL_ADAPTER, "PortalAdapter"),
    ]
    .into_iter()
    .map(|(role, name)| (ContractRole::from(role), name.to_string()))
    .collect()
}

/// Where compiled contracts live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Foundry `out/` directory.
    pub out_dir: PathBuf,
    /// Role to contract name. Entries override the defaults.
    #[serde(default)]
    pub contracts: BTreeMap<ContractRole, String>,
}

impl ArtifactsConfig {
    /// Defaults merged with the configured overrides.
    pub fn contract_names(&self) -> BTreeMap<ContractRole, String> {
        let mut names = default_contract_names();
        names.extend(self.contracts.clone());
        names
    }
}

/// Everything needed to talk to the chains of a run and build its contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub chains: ChainMap<ChainMetadata>,
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub options: DeployerOptions,
    #[serde(default)]
    pub confirmation: ConfirmationPolicy,
}

impl EngineConfig {
    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize engine config to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file, or from [`ENGINE_CONFIG_FILENAME`] inside a
    /// directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file or directory not found: {}", path.display());
        }

        let config_path = if path.is_dir() {
            path.join(ENGINE_CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&config_path)
            .context(format!("Failed to read config from {}", config_path.display()))?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file as TOML")?;
        tracing::info!(
            path = %config_path.display(),
            chains = config.chains.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn connection(&self) -> Result<JsonRpcConnection> {
        Ok(JsonRpcConnection::new(self.chains.clone())?
            .with_confirmation(self.confirmation.clone()))
    }

    pub fn factories(&self) -> Result<FactoryRegistry> {
        FactoryRegistry::load_foundry_artifacts(
            &self.artifacts.out_dir,
            &self.artifacts.contract_names(),
        )
        .context("Failed to load contract artifacts")
    }
}

/// Load desired per-chain configs from a `.json` or `.toml` file.
pub fn load_chain_configs<T: DeserializeOwned>(path: &Path) -> Result<ChainMap<T>> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read chain configs from {}", path.display()))?;

    let configs: ChainMap<T> = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&content)
            .context(format!("Failed to parse {} as JSON", path.display()))?,
        Some("toml") => toml::from_str(&content)
            .context(format!("Failed to parse {} as TOML", path.display()))?,
        _ => anyhow::bail!(
            "Unsupported chain config format for {}, expected .json or .toml",
            path.display()
        ),
    };
    tracing::debug!(path = %path.display(), chains = configs.len(), "Chain configs loaded");
    Ok(configs)
}
