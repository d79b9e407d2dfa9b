//! warpdeck-deploy - Declarative multi-chain deployment and reconciliation.
//!
//! This crate deploys upgradeable routers behind transparent proxies on many chains, wires
//! their proxy admins, timelocks and security modules, enrolls them with each other, and
//! later checks live state against the desired configuration to plan corrective
//! transactions.

pub mod abi;
pub mod checker;
pub mod diff;
pub mod modules;
pub mod router;
pub mod token;
pub mod traits;

mod addresses;
mod builder;
mod config;
mod deployer;
mod error;
mod factories;
mod rpc;
mod types;
mod verification;

pub use addresses::ContractAddressMap;
pub use builder::DeployerBuilder;
pub use checker::{
    CheckReport, CoreChecker, CoreConfig, RouterChecker, ViolationRecord, ViolationType,
};
pub use config::{
    ArtifactsConfig, ENGINE_CONFIG_FILENAME, EngineConfig, default_contract_names,
    load_chain_configs,
};
pub use deployer::{Deployer, DeployerOptions, TimelockConfig, transfer_ownership_transaction};
pub use error::{ChainError, MultiChainError, ReadError, collect_chain_results};
pub use factories::{ContractFactory, FactoryRegistry};
pub use modules::{
    HookConfig, HookModule, HookRef, HookType, IsmConfig, IsmModule, IsmRef, ModuleRef,
    ModuleType,
};
pub use router::{
    ProxiedRouterDeployer, ProxyAdminConfig, RouterConfig,
    kinds::{
        InterchainAccountRouterKind, InterchainQueryRouterKind, LiquidityLayerConfig,
        LiquidityLayerRouterKind, TokenRouterKind, WarpRouteConfig,
    },
};
pub use rpc::{ConfirmationPolicy, JsonRpcConnection};
pub use token::{TokenAdapter, TokenConfig, TokenStandard};
pub use traits::{
    ChainConnection, ChainDeployment, ChainMetadata, ProtocolType, RouterContext, RouterKind,
    TokenMetadata,
};
pub use types::{
    ChainMap, ChainName, ContractRole, ForeignDeployments, TransactionSpec, TxReceipt,
    address_to_bytes32, format_address, parse_router_id, roles,
};
pub use verification::{VerificationArtifact, VerificationLog};
