//! In-memory EVM chains for driving deployments, checks and updates end to end.
//!
//! Contracts are recognised by their init code (`init:<Name>|` followed by constructor
//! arguments) and implement just the functions the engine calls. Every transaction is
//! sent from a single signer and logged per chain.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::{Arc, Mutex},
};

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    sol_types::{SolCall, SolType, SolValue, abi::TokenSeq, sol_data},
};
use anyhow::{Context, Result};
use futures::future::ready;
use warpdeck_deploy::{
    ChainConnection, ChainError, ChainMap, ChainMetadata, ChainName, ContractAddressMap,
    ContractFactory, Deployer, DeployerBuilder, FactoryRegistry, ProtocolType, ReadError,
    TokenMetadata, TransactionSpec, TxReceipt,
    abi::{
        EIP1967_ADMIN_SLOT, EIP1967_IMPLEMENTATION_SLOT, IAggregationHook, IAggregationIsm,
        ICircleBridgeAdapter, IErc20, IInterchainSecurityModule, ILiquidityLayerRouter, IMailbox,
        IMailboxClient, IMultisigIsm, IOwnable, IPausable, IPortalAdapter, IPostDispatchHook,
        IProxyAdmin, IRouter, IRoutingIsm, ISyntheticToken, ITimelockController,
        ITrustedRelayerIsm,
    },
    default_contract_names, roles,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn init_code(name: &str) -> Bytes {
    Bytes::from(format!("init:{name}|").into_bytes())
}

fn runtime_code(name: &str) -> Vec<u8> {
    format!("runtime:{name}").into_bytes()
}

pub fn factory(name: &str) -> ContractFactory {
    ContractFactory::new(name, init_code(name), &runtime_code(name))
}

/// A factory for every role the engine knows.
pub fn factories() -> FactoryRegistry {
    default_contract_names()
        .into_iter()
        .fold(FactoryRegistry::new(), |registry, (role, name)| {
            registry.with(role, factory(&name))
        })
}

/// Split creation data into contract name and constructor arguments.
fn parse_init_code(data: &[u8]) -> Option<(String, Vec<u8>)> {
    let rest = data.strip_prefix(b"init:")?;
    let end = rest.iter().position(|byte| *byte == b'|')?;
    let name = String::from_utf8(rest[..end].to_vec()).ok()?;
    Some((name, rest[end + 1..].to_vec()))
}

/// State of one deployed contract.
#[derive(Debug, Clone, Default)]
pub struct Contract {
    /// Contract whose runtime code lives at the address.
    pub name: String,
    /// Contract whose functions answer calls. Differs from `name` behind a proxy.
    pub logic: String,
    pub owner: Address,
    pub initialized: bool,
    pub mailbox: Address,
    pub hook: Address,
    pub ism: Address,
    pub routers: BTreeMap<u32, B256>,
    pub admin: Address,
    pub implementation: Address,
    pub min_delay: U256,
    pub roles: BTreeSet<(B256, Address)>,
    pub modules: BTreeMap<u32, Address>,
    pub members: Vec<Address>,
    pub threshold: u8,
    pub paused: bool,
    pub relayer: Address,
    pub default_ism: Address,
    pub default_hook: Address,
    pub required_hook: Address,
    pub balances: BTreeMap<Address, U256>,
    /// ERC20 getters; they revert while unset.
    pub metadata: Option<TokenMetadata>,
    /// Token escrowed or wrapped by a token router.
    pub wrapped: Address,
    /// Decimals a synthetic token router was constructed with.
    pub decimals: u8,
    /// Circle or Wormhole domain per local domain, on bridge adapters.
    pub bridge_domains: BTreeMap<u32, u32>,
    /// Token per symbol, on the Circle adapter.
    pub tokens: BTreeMap<String, Address>,
    /// Adapter per bridge name, on the liquidity layer router.
    pub adapters: BTreeMap<String, Address>,
}

impl Contract {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            logic: name.to_string(),
            ..Default::default()
        }
    }

    fn is_router(&self) -> bool {
        self.logic.ends_with("Router")
            || self.logic.ends_with("Adapter")
            || self.logic.starts_with("Aet")
    }
}

#[derive(Debug, Default)]
struct ChainState {
    contracts: BTreeMap<Address, Contract>,
    balances: BTreeMap<Address, U256>,
    nonce: u64,
    transactions: Vec<TransactionSpec>,
    failing: bool,
}

struct Inner {
    metadata: ChainMap<ChainMetadata>,
    signer: Address,
    chains: Mutex<ChainMap<ChainState>>,
    mailboxes: ChainMap<Address>,
}

/// Clone-able handle to a set of in-memory chains.
#[derive(Clone)]
pub struct MockChains {
    inner: Arc<Inner>,
}

type Revert = String;

fn decode<T: SolCall>(data: &[u8]) -> Result<T, Revert> {
    T::abi_decode(data, true).map_err(|e| e.to_string())
}

fn is<T: SolCall>(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == T::SELECTOR
}

fn ret<T: SolValue>(value: T) -> Result<Bytes, Revert>
where
    for<'a> <T::SolType as SolType>::Token<'a>: TokenSeq<'a>,
{
    Ok(value.abi_encode_params().into())
}

fn only_owner(contract: &Contract, sender: Address) -> Result<(), Revert> {
    if contract.owner != sender {
        return Err(format!(
            "Ownable: caller {sender} is not the owner {}",
            contract.owner
        ));
    }
    Ok(())
}

fn module_type(logic: &str) -> Option<u8> {
    match logic {
        "DomainRoutingIsm" => Some(1),
        "StaticAggregationIsm" => Some(2),
        "StaticMerkleRootMultisigIsm" => Some(4),
        "StaticMessageIdMultisigIsm" => Some(5),
        "TestIsm" | "TrustedRelayerIsm" | "PausableIsm" | "InterchainAccountIsm" => Some(6),
        _ => None,
    }
}

fn hook_type(logic: &str) -> Option<u8> {
    match logic {
        "StaticAggregationHook" => Some(2),
        "MerkleTreeHook" => Some(3),
        "PausableHook" => Some(7),
        _ => None,
    }
}

/// Execute `data` against `to`, committing state changes on success.
fn dispatch(
    contracts: &mut BTreeMap<Address, Contract>,
    to: Address,
    data: &[u8],
    sender: Address,
) -> Result<Bytes, Revert> {
    let mut contract = contracts
        .get(&to)
        .cloned()
        .ok_or_else(|| format!("no contract at {to}"))?;
    let logic = contract.logic.clone();

    // Proxy admins reach into the proxies they administer.
    if logic == "ProxyAdmin" && is::<IProxyAdmin::changeProxyAdminCall>(data) {
        let call = decode::<IProxyAdmin::changeProxyAdminCall>(data)?;
        only_owner(&contract, sender)?;
        let proxy = contracts
            .get_mut(&call.proxy)
            .ok_or_else(|| format!("no proxy at {}", call.proxy))?;
        if proxy.admin != to {
            return Err(format!("{to} is not the admin of {}", call.proxy));
        }
        proxy.admin = call.newAdmin;
        return Ok(Bytes::new());
    }

    let output = if logic != "TimelockController" && is::<IOwnable::ownerCall>(data) {
        ret((contract.owner,))
    } else if logic != "TimelockController" && is::<IOwnable::transferOwnershipCall>(data) {
        let call = decode::<IOwnable::transferOwnershipCall>(data)?;
        only_owner(&contract, sender)?;
        contract.owner = call.newOwner;
        Ok(Bytes::new())
    } else if contract.is_router() {
        router_call(&mut contract, data, sender)
    } else if logic == "TimelockController" {
        if is::<ITimelockController::getMinDelayCall>(data) {
            ret((contract.min_delay,))
        } else if is::<ITimelockController::hasRoleCall>(data) {
            let call = decode::<ITimelockController::hasRoleCall>(data)?;
            ret((contract.roles.contains(&(call.role, call.account)),))
        } else {
            Err("unsupported timelock call".to_string())
        }
    } else if logic == "Mailbox" {
        mailbox_call(&mut contract, data, sender)
    } else if logic == "ERC20" {
        if is::<IErc20::balanceOfCall>(data) {
            let call = decode::<IErc20::balanceOfCall>(data)?;
            ret((contract.balances.get(&call.account).copied().unwrap_or_default(),))
        } else if is::<IErc20::totalSupplyCall>(data) {
            ret((contract.balances.values().fold(U256::ZERO, |total, balance| total + *balance),))
        } else if let Some(metadata) = &contract.metadata {
            if is::<IErc20::nameCall>(data) {
                ret((metadata.name.clone(),))
            } else if is::<IErc20::symbolCall>(data) {
                ret((metadata.symbol.clone(),))
            } else if is::<IErc20::decimalsCall>(data) {
                Ok(<(sol_data::Uint<8>,)>::abi_encode_params(&(metadata.decimals,)).into())
            } else {
                Err("unsupported ERC20 call".to_string())
            }
        } else {
            Err("unsupported ERC20 call".to_string())
        }
    } else if let Some(raw) = module_type(&logic) {
        ism_call(&mut contract, raw, data, sender)
    } else if let Some(raw) = hook_type(&logic) {
        hook_call(&mut contract, raw, data, sender)
    } else {
        Err(format!("{logic} does not implement this call"))
    }?;

    contracts.insert(to, contract);
    Ok(output)
}

fn initialize(contract: &mut Contract, owner: Address) -> Result<Bytes, Revert> {
    if contract.initialized {
        return Err("Initializable: contract is already initialized".to_string());
    }
    contract.owner = owner;
    contract.initialized = true;
    Ok(Bytes::new())
}

fn router_call(contract: &mut Contract, data: &[u8], sender: Address) -> Result<Bytes, Revert> {
    let own_call = match contract.logic.as_str() {
        "CircleBridgeAdapter" => circle_call(contract, data, sender),
        "PortalAdapter" => portal_call(contract, data, sender),
        "LiquidityLayerRouter" => liquidity_router_call(contract, data, sender),
        _ => None,
    };
    if let Some(result) = own_call {
        return result;
    }

    if is::<IMailboxClient::mailboxCall>(data) {
        ret((contract.mailbox,))
    } else if is::<IMailboxClient::hookCall>(data) {
        ret((contract.hook,))
    } else if is::<IMailboxClient::interchainSecurityModuleCall>(data) {
        ret((contract.ism,))
    } else if is::<IMailboxClient::setHookCall>(data) {
        only_owner(contract, sender)?;
        contract.hook = decode::<IMailboxClient::setHookCall>(data)?.hook;
        Ok(Bytes::new())
    } else if is::<IMailboxClient::setInterchainSecurityModuleCall>(data) {
        only_owner(contract, sender)?;
        contract.ism = decode::<IMailboxClient::setInterchainSecurityModuleCall>(data)?.module;
        Ok(Bytes::new())
    } else if is::<IMailboxClient::initializeCall>(data) {
        if contract.initialized {
            return Err("Initializable: contract is already initialized".to_string());
        }
        let call = decode::<IMailboxClient::initializeCall>(data)?;
        contract.hook = call.hook;
        contract.ism = call.interchainSecurityModule;
        contract.owner = call.owner;
        contract.initialized = true;
        Ok(Bytes::new())
    } else if is::<ISyntheticToken::initializeCall>(data) {
        let call = decode::<ISyntheticToken::initializeCall>(data)?;
        initialize(contract, call.owner)?;
        contract.hook = call.hook;
        contract.ism = call.interchainSecurityModule;
        contract.metadata = Some(TokenMetadata {
            name: call.name,
            symbol: call.symbol,
            decimals: contract.decimals,
        });
        if !call.totalSupply.is_zero() {
            contract.balances.insert(call.owner, call.totalSupply);
        }
        Ok(Bytes::new())
    } else if is::<IRouter::domainsCall>(data) {
        ret((contract.routers.keys().copied().collect::<Vec<u32>>(),))
    } else if is::<IRouter::routersCall>(data) {
        let call = decode::<IRouter::routersCall>(data)?;
        ret((contract.routers.get(&call.domain).copied().unwrap_or_default(),))
    } else if is::<IRouter::enrollRemoteRoutersCall>(data) {
        only_owner(contract, sender)?;
        let call = decode::<IRouter::enrollRemoteRoutersCall>(data)?;
        if call.domains.len() != call.addresses.len() {
            return Err("length mismatch".to_string());
        }
        contract.routers.extend(call.domains.into_iter().zip(call.addresses));
        Ok(Bytes::new())
    } else if is::<IRouter::unenrollRemoteRoutersCall>(data) {
        only_owner(contract, sender)?;
        for domain in decode::<IRouter::unenrollRemoteRoutersCall>(data)?.domains {
            if contract.routers.remove(&domain).is_none() {
                return Err(format!("no router enrolled for domain {domain}"));
            }
        }
        Ok(Bytes::new())
    } else {
        Err(format!("{} does not implement this call", contract.logic))
    }
}

fn circle_call(
    contract: &mut Contract,
    data: &[u8],
    sender: Address,
) -> Option<Result<Bytes, Revert>> {
    let result = if is::<ICircleBridgeAdapter::initializeCall>(data) {
        decode::<ICircleBridgeAdapter::initializeCall>(data)
            .and_then(|call| initialize(contract, call.owner))
    } else if is::<ICircleBridgeAdapter::aetheriumDomainToCircleDomainCall>(data) {
        decode::<ICircleBridgeAdapter::aetheriumDomainToCircleDomainCall>(data).and_then(|call| {
            ret((contract.bridge_domains.get(&call.domain).copied().unwrap_or_default(),))
        })
    } else if is::<ICircleBridgeAdapter::addDomainCall>(data) {
        only_owner(contract, sender)
            .and_then(|()| decode::<ICircleBridgeAdapter::addDomainCall>(data))
            .map(|call| {
                contract.bridge_domains.insert(call.domain, call.circleDomain);
                Bytes::new()
            })
    } else if is::<ICircleBridgeAdapter::tokenSymbolToAddressCall>(data) {
        decode::<ICircleBridgeAdapter::tokenSymbolToAddressCall>(data)
            .and_then(|call| ret((contract.tokens.get(&call.symbol).copied().unwrap_or_default(),)))
    } else if is::<ICircleBridgeAdapter::addTokenCall>(data) {
        only_owner(contract, sender)
            .and_then(|()| decode::<ICircleBridgeAdapter::addTokenCall>(data))
            .map(|call| {
                contract.tokens.insert(call.symbol, call.token);
                Bytes::new()
            })
    } else {
        return None;
    };
    Some(result)
}

fn portal_call(
    contract: &mut Contract,
    data: &[u8],
    sender: Address,
) -> Option<Result<Bytes, Revert>> {
    let result = if is::<IPortalAdapter::initializeCall>(data) {
        decode::<IPortalAdapter::initializeCall>(data)
            .and_then(|call| initialize(contract, call.owner))
    } else if is::<IPortalAdapter::aetheriumDomainToWormholeDomainCall>(data) {
        decode::<IPortalAdapter::aetheriumDomainToWormholeDomainCall>(data).and_then(|call| {
            let wormhole = contract.bridge_domains.get(&call.domain).copied().unwrap_or_default();
            ret((wormhole as u16,))
        })
    } else if is::<IPortalAdapter::addDomainCall>(data) {
        only_owner(contract, sender)
            .and_then(|()| decode::<IPortalAdapter::addDomainCall>(data))
            .map(|call| {
                contract.bridge_domains.insert(call.domain, u32::from(call.wormholeDomain));
                Bytes::new()
            })
    } else {
        return None;
    };
    Some(result)
}

fn liquidity_router_call(
    contract: &mut Contract,
    data: &[u8],
    sender: Address,
) -> Option<Result<Bytes, Revert>> {
    let result = if is::<ILiquidityLayerRouter::liquidityLayerAdaptersCall>(data) {
        decode::<ILiquidityLayerRouter::liquidityLayerAdaptersCall>(data).and_then(|call| {
            ret((contract.adapters.get(&call.bridge).copied().unwrap_or_default(),))
        })
    } else if is::<ILiquidityLayerRouter::setLiquidityLayerAdapterCall>(data) {
        only_owner(contract, sender)
            .and_then(|()| decode::<ILiquidityLayerRouter::setLiquidityLayerAdapterCall>(data))
            .map(|call| {
                contract.adapters.insert(call.bridge, call.adapter);
                Bytes::new()
            })
    } else {
        return None;
    };
    Some(result)
}

fn mailbox_call(contract: &mut Contract, data: &[u8], sender: Address) -> Result<Bytes, Revert> {
    if is::<IMailbox::defaultIsmCall>(data) {
        ret((contract.default_ism,))
    } else if is::<IMailbox::defaultHookCall>(data) {
        ret((contract.default_hook,))
    } else if is::<IMailbox::requiredHookCall>(data) {
        ret((contract.required_hook,))
    } else if is::<IMailbox::setDefaultIsmCall>(data) {
        only_owner(contract, sender)?;
        contract.default_ism = decode::<IMailbox::setDefaultIsmCall>(data)?.module;
        Ok(Bytes::new())
    } else if is::<IMailbox::setDefaultHookCall>(data) {
        only_owner(contract, sender)?;
        contract.default_hook = decode::<IMailbox::setDefaultHookCall>(data)?.hook;
        Ok(Bytes::new())
    } else if is::<IMailbox::setRequiredHookCall>(data) {
        only_owner(contract, sender)?;
        contract.required_hook = decode::<IMailbox::setRequiredHookCall>(data)?.hook;
        Ok(Bytes::new())
    } else {
        Err("unsupported mailbox call".to_string())
    }
}

fn pausable_call(
    contract: &mut Contract,
    data: &[u8],
    sender: Address,
) -> Option<Result<Bytes, Revert>> {
    if is::<IPausable::pausedCall>(data) {
        Some(ret((contract.paused,)))
    } else if is::<IPausable::pauseCall>(data) || is::<IPausable::unpauseCall>(data) {
        Some(only_owner(contract, sender).map(|_| {
            contract.paused = is::<IPausable::pauseCall>(data);
            Bytes::new()
        }))
    } else {
        None
    }
}

fn ism_call(
    contract: &mut Contract,
    raw: u8,
    data: &[u8],
    sender: Address,
) -> Result<Bytes, Revert> {
    if is::<IInterchainSecurityModule::moduleTypeCall>(data) {
        return Ok(<(sol_data::Uint<8>,)>::abi_encode_params(&(raw,)).into());
    }
    match contract.logic.as_str() {
        "TrustedRelayerIsm" if is::<ITrustedRelayerIsm::trustedRelayerCall>(data) => {
            ret((contract.relayer,))
        }
        "PausableIsm" => pausable_call(contract, data, sender)
            .unwrap_or_else(|| Err("unsupported pausable ISM call".to_string())),
        "DomainRoutingIsm" => {
            if is::<IRoutingIsm::initializeCall>(data) {
                if contract.initialized {
                    return Err("Initializable: contract is already initialized".to_string());
                }
                let call = decode::<IRoutingIsm::initializeCall>(data)?;
                contract.owner = call.owner;
                contract.modules = call.domains.into_iter().zip(call.modules).collect();
                contract.initialized = true;
                Ok(Bytes::new())
            } else if is::<IRoutingIsm::domainsCall>(data) {
                ret((contract.modules.keys().copied().collect::<Vec<u32>>(),))
            } else if is::<IRoutingIsm::moduleCall>(data) {
                let origin = decode::<IRoutingIsm::moduleCall>(data)?.origin;
                let module = contract
                    .modules
                    .get(&origin)
                    .copied()
                    .ok_or_else(|| format!("no ISM found for origin {origin}"))?;
                ret((module,))
            } else if is::<IRoutingIsm::setCall>(data) {
                only_owner(contract, sender)?;
                let call = decode::<IRoutingIsm::setCall>(data)?;
                contract.modules.insert(call.domain, call.module);
                Ok(Bytes::new())
            } else if is::<IRoutingIsm::removeCall>(data) {
                only_owner(contract, sender)?;
                let domain = decode::<IRoutingIsm::removeCall>(data)?.domain;
                contract.modules.remove(&domain);
                Ok(Bytes::new())
            } else {
                Err("unsupported routing ISM call".to_string())
            }
        }
        "StaticAggregationIsm" if is::<IAggregationIsm::modulesAndThresholdCall>(data) => {
            Ok(<(sol_data::Array<sol_data::Address>, sol_data::Uint<8>)>::abi_encode_params(
                &(contract.members.clone(), contract.threshold),
            )
            .into())
        }
        "StaticMerkleRootMultisigIsm" | "StaticMessageIdMultisigIsm"
            if is::<IMultisigIsm::validatorsAndThresholdCall>(data) =>
        {
            Ok(<(sol_data::Array<sol_data::Address>, sol_data::Uint<8>)>::abi_encode_params(
                &(contract.members.clone(), contract.threshold),
            )
            .into())
        }
        logic => Err(format!("{logic} does not implement this call")),
    }
}

fn hook_call(
    contract: &mut Contract,
    raw: u8,
    data: &[u8],
    sender: Address,
) -> Result<Bytes, Revert> {
    if is::<IPostDispatchHook::hookTypeCall>(data) {
        return Ok(<(sol_data::Uint<8>,)>::abi_encode_params(&(raw,)).into());
    }
    match contract.logic.as_str() {
        "PausableHook" => pausable_call(contract, data, sender)
            .unwrap_or_else(|| Err("unsupported pausable hook call".to_string())),
        "StaticAggregationHook" if is::<IAggregationHook::hooksCall>(data) => {
            ret((contract.members.clone(),))
        }
        logic => Err(format!("{logic} does not implement this call")),
    }
}

/// State of a freshly created `name`, or a revert for malformed arguments.
fn construct(name: &str, args: &[u8], sender: Address) -> Result<Contract, Revert> {
    let mut contract = Contract::new(name);
    let first_address = || {
        (args.len() >= 32)
            .then(|| Address::from_word(B256::from_slice(&args[..32])))
            .ok_or_else(|| format!("{name} expects an address argument"))
    };

    match name {
        "ProxyAdmin" | "PausableHook" => contract.owner = sender,
        "TimelockController" => {
            let (delay, proposers, executors, _admin) =
                <(U256, Vec<Address>, Vec<Address>, Address)>::abi_decode_params(args, true)
                    .map_err(|e| e.to_string())?;
            contract.min_delay = delay;
            let proposer_role = keccak256("PROPOSER_ROLE");
            let executor_role = keccak256("EXECUTOR_ROLE");
            contract
                .roles
                .extend(proposers.into_iter().map(|account| (proposer_role, account)));
            contract
                .roles
                .extend(executors.into_iter().map(|account| (executor_role, account)));
        }
        "PausableIsm" => contract.owner = first_address()?,
        "TrustedRelayerIsm" => {
            let (mailbox, relayer) =
                <(Address, Address)>::abi_decode_params(args, true).map_err(|e| e.to_string())?;
            contract.mailbox = mailbox;
            contract.relayer = relayer;
        }
        "StaticMerkleRootMultisigIsm" | "StaticMessageIdMultisigIsm" | "StaticAggregationIsm" => {
            let (members, threshold) =
                <(sol_data::Array<sol_data::Address>, sol_data::Uint<8>)>::abi_decode_params(
                    args, true,
                )
                .map_err(|e| e.to_string())?;
            contract.members = members;
            contract.threshold = threshold;
        }
        "StaticAggregationHook" => {
            let (members,) =
                <(Vec<Address>,)>::abi_decode_params(args, true).map_err(|e| e.to_string())?;
            contract.members = members;
        }
        "MerkleTreeHook" => contract.mailbox = first_address()?,
        "AetNative" => {
            let (_scale, mailbox) =
                <(U256, Address)>::abi_decode_params(args, true).map_err(|e| e.to_string())?;
            contract.mailbox = mailbox;
        }
        "AetERC20Collateral" | "AetERC4626OwnerCollateral" | "AetFiatToken" | "AetXERC20"
        | "AetXERC20Lockbox" => {
            let (token, _scale, mailbox) = <(Address, U256, Address)>::abi_decode_params(args, true)
                .map_err(|e| e.to_string())?;
            contract.wrapped = token;
            contract.mailbox = mailbox;
        }
        "AetERC20" => {
            let (decimals, _scale, mailbox) =
                <(sol_data::Uint<8>, sol_data::Uint<256>, sol_data::Address)>::abi_decode_params(
                    args, true,
                )
                .map_err(|e| e.to_string())?;
            contract.decimals = decimals;
            contract.mailbox = mailbox;
        }
        "AetERC4626" => {
            let (decimals, _scale, mailbox, _collateral_domain) =
                <(
                    sol_data::Uint<8>,
                    sol_data::Uint<256>,
                    sol_data::Address,
                    sol_data::Uint<32>,
                )>::abi_decode_params(args, true)
                    .map_err(|e| e.to_string())?;
            contract.decimals = decimals;
            contract.mailbox = mailbox;
        }
        _ if contract.is_router() => contract.mailbox = first_address()?,
        _ => {}
    }
    Ok(contract)
}

impl MockChains {
    /// Chains named after `domains`, each with a mailbox whose default ISM accepts
    /// everything and whose hooks are merkle tree hooks.
    pub fn new(domains: &[(&str, u32)]) -> Self {
        let signer = Address::repeat_byte(0x5e);
        let mut metadata = ChainMap::new();
        let mut chains = ChainMap::new();
        let mut mailboxes = ChainMap::new();

        for (name, domain) in domains {
            let chain = ChainName::from(*name);
            metadata.insert(
                chain.clone(),
                ChainMetadata {
                    chain_id: u64::from(*domain),
                    domain_id: *domain,
                    protocol: ProtocolType::Ethereum,
                    rpc_url: None,
                    signer: None,
                    native_token: None,
                },
            );

            let mut state = ChainState::default();
            let ism = install_into(&chain, &mut state, Contract::new("TestIsm"));
            let hook = install_into(&chain, &mut state, Contract::new("MerkleTreeHook"));
            let mailbox = install_into(
                &chain,
                &mut state,
                Contract {
                    owner: signer,
                    default_ism: ism,
                    default_hook: hook,
                    required_hook: hook,
                    ..Contract::new("Mailbox")
                },
            );
            mailboxes.insert(chain.clone(), mailbox);
            chains.insert(chain, state);
        }

        Self {
            inner: Arc::new(Inner {
                metadata,
                signer,
                chains: Mutex::new(chains),
                mailboxes,
            }),
        }
    }

    pub fn signer(&self) -> Address {
        self.inner.signer
    }

    pub fn chain(name: &str) -> ChainName {
        ChainName::from(name)
    }

    pub fn mailbox(&self, chain: &str) -> Address {
        self.inner.mailboxes[&ChainName::from(chain)]
    }

    pub fn domain(&self, chain: &str) -> u32 {
        self.inner.metadata[&ChainName::from(chain)].domain_id
    }

    /// Address book holding every chain's mailbox.
    pub fn core_addresses(&self) -> ContractAddressMap {
        let mut book = ContractAddressMap::new();
        for (chain, mailbox) in &self.inner.mailboxes {
            book.insert(chain, &roles::MAILBOX.into(), *mailbox);
        }
        book
    }

    /// Every call and creation on `chain` fails from now on.
    pub fn fail_chain(&self, chain: &str) {
        let mut chains = self.inner.chains.lock().unwrap();
        chains.get_mut(&ChainName::from(chain)).unwrap().failing = true;
    }

    /// Transactions submitted to `chain`, in order.
    pub fn transactions(&self, chain: &str) -> Vec<TransactionSpec> {
        let chains = self.inner.chains.lock().unwrap();
        chains[&ChainName::from(chain)].transactions.clone()
    }

    pub fn contract(&self, chain: &str, address: Address) -> Option<Contract> {
        let chains = self.inner.chains.lock().unwrap();
        chains[&ChainName::from(chain)].contracts.get(&address).cloned()
    }

    pub fn install(&self, chain: &str, contract: Contract) -> Address {
        let chain = ChainName::from(chain);
        let mut chains = self.inner.chains.lock().unwrap();
        let state = chains.get_mut(&chain).unwrap();
        install_into(&chain, state, contract)
    }

    pub fn set_balance(&self, chain: &str, account: Address, amount: U256) {
        let mut chains = self.inner.chains.lock().unwrap();
        chains
            .get_mut(&ChainName::from(chain))
            .unwrap()
            .balances
            .insert(account, amount);
    }

    /// Execute `tx` as the current owner of its target, outside the transaction log.
    pub fn apply_as_owner(&self, chain: &str, tx: &TransactionSpec) -> Result<(), Revert> {
        let mut chains = self.inner.chains.lock().unwrap();
        let state = chains.get_mut(&ChainName::from(chain)).unwrap();
        let to = tx.to.ok_or_else(|| "creations have no owner".to_string())?;
        let owner = state
            .contracts
            .get(&to)
            .map(|contract| contract.owner)
            .ok_or_else(|| format!("no contract at {to}"))?;
        dispatch(&mut state.contracts, to, &tx.data, owner).map(|_| ())
    }

    pub fn deployer(
        &self,
        address_book: ContractAddressMap,
        concurrent: bool,
    ) -> Deployer<MockChains> {
        DeployerBuilder::new(self.clone(), factories())
            .address_book(address_book)
            .concurrent(concurrent)
            .build()
            .unwrap()
    }

    fn with_chain<T>(
        &self,
        chain: &ChainName,
        f: impl FnOnce(&mut ChainState) -> Result<T>,
    ) -> Result<T> {
        let mut chains = self.inner.chains.lock().unwrap();
        let state = chains
            .get_mut(chain)
            .with_context(|| format!("unknown chain {chain}"))?;
        if state.failing {
            anyhow::bail!("connection to {chain} refused");
        }
        f(state)
    }

    fn execute(&self, chain: &ChainName, tx: &TransactionSpec) -> Result<TxReceipt> {
        let signer = self.inner.signer;
        self.with_chain(chain, |state| {
            state.transactions.push(tx.clone());
            let transaction_hash = keccak256(format!("{chain}/tx/{}", state.transactions.len()));

            let Some(to) = tx.to else {
                let (name, args) = parse_init_code(&tx.data).context("unrecognised init code")?;
                let contract_address = create(chain, state, &name, &args, signer).ok();
                return Ok(TxReceipt {
                    transaction_hash,
                    contract_address,
                    success: contract_address.is_some(),
                });
            };

            let success = match dispatch(&mut state.contracts, to, &tx.data, signer) {
                Ok(_) => true,
                Err(reason) => {
                    tracing::debug!(
                        chain = %chain,
                        to = %to,
                        reason = %reason,
                        "Mock transaction reverted"
                    );
                    false
                }
            };
            Ok(TxReceipt {
                transaction_hash,
                contract_address: None,
                success,
            })
        })
    }
}

fn next_address(chain: &ChainName, state: &mut ChainState) -> Address {
    state.nonce += 1;
    Address::from_word(keccak256(format!("{chain}/contract/{}", state.nonce)))
}

fn install_into(chain: &ChainName, state: &mut ChainState, contract: Contract) -> Address {
    let address = next_address(chain, state);
    state.contracts.insert(address, contract);
    address
}

fn create(
    chain: &ChainName,
    state: &mut ChainState,
    name: &str,
    args: &[u8],
    sender: Address,
) -> Result<Address, Revert> {
    if name != "TransparentUpgradeableProxy" {
        let contract = construct(name, args, sender)?;
        return Ok(install_into(chain, state, contract));
    }

    let (implementation, admin, data) =
        <(Address, Address, Bytes)>::abi_decode_params(args, true).map_err(|e| e.to_string())?;
    let logic = state
        .contracts
        .get(&implementation)
        .ok_or_else(|| format!("no implementation at {implementation}"))?;
    let proxy = Contract {
        logic: logic.logic.clone(),
        mailbox: logic.mailbox,
        wrapped: logic.wrapped,
        decimals: logic.decimals,
        admin,
        implementation,
        ..Contract::new(name)
    };
    let address = install_into(chain, state, proxy);
    if !data.is_empty() {
        if let Err(reason) = dispatch(&mut state.contracts, address, &data, sender) {
            state.contracts.remove(&address);
            return Err(reason);
        }
    }
    Ok(address)
}

impl ChainConnection for MockChains {
    fn metadata(&self, chain: &ChainName) -> Result<ChainMetadata, ChainError> {
        self.inner
            .metadata
            .get(chain)
            .cloned()
            .ok_or_else(|| ChainError::configuration(chain, "unknown chain"))
    }

    fn chain_for_domain(&self, domain: u32) -> Option<ChainName> {
        self.inner
            .metadata
            .iter()
            .find(|(_, metadata)| metadata.domain_id == domain)
            .map(|(chain, _)| chain.clone())
    }

    fn signer_address(&self, chain: &ChainName) -> impl Future<Output = Result<Address>> + Send {
        ready(self.with_chain(chain, |_| Ok(self.inner.signer)))
    }

    fn read(
        &self,
        chain: &ChainName,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, ReadError>> + Send {
        let outcome = self.with_chain(chain, |state| {
            let mut contracts = state.contracts.clone();
            Ok(dispatch(&mut contracts, to, &data, Address::ZERO))
        });
        ready(match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(reason)) => Err(ReadError::Reverted(reason)),
            Err(error) => Err(ReadError::Transport(error)),
        })
    }

    fn submit(
        &self,
        chain: &ChainName,
        tx: &TransactionSpec,
    ) -> impl Future<Output = Result<TxReceipt>> + Send {
        ready(self.execute(chain, tx))
    }

    fn code_hash(
        &self,
        chain: &ChainName,
        address: Address,
    ) -> impl Future<Output = Result<B256>> + Send {
        ready(self.with_chain(chain, |state| {
            Ok(match state.contracts.get(&address) {
                Some(contract) => keccak256(runtime_code(&contract.name)),
                None => keccak256([]),
            })
        }))
    }

    fn storage_at(
        &self,
        chain: &ChainName,
        address: Address,
        slot: B256,
    ) -> impl Future<Output = Result<B256>> + Send {
        ready(self.with_chain(chain, |state| {
            let Some(contract) = state.contracts.get(&address) else {
                return Ok(B256::ZERO);
            };
            Ok(if slot == EIP1967_ADMIN_SLOT {
                contract.admin.into_word()
            } else if slot == EIP1967_IMPLEMENTATION_SLOT {
                contract.implementation.into_word()
            } else {
                B256::ZERO
            })
        }))
    }

    fn balance(
        &self,
        chain: &ChainName,
        address: Address,
    ) -> impl Future<Output = Result<U256>> + Send {
        ready(self.with_chain(chain, |state| {
            Ok(state.balances.get(&address).copied().unwrap_or_default())
        }))
    }
}

/// [`MockChains`] behind a transport that drops every view call with one selector.
#[derive(Clone)]
pub struct FailingSelector {
    chains: MockChains,
    selector: [u8; 4],
    reason: &'static str,
}

impl FailingSelector {
    pub fn new(chains: MockChains, selector: [u8; 4], reason: &'static str) -> Self {
        Self {
            chains,
            selector,
            reason,
        }
    }
}

impl ChainConnection for FailingSelector {
    fn metadata(&self, chain: &ChainName) -> Result<ChainMetadata, ChainError> {
        self.chains.metadata(chain)
    }

    fn chain_for_domain(&self, domain: u32) -> Option<ChainName> {
        self.chains.chain_for_domain(domain)
    }

    fn signer_address(&self, chain: &ChainName) -> impl Future<Output = Result<Address>> + Send {
        self.chains.signer_address(chain)
    }

    fn read(
        &self,
        chain: &ChainName,
        to: Address,
        data: Bytes,
    ) -> impl Future<Output = Result<Bytes, ReadError>> + Send {
        let dropped = data.len() >= 4 && data[..4] == self.selector;
        let forwarded = self.chains.read(chain, to, data);
        let reason = self.reason;
        async move {
            if dropped {
                return Err(ReadError::Transport(anyhow::anyhow!(reason)));
            }
            forwarded.await
        }
    }

    fn submit(
        &self,
        chain: &ChainName,
        tx: &TransactionSpec,
    ) -> impl Future<Output = Result<TxReceipt>> + Send {
        self.chains.submit(chain, tx)
    }

    fn code_hash(
        &self,
        chain: &ChainName,
        address: Address,
    ) -> impl Future<Output = Result<B256>> + Send {
        self.chains.code_hash(chain, address)
    }

    fn storage_at(
        &self,
        chain: &ChainName,
        address: Address,
        slot: B256,
    ) -> impl Future<Output = Result<B256>> + Send {
        self.chains.storage_at(chain, address, slot)
    }

    fn balance(
        &self,
        chain: &ChainName,
        address: Address,
    ) -> impl Future<Output = Result<U256>> + Send {
        self.chains.balance(chain, address)
    }
}

/// Deployer over any connection, with the mock factories and `address_book`.
pub fn deployer_over<C: ChainConnection>(
    connection: C,
    address_book: ContractAddressMap,
) -> Deployer<C> {
    DeployerBuilder::new(connection, factories())
        .address_book(address_book)
        .build()
        .unwrap()
}

/// Index of the first transaction on `chain` matching `predicate`.
pub fn position(
    transactions: &[TransactionSpec],
    predicate: impl Fn(&TransactionSpec) -> bool,
) -> Option<usize> {
    transactions.iter().position(predicate)
}

/// Whether `tx` calls `T` on `to`.
pub fn calls<T: SolCall>(tx: &TransactionSpec, to: Address) -> bool {
    tx.to == Some(to) && is::<T>(&tx.data)
}
