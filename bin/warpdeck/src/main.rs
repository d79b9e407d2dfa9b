//! warpdeck deploys interchain router applications across many chains and keeps them in
//! line with their desired configuration.

mod cli;

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::de::DeserializeOwned;

use cli::{Cli, Command, RouteArgs, RouterKindArg};
use warpdeck_deploy::{
    ChainError, ChainMap, ChainName, CheckReport, ContractAddressMap, Deployer, DeployerBuilder,
    ENGINE_CONFIG_FILENAME, EngineConfig, ForeignDeployments, InterchainAccountRouterKind,
    InterchainQueryRouterKind, JsonRpcConnection, LiquidityLayerRouterKind, ProxiedRouterDeployer,
    RouterChecker, RouterKind, TokenRouterKind, TransactionSpec, format_address,
    load_chain_configs,
};

/// Variables the CLI itself reads; never part of the engine config.
const CLI_ONLY_VARIABLES: &[&str] = &["config", "verbosity", "addresses", "verification", "kind"];

/// Engine config from a TOML file (or [`ENGINE_CONFIG_FILENAME`] in a directory), overridden
/// by `WARPDECK_` environment variables.
fn load_engine_config(path: &Path) -> Result<EngineConfig> {
    let path = if path.is_dir() {
        path.join(ENGINE_CONFIG_FILENAME)
    } else {
        path.to_path_buf()
    };
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }

    let config: EngineConfig = Figment::new()
        .merge(Toml::file(&path))
        .merge(Env::prefixed("WARPDECK_").ignore(CLI_ONLY_VARIABLES).split("__"))
        .extract()
        .context(format!("Failed to load engine config from {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        chains = config.chains.len(),
        concurrent = config.options.concurrent,
        "Engine configuration loaded"
    );
    Ok(config)
}

fn load_address_book(path: &Path) -> Result<ContractAddressMap> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No address book found, starting empty");
        return Ok(ContractAddressMap::new());
    }
    ContractAddressMap::load_from_file(path)
}

/// Write every known address and the verification artifacts of this run.
fn save_outputs(cli: &Cli, deployer: &Deployer<JsonRpcConnection>) -> Result<()> {
    let mut addresses = deployer.deployed_contracts();
    addresses.merge(deployer.address_book());
    addresses.save_to_file(&cli.addresses)?;
    deployer.verification().save_to_file(&cli.verification)?;
    Ok(())
}

fn violations_table(report: &CheckReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Type", "Chain", "Contract", "Path", "Expected", "Actual"]);
    for (violation_type, violations) in report.group_by_type() {
        for violation in violations {
            table.add_row(vec![
                violation_type.to_string(),
                violation.chain.to_string(),
                violation.role.to_string(),
                violation.path.clone(),
                violation.expected.to_string(),
                violation.actual.to_string(),
            ]);
        }
    }
    table
}

fn errors_table(errors: &BTreeMap<ChainName, ChainError>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Chain", "Error"]);
    for (chain, error) in errors {
        table.add_row(vec![chain.to_string(), error.to_string()]);
    }
    table
}

fn transactions_table(plan: &ChainMap<Vec<TransactionSpec>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Chain", "#", "To", "Annotation"]);
    for (chain, transactions) in plan {
        for (index, tx) in transactions.iter().enumerate() {
            let to = tx.to.map(format_address).unwrap_or_else(|| "(create)".to_string());
            table.add_row(vec![chain.to_string(), index.to_string(), to, tx.annotation.clone()]);
        }
    }
    table
}

async fn run<K>(cli: &Cli, engine: &EngineConfig, kind: K) -> Result<()>
where
    K: RouterKind,
    K::Config: DeserializeOwned,
{
    let route = cli.command.route();
    let configs: ChainMap<K::Config> = load_chain_configs(&route.routes)?;

    let deployer = DeployerBuilder::new(engine.connection()?, engine.factories()?)
        .address_book(load_address_book(&cli.addresses)?)
        .options(engine.options.clone())
        .build()?;

    let mut router = ProxiedRouterDeployer::new(deployer, kind)?;
    if let Some(foreign) = &route.foreign {
        let foreign: ForeignDeployments = load_chain_configs(foreign)?;
        router = router.with_foreign_deployments(&foreign)?;
    }

    tracing::info!(
        kind = K::KIND_NAME,
        chains = configs.len(),
        foreign = router.foreign().len(),
        "Running {}",
        command_name(&cli.command)
    );

    match &cli.command {
        Command::Deploy(_) => {
            let outcome = router.deploy(&configs).await;
            save_outputs(cli, router.deployer())?;
            let deployed = outcome?;
            tracing::info!(
                chains = deployed.len(),
                addresses = %cli.addresses.display(),
                "Deployment complete"
            );
        }
        Command::Enroll(_) => {
            router.enroll(&configs).await?;
            tracing::info!(chains = configs.len(), "Enrollment complete");
        }
        Command::Check(_) => {
            let checker =
                RouterChecker::new(router.deployer(), router.kind()).with_foreign(router.foreign());
            let report = checker.check(&configs).await;

            if !report.violations.is_empty() {
                println!("{}", violations_table(&report));
            }
            if !report.errors.is_empty() {
                println!("{}", errors_table(&report.errors));
            }
            if !report.is_clean() {
                anyhow::bail!(
                    "{} violation(s) and {} failed chain(s)",
                    report.violations.len(),
                    report.errors.len()
                );
            }
            tracing::info!(chains = configs.len(), "No violations found");
        }
        Command::Update { submit, out, .. } => {
            let checker =
                RouterChecker::new(router.deployer(), router.kind()).with_foreign(router.foreign());
            let (plan, failures) = match checker.update(&configs).await {
                Ok(plan) => (plan, BTreeMap::new()),
                Err(error) => (error.partial, error.failures),
            };

            // Planning may have deployed replacement modules or timelocks.
            save_outputs(cli, router.deployer())?;

            println!("{}", transactions_table(&plan));
            if let Some(out) = out {
                let content = serde_json::to_string_pretty(&plan)
                    .context("Failed to serialize planned transactions")?;
                std::fs::write(out, content)
                    .context(format!("Failed to write planned transactions to {}", out.display()))?;
            }
            if !failures.is_empty() {
                println!("{}", errors_table(&failures));
                anyhow::bail!("Planning failed on {} chain(s)", failures.len());
            }

            if *submit {
                submit_plan(router.deployer(), plan).await?;
            }
        }
    }

    Ok(())
}

/// Submit each chain's transactions in order, stopping a chain at its first failure.
async fn submit_plan(
    deployer: &Deployer<JsonRpcConnection>,
    plan: ChainMap<Vec<TransactionSpec>>,
) -> Result<()> {
    let mut failed = Vec::new();
    for (chain, transactions) in plan {
        for tx in transactions {
            let annotation = tx.annotation.clone();
            match deployer.submit(&chain, tx).await {
                Ok(receipt) => {
                    tracing::info!(
                        chain = %chain,
                        hash = %receipt.transaction_hash,
                        "{annotation}"
                    );
                }
                Err(error) => {
                    tracing::error!(chain = %chain, error = %error, "Failed: {annotation}");
                    failed.push(chain.clone());
                    break;
                }
            }
        }
    }
    if !failed.is_empty() {
        anyhow::bail!("Submission failed on {} chain(s)", failed.len());
    }
    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Deploy(_) => "deploy",
        Command::Check(_) => "check",
        Command::Update { .. } => "update",
        Command::Enroll(_) => "enroll",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut engine = load_engine_config(&cli.config)?;
    if cli.concurrent {
        engine.options.concurrent = true;
    }

    let RouteArgs { kind, .. } = cli.command.route();
    match kind {
        RouterKindArg::Warp => run(&cli, &engine, TokenRouterKind).await,
        RouterKindArg::Ica => run(&cli, &engine, InterchainAccountRouterKind).await,
        RouterKindArg::Query => run(&cli, &engine, InterchainQueryRouterKind).await,
        RouterKindArg::LiquidityLayer => run(&cli, &engine, LiquidityLayerRouterKind).await,
    }
}
