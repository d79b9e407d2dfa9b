use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use warpdeck_deploy::ENGINE_CONFIG_FILENAME;

/// Router application a command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum RouterKindArg {
    /// Token bridges (native, collateral, synthetic, ...).
    Warp,
    /// Interchain account routers.
    Ica,
    /// Interchain query routers.
    Query,
    /// Liquidity layer routers with their bridge adapters.
    LiquidityLayer,
}

#[derive(Debug, Clone, Args)]
pub struct RouteArgs {
    /// Router application to operate on.
    #[arg(short, long, env = "WARPDECK_KIND")]
    pub kind: RouterKindArg,

    /// Desired per-chain configs (.json or .toml).
    #[arg(short, long)]
    pub routes: PathBuf,

    /// Peer routers deployed elsewhere, as a JSON map of chain to router address.
    #[arg(long)]
    pub foreign: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Deploy routers, enroll them with each other and hand over ownership.
    Deploy(RouteArgs),

    /// Compare live state against the desired configs. Exits non-zero on drift.
    Check(RouteArgs),

    /// Plan the transactions that would fix any drift.
    Update {
        #[command(flatten)]
        route: RouteArgs,

        /// Submit the planned transactions with the configured signer.
        #[arg(long, default_value_t = false)]
        submit: bool,

        /// Also write the planned transactions to this JSON file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Enroll already deployed routers with their peers.
    Enroll(RouteArgs),
}

impl Command {
    pub fn route(&self) -> &RouteArgs {
        match self {
            Command::Deploy(route)
            | Command::Check(route)
            | Command::Enroll(route)
            | Command::Update { route, .. } => route,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level.
    #[arg(short, long, env = "WARPDECK_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Engine configuration file. Values can be overridden with `WARPDECK_` variables,
    /// nesting with `__` (e.g. `WARPDECK_OPTIONS__CONCURRENT=true`).
    #[arg(short, long, env = "WARPDECK_CONFIG", default_value = ENGINE_CONFIG_FILENAME)]
    pub config: PathBuf,

    /// Address book read before and written after every run.
    #[arg(short, long, env = "WARPDECK_ADDRESSES", default_value = "addresses.json")]
    pub addresses: PathBuf,

    /// Where verification artifacts of deployed contracts are written.
    #[arg(long, env = "WARPDECK_VERIFICATION", default_value = "verification.json")]
    pub verification: PathBuf,

    /// Run chains concurrently instead of one after the other.
    #[arg(long, default_value_t = false)]
    pub concurrent: bool,

    #[command(subcommand)]
    pub command: Command,
}
