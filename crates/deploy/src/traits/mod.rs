//! Seams between the engine and what it drives.
//!
//! - [`ChainConnection`]: per-chain reads and transaction submission.
//! - [`ChainDeployment`]: an application deployed chain by chain by the
//!   [`Deployer`](crate::Deployer).
//! - [`RouterKind`]: the pieces a router family supplies to the proxied router machinery.

mod connection;
mod deployment;
mod router;

pub use connection::{ChainConnection, ChainMetadata, ProtocolType, TokenMetadata};
pub use deployment::ChainDeployment;
pub use router::{RouterContext, RouterKind};
