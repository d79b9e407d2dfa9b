//! Concrete router kinds.

mod ica;
mod liquidity;
mod query;
mod token;

pub use ica::{INTERCHAIN_ACCOUNT_ISM, INTERCHAIN_ACCOUNT_ROUTER, InterchainAccountRouterKind};
pub use liquidity::{
    CIRCLE_BRIDGE_ADAPTER, CircleBridgeConfig, CircleDomainMapping, LIQUIDITY_LAYER_ROUTER,
    LiquidityLayerConfig, LiquidityLayerRouterKind, PORTAL_ADAPTER, PortalBridgeConfig,
    WormholeDomainMapping,
};
pub use query::{INTERCHAIN_QUERY_ROUTER, InterchainQueryRouterKind};
pub use token::{TokenRouterKind, WarpRouteConfig};
