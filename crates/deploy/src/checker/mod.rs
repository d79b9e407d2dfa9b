//! Drift detection: derive live config, compare it with desired config and emit corrective
//! transactions.

use std::{collections::BTreeMap, str::FromStr};

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    ChainError, ChainName, ContractRole, TransactionSpec,
    abi::IProxyAdmin,
    diff::{ConfigNode, Difference},
    format_address,
};

mod mailbox;
mod router;

pub use mailbox::{CoreChecker, CoreConfig, DerivedCoreConfig};
pub use router::{DerivedProxyAdmin, DerivedRouterConfig, DerivedTimelock, RouterChecker};

/// Category of a mismatch. Each variant names the top-level config field it covers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ViolationType {
    Owner,
    Mailbox,
    Hook,
    InterchainSecurityModule,
    ProxyAdmin,
    ProxyAdminOwner,
    Timelock,
    RemoteRouter,
    DefaultIsm,
    DefaultHook,
    RequiredHook,
}

impl ViolationType {
    /// Config field this violation type is reported under.
    pub fn field(&self) -> &'static str {
        self.into()
    }
}

/// One mismatch between desired and live config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationRecord {
    pub chain: ChainName,
    pub role: ContractRole,
    pub violation_type: ViolationType,
    /// Dotted path of the differing value, starting with the violation's field.
    pub path: String,
    /// `null` when the entry is absent on chain.
    pub actual: serde_json::Value,
    /// `null` when the entry is present on chain but not desired.
    pub expected: serde_json::Value,
}

impl ViolationRecord {
    /// Classify differences by their top-level field.
    ///
    /// Differences under a field with no violation type are dropped with a warning.
    pub fn from_differences(
        chain: &ChainName,
        role: &ContractRole,
        differences: Vec<Difference>,
    ) -> Vec<ViolationRecord> {
        let render = |node: &Option<ConfigNode>| {
            node.as_ref()
                .map(ConfigNode::to_json)
                .unwrap_or(serde_json::Value::Null)
        };

        differences
            .into_iter()
            .filter_map(|difference| {
                let Ok(violation_type) = ViolationType::from_str(difference.root()) else {
                    tracing::warn!(
                        chain = %chain,
                        path = %difference.path,
                        "Unclassified difference"
                    );
                    return None;
                };
                Some(ViolationRecord {
                    chain: chain.clone(),
                    role: role.clone(),
                    violation_type,
                    path: difference.path.clone(),
                    actual: render(&difference.actual),
                    expected: render(&difference.expected),
                })
            })
            .collect()
    }
}

/// Outcome of one check call. Read failures are per chain and never hide other chains'
/// violations.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub violations: Vec<ViolationRecord>,
    pub errors: BTreeMap<ChainName, ChainError>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.errors.is_empty()
    }

    pub fn group_by_type(&self) -> BTreeMap<ViolationType, Vec<&ViolationRecord>> {
        let mut groups: BTreeMap<ViolationType, Vec<&ViolationRecord>> = BTreeMap::new();
        for violation in &self.violations {
            groups.entry(violation.violation_type).or_default().push(violation);
        }
        groups
    }

    pub(crate) fn from_outcomes(
        outcomes: Vec<(ChainName, Result<Vec<ViolationRecord>, ChainError>)>,
    ) -> Self {
        let mut report = Self::default();
        for (chain, outcome) in outcomes {
            match outcome {
                Ok(violations) => report.violations.extend(violations),
                Err(error) => {
                    tracing::error!(chain = %chain, error = %error, "Check failed");
                    report.errors.insert(chain, error);
                }
            }
        }
        report
    }
}

/// `changeProxyAdmin` sent to the current admin, or `None` when it is already `desired`.
pub(crate) fn change_proxy_admin_transaction(
    chain_id: u64,
    proxy: Address,
    current: Address,
    desired: Address,
) -> Option<TransactionSpec> {
    if current == desired {
        return None;
    }
    Some(TransactionSpec::call(
        chain_id,
        current,
        &IProxyAdmin::changeProxyAdminCall {
            proxy,
            newAdmin: desired,
        },
        format!(
            "Changing proxy admin of {} from {} to {}",
            format_address(proxy),
            format_address(current),
            format_address(desired)
        ),
    ))
}
