//! Per-chain error taxonomy and multi-chain aggregation.

use std::{collections::BTreeMap, fmt};

use thiserror::Error;

use crate::{ChainMap, ChainName};

/// A failure scoped to a single chain.
///
/// None of these abort sibling chains; they are collected into a [`MultiChainError`].
#[derive(Debug, Error)]
pub enum ChainError {
    /// Desired config is structurally invalid, references an unknown role, or lacks a
    /// required field.
    #[error("invalid configuration for {chain}: {reason}")]
    Configuration { chain: ChainName, reason: String },

    /// Provider failure while deriving on-chain state.
    #[error("failed to read {target} on {chain}: {reason}")]
    RemoteRead {
        chain: ChainName,
        target: String,
        reason: String,
    },

    /// A transaction was rejected, reverted, or a seeded deployment failed validation.
    #[error("deployment on {chain} failed: {reason}")]
    Deployment { chain: ChainName, reason: String },
}

impl ChainError {
    pub fn configuration(chain: &ChainName, reason: impl Into<String>) -> Self {
        Self::Configuration {
            chain: chain.clone(),
            reason: reason.into(),
        }
    }

    pub fn remote_read(
        chain: &ChainName,
        target: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::RemoteRead {
            chain: chain.clone(),
            target: target.into(),
            reason: format!("{reason:#}"),
        }
    }

    pub fn deployment(chain: &ChainName, reason: impl fmt::Display) -> Self {
        Self::Deployment {
            chain: chain.clone(),
            reason: format!("{reason:#}"),
        }
    }

    /// The chain this error is scoped to.
    pub fn chain(&self) -> &ChainName {
        match self {
            Self::Configuration { chain, .. }
            | Self::RemoteRead { chain, .. }
            | Self::Deployment { chain, .. } => chain,
        }
    }
}

/// Why a view call returned no data.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The call executed and the contract reverted it.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The node could not be reached or did not answer.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Aggregate of per-chain failures, carrying whatever the succeeding chains produced.
#[derive(Debug)]
pub struct MultiChainError<T> {
    pub failures: BTreeMap<ChainName, ChainError>,
    pub partial: T,
}

impl<T> MultiChainError<T> {
    pub fn new(failures: BTreeMap<ChainName, ChainError>, partial: T) -> Self {
        Self { failures, partial }
    }

    /// Wrap one chain's error with an empty partial result.
    pub fn single(error: ChainError, partial: T) -> Self {
        let mut failures = BTreeMap::new();
        failures.insert(error.chain().clone(), error);
        Self { failures, partial }
    }

    /// Chains the caller should re-run.
    pub fn failed_chains(&self) -> Vec<&ChainName> {
        self.failures.keys().collect()
    }

    /// Re-type the partial result, keeping the failures.
    pub fn map_partial<U>(self, f: impl FnOnce(T) -> U) -> MultiChainError<U> {
        MultiChainError {
            failures: self.failures,
            partial: f(self.partial),
        }
    }
}

impl<T> fmt::Display for MultiChainError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} chain(s) failed", self.failures.len())?;
        for error in self.failures.values() {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug> std::error::Error for MultiChainError<T> {}

/// Split per-chain outcomes into successes and failures.
pub fn collect_chain_results<T>(
    outcomes: impl IntoIterator<Item = (ChainName, Result<T, ChainError>)>,
) -> Result<ChainMap<T>, MultiChainError<ChainMap<T>>> {
    let mut succeeded = ChainMap::new();
    let mut failures = BTreeMap::new();
    for (chain, outcome) in outcomes {
        match outcome {
            Ok(value) => {
                succeeded.insert(chain, value);
            }
            Err(error) => {
                tracing::error!(chain = %chain, error = %error, "Chain failed");
                failures.insert(chain, error);
            }
        }
    }

    if failures.is_empty() {
        Ok(succeeded)
    } else {
        Err(MultiChainError::new(failures, succeeded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_names_every_failed_chain() {
        let outcomes = vec![
            (ChainName::from("alpha"), Ok(1)),
            (
                ChainName::from("beta"),
                Err(ChainError::deployment(&"beta".into(), "reverted")),
            ),
            (
                ChainName::from("gamma"),
                Err(ChainError::configuration(&"gamma".into(), "no mailbox")),
            ),
        ];

        let error = collect_chain_results(outcomes).unwrap_err();
        assert_eq!(
            error.failed_chains(),
            vec![&ChainName::from("beta"), &ChainName::from("gamma")]
        );
        assert_eq!(error.partial.get(&ChainName::from("alpha")), Some(&1));

        let rendered = error.to_string();
        assert!(rendered.contains("2 chain(s) failed"), "got: {rendered}");
        assert!(rendered.contains("no mailbox"), "got: {rendered}");
    }

    #[test]
    fn test_collect_all_successes() {
        let outcomes = vec![(ChainName::from("alpha"), Ok::<_, ChainError>("done"))];
        let results = collect_chain_results(outcomes).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_error_reports_its_chain() {
        let error = ChainError::remote_read(&"alpha".into(), "owner()", "timeout");
        assert_eq!(error.chain().as_str(), "alpha");
        assert!(error.to_string().contains("owner()"));
    }

    #[test]
    fn test_read_error_keeps_transport_context() {
        let error = ReadError::from(anyhow::anyhow!("connection reset by peer"));
        let wrapped = ChainError::remote_read(&"alpha".into(), "getMinDelay()", error);
        assert!(wrapped.to_string().contains("connection reset by peer"));

        let reverted = ReadError::Reverted("no such function".to_string());
        assert_eq!(reverted.to_string(), "execution reverted: no such function");
    }
}
