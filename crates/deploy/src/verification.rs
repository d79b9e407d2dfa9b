//! Per-chain log of contracts awaiting source verification.

use std::{path::Path, sync::Mutex};

use alloy_core::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{ChainMap, ChainName};

/// One contract an external verifier should publish sources for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationArtifact {
    pub name: String,
    pub address: Address,
    pub constructor_arguments: Bytes,
    pub is_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_implementation: Option<Address>,
}

/// Append-only artifact sink shared by concurrent chain deployments.
#[derive(Debug, Default)]
pub struct VerificationLog {
    artifacts: Mutex<ChainMap<Vec<VerificationArtifact>>>,
}

impl VerificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(
        &self,
        chain: &ChainName,
        artifacts: impl IntoIterator<Item = VerificationArtifact>,
    ) {
        let mut log = self
            .artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.entry(chain.clone()).or_default().extend(artifacts);
    }

    /// Copy of everything recorded so far.
    pub fn snapshot(&self) -> ChainMap<Vec<VerificationArtifact>> {
        self.artifacts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Write the log as pretty JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .context("Failed to serialize verification artifacts")?;
        std::fs::write(path, json).context(format!(
            "Failed to write verification artifacts to {}",
            path.display()
        ))?;
        tracing::info!(path = %path.display(), "Verification artifacts saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn artifact(name: &str) -> VerificationArtifact {
        VerificationArtifact {
            name: name.to_string(),
            address: Address::repeat_byte(1),
            constructor_arguments: Bytes::new(),
            is_proxy: false,
            expected_implementation: None,
        }
    }

    #[test]
    fn test_append_keeps_order_per_chain() {
        let log = VerificationLog::new();
        log.append(&"alpha".into(), [artifact("ProxyAdmin")]);
        log.append(&"alpha".into(), [artifact("Router")]);
        log.append(&"beta".into(), [artifact("ProxyAdmin")]);

        let snapshot = log.snapshot();
        let names: Vec<_> = snapshot[&ChainName::from("alpha")]
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["ProxyAdmin", "Router"]);
        assert_eq!(snapshot[&ChainName::from("beta")].len(), 1);
    }

    #[test]
    fn test_save_to_file() {
        let dir = TempDir::new("verification").unwrap();
        let path = dir.path().join("verification.json");
        let log = VerificationLog::new();
        log.append(&"alpha".into(), [artifact("Router")]);
        log.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"isProxy\": false"), "got: {content}");
    }
}
