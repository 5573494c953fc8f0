//! Client configuration.
//!
//! Everything has a sensible default; a TOML file (pointed at by
//! `LOCKSTAKE_CONFIG`) overrides individual fields.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Risk engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Hard cap on the borrow ceiling indication (percent). Steering users
    /// right up to 100% would have them liquidated by the next rate accrual.
    #[serde(default = "default_cap_indication")]
    pub cap_indication_percentage: f64,
    /// Risk percent at which a position counts as medium risk
    #[serde(default = "default_medium_threshold")]
    pub medium_risk_threshold: f64,
    /// Risk percent at which a position counts as high risk
    #[serde(default = "default_high_threshold")]
    pub high_risk_threshold: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            cap_indication_percentage: default_cap_indication(),
            medium_risk_threshold: default_medium_threshold(),
            high_risk_threshold: default_high_threshold(),
        }
    }
}

/// Portfolio scan tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Risk level at or above which a position lands in the at-risk set
    #[serde(default = "default_scan_threshold")]
    pub threshold: RiskLevel,
    /// Parallelism cap for per-position reads
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threshold: default_scan_threshold(),
            max_concurrent_reads: default_max_concurrent_reads(),
        }
    }
}

fn default_cap_indication() -> f64 {
    94.0
}

fn default_medium_threshold() -> f64 {
    40.0
}

fn default_high_threshold() -> f64 {
    75.0
}

fn default_scan_threshold() -> RiskLevel {
    RiskLevel::High
}

fn default_max_concurrent_reads() -> usize {
    8
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
    }

    /// Load from the file named by `LOCKSTAKE_CONFIG`, falling back to
    /// defaults when unset or unreadable.
    pub fn from_env() -> Self {
        match std::env::var("LOCKSTAKE_CONFIG") {
            Ok(path) => Self::from_file(&path).unwrap_or_else(|e| {
                warn!(path = %path, error = %e, "Config load failed, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn log_config(&self) {
        info!(
            cap_indication = self.risk.cap_indication_percentage,
            medium_threshold = self.risk.medium_risk_threshold,
            high_threshold = self.risk.high_risk_threshold,
            scan_threshold = ?self.scan.threshold,
            max_concurrent_reads = self.scan.max_concurrent_reads,
            "Client configuration"
        );
    }
}
