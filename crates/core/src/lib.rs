//! Core logic for the staking engine client: fixed-point protocol math,
//! the collateral risk engine, position snapshots, portfolio scanning and
//! configuration.

pub mod config;
pub mod math;
pub mod portfolio;
pub mod position;
pub mod risk;

pub use config::{ClientConfig, RiskConfig, ScanConfig};
pub use portfolio::{PortfolioScanner, ScanError, ScanReport};
pub use position::PositionSnapshot;
pub use risk::{PriceSource, ReferencePrice, RiskLevel, RiskSnapshot};
