//! Portfolio scanning: judge every position an owner holds against one
//! consistent set of parameters and one reference price.

use alloy::primitives::{Address, U256};
use futures::stream::{self, StreamExt};
use lockstake_api::MarketPriceClient;
use lockstake_chain::{PositionReads, ReadError, UrnState};
use smallvec::SmallVec;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::ClientConfig;
use crate::position::PositionSnapshot;
use crate::risk::{PriceSource, ReferencePrice, RiskLevel};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error(transparent)]
    Read(#[from] ReadError),
}

/// Outcome of one portfolio pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// All positions, ordered by index
    pub positions: Vec<PositionSnapshot>,
    /// Indices whose risk level meets the threshold or that are already
    /// past the liquidation point
    pub at_risk_indices: SmallVec<[u64; 8]>,
    pub threshold: RiskLevel,
    pub price_source: PriceSource,
}

/// Scans every urn an owner holds. Parameters and the reference price are
/// fetched once per pass so all positions are judged consistently.
pub struct PortfolioScanner {
    reads: Arc<dyn PositionReads>,
    feed: Arc<MarketPriceClient>,
    symbol: String,
    config: ClientConfig,
}

impl PortfolioScanner {
    pub fn new(
        reads: Arc<dyn PositionReads>,
        feed: Arc<MarketPriceClient>,
        symbol: impl Into<String>,
        config: ClientConfig,
    ) -> Self {
        Self {
            reads,
            feed,
            symbol: symbol.into(),
            config,
        }
    }

    /// Scan with a fresh market price. Feed failures degrade to the
    /// protocol fallback price instead of aborting the pass.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn scan(&self, owner: Address) -> Result<ScanReport, ScanError> {
        let market = match self.feed.spot_price(&self.symbol).await {
            Ok(quote) => {
                let wad = quote.price_wad();
                (!wad.is_zero()).then_some(wad)
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "Market price fetch failed");
                None
            }
        };
        self.scan_with_price(owner, market).await
    }

    /// Scan against an already-known market price (wad), or none.
    pub async fn scan_with_price(
        &self,
        owner: Address,
        market_wad: Option<U256>,
    ) -> Result<ScanReport, ScanError> {
        let params = self.reads.risk_params().await?;
        let count = self.reads.urn_count(owner).await?;
        let reference = ReferencePrice::select(market_wad, &params);

        let mut states: Vec<(u64, Result<UrnState, ReadError>)> = stream::iter(0..count)
            .map(|index| {
                let reads = Arc::clone(&self.reads);
                async move { (index, reads.urn_state(owner, index).await) }
            })
            .buffer_unordered(self.config.scan.max_concurrent_reads.max(1))
            .collect()
            .await;
        states.sort_by_key(|(index, _)| *index);

        let mut positions = Vec::with_capacity(states.len());
        let mut at_risk_indices = SmallVec::new();
        for (index, state) in states {
            let state = state?;
            let snapshot = PositionSnapshot::from_state(
                owner,
                index,
                &state,
                &params,
                &reference,
                &self.config.risk,
            );
            let level = RiskLevel::classify(
                snapshot.risk.risk_percent,
                snapshot.risk.is_liquidated,
                &self.config.risk,
            );
            if !snapshot.is_closed()
                && (level >= self.config.scan.threshold || snapshot.risk.is_liquidated)
            {
                at_risk_indices.push(index);
            }
            positions.push(snapshot);
        }

        info!(
            owner = %owner,
            positions = positions.len(),
            at_risk = at_risk_indices.len(),
            price_source = ?reference.source,
            "Portfolio scan complete"
        );

        Ok(ScanReport {
            positions,
            at_risk_indices,
            threshold: self.config.scan.threshold,
            price_source: reference.source,
        })
    }
}
