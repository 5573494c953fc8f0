//! Market price feed client.
//!
//! Fetches spot prices from an off-chain price API and keeps the latest
//! quote per symbol so the risk engine can tell a fresh market price from a
//! stale one and fall back to the protocol's delayed price when needed.

use alloy::primitives::U256;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://price-api.sky.money";

/// One market quote for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPrice {
    pub symbol: String,
    /// USD price
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

impl MarketPrice {
    /// Price scaled to 18 decimals. Non-finite or negative quotes collapse
    /// to zero, which downstream risk math treats as "no usable price".
    pub fn price_wad(&self) -> U256 {
        if !self.price.is_finite() || self.price <= 0.0 {
            return U256::ZERO;
        }
        U256::from((self.price * 1e18) as u128)
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Wire format of the price endpoint.
#[derive(Debug, Deserialize)]
struct PriceResponse {
    symbol: String,
    #[serde(alias = "usd_price")]
    price: f64,
}

/// HTTP client for the market price API, caching the latest quote per
/// symbol.
#[derive(Debug, Clone)]
pub struct MarketPriceClient {
    client: reqwest::Client,
    base_url: String,
    cache: std::sync::Arc<DashMap<String, MarketPrice>>,
}

impl MarketPriceClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: std::sync::Arc::new(DashMap::new()),
        }
    }

    /// Fetch the current spot price for `symbol` and cache it.
    #[instrument(skip(self))]
    pub async fn spot_price(&self, symbol: &str) -> Result<MarketPrice> {
        let url = format!("{}/v1/prices/{}", self.base_url, symbol);

        let response: PriceResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("price request failed")?
            .error_for_status()
            .context("price endpoint returned an error")?
            .json()
            .await
            .context("malformed price response")?;

        let quote = MarketPrice {
            symbol: response.symbol,
            price: response.price,
            fetched_at: Utc::now(),
        };
        debug!(symbol = %quote.symbol, price = quote.price, "Market price fetched");

        self.cache.insert(symbol.to_string(), quote.clone());
        Ok(quote)
    }

    /// Latest cached quote for `symbol`, if one was ever fetched.
    pub fn cached(&self, symbol: &str) -> Option<MarketPrice> {
        self.cache.get(symbol).map(|q| q.clone())
    }
}

impl Default for MarketPriceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_response_parsing() {
        let raw = r#"{"symbol":"SKY","price":0.0512}"#;
        let parsed: PriceResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.symbol, "SKY");
        assert!((parsed.price - 0.0512).abs() < 1e-12);

        let aliased = r#"{"symbol":"SKY","usd_price":0.05}"#;
        let parsed: PriceResponse = serde_json::from_str(aliased).unwrap();
        assert!((parsed.price - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_price_wad_scaling() {
        let quote = MarketPrice {
            symbol: "SKY".into(),
            price: 0.05,
            fetched_at: Utc::now(),
        };
        assert_eq!(quote.price_wad(), U256::from(50_000_000_000_000_000u128));

        let bad = MarketPrice {
            symbol: "SKY".into(),
            price: f64::NAN,
            fetched_at: Utc::now(),
        };
        assert_eq!(bad.price_wad(), U256::ZERO);
    }

    #[test]
    fn test_staleness() {
        let quote = MarketPrice {
            symbol: "SKY".into(),
            price: 1.0,
            fetched_at: Utc::now() - Duration::minutes(10),
        };
        assert!(quote.is_stale(Duration::minutes(5)));
        assert!(!quote.is_stale(Duration::hours(1)));
    }

    #[tokio::test]
    #[ignore] // Hits the live price API
    async fn test_live_spot_price() {
        let client = MarketPriceClient::new();
        let quote = client.spot_price("SKY").await.unwrap();
        assert!(quote.price > 0.0);
        assert!(client.cached("SKY").is_some());
    }
}
