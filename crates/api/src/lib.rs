//! Off-chain API clients for the staking engine client.

pub mod price;

pub use price::{MarketPrice, MarketPriceClient};
