//! Market module - Cross-exchange normalization engine
//!
//! Collects tickers from Binance, Bybit and Upbit and expresses every price
//! and volume in one reference fiat, with shared cross rates bootstrapped
//! from the exchanges' own BTC benchmark pairs.

pub mod feed;
pub mod normalizer;
pub mod rates;
pub mod sources;
pub mod tickers;
pub mod volume;
pub mod wallet;

pub use feed::{CycleStats, FeedSettings, MarketFeed};
pub use normalizer::{Normalizer, QuoteClassifier, QuotePolicy};
pub use rates::{RateCache, Rates};
pub use tickers::{SharedTickers, Tickers};
pub use volume::{NegativeVolumePolicy, VolumeWindowEstimator};
pub use wallet::{apply_network_status, SharedWallets, WalletBook};
