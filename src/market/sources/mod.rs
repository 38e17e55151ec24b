//! Exchange adapters (Binance, Bybit, Upbit)
//!
//! Adapters are thin data producers: they fetch an exchange's public REST
//! endpoints and hand raw rows to the engine. All conversion happens in the
//! shared core.

mod binance;
mod bybit;
mod upbit;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use upbit::UpbitClient;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::types::{Exchange, MarketListing, NetworkRecord, TickerBatch};

/// Capability interface every exchange adapter implements
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Which exchange this adapter talks to
    fn exchange(&self) -> Exchange;

    /// List every pair the exchange trades
    async fn fetch_markets(&self) -> Result<Vec<MarketListing>>;

    /// Fetch one polling cycle of prices, top of book and cumulative volume.
    ///
    /// Rows that fail to parse are reported by symbol in `malformed`, not
    /// dropped, so the feed can tell them apart from delisted symbols.
    async fn fetch_raw_tickers(&self) -> Result<TickerBatch>;

    /// Fetch per-network wallet status.
    ///
    /// Wallet endpoints are authenticated on most exchanges; adapters without
    /// credentials report nothing.
    async fn fetch_wallet_status(&self) -> Result<Vec<NetworkRecord>> {
        Ok(Vec::new())
    }
}

/// Build the HTTP client shared by an adapter's requests
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// GET `url` and return the body, failing on a non-success status
pub(crate) async fn get_text(client: &reqwest::Client, url: &str, source: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", source))?;

    if !response.status().is_success() {
        bail!("{} API returned error: {}", source, response.status());
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to read {} response body", source))
}

/// Parse a decimal sent as a JSON string; empty strings read as zero
pub(crate) fn parse_decimal(s: &str) -> Result<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .with_context(|| format!("Invalid decimal: {:?}", s))
}
