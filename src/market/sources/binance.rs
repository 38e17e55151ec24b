//! Binance REST client for spot tickers
//!
//! Uses the public exchangeInfo and 24hr ticker endpoints. Prices come back
//! as JSON strings and `quoteVolume` is already in quote units.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::market::sources::{get_text, http_client, parse_decimal, ExchangeAdapter};
use crate::types::{Exchange, MarketListing, RawQuote, RawTicker, TickerBatch};

const BINANCE_REST_URL: &str = "https://api.binance.com";

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: String,
    bid_price: String,
    bid_qty: String,
    ask_price: String,
    ask_qty: String,
    quote_volume: String,
}

#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: reqwest::Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: BINANCE_REST_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub(crate) fn parse_markets(body: &str) -> Result<Vec<MarketListing>> {
        let info: ExchangeInfo =
            serde_json::from_str(body).context("Failed to parse Binance exchangeInfo response")?;

        Ok(info
            .symbols
            .into_iter()
            .map(|s| MarketListing {
                trading: s.status == "TRADING",
                symbol: s.symbol,
                base: s.base_asset,
                quote: s.quote_asset,
            })
            .collect())
    }

    pub(crate) fn parse_tickers(body: &str) -> Result<TickerBatch> {
        let rows: Vec<Ticker24h> =
            serde_json::from_str(body).context("Failed to parse Binance 24hr ticker response")?;

        let mut batch = TickerBatch::default();
        for row in rows {
            match Self::convert(&row) {
                Ok(ticker) => batch.rows.push(ticker),
                Err(e) => {
                    tracing::debug!(source = %"Binance", symbol = %row.symbol, error = %e, "Malformed ticker row");
                    batch.malformed.push(row.symbol);
                }
            }
        }
        Ok(batch)
    }

    fn convert(row: &Ticker24h) -> Result<RawTicker> {
        Ok(RawTicker {
            symbol: row.symbol.clone(),
            quote: RawQuote {
                last: parse_decimal(&row.last_price)?,
                ask: parse_decimal(&row.ask_price)?,
                bid: parse_decimal(&row.bid_price)?,
                ask_qty: parse_decimal(&row.ask_qty)?,
                bid_qty: parse_decimal(&row.bid_qty)?,
            },
            volume_24h: parse_decimal(&row.quote_volume)?,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceClient {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketListing>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = get_text(&self.client, &url, "Binance").await?;
        Self::parse_markets(&body)
    }

    async fn fetch_raw_tickers(&self) -> Result<TickerBatch> {
        let url = format!("{}/api/v3/ticker/24hr", self.base_url);
        let body = get_text(&self.client, &url, "Binance").await?;
        Self::parse_tickers(&body)
    }
}
