//! Bybit REST client for spot tickers
//!
//! V5 public market endpoints. Every response is wrapped in a
//! `{retCode, retMsg, result}` envelope; a non-zero `retCode` is an error
//! even on HTTP 200.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::market::sources::{get_text, http_client, parse_decimal, ExchangeAdapter};
use crate::types::{Exchange, MarketListing, RawQuote, RawTicker, TickerBatch};

const BYBIT_REST_URL: &str = "https://api.bybit.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    ret_msg: String,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Instrument {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    symbol: String,
    last_price: String,
    bid1_price: String,
    bid1_size: String,
    ask1_price: String,
    ask1_size: String,
    /// 24h turnover, in quote units
    turnover24h: String,
}

#[derive(Debug, Clone)]
pub struct BybitClient {
    client: reqwest::Client,
    base_url: String,
}

impl BybitClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: BYBIT_REST_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn unwrap_envelope<T: DeserializeOwned>(body: &str, what: &str) -> Result<Vec<T>> {
        let envelope: Envelope<ListResult<T>> = serde_json::from_str(body)
            .with_context(|| format!("Failed to parse Bybit {} response", what))?;

        if envelope.ret_code != 0 {
            bail!(
                "Bybit {} returned retCode {}: {}",
                what,
                envelope.ret_code,
                envelope.ret_msg
            );
        }

        Ok(envelope.result.map(|r| r.list).unwrap_or_default())
    }

    pub(crate) fn parse_markets(body: &str) -> Result<Vec<MarketListing>> {
        let instruments = Self::unwrap_envelope::<Instrument>(body, "instruments-info")?;
        Ok(instruments
            .into_iter()
            .map(|i| MarketListing {
                trading: i.status == "Trading",
                symbol: i.symbol,
                base: i.base_coin,
                quote: i.quote_coin,
            })
            .collect())
    }

    pub(crate) fn parse_tickers(body: &str) -> Result<TickerBatch> {
        let rows = Self::unwrap_envelope::<BybitTicker>(body, "tickers")?;

        let mut batch = TickerBatch::default();
        for row in rows {
            match Self::convert(&row) {
                Ok(ticker) => batch.rows.push(ticker),
                Err(e) => {
                    tracing::debug!(source = %"Bybit", symbol = %row.symbol, error = %e, "Malformed ticker row");
                    batch.malformed.push(row.symbol);
                }
            }
        }
        Ok(batch)
    }

    fn convert(row: &BybitTicker) -> Result<RawTicker> {
        Ok(RawTicker {
            symbol: row.symbol.clone(),
            quote: RawQuote {
                last: parse_decimal(&row.last_price)?,
                ask: parse_decimal(&row.ask1_price)?,
                bid: parse_decimal(&row.bid1_price)?,
                ask_qty: parse_decimal(&row.ask1_size)?,
                bid_qty: parse_decimal(&row.bid1_size)?,
            },
            volume_24h: parse_decimal(&row.turnover24h)?,
        })
    }
}

#[async_trait]
impl ExchangeAdapter for BybitClient {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketListing>> {
        let url = format!("{}/v5/market/instruments-info?category=spot", self.base_url);
        let body = get_text(&self.client, &url, "Bybit").await?;
        Self::parse_markets(&body)
    }

    async fn fetch_raw_tickers(&self) -> Result<TickerBatch> {
        let url = format!("{}/v5/market/tickers?category=spot", self.base_url);
        let body = get_text(&self.client, &url, "Bybit").await?;
        Self::parse_tickers(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_markets() {
        let body = serde_json::json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "spot",
                "list": [
                    {"symbol": "BTCUSDT", "baseCoin": "BTC", "quoteCoin": "USDT", "status": "Trading"},
                    {"symbol": "ETHBTC", "baseCoin": "ETH", "quoteCoin": "BTC", "status": "Trading"}
                ]
            },
            "time": 1700000000000i64
        })
        .to_string();

        let markets = BybitClient::parse_markets(&body).unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[1].quote, "BTC");
        assert!(markets.iter().all(|m| m.trading));
    }

    #[test]
    fn test_parse_tickers() {
        let body = serde_json::json!({
            "retCode": 0,
            "retMsg": "OK",
            "result": {
                "category": "spot",
                "list": [{
                    "symbol": "ETHBTC",
                    "lastPrice": "0.0521",
                    "bid1Price": "0.0520",
                    "bid1Size": "3.1",
                    "ask1Price": "0.0522",
                    "ask1Size": "2.4",
                    "turnover24h": "45.67"
                }, {
                    "symbol": "XRPBTC",
                    "lastPrice": "--",
                    "bid1Price": "",
                    "bid1Size": "",
                    "ask1Price": "",
                    "ask1Size": "",
                    "turnover24h": "0"
                }]
            },
            "time": 1700000001234i64
        })
        .to_string();

        let batch = BybitClient::parse_tickers(&body).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].quote.last, dec!(0.0521));
        assert_eq!(batch.rows[0].quote.bid_qty, dec!(3.1));
        assert_eq!(batch.rows[0].volume_24h, dec!(45.67));
        assert_eq!(batch.malformed, vec!["XRPBTC".to_string()]);
    }

    #[test]
    fn test_null_result_is_empty_batch() {
        let body = serde_json::json!({"retCode": 0, "retMsg": "OK", "result": null}).to_string();
        assert!(BybitClient::parse_tickers(&body).unwrap().is_empty());
    }

    #[test]
    fn test_non_zero_ret_code_is_error() {
        let body = serde_json::json!({
            "retCode": 10001,
            "retMsg": "params error",
            "result": null
        })
        .to_string();

        let err = BybitClient::parse_tickers(&body).unwrap_err();
        assert!(err.to_string().contains("10001"));
    }
}
