//! Upbit REST client for KRW, BTC and USDT markets
//!
//! Market codes are quote-first (`KRW-BTC`). The ticker endpoint carries no
//! book, so each cycle also reads the top level of `/v1/orderbook`.
//! Numbers arrive as JSON numbers, not strings.
//!
//! Ticker queries name their markets explicitly and Upbit rejects the whole
//! request when one code has been delisted, so a failed query reloads the
//! market list once and retries.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use crate::market::sources::{get_text, http_client, parse_decimal, ExchangeAdapter};
use crate::types::{Exchange, MarketListing, RawQuote, RawTicker, TickerBatch};

const UPBIT_REST_URL: &str = "https://api.upbit.com";

/// Markets per ticker/orderbook request
const MARKETS_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
struct UpbitMarket {
    market: String,
}

#[derive(Debug, Deserialize)]
struct UpbitTicker {
    market: String,
    trade_price: serde_json::Number,
    /// 24h traded value, in quote units
    acc_trade_price_24h: serde_json::Number,
}

#[derive(Debug, Deserialize)]
struct UpbitOrderbook {
    market: String,
    orderbook_units: Vec<OrderbookUnit>,
}

#[derive(Debug, Deserialize)]
struct OrderbookUnit {
    ask_price: serde_json::Number,
    bid_price: serde_json::Number,
    ask_size: serde_json::Number,
    bid_size: serde_json::Number,
}

#[derive(Debug)]
pub struct UpbitClient {
    client: reqwest::Client,
    base_url: String,
    /// Market codes from the last market list load, used to build ticker queries
    markets: RwLock<Vec<String>>,
}

impl UpbitClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: UPBIT_REST_URL.to_string(),
            markets: RwLock::new(Vec::new()),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Split `KRW-BTC` into (base, quote)
    pub(crate) fn split_market(market: &str) -> Option<(String, String)> {
        let (quote, base) = market.split_once('-')?;
        if quote.is_empty() || base.is_empty() {
            return None;
        }
        Some((base.to_string(), quote.to_string()))
    }

    pub(crate) fn parse_markets(body: &str) -> Result<Vec<MarketListing>> {
        let markets: Vec<UpbitMarket> =
            serde_json::from_str(body).context("Failed to parse Upbit market/all response")?;

        Ok(markets
            .into_iter()
            .filter_map(|m| {
                let (base, quote) = Self::split_market(&m.market)?;
                // market/all only lists open markets; warning flags still trade
                Some(MarketListing {
                    trading: true,
                    symbol: m.market,
                    base,
                    quote,
                })
            })
            .collect())
    }

    /// Join ticker and orderbook responses on market code
    pub(crate) fn parse_tickers(ticker_body: &str, book_body: &str) -> Result<TickerBatch> {
        let rows: Vec<UpbitTicker> =
            serde_json::from_str(ticker_body).context("Failed to parse Upbit ticker response")?;
        let books: Vec<UpbitOrderbook> =
            serde_json::from_str(book_body).context("Failed to parse Upbit orderbook response")?;

        let tops: HashMap<String, &OrderbookUnit> = books
            .iter()
            .filter_map(|b| b.orderbook_units.first().map(|u| (b.market.clone(), u)))
            .collect();

        let mut batch = TickerBatch::default();
        for row in &rows {
            match Self::convert(row, tops.get(&row.market).copied()) {
                Ok(ticker) => batch.rows.push(ticker),
                Err(e) => {
                    tracing::debug!(source = %"Upbit", symbol = %row.market, error = %e, "Malformed ticker row");
                    batch.malformed.push(row.market.clone());
                }
            }
        }
        Ok(batch)
    }

    fn convert(row: &UpbitTicker, top: Option<&OrderbookUnit>) -> Result<RawTicker> {
        let mut quote = RawQuote {
            last: number(&row.trade_price)?,
            ..RawQuote::default()
        };
        if let Some(unit) = top {
            quote.ask = number(&unit.ask_price)?;
            quote.bid = number(&unit.bid_price)?;
            quote.ask_qty = number(&unit.ask_size)?;
            quote.bid_qty = number(&unit.bid_size)?;
        }

        Ok(RawTicker {
            symbol: row.market.clone(),
            quote,
            volume_24h: number(&row.acc_trade_price_24h)?,
        })
    }

    fn market_codes(&self) -> Vec<String> {
        self.markets.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn load_markets(&self) -> Result<Vec<MarketListing>> {
        let url = format!("{}/v1/market/all", self.base_url);
        let body = get_text(&self.client, &url, "Upbit").await?;
        let listings = Self::parse_markets(&body)?;

        let codes = listings.iter().map(|l| l.symbol.clone()).collect();
        *self.markets.write().unwrap_or_else(|e| e.into_inner()) = codes;

        Ok(listings)
    }

    async fn fetch_chunk(&self, markets: &[String]) -> Result<TickerBatch> {
        let joined = markets.join(",");
        let ticker_url = format!("{}/v1/ticker?markets={}", self.base_url, joined);
        let book_url = format!("{}/v1/orderbook?markets={}", self.base_url, joined);

        let (ticker_body, book_body) = tokio::try_join!(
            get_text(&self.client, &ticker_url, "Upbit"),
            get_text(&self.client, &book_url, "Upbit"),
        )?;
        Self::parse_tickers(&ticker_body, &book_body)
    }

    async fn fetch_all(&self, markets: &[String]) -> Result<TickerBatch> {
        let mut batch = TickerBatch::default();
        for chunk in markets.chunks(MARKETS_PER_REQUEST) {
            batch.extend(self.fetch_chunk(chunk).await?);
        }
        Ok(batch)
    }
}

fn number(n: &serde_json::Number) -> Result<Decimal> {
    parse_decimal(&n.to_string())
}

#[async_trait]
impl ExchangeAdapter for UpbitClient {
    fn exchange(&self) -> Exchange {
        Exchange::Upbit
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketListing>> {
        self.load_markets().await
    }

    async fn fetch_raw_tickers(&self) -> Result<TickerBatch> {
        let markets = self.market_codes();
        if markets.is_empty() {
            bail!("No Upbit markets loaded; fetch_markets must run first");
        }

        match self.fetch_all(&markets).await {
            Ok(batch) => Ok(batch),
            Err(e) => {
                tracing::warn!(source = %"Upbit", error = %e, "Ticker query failed, reloading market list");
                let listings = self.load_markets().await?;
                tracing::info!(source = %"Upbit", before = markets.len(), after = listings.len(), "Market list reloaded");
                self.fetch_all(&self.market_codes()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serve canned JSON on a local port; `route` maps a request path to (status, body)
    fn serve<F>(route: F) -> String
    where
        F: Fn(&str) -> (u16, String) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header == "\r\n" => break,
                        Ok(_) => {}
                    }
                }

                let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
                let (status, body) = route(&path);
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        format!("http://{}", addr)
    }

    fn local_client(base_url: &str) -> UpbitClient {
        let mut client = UpbitClient::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url);
        client.client = reqwest::Client::builder().no_proxy().build().unwrap();
        client
    }

    #[test]
    fn test_split_market() {
        assert_eq!(
            UpbitClient::split_market("KRW-BTC"),
            Some(("BTC".to_string(), "KRW".to_string()))
        );
        assert_eq!(UpbitClient::split_market("KRWBTC"), None);
        assert_eq!(UpbitClient::split_market("KRW-"), None);
    }

    #[test]
    fn test_parse_markets() {
        let body = serde_json::json!([
            {"market": "KRW-BTC", "korean_name": "비트코인", "english_name": "Bitcoin", "market_warning": "NONE"},
            {"market": "BTC-ETH", "korean_name": "이더리움", "english_name": "Ethereum", "market_warning": "CAUTION"},
            {"market": "broken", "korean_name": "", "english_name": ""}
        ])
        .to_string();

        let markets = UpbitClient::parse_markets(&body).unwrap();
        assert_eq!(markets.len(), 2);
        assert_eq!(markets[0].base, "BTC");
        assert_eq!(markets[0].quote, "KRW");
        assert_eq!(markets[1].quote, "BTC");
        // Investment warnings do not stop trading
        assert!(markets.iter().all(|m| m.trading));
    }

    #[test]
    fn test_parse_tickers_joins_orderbook() {
        let tickers = serde_json::json!([
            {"market": "KRW-BTC", "trade_price": 65000000.0, "acc_trade_price_24h": 123456789012.5, "timestamp": 1700000000000i64},
            {"market": "KRW-ETH", "trade_price": 3200000, "acc_trade_price_24h": 5000000000i64, "timestamp": 1700000000001i64}
        ])
        .to_string();
        let books = serde_json::json!([
            {
                "market": "KRW-BTC",
                "timestamp": 1700000000000i64,
                "orderbook_units": [
                    {"ask_price": 65010000.0, "bid_price": 64990000.0, "ask_size": 0.5, "bid_size": 1.25},
                    {"ask_price": 65020000.0, "bid_price": 64980000.0, "ask_size": 2.0, "bid_size": 3.0}
                ]
            }
        ])
        .to_string();

        let batch = UpbitClient::parse_tickers(&tickers, &books).unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert!(batch.malformed.is_empty());

        let btc = &batch.rows[0];
        assert_eq!(btc.quote.last, dec!(65000000));
        assert_eq!(btc.quote.ask, dec!(65010000));
        assert_eq!(btc.quote.bid_qty, dec!(1.25));
        assert_eq!(btc.volume_24h, dec!(123456789012.5));

        // No book for ETH: last price only
        let eth = &batch.rows[1];
        assert_eq!(eth.quote.last, dec!(3200000));
        assert_eq!(eth.quote.ask, Decimal::ZERO);
        assert_eq!(eth.volume_24h, dec!(5000000000));
    }

    #[tokio::test]
    async fn test_delisted_code_reloads_market_list() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();

        let base_url = serve(move |path| {
            if path.starts_with("/v1/market/all") {
                let body = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    r#"[{"market":"KRW-BTC"},{"market":"KRW-LUNA"}]"#
                } else {
                    r#"[{"market":"KRW-BTC"}]"#
                };
                return (200, body.to_string());
            }
            if path.contains("KRW-LUNA") {
                return (404, r#"{"error":{"name":404,"message":"Code not found"}}"#.to_string());
            }
            if path.starts_with("/v1/ticker") {
                (200, r#"[{"market":"KRW-BTC","trade_price":65000000,"acc_trade_price_24h":1000.5}]"#.to_string())
            } else {
                (200, r#"[{"market":"KRW-BTC","orderbook_units":[{"ask_price":65010000,"bid_price":64990000,"ask_size":0.5,"bid_size":1.0}]}]"#.to_string())
            }
        });

        let client = local_client(&base_url);
        assert_eq!(client.fetch_markets().await.unwrap().len(), 2);

        let batch = client.fetch_raw_tickers().await.unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].symbol, "KRW-BTC");
        assert_eq!(batch.rows[0].quote.ask, dec!(65010000));
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert_eq!(client.market_codes(), vec!["KRW-BTC".to_string()]);
    }
}
