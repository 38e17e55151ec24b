//! Market Feed - Polling driver for one exchange
//!
//! Owns one adapter, that exchange's ticker store and wallet book, and the
//! engine components. Each cycle fetches over the network first and only then
//! takes the store's write lock, so readers are never blocked on I/O.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::EngineError;
use crate::market::normalizer::{Normalizer, QuoteClassifier};
use crate::market::rates::RateCache;
use crate::market::sources::ExchangeAdapter;
use crate::market::tickers::{SharedTickers, Tickers};
use crate::market::volume::VolumeWindowEstimator;
use crate::market::wallet::{SharedWallets, WalletBook};
use crate::types::{Exchange, RawTicker, Ticker, TickerBatch};

/// Scheduling knobs for one feed
#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub poll_interval: Duration,
    pub wallet_poll_interval: Duration,
    pub retry_delay: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            wallet_poll_interval: Duration::from_secs(600),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of one ticker cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Tickers that took a price and volume update
    pub updated: usize,
    /// Tickers marked dead in this cycle
    pub dead: usize,
    /// Rows refused this cycle: unparseable, unclassified quote or dead symbol
    pub rejected: usize,
}

pub struct MarketFeed<A: ExchangeAdapter> {
    adapter: A,
    tickers: SharedTickers,
    wallets: SharedWallets,
    normalizer: Normalizer,
    volume: VolumeWindowEstimator,
    settings: FeedSettings,
}

impl<A: ExchangeAdapter> MarketFeed<A> {
    pub fn new(
        adapter: A,
        normalizer: Normalizer,
        volume: VolumeWindowEstimator,
        settings: FeedSettings,
    ) -> Self {
        let exchange = adapter.exchange();
        let fiat = normalizer.classifier().reference_fiat().to_string();
        Self {
            adapter,
            tickers: Tickers::new(exchange, &fiat).shared(),
            wallets: WalletBook::new().shared(),
            normalizer,
            volume,
            settings,
        }
    }

    /// Feed with default engine components around a shared rate cache
    pub fn with_rates(adapter: A, rates: Arc<RateCache>, classifier: QuoteClassifier) -> Self {
        let normalizer = Normalizer::new(rates.clone(), classifier.clone());
        let volume = VolumeWindowEstimator::new(rates, classifier);
        Self::new(adapter, normalizer, volume, FeedSettings::default())
    }

    pub fn exchange(&self) -> Exchange {
        self.adapter.exchange()
    }

    /// Handle for read-side consumers
    pub fn tickers(&self) -> SharedTickers {
        self.tickers.clone()
    }

    pub fn wallets(&self) -> SharedWallets {
        self.wallets.clone()
    }

    /// Load the exchange's listings into the store.
    ///
    /// Pairs that are not trading or whose quote cannot be converted are
    /// skipped. Returns the number of tickers inserted.
    pub async fn bootstrap(&self) -> Result<usize> {
        let listings = self
            .adapter
            .fetch_markets()
            .await
            .with_context(|| format!("Failed to load {} markets", self.exchange()))?;

        let classifier = self.normalizer.classifier();
        let mut tickers = self.tickers.write().unwrap_or_else(|e| e.into_inner());
        let mut inserted = 0;
        let mut skipped = 0;

        for listing in listings {
            if !listing.trading || classifier.classify(&listing.quote).is_none() {
                skipped += 1;
                continue;
            }
            match tickers.insert(Ticker::new(listing.symbol, &listing.base, &listing.quote)) {
                Ok(()) => inserted += 1,
                Err(EngineError::DuplicateSymbol(symbol)) => {
                    tracing::debug!(exchange = %self.exchange(), symbol = %symbol, "Duplicate listing ignored");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(
            exchange = %self.exchange(),
            inserted,
            skipped,
            "Market listings loaded"
        );
        Ok(inserted)
    }

    /// Fetch and apply one ticker cycle stamped with `now_ms`
    pub async fn poll_tickers(&self, now_ms: i64) -> Result<CycleStats> {
        let batch = self
            .adapter
            .fetch_raw_tickers()
            .await
            .with_context(|| format!("Failed to fetch {} tickers", self.exchange()))?;

        let mut tickers = self.tickers.write().unwrap_or_else(|e| e.into_inner());
        Ok(self.apply_cycle(&mut tickers, &batch, now_ms))
    }

    fn apply_cycle(&self, tickers: &mut Tickers, batch: &TickerBatch, now_ms: i64) -> CycleStats {
        let mut stats = CycleStats::default();

        // An exchange never delists everything at once; treat it as a bad response
        if batch.is_empty() {
            if !tickers.is_empty() {
                tracing::warn!(exchange = %tickers.exchange(), "Empty ticker response, cycle skipped");
            }
            return stats;
        }

        let by_symbol: HashMap<&str, &RawTicker> =
            batch.rows.iter().map(|r| (r.symbol.as_str(), r)).collect();
        let malformed: HashSet<&str> = batch.malformed.iter().map(String::as_str).collect();

        let killed = tickers
            .mark_missing(|symbol| by_symbol.contains_key(symbol) || malformed.contains(symbol));
        for symbol in &killed {
            tracing::warn!(exchange = %tickers.exchange(), symbol = %symbol, "Symbol missing from feed, marked dead");
        }
        stats.dead = killed.len();

        for symbol in &malformed {
            if tickers.get(symbol).is_some() {
                stats.rejected += 1;
                tracing::debug!(exchange = %tickers.exchange(), symbol = %symbol, "Malformed row, ticker left unchanged");
            }
        }

        // USD-like bases refresh USD/fiat before BTC pairs derive from it, and
        // both run before BTC-quoted rows convert with this cycle's rate.
        let mut order: Vec<&RawTicker> = batch.rows.iter().collect();
        order.sort_by_key(|r| tickers.get(&r.symbol).map(|t| benchmark_rank(&t.base_name)).unwrap_or(2));

        for row in order {
            let ticker = match tickers.resolve(&row.symbol) {
                Ok(ticker) => ticker,
                Err(EngineError::UnknownSymbol(_)) => continue,
                Err(_) => {
                    stats.rejected += 1;
                    continue;
                }
            };

            let applied = self
                .normalizer
                .apply_price(ticker, &row.quote)
                .and_then(|_| self.volume.apply_volume(ticker, row.volume_24h, now_ms));

            match applied {
                Ok(()) => stats.updated += 1,
                Err(e) => {
                    stats.rejected += 1;
                    tracing::debug!(symbol = %row.symbol, error = %e, "Ticker row rejected");
                }
            }
        }

        stats
    }

    /// Fetch and apply wallet status. Returns the number of assets updated.
    pub async fn poll_wallets(&self) -> Result<usize> {
        let records = self
            .adapter
            .fetch_wallet_status()
            .await
            .with_context(|| format!("Failed to fetch {} wallet status", self.exchange()))?;

        if records.is_empty() {
            return Ok(0);
        }

        let mut tickers = self.tickers.write().unwrap_or_else(|e| e.into_inner());
        let mut wallets = self.wallets.write().unwrap_or_else(|e| e.into_inner());
        Ok(wallets.apply_wallet_status(&mut tickers, &records))
    }

    /// Poll until `shutdown` flips to true.
    ///
    /// Bootstrap is retried until it succeeds; cycle failures are logged and
    /// the next tick proceeds as normal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let exchange = self.exchange();

        loop {
            match self.bootstrap().await {
                Ok(_) => break,
                Err(e) => {
                    tracing::warn!(exchange = %exchange, error = %e, "Bootstrap failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.retry_delay) => {}
                        _ = shutdown.changed() => return Ok(()),
                    }
                }
            }
        }

        let mut ticker_interval = tokio::time::interval(self.settings.poll_interval);
        let mut wallet_interval = tokio::time::interval(self.settings.wallet_poll_interval);
        ticker_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        wallet_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker_interval.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    match self.poll_tickers(now_ms).await {
                        Ok(stats) => {
                            tracing::debug!(
                                exchange = %exchange,
                                updated = stats.updated,
                                dead = stats.dead,
                                rejected = stats.rejected,
                                "Ticker cycle complete"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(exchange = %exchange, error = %e, "Ticker cycle failed");
                        }
                    }
                }
                _ = wallet_interval.tick() => {
                    if let Err(e) = self.poll_wallets().await {
                        tracing::warn!(exchange = %exchange, error = %e, "Wallet cycle failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(exchange = %exchange, "Feed stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Apply order within a cycle: USD-like bases, then BTC, then the rest
fn benchmark_rank(base: &str) -> u8 {
    if crate::market::normalizer::USD_LIKE_QUOTES.contains(&base) {
        0
    } else if base == "BTC" {
        1
    } else {
        2
    }
}
