//! xtickers - cross-exchange ticker aggregator
//!
//! Polls every enabled exchange, normalizes prices and volumes into the
//! reference fiat and logs a periodic summary until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use xtickers::config::AppConfig;
use xtickers::market::sources::{BinanceClient, BybitClient, ExchangeAdapter, UpbitClient};
use xtickers::market::{
    MarketFeed, Normalizer, QuoteClassifier, RateCache, SharedTickers, VolumeWindowEstimator,
};
use xtickers::types::Exchange;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(config.logging.json);

    tracing::info!(config = %config.digest(), "Starting xtickers");

    let rates = Arc::new(
        RateCache::new(config.engine.volume_24h_base, config.engine.volume_1m_base)
            .context("Invalid volume bases")?,
    );
    if rates.set_usd_fiat_rate(config.engine.usd_fiat_rate) {
        tracing::info!(rate = %config.engine.usd_fiat_rate, "USD/fiat rate seeded from config");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles: Vec<JoinHandle<Result<()>>> = Vec::new();
    let mut stores: Vec<(Exchange, SharedTickers)> = Vec::new();

    for exchange in config.enabled_exchanges() {
        let timeout = config.http_timeout();
        let (handle, store) = match exchange {
            Exchange::Binance => spawn_feed(BinanceClient::new(timeout)?, &config, &rates, &shutdown_rx),
            Exchange::Bybit => spawn_feed(BybitClient::new(timeout)?, &config, &rates, &shutdown_rx),
            Exchange::Upbit => spawn_feed(UpbitClient::new(timeout)?, &config, &rates, &shutdown_rx),
        };
        handles.push(handle);
        stores.push((exchange, store));
    }

    let summary_every = Duration::from_secs(config.logging.summary_interval_secs.max(1));
    let mut summary = tokio::time::interval(summary_every);
    summary.tick().await;

    loop {
        tokio::select! {
            _ = summary.tick() => log_summary(&rates, &stores),
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Shutdown requested");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    for result in futures_util::future::join_all(handles).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Feed exited with error"),
            Err(e) => tracing::error!(error = %e, "Feed task panicked"),
        }
    }

    log_summary(&rates, &stores);
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn spawn_feed<A>(
    adapter: A,
    config: &AppConfig,
    rates: &Arc<RateCache>,
    shutdown: &watch::Receiver<bool>,
) -> (JoinHandle<Result<()>>, SharedTickers)
where
    A: ExchangeAdapter + 'static,
{
    let exchange = adapter.exchange();
    let classifier = QuoteClassifier::new(&config.engine.reference_fiat, config.quote_policy());

    let normalizer = Normalizer::new(rates.clone(), classifier.clone())
        .with_harvest(config.harvests_benchmarks(exchange));
    let volume = VolumeWindowEstimator::new(rates.clone(), classifier)
        .with_window_ms(config.engine.volume_window_ms)
        .with_negative_policy(config.engine.negative_volume);

    let feed = MarketFeed::new(adapter, normalizer, volume, config.feed_settings());
    let store = feed.tickers();

    tracing::info!(exchange = %exchange, "Feed started");
    (tokio::spawn(feed.run(shutdown.clone())), store)
}

fn log_summary(rates: &RateCache, stores: &[(Exchange, SharedTickers)]) {
    let snap = rates.snapshot();
    tracing::info!(
        usd_fiat = %snap.usd_fiat_rate,
        btc_fiat = %snap.btc_fiat_rate,
        btc_usd = %snap.btc_usd_price,
        "Rates"
    );

    for (exchange, store) in stores {
        let tickers = store.read().unwrap_or_else(|e| e.into_inner());
        let priced = tickers.iter_live().filter(|t| t.has_price()).count();
        let top = tickers
            .iter_live()
            .max_by_key(|t| t.volume_1m)
            .filter(|t| !t.volume_1m.is_zero());

        tracing::info!(
            exchange = %exchange,
            total = tickers.len(),
            live = tickers.live_count(),
            dead = tickers.dead_count(),
            priced,
            volume_24h = %tickers.total_volume_24h(),
            top_1m = %top.map(|t| t.symbol.as_str()).unwrap_or("-"),
            "Tickers"
        );
    }
}
