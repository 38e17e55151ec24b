//! Configuration management for xtickers
//!
//! Loads from optional config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use std::time::Duration;

use crate::market::feed::FeedSettings;
use crate::market::normalizer::QuotePolicy;
use crate::types::Exchange;

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (XTICKERS_*)
            .add_source(
                Environment::with_prefix("XTICKERS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("exchanges.benchmark_exchanges")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Defaults only, no files or environment
    pub fn defaults() -> Result<Self> {
        let config = Self::builder()?
            .build()
            .context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            // Engine defaults
            .set_default("engine.reference_fiat", "KRW")?
            .set_default("engine.usd_fiat_rate", "0")?
            .set_default("engine.volume_24h_base", "100000000")?
            .set_default("engine.volume_1m_base", "1000000")?
            .set_default("engine.volume_window_ms", 60_000)?
            .set_default("engine.negative_volume", "clamp")?
            .set_default("engine.strict_quotes", true)?
            // Exchange defaults
            .set_default("exchanges.binance_enabled", true)?
            .set_default("exchanges.bybit_enabled", true)?
            .set_default("exchanges.upbit_enabled", true)?
            .set_default("exchanges.poll_interval_ms", 5_000)?
            .set_default("exchanges.wallet_poll_interval_secs", 600)?
            .set_default("exchanges.http_timeout_ms", 10_000)?
            .set_default("exchanges.retry_delay_ms", 5_000)?
            .set_default(
                "exchanges.benchmark_exchanges",
                vec!["binance", "bybit", "upbit"],
            )?
            // Logging defaults
            .set_default("logging.json", false)?
            .set_default("logging.summary_interval_secs", 60)?)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.reference_fiat.trim().is_empty() {
            bail!("engine.reference_fiat must not be empty");
        }
        if self.engine.volume_24h_base <= Decimal::ZERO {
            bail!("engine.volume_24h_base must be positive");
        }
        if self.engine.volume_1m_base <= Decimal::ZERO {
            bail!("engine.volume_1m_base must be positive");
        }
        if self.engine.usd_fiat_rate < Decimal::ZERO {
            bail!("engine.usd_fiat_rate must not be negative");
        }
        if self.engine.volume_window_ms <= 0 {
            bail!("engine.volume_window_ms must be positive");
        }
        if self.exchanges.poll_interval_ms == 0 {
            bail!("exchanges.poll_interval_ms must be positive");
        }
        if self.exchanges.wallet_poll_interval_secs == 0 {
            bail!("exchanges.wallet_poll_interval_secs must be positive");
        }
        for name in &self.exchanges.benchmark_exchanges {
            if Exchange::from_str(name).is_none() {
                bail!("Unknown exchange in exchanges.benchmark_exchanges: {}", name);
            }
        }
        if self.enabled_exchanges().is_empty() {
            bail!("At least one exchange must be enabled");
        }
        Ok(())
    }

    pub fn quote_policy(&self) -> QuotePolicy {
        if self.engine.strict_quotes {
            QuotePolicy::Strict
        } else {
            QuotePolicy::Lenient
        }
    }

    pub fn enabled_exchanges(&self) -> Vec<Exchange> {
        Exchange::ALL
            .into_iter()
            .filter(|e| match e {
                Exchange::Binance => self.exchanges.binance_enabled,
                Exchange::Bybit => self.exchanges.bybit_enabled,
                Exchange::Upbit => self.exchanges.upbit_enabled,
            })
            .collect()
    }

    pub fn harvests_benchmarks(&self, exchange: Exchange) -> bool {
        self.exchanges
            .benchmark_exchanges
            .iter()
            .any(|name| Exchange::from_str(name) == Some(exchange))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.exchanges.http_timeout_ms)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            poll_interval: Duration::from_millis(self.exchanges.poll_interval_ms),
            wallet_poll_interval: Duration::from_secs(self.exchanges.wallet_poll_interval_secs),
            retry_delay: Duration::from_millis(self.exchanges.retry_delay_ms),
        }
    }

    /// One-line summary for logging
    pub fn digest(&self) -> String {
        format!(
            "fiat={} exchanges={:?} poll_ms={} v24_base={} v1m_base={} negative_volume={:?} strict_quotes={}",
            self.engine.reference_fiat,
            self.enabled_exchanges(),
            self.exchanges.poll_interval_ms,
            self.engine.volume_24h_base,
            self.engine.volume_1m_base,
            self.engine.negative_volume,
            self.engine.strict_quotes
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
