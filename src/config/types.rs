//! Configuration types

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::market::volume::NegativeVolumePolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub exchanges: ExchangesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Currency every normalized price is expressed in
    pub reference_fiat: String,
    /// Seed for the USD-like/fiat rate (0 = wait for a feed to publish one)
    pub usd_fiat_rate: Decimal,
    /// Divisor turning fiat 24h volume into display units
    pub volume_24h_base: Decimal,
    /// Divisor turning fiat 1m volume into display units
    pub volume_1m_base: Decimal,
    /// Minimum spacing between 1m volume samples in milliseconds
    pub volume_window_ms: i64,
    /// "clamp" or "passthrough"
    pub negative_volume: NegativeVolumePolicy,
    /// Reject quotes that are neither USD-like, BTC nor the reference fiat
    pub strict_quotes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangesConfig {
    pub binance_enabled: bool,
    pub bybit_enabled: bool,
    pub upbit_enabled: bool,
    /// Ticker polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Wallet status polling interval in seconds
    pub wallet_poll_interval_secs: u64,
    /// HTTP request timeout in milliseconds
    pub http_timeout_ms: u64,
    /// Delay before retrying a failed bootstrap in milliseconds
    pub retry_delay_ms: u64,
    /// Exchanges allowed to publish benchmark rates
    pub benchmark_exchanges: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
    /// Interval between summary log lines in seconds
    pub summary_interval_secs: u64,
}
