//! Volume Window Estimator - Rolling 1m volume from cumulative 24h counters
//!
//! Exchanges only report a cumulative 24h traded volume. Sampling that counter
//! at least a minute apart and differencing consecutive samples gives an
//! estimate of what traded in the last minute.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::market::normalizer::QuoteClassifier;
use crate::market::rates::RateCache;
use crate::types::Ticker;

/// Minimum spacing between accepted 1m samples
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// Handling of a negative delta, seen when an exchange's 24h counter restarts
/// at a day boundary instead of trailing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeVolumePolicy {
    /// Report zero for the window
    #[default]
    Clamp,
    /// Report the negative estimate as computed
    Passthrough,
}

pub struct VolumeWindowEstimator {
    rates: Arc<RateCache>,
    classifier: QuoteClassifier,
    window_ms: i64,
    negative: NegativeVolumePolicy,
}

impl VolumeWindowEstimator {
    pub fn new(rates: Arc<RateCache>, classifier: QuoteClassifier) -> Self {
        Self {
            rates,
            classifier,
            window_ms: DEFAULT_WINDOW_MS,
            negative: NegativeVolumePolicy::default(),
        }
    }

    pub fn with_window_ms(mut self, window_ms: i64) -> Self {
        self.window_ms = window_ms;
        self
    }

    pub fn with_negative_policy(mut self, negative: NegativeVolumePolicy) -> Self {
        self.negative = negative;
        self
    }

    /// Fold one cumulative 24h volume sample (in quote units) into `ticker`.
    ///
    /// `volume_24h` is refreshed on every call. `volume_1m`, `timestamp` and
    /// `previous_24h` only move when more than one window has passed since
    /// the last accepted sample, and the first sample always yields zero.
    pub fn apply_volume(&self, ticker: &mut Ticker, raw_cumulative_24h: Decimal, now_ms: i64) -> EngineResult<()> {
        if ticker.is_dead() {
            return Err(EngineError::SymbolDead(ticker.symbol.clone()));
        }
        let kind = self.classifier.classify_ticker(ticker)?;
        let rates = self.rates.snapshot();

        let converted = self.rates.get_fiat_amount(raw_cumulative_24h, kind);
        ticker.volume_24h = (converted / rates.volume_24h_base).floor();

        if now_ms <= ticker.timestamp + self.window_ms {
            return Ok(());
        }

        let delta = if ticker.previous_24h > Decimal::ZERO {
            converted - ticker.previous_24h
        } else {
            Decimal::ZERO
        };

        let mut volume_1m = (delta / rates.volume_1m_base).floor();
        if volume_1m < Decimal::ZERO {
            tracing::debug!(
                symbol = %ticker.symbol,
                previous = %ticker.previous_24h,
                current = %converted,
                "24h volume counter went backwards"
            );
            if self.negative == NegativeVolumePolicy::Clamp {
                volume_1m = Decimal::ZERO;
            }
        }

        ticker.volume_1m = volume_1m;
        ticker.timestamp = now_ms;
        ticker.previous_24h = converted;

        Ok(())
    }
}
