//! Rate Cache - Shared cross rates between adapters
//!
//! Holds the USD-like/fiat rate, the BTC/fiat rate and the BTC/USD price,
//! plus the two divisors that compress raw volumes into display units.
//! Whichever feed observes a benchmark pair writes here; every feed reads.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{EngineError, EngineResult};
use crate::types::QuoteKind;

/// Point-in-time copy of every cached value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rates {
    pub usd_fiat_rate: Decimal,
    pub btc_fiat_rate: Decimal,
    pub btc_usd_price: Decimal,
    pub volume_24h_base: Decimal,
    pub volume_1m_base: Decimal,
}

impl Rates {
    fn rate_for(&self, kind: QuoteKind) -> Decimal {
        match kind {
            QuoteKind::UsdLike => self.usd_fiat_rate,
            QuoteKind::BtcLike => self.btc_fiat_rate,
            QuoteKind::FiatNative => Decimal::ONE,
        }
    }
}

/// Process-wide rate cache, one per reference fiat
///
/// A single lock guards all fields so a reader never sees a half-applied
/// benchmark (e.g. a new BTC/USD price with the old BTC/fiat rate).
#[derive(Debug)]
pub struct RateCache {
    inner: RwLock<Rates>,
}

impl RateCache {
    pub fn new(volume_24h_base: Decimal, volume_1m_base: Decimal) -> EngineResult<Self> {
        check_base(volume_24h_base)?;
        check_base(volume_1m_base)?;
        Ok(Self {
            inner: RwLock::new(Rates {
                usd_fiat_rate: Decimal::ZERO,
                btc_fiat_rate: Decimal::ZERO,
                btc_usd_price: Decimal::ZERO,
                volume_24h_base,
                volume_1m_base,
            }),
        })
    }

    // Rates are plain values; a writer that panicked cannot leave them torn.
    fn read(&self) -> RwLockReadGuard<'_, Rates> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Rates> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the USD-like to reference-fiat rate. Non-positive rates are ignored.
    pub fn set_usd_fiat_rate(&self, rate: Decimal) -> bool {
        if rate <= Decimal::ZERO {
            tracing::debug!(rate = %rate, "Ignoring non-positive USD/fiat rate");
            return false;
        }
        self.write().usd_fiat_rate = rate;
        true
    }

    /// Record a BTC benchmark observation.
    ///
    /// `kind` is the quote kind of the benchmark pair: a USD-like quote sets
    /// the BTC/USD price and derives BTC/fiat through the USD/fiat rate, a
    /// fiat-native quote sets BTC/fiat directly. Last write wins.
    pub fn set_btc_benchmark_price(&self, price: Decimal, kind: QuoteKind) -> bool {
        if price <= Decimal::ZERO {
            return false;
        }

        let mut rates = self.write();
        match kind {
            QuoteKind::UsdLike => {
                rates.btc_usd_price = price;
                if rates.usd_fiat_rate > Decimal::ZERO {
                    rates.btc_fiat_rate = price * rates.usd_fiat_rate;
                }
            }
            QuoteKind::FiatNative => {
                rates.btc_fiat_rate = price;
                if rates.usd_fiat_rate > Decimal::ZERO {
                    rates.btc_usd_price = price / rates.usd_fiat_rate;
                }
            }
            QuoteKind::BtcLike => return false,
        }
        true
    }

    /// Convert a raw amount to reference fiat.
    ///
    /// Returns zero while the needed rate is unset; callers treat zero as
    /// "rate not yet available", not as a real price.
    pub fn get_fiat_amount(&self, raw: Decimal, kind: QuoteKind) -> Decimal {
        raw * self.read().rate_for(kind)
    }

    /// Like [`get_fiat_amount`](Self::get_fiat_amount) but reports a missing rate
    pub fn try_fiat_amount(&self, raw: Decimal, kind: QuoteKind) -> EngineResult<Decimal> {
        let rate = self.read().rate_for(kind);
        if rate.is_zero() {
            return Err(EngineError::RateUnavailable(kind));
        }
        Ok(raw * rate)
    }

    /// Check whether amounts of this quote kind can be converted yet
    pub fn is_ready(&self, kind: QuoteKind) -> bool {
        !self.read().rate_for(kind).is_zero()
    }

    pub fn set_volume_bases(&self, volume_24h_base: Decimal, volume_1m_base: Decimal) -> EngineResult<()> {
        check_base(volume_24h_base)?;
        check_base(volume_1m_base)?;
        let mut rates = self.write();
        rates.volume_24h_base = volume_24h_base;
        rates.volume_1m_base = volume_1m_base;
        Ok(())
    }

    pub fn snapshot(&self) -> Rates {
        *self.read()
    }
}

fn check_base(base: Decimal) -> EngineResult<()> {
    if base <= Decimal::ZERO {
        return Err(EngineError::InvalidVolumeBase(base));
    }
    Ok(())
}
