//! Normalizer - Converts native-quote prices into the reference fiat
//!
//! Every adapter runs its raw prices through here so that a BTC-quoted pair on
//! one exchange and a KRW-quoted pair on another end up directly comparable.
//! The normalizer is also where benchmark observations are harvested: pricing
//! BTC against a USD-like coin or the reference fiat publishes the BTC cross
//! rate that every other feed converts BTC-quoted pairs with.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::market::rates::RateCache;
use crate::types::{QuoteKind, RawQuote, Ticker};

/// Quote codes converted through the USD/fiat rate
pub const USD_LIKE_QUOTES: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];

/// Quote codes converted through the BTC/fiat rate
pub const BTC_LIKE_QUOTES: [&str; 1] = ["BTC"];

/// What to do with a quote that is neither USD-like, BTC nor the reference fiat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotePolicy {
    /// Leave the ticker untouched and report it
    #[default]
    Strict,
    /// Treat it as already denominated in the reference fiat
    Lenient,
}

/// Table-driven quote classification for one reference fiat
#[derive(Debug, Clone)]
pub struct QuoteClassifier {
    reference_fiat: String,
    policy: QuotePolicy,
}

impl QuoteClassifier {
    pub fn new(reference_fiat: &str, policy: QuotePolicy) -> Self {
        Self {
            reference_fiat: reference_fiat.trim().to_uppercase(),
            policy,
        }
    }

    pub fn reference_fiat(&self) -> &str {
        &self.reference_fiat
    }

    pub fn classify(&self, quote: &str) -> Option<QuoteKind> {
        let quote = quote.trim().to_uppercase();
        if quote.is_empty() {
            return None;
        }
        if USD_LIKE_QUOTES.contains(&quote.as_str()) {
            return Some(QuoteKind::UsdLike);
        }
        if BTC_LIKE_QUOTES.contains(&quote.as_str()) {
            return Some(QuoteKind::BtcLike);
        }
        if quote == self.reference_fiat {
            return Some(QuoteKind::FiatNative);
        }
        match self.policy {
            QuotePolicy::Strict => None,
            QuotePolicy::Lenient => Some(QuoteKind::FiatNative),
        }
    }

    /// Classify a ticker's quote, reporting the failure with its symbol
    pub fn classify_ticker(&self, ticker: &Ticker) -> EngineResult<QuoteKind> {
        self.classify(&ticker.quote_name)
            .ok_or_else(|| EngineError::UnclassifiedQuote {
                symbol: ticker.symbol.clone(),
                quote: ticker.quote_name.clone(),
            })
    }
}

pub struct Normalizer {
    rates: Arc<RateCache>,
    classifier: QuoteClassifier,
    harvest_benchmarks: bool,
}

impl Normalizer {
    pub fn new(rates: Arc<RateCache>, classifier: QuoteClassifier) -> Self {
        Self {
            rates,
            classifier,
            harvest_benchmarks: true,
        }
    }

    /// Enable or disable publishing benchmark observations to the rate cache
    pub fn with_harvest(mut self, harvest_benchmarks: bool) -> Self {
        self.harvest_benchmarks = harvest_benchmarks;
        self
    }

    pub fn classifier(&self) -> &QuoteClassifier {
        &self.classifier
    }

    pub fn rates(&self) -> &Arc<RateCache> {
        &self.rates
    }

    /// Write reference-fiat prices onto `ticker`.
    ///
    /// Dead tickers and unclassifiable quotes are rejected without touching
    /// the ticker. While a needed rate is unset the prices are written as zero.
    pub fn apply_price(&self, ticker: &mut Ticker, raw: &RawQuote) -> EngineResult<()> {
        if ticker.is_dead() {
            return Err(EngineError::SymbolDead(ticker.symbol.clone()));
        }
        let kind = self.classifier.classify_ticker(ticker)?;

        if self.harvest_benchmarks {
            self.harvest(ticker, kind, raw.last);
        }

        ticker.last_price = self.rates.get_fiat_amount(raw.last, kind);
        ticker.ask_price = self.rates.get_fiat_amount(raw.ask, kind);
        ticker.bid_price = self.rates.get_fiat_amount(raw.bid, kind);
        ticker.ask_qty = raw.ask_qty;
        ticker.bid_qty = raw.bid_qty;

        Ok(())
    }

    fn harvest(&self, ticker: &Ticker, kind: QuoteKind, raw_last: Decimal) {
        if raw_last <= Decimal::ZERO {
            return;
        }

        // Lenient classification may call a foreign quote fiat-native; only the
        // reference fiat itself is a benchmark.
        let native = kind == QuoteKind::FiatNative
            && ticker.quote_name == self.classifier.reference_fiat();

        if BTC_LIKE_QUOTES.contains(&ticker.base_name.as_str())
            && (kind == QuoteKind::UsdLike || native)
        {
            if self.rates.set_btc_benchmark_price(raw_last, kind) {
                tracing::trace!(
                    symbol = %ticker.symbol,
                    price = %raw_last,
                    kind = %kind,
                    "BTC benchmark harvested"
                );
            }
        } else if USD_LIKE_QUOTES.contains(&ticker.base_name.as_str())
            && native
            && self.rates.set_usd_fiat_rate(raw_last)
        {
            tracing::trace!(symbol = %ticker.symbol, rate = %raw_last, "USD/fiat rate harvested");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn normalizer(policy: QuotePolicy) -> Normalizer {
        let rates = Arc::new(RateCache::new(dec!(1000), dec!(10)).unwrap());
        Normalizer::new(rates, QuoteClassifier::new("KRW", policy))
    }

    fn quote(last: Decimal) -> RawQuote {
        RawQuote {
            last,
            ask: last,
            bid: last,
            ask_qty: dec!(1),
            bid_qty: dec!(2),
        }
    }

    #[test]
    fn test_classification_table() {
        let c = QuoteClassifier::new("krw", QuotePolicy::Strict);
        for q in ["USDT", "usdc", "BUSD", "USD"] {
            assert_eq!(c.classify(q), Some(QuoteKind::UsdLike));
        }
        assert_eq!(c.classify("BTC"), Some(QuoteKind::BtcLike));
        assert_eq!(c.classify("KRW"), Some(QuoteKind::FiatNative));
        assert_eq!(c.classify("ETH"), None);
        assert_eq!(c.classify(""), None);

        let lenient = QuoteClassifier::new("KRW", QuotePolicy::Lenient);
        assert_eq!(lenient.classify("ETH"), Some(QuoteKind::FiatNative));
        assert_eq!(lenient.classify("  "), None);
    }

    #[test]
    fn test_usd_quoted_price_and_btc_harvest() {
        let n = normalizer(QuotePolicy::Strict);
        n.rates().set_usd_fiat_rate(dec!(1300));

        let mut btc = Ticker::new("BTCUSDT", "BTC", "USDT");
        n.apply_price(&mut btc, &quote(dec!(50000))).unwrap();
        assert_eq!(btc.last_price, dec!(65000000));
        assert_eq!(btc.ask_qty, dec!(1));
        assert_eq!(btc.bid_qty, dec!(2));
        assert_eq!(n.rates().snapshot().btc_fiat_rate, dec!(65000000));

        let mut eth = Ticker::new("ETHBTC", "ETH", "BTC");
        n.apply_price(&mut eth, &quote(dec!(0.02))).unwrap();
        assert_eq!(eth.last_price, dec!(1300000));
    }

    #[test]
    fn test_usdt_fiat_pair_publishes_usd_rate() {
        let n = normalizer(QuotePolicy::Strict);
        let mut usdt = Ticker::new("KRW-USDT", "USDT", "KRW");
        n.apply_price(&mut usdt, &quote(dec!(1385))).unwrap();
        assert_eq!(usdt.last_price, dec!(1385));
        assert_eq!(n.rates().snapshot().usd_fiat_rate, dec!(1385));
    }

    #[test]
    fn test_harvest_disabled() {
        let n = normalizer(QuotePolicy::Strict).with_harvest(false);
        let mut btc = Ticker::new("KRW-BTC", "BTC", "KRW");
        n.apply_price(&mut btc, &quote(dec!(90000000))).unwrap();
        assert_eq!(btc.last_price, dec!(90000000));
        assert_eq!(n.rates().snapshot().btc_fiat_rate, Decimal::ZERO);
    }

    #[test]
    fn test_rate_unavailable_writes_zero() {
        let n = normalizer(QuotePolicy::Strict);
        let mut eth = Ticker::new("ETHBTC", "ETH", "BTC");
        n.apply_price(&mut eth, &quote(dec!(0.05))).unwrap();
        assert_eq!(eth.last_price, Decimal::ZERO);
        assert!(!eth.has_price());
    }

    #[test]
    fn test_unclassified_quote_leaves_ticker_unmodified() {
        let n = normalizer(QuotePolicy::Strict);
        let mut ticker = Ticker::new("SOLETH", "SOL", "ETH");
        ticker.last_price = dec!(7);
        let before = ticker.clone();

        let err = n.apply_price(&mut ticker, &quote(dec!(0.05))).unwrap_err();
        assert!(matches!(err, EngineError::UnclassifiedQuote { .. }));
        assert_eq!(ticker, before);
    }
}
