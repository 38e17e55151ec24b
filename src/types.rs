//! Core types used throughout xtickers
//!
//! Defines the normalized ticker record, wallet status records and the raw
//! rows exchange adapters hand to the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    Binance,
    Bybit,
    Upbit,
}

impl Exchange {
    /// All exchanges with a bundled adapter
    pub const ALL: [Exchange; 3] = [Exchange::Binance, Exchange::Bybit, Exchange::Upbit];

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "binance" => Some(Exchange::Binance),
            "bybit" => Some(Exchange::Bybit),
            "upbit" => Some(Exchange::Upbit),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Binance => write!(f, "Binance"),
            Exchange::Bybit => write!(f, "Bybit"),
            Exchange::Upbit => write!(f, "Upbit"),
        }
    }
}

/// How a quote currency relates to the reference fiat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteKind {
    /// USDT, USDC, BUSD, USD
    UsdLike,
    /// BTC
    BtcLike,
    /// Already denominated in the reference fiat
    FiatNative,
}

impl fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteKind::UsdLike => write!(f, "USD_LIKE"),
            QuoteKind::BtcLike => write!(f, "BTC_LIKE"),
            QuoteKind::FiatNative => write!(f, "FIAT_NATIVE"),
        }
    }
}

/// Lifecycle of a stored symbol
///
/// `Unresolved -> Live` on the first match against live market data,
/// `Unresolved | Live -> Dead` on a lookup miss. `Dead` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SymbolState {
    #[default]
    Unresolved,
    Live,
    Dead,
}

impl fmt::Display for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolState::Unresolved => write!(f, "UNRESOLVED"),
            SymbolState::Live => write!(f, "LIVE"),
            SymbolState::Dead => write!(f, "DEAD"),
        }
    }
}

/// One symbol on one exchange market, normalized to the reference fiat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// Exchange-native pair identifier (e.g. "BTCUSDT", "KRW-BTC")
    pub symbol: String,
    /// Resolution state of `symbol`
    pub state: SymbolState,
    /// Base asset code, uppercase
    pub base_name: String,
    /// Quote asset code, uppercase
    pub quote_name: String,
    /// Last trade price in reference fiat
    pub last_price: Decimal,
    /// Best ask in reference fiat
    pub ask_price: Decimal,
    /// Best bid in reference fiat
    pub bid_price: Decimal,
    /// Best ask size in base units
    pub ask_qty: Decimal,
    /// Best bid size in base units
    pub bid_qty: Decimal,
    /// 24h volume in display units (fiat / volume_24h_base)
    pub volume_24h: Decimal,
    /// Estimated last-minute volume in display units (fiat / volume_1m_base)
    pub volume_1m: Decimal,
    /// Last accepted cumulative 24h volume in fiat; zero means no sample yet
    pub previous_24h: Decimal,
    /// Epoch ms of the last accepted 1m volume sample
    pub timestamp: i64,
    /// Wallet flags for `base_name`
    pub active: bool,
    pub deposit: bool,
    pub withdraw: bool,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, base: &str, quote: &str) -> Self {
        Self {
            symbol: symbol.into(),
            state: SymbolState::Unresolved,
            base_name: base.trim().to_uppercase(),
            quote_name: quote.trim().to_uppercase(),
            last_price: Decimal::ZERO,
            ask_price: Decimal::ZERO,
            bid_price: Decimal::ZERO,
            ask_qty: Decimal::ZERO,
            bid_qty: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            volume_1m: Decimal::ZERO,
            previous_24h: Decimal::ZERO,
            timestamp: 0,
            active: true,
            deposit: true,
            withdraw: true,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.state == SymbolState::Dead
    }

    pub fn is_live(&self) -> bool {
        self.state == SymbolState::Live
    }

    /// True once a non-zero price has been normalized
    pub fn has_price(&self) -> bool {
        self.last_price > Decimal::ZERO
    }

    /// Ask/bid spread in reference fiat, if both sides are known
    pub fn spread(&self) -> Option<Decimal> {
        if self.ask_price > Decimal::ZERO && self.bid_price > Decimal::ZERO {
            Some(self.ask_price - self.bid_price)
        } else {
            None
        }
    }
}

/// Raw top-of-book and last price in the exchange's native quote currency
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawQuote {
    pub last: Decimal,
    pub ask: Decimal,
    pub bid: Decimal,
    pub ask_qty: Decimal,
    pub bid_qty: Decimal,
}

/// One row of an adapter's ticker response
#[derive(Debug, Clone, PartialEq)]
pub struct RawTicker {
    pub symbol: String,
    pub quote: RawQuote,
    /// Cumulative 24h traded volume in quote units
    pub volume_24h: Decimal,
}

/// One polling cycle as returned by an adapter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickerBatch {
    pub rows: Vec<RawTicker>,
    /// Symbols present in the response whose row could not be parsed
    pub malformed: Vec<String>,
}

impl TickerBatch {
    pub fn from_rows(rows: Vec<RawTicker>) -> Self {
        Self {
            rows,
            malformed: Vec::new(),
        }
    }

    /// True when the response named no symbol at all
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.malformed.is_empty()
    }

    pub fn extend(&mut self, other: TickerBatch) {
        self.rows.extend(other.rows);
        self.malformed.extend(other.malformed);
    }
}

/// A tradable pair listed by an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketListing {
    pub symbol: String,
    pub base: String,
    pub quote: String,
    pub trading: bool,
}

/// Aggregate wallet status of one base asset on one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WState {
    pub base_name: String,
    pub active: bool,
    pub deposit: bool,
    pub withdraw: bool,
    pub networks: Vec<WNetwork>,
}

impl WState {
    pub fn new(base_name: &str) -> Self {
        Self {
            base_name: base_name.trim().to_uppercase(),
            active: false,
            deposit: false,
            withdraw: false,
            networks: Vec::new(),
        }
    }

    pub fn network(&self, network: &str) -> Option<&WNetwork> {
        let key = network_key(&self.base_name, network);
        self.networks.iter().find(|n| n.name == key)
    }
}

/// One chain/network an asset can move over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WNetwork {
    /// Composite key `BASE-NETWORK`, unique within the parent `WState`
    pub name: String,
    pub network: String,
    pub chain: String,
    pub deposit: bool,
    pub withdraw: bool,
    pub withdraw_fee: Decimal,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    pub min_confirm: u32,
}

/// Composite `WNetwork` key
pub fn network_key(base: &str, network: &str) -> String {
    format!("{}-{}", base.trim().to_uppercase(), network.trim())
}

/// One per-chain record from an exchange's wallet-status response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkRecord {
    pub base: String,
    pub network: String,
    pub chain: String,
    /// Asset-level flag when the exchange reports one; otherwise derived
    pub active: Option<bool>,
    pub deposit: bool,
    pub withdraw: bool,
    pub withdraw_fee: Decimal,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    pub min_confirm: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_ticker_normalizes_codes() {
        let ticker = Ticker::new("btcusdt", " btc", "usdt ");
        assert_eq!(ticker.base_name, "BTC");
        assert_eq!(ticker.quote_name, "USDT");
        assert_eq!(ticker.state, SymbolState::Unresolved);
        assert!(!ticker.has_price());
        assert!(ticker.active && ticker.deposit && ticker.withdraw);
    }

    #[test]
    fn test_spread_requires_both_sides() {
        let mut ticker = Ticker::new("KRW-BTC", "BTC", "KRW");
        assert_eq!(ticker.spread(), None);
        ticker.ask_price = dec!(101);
        ticker.bid_price = dec!(100);
        assert_eq!(ticker.spread(), Some(dec!(1)));
    }

    #[test]
    fn test_network_key() {
        assert_eq!(network_key("usdt", "TRC20"), "USDT-TRC20");
    }

    #[test]
    fn test_ticker_batch_extend() {
        let mut batch = TickerBatch::default();
        assert!(batch.is_empty());
        batch.extend(TickerBatch {
            rows: Vec::new(),
            malformed: vec!["KRW-ETH".to_string()],
        });
        assert!(!batch.is_empty());
        assert_eq!(batch.malformed, vec!["KRW-ETH".to_string()]);
    }

    #[test]
    fn test_exchange_parse() {
        assert_eq!(Exchange::from_str("UPBIT"), Some(Exchange::Upbit));
        assert_eq!(Exchange::from_str("kraken"), None);
    }
}
