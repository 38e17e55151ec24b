//! Engine error types
//!
//! None of these abort a polling cycle: the engine hands them back as values
//! and leaves the affected ticker untouched, so one bad row never blocks the
//! rest of a store.

use rust_decimal::Decimal;

use crate::types::QuoteKind;

/// Convenience alias for engine results
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// No benchmark has been harvested yet for this quote kind
    #[error("rate not yet available for {0} quotes")]
    RateUnavailable(QuoteKind),

    /// The symbol was marked dead and accepts no further updates
    #[error("symbol {0} is dead")]
    SymbolDead(String),

    /// The symbol is not present in the store
    #[error("unknown symbol {0}")]
    UnknownSymbol(String),

    /// The quote currency maps to no conversion rule
    #[error("cannot classify quote currency {quote:?} of {symbol}")]
    UnclassifiedQuote { symbol: String, quote: String },

    #[error("volume base must be positive, got {0}")]
    InvalidVolumeBase(Decimal),

    #[error("duplicate symbol {0}")]
    DuplicateSymbol(String),
}
