//! Ticker Store - Ordered, symbol-indexed tickers for one exchange market
//!
//! Entries are inserted once when a feed bootstraps and are mutated in place
//! afterwards. Nothing is ever removed: a symbol that stops resolving is
//! marked dead and stays in the store so iteration order is stable.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{EngineError, EngineResult};
use crate::types::{Exchange, SymbolState, Ticker};

/// Store shared between the owning feed and read-side consumers
pub type SharedTickers = Arc<RwLock<Tickers>>;

#[derive(Debug, Clone)]
pub struct Tickers {
    exchange: Exchange,
    reference_fiat: String,
    items: Vec<Ticker>,
    index: HashMap<String, usize>,
}

impl Tickers {
    pub fn new(exchange: Exchange, reference_fiat: &str) -> Self {
        Self {
            exchange,
            reference_fiat: reference_fiat.trim().to_uppercase(),
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn shared(self) -> SharedTickers {
        Arc::new(RwLock::new(self))
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn reference_fiat(&self) -> &str {
        &self.reference_fiat
    }

    /// Append a ticker. Symbols are unique within a store.
    pub fn insert(&mut self, ticker: Ticker) -> EngineResult<()> {
        if self.index.contains_key(&ticker.symbol) {
            return Err(EngineError::DuplicateSymbol(ticker.symbol));
        }
        self.index.insert(ticker.symbol.clone(), self.items.len());
        self.items.push(ticker);
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<&Ticker> {
        self.index.get(symbol).map(|&i| &self.items[i])
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Ticker> {
        match self.index.get(symbol) {
            Some(&i) => Some(&mut self.items[i]),
            None => None,
        }
    }

    /// Match a symbol against live market data.
    ///
    /// Promotes an unresolved entry to live. Dead entries never resolve again.
    pub fn resolve(&mut self, symbol: &str) -> EngineResult<&mut Ticker> {
        let ticker = self
            .get_mut(symbol)
            .ok_or_else(|| EngineError::UnknownSymbol(symbol.to_string()))?;

        match ticker.state {
            SymbolState::Dead => Err(EngineError::SymbolDead(symbol.to_string())),
            SymbolState::Unresolved => {
                ticker.state = SymbolState::Live;
                Ok(ticker)
            }
            SymbolState::Live => Ok(ticker),
        }
    }

    /// Mark a symbol dead after a lookup miss. Returns true on a transition.
    pub fn mark_dead(&mut self, symbol: &str) -> bool {
        match self.get_mut(symbol) {
            Some(ticker) if !ticker.is_dead() => {
                ticker.state = SymbolState::Dead;
                true
            }
            _ => false,
        }
    }

    /// Mark every stored symbol that `listed` rejects as dead.
    ///
    /// Returns the symbols that transitioned in this call.
    pub fn mark_missing<F>(&mut self, listed: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let mut killed = Vec::new();
        for ticker in self.items.iter_mut() {
            if !ticker.is_dead() && !listed(&ticker.symbol) {
                ticker.state = SymbolState::Dead;
                killed.push(ticker.symbol.clone());
            }
        }
        killed
    }

    /// All entries in insertion order, dead ones included
    pub fn iter(&self) -> impl Iterator<Item = &Ticker> {
        self.items.iter()
    }

    /// Entries consumers should read: everything not dead
    pub fn iter_live(&self) -> impl Iterator<Item = &Ticker> {
        self.items.iter().filter(|t| !t.is_dead())
    }

    /// Non-dead entries trading the given base asset
    pub fn iter_base_mut<'a>(&'a mut self, base: &'a str) -> impl Iterator<Item = &'a mut Ticker> + 'a {
        self.items
            .iter_mut()
            .filter(move |t| !t.is_dead() && t.base_name.eq_ignore_ascii_case(base))
    }

    /// Owned copy of every non-dead entry
    pub fn snapshot(&self) -> Vec<Ticker> {
        self.iter_live().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.items.iter().filter(|t| t.is_live()).count()
    }

    pub fn dead_count(&self) -> usize {
        self.items.iter().filter(|t| t.is_dead()).count()
    }

    /// Sum of converted 24h volume across non-dead entries, in display units
    pub fn total_volume_24h(&self) -> Decimal {
        self.iter_live().map(|t| t.volume_24h).sum()
    }
}
