//! Wallet State Reconciler - Deposit/withdraw status per asset and network
//!
//! Merges one exchange's per-chain wallet records into per-asset `WState`
//! entries and fans the resulting flags out to every ticker on that asset.
//!
//! Merge policy:
//! - across calls, the latest response replaces the stored asset flags
//! - within one response, an asset's flags are the OR over its networks
//! - networks are append-only; a known network only has deposit/withdraw
//!   refreshed

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::market::tickers::Tickers;
use crate::types::{network_key, NetworkRecord, WNetwork, WState};

/// Book shared between the owning feed and readers
pub type SharedWallets = Arc<RwLock<WalletBook>>;

/// Per-exchange wallet states in first-seen order
#[derive(Debug, Clone, Default)]
pub struct WalletBook {
    states: Vec<WState>,
    index: HashMap<String, usize>,
}

impl WalletBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedWallets {
        Arc::new(RwLock::new(self))
    }

    pub fn get(&self, base: &str) -> Option<&WState> {
        self.index
            .get(&base.trim().to_uppercase())
            .map(|&i| &self.states[i])
    }

    /// Look up the state for `base`, creating an empty one if absent
    pub fn entry(&mut self, base: &str) -> &mut WState {
        let key = base.trim().to_uppercase();
        let idx = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                self.states.push(WState::new(&key));
                self.index.insert(key, self.states.len() - 1);
                self.states.len() - 1
            }
        };
        &mut self.states[idx]
    }

    pub fn iter(&self) -> impl Iterator<Item = &WState> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Replace the asset-level flags for `base` and propagate them to tickers.
    ///
    /// Returns the number of tickers updated.
    pub fn apply_asset_status(
        &mut self,
        tickers: &mut Tickers,
        base: &str,
        active: bool,
        deposit: bool,
        withdraw: bool,
    ) -> usize {
        let state = self.entry(base);
        state.active = active;
        state.deposit = deposit;
        state.withdraw = withdraw;

        let base_name = state.base_name.clone();
        let mut touched = 0;
        for ticker in tickers.iter_base_mut(&base_name) {
            ticker.active = active;
            ticker.deposit = deposit;
            ticker.withdraw = withdraw;
            touched += 1;
        }
        touched
    }

    /// Apply one exchange wallet-status response.
    ///
    /// Returns the number of assets updated.
    pub fn apply_wallet_status(&mut self, tickers: &mut Tickers, records: &[NetworkRecord]) -> usize {
        // (active, deposit, withdraw) per asset, in first-seen order
        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, (bool, bool, bool)> = HashMap::new();

        for record in records {
            let base = record.base.trim().to_uppercase();
            if base.is_empty() {
                continue;
            }

            let state = self.entry(&base);
            apply_network_status(state, &record.network, record);

            let active = record.active.unwrap_or(record.deposit || record.withdraw);
            let flags = merged.entry(base.clone()).or_insert_with(|| {
                order.push(base.clone());
                (false, false, false)
            });
            flags.0 |= active;
            flags.1 |= record.deposit;
            flags.2 |= record.withdraw;
        }

        for base in &order {
            let (active, deposit, withdraw) = merged[base];
            let touched = self.apply_asset_status(tickers, base, active, deposit, withdraw);
            tracing::trace!(
                exchange = %tickers.exchange(),
                asset = %base,
                active,
                deposit,
                withdraw,
                tickers = touched,
                "Wallet status applied"
            );
        }

        order.len()
    }
}

/// Merge one network record into `state`.
///
/// A known network keeps its descriptive fields and only has deposit and
/// withdraw refreshed; an unknown one is appended in full.
pub fn apply_network_status(state: &mut WState, network_id: &str, record: &NetworkRecord) {
    let key = network_key(&state.base_name, network_id);

    if let Some(existing) = state.networks.iter_mut().find(|n| n.name == key) {
        existing.deposit = record.deposit;
        existing.withdraw = record.withdraw;
        return;
    }

    state.networks.push(WNetwork {
        name: key,
        network: network_id.trim().to_string(),
        chain: record.chain.clone(),
        deposit: record.deposit,
        withdraw: record.withdraw,
        withdraw_fee: record.withdraw_fee,
        min_withdrawal: record.min_withdrawal,
        max_withdrawal: record.max_withdrawal,
        min_confirm: record.min_confirm,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Exchange, Ticker};
    use rust_decimal_macros::dec;

    fn tickers() -> Tickers {
        let mut t = Tickers::new(Exchange::Upbit, "KRW");
        t.insert(Ticker::new("KRW-USDT", "USDT", "KRW")).unwrap();
        t.insert(Ticker::new("BTC-USDT", "USDT", "BTC")).unwrap();
        t.insert(Ticker::new("KRW-BTC", "BTC", "KRW")).unwrap();
        t
    }

    fn record(base: &str, network: &str, deposit: bool, withdraw: bool) -> NetworkRecord {
        NetworkRecord {
            base: base.to_string(),
            network: network.to_string(),
            chain: network.to_lowercase(),
            active: None,
            deposit,
            withdraw,
            withdraw_fee: dec!(1),
            min_withdrawal: dec!(10),
            max_withdrawal: dec!(100000),
            min_confirm: 12,
        }
    }

    #[test]
    fn test_asset_status_fans_out_to_matching_tickers() {
        let mut book = WalletBook::new();
        let mut t = tickers();

        let touched = book.apply_asset_status(&mut t, "usdt", true, false, true);
        assert_eq!(touched, 2);
        for symbol in ["KRW-USDT", "BTC-USDT"] {
            let ticker = t.get(symbol).unwrap();
            assert!(ticker.active && !ticker.deposit && ticker.withdraw);
        }
        assert!(t.get("KRW-BTC").unwrap().deposit);
        assert_eq!(book.get("USDT").unwrap().base_name, "USDT");
    }

    #[test]
    fn test_asset_status_last_write_wins() {
        let mut book = WalletBook::new();
        let mut t = tickers();
        book.apply_asset_status(&mut t, "BTC", true, true, true);
        book.apply_asset_status(&mut t, "BTC", false, false, false);

        let state = book.get("btc").unwrap();
        assert!(!state.active && !state.deposit && !state.withdraw);
        assert!(!t.get("KRW-BTC").unwrap().withdraw);
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_dead_tickers_not_updated() {
        let mut book = WalletBook::new();
        let mut t = tickers();
        t.mark_dead("BTC-USDT");
        let touched = book.apply_asset_status(&mut t, "USDT", false, false, false);
        assert_eq!(touched, 1);
        assert!(t.get("BTC-USDT").unwrap().deposit);
    }

    #[test]
    fn test_network_append_then_update_in_place() {
        let mut state = WState::new("usdt");
        apply_network_status(&mut state, "TRC20", &record("USDT", "TRC20", true, true));
        apply_network_status(&mut state, "ERC20", &record("USDT", "ERC20", true, false));
        assert_eq!(state.networks.len(), 2);

        let mut changed = record("USDT", "TRC20", false, false);
        changed.withdraw_fee = dec!(99);
        changed.min_confirm = 1;
        apply_network_status(&mut state, "TRC20", &changed);

        assert_eq!(state.networks.len(), 2);
        let trc = state.network("TRC20").unwrap();
        assert_eq!(trc.name, "USDT-TRC20");
        assert!(!trc.deposit && !trc.withdraw);
        // Descriptive fields keep their first-seen values
        assert_eq!(trc.withdraw_fee, dec!(1));
        assert_eq!(trc.min_confirm, 12);
    }

    #[test]
    fn test_wallet_status_ors_networks_within_one_response() {
        let mut book = WalletBook::new();
        let mut t = tickers();
        let records = vec![
            record("USDT", "TRC20", false, true),
            record("BTC", "BTC", false, false),
            record("USDT", "ERC20", true, false),
        ];

        assert_eq!(book.apply_wallet_status(&mut t, &records), 2);

        let usdt = book.get("USDT").unwrap();
        assert!(usdt.active && usdt.deposit && usdt.withdraw);
        assert_eq!(usdt.networks.len(), 2);

        let btc = book.get("BTC").unwrap();
        assert!(!btc.active && !btc.deposit && !btc.withdraw);
        assert!(!t.get("KRW-BTC").unwrap().active);

        let order: Vec<&str> = book.iter().map(|s| s.base_name.as_str()).collect();
        assert_eq!(order, vec!["USDT", "BTC"]);
    }

    #[test]
    fn test_wallet_status_replaces_previous_response() {
        let mut book = WalletBook::new();
        let mut t = tickers();
        book.apply_wallet_status(&mut t, &[record("USDT", "TRC20", true, true)]);
        book.apply_wallet_status(&mut t, &[record("USDT", "TRC20", false, true)]);

        let usdt = book.get("USDT").unwrap();
        assert!(!usdt.deposit && usdt.withdraw);
        assert!(!t.get("KRW-USDT").unwrap().deposit);
        assert_eq!(usdt.networks.len(), 1);
    }

    #[test]
    fn test_explicit_active_flag_overrides_derivation() {
        let mut book = WalletBook::new();
        let mut t = tickers();
        let mut r = record("BTC", "BTC", true, true);
        r.active = Some(false);
        book.apply_wallet_status(&mut t, &[r]);
        let btc = book.get("BTC").unwrap();
        assert!(!btc.active && btc.deposit);
    }
}
