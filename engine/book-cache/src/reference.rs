//! Instrument reference data

use crate::types::Instrument;
use std::collections::HashMap;

/// Read-only instrument cache, built once at startup
#[derive(Debug, Default)]
pub struct ReferenceCache {
    instruments: Vec<Instrument>,
    by_id: HashMap<i64, usize>,
    by_symbol: HashMap<String, usize>,
}

impl ReferenceCache {
    /// Build the cache, keeping the load order for `instruments()`
    pub fn new(instruments: Vec<Instrument>) -> Self {
        let mut by_id = HashMap::with_capacity(instruments.len());
        let mut by_symbol = HashMap::with_capacity(instruments.len());

        for (idx, instrument) in instruments.iter().enumerate() {
            by_id.insert(instrument.id, idx);
            by_symbol.insert(instrument.symbol.clone(), idx);
        }

        Self { instruments, by_id, by_symbol }
    }

    pub fn get(&self, id: i64) -> Option<&Instrument> {
        self.by_id.get(&id).map(|&idx| &self.instruments[idx])
    }

    pub fn get_by_symbol(&self, symbol: &str) -> Option<&Instrument> {
        self.by_symbol.get(symbol).map(|&idx| &self.instruments[idx])
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(id: i64, symbol: &str) -> Instrument {
        Instrument {
            id,
            symbol: symbol.to_string(),
            market: "FX".to_string(),
            quote_currency: "USD".to_string(),
            min_trade_size: 0.01,
            precision: 5.0,
            contract_size: 100000.0,
            bid: 0.0,
            ask: 0.0,
            quoted_at: None,
        }
    }

    #[test]
    fn test_lookup_by_id_and_symbol() {
        let cache = ReferenceCache::new(vec![instrument(2, "EURUSD"), instrument(1, "AUDUSD")]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(2).map(|i| i.symbol.as_str()), Some("EURUSD"));
        assert_eq!(cache.get_by_symbol("AUDUSD").map(|i| i.id), Some(1));
        assert!(cache.get(3).is_none());
        assert_eq!(cache.instruments()[0].id, 2);
    }
}
