//! In-Memory Price Store
//!
//! The canonical last-price table. Seeded with one sentinel entry per
//! registered instrument; entries are never added or removed afterwards.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::application::ports::PriceStorePort;
use crate::domain::price::{PriceSnapshot, PriceState};
use crate::domain::registry::{Instrument, SymbolRegistry};

/// Lock-guarded price table keyed by instrument.
#[derive(Debug)]
pub struct InMemoryPriceStore {
    prices: RwLock<HashMap<Instrument, PriceState>>,
}

impl InMemoryPriceStore {
    /// Create a store with a sentinel entry for every registered instrument.
    #[must_use]
    pub fn new(registry: &SymbolRegistry) -> Self {
        let prices = registry
            .instruments()
            .iter()
            .map(|instrument| (instrument.clone(), PriceState::unknown()))
            .collect();

        Self {
            prices: RwLock::new(prices),
        }
    }
}

impl PriceStorePort for InMemoryPriceStore {
    fn get(&self, instrument: &Instrument) -> Option<PriceState> {
        self.prices.read().get(instrument).copied()
    }

    fn set(&self, instrument: &Instrument, price: f64) -> bool {
        let now = Utc::now();
        let mut prices = self.prices.write();
        match prices.get_mut(instrument) {
            Some(entry) => {
                *entry = PriceState::observed(price, now);
                true
            }
            None => false,
        }
    }

    fn snapshot(&self) -> PriceSnapshot {
        self.prices
            .read()
            .iter()
            .map(|(instrument, state)| (instrument.clone(), *state))
            .collect()
    }
}
