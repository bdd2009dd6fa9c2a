//! Price State
//!
//! Per-instrument last known price, point-in-time snapshots of the whole
//! table, and the tick type flowing from the upstream feed into the store.
//!
//! Prices are stored as received (`f64`, full precision). Rounding to cents
//! only happens at the downstream wire boundary via [`format_price`] and
//! [`round_to_cents`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::registry::Instrument;

/// Price reported for an instrument before any data has arrived.
pub const UNKNOWN_PRICE: f64 = 0.0;

// =============================================================================
// PriceState
// =============================================================================

/// Last observed price for one instrument.
///
/// `price` and `last_updated` are always written together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceState {
    /// Last observed price, or [`UNKNOWN_PRICE`].
    pub price: f64,
    /// Time of the last write; `None` until the first update.
    pub last_updated: Option<DateTime<Utc>>,
}

impl PriceState {
    /// Sentinel state used before any update arrives.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            price: UNKNOWN_PRICE,
            last_updated: None,
        }
    }

    /// State for a price observed at `at`.
    #[must_use]
    pub const fn observed(price: f64, at: DateTime<Utc>) -> Self {
        Self {
            price,
            last_updated: Some(at),
        }
    }

    /// Whether at least one update has been applied.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        self.last_updated.is_some()
    }
}

impl Default for PriceState {
    fn default() -> Self {
        Self::unknown()
    }
}

// =============================================================================
// PriceSnapshot
// =============================================================================

/// Consistent point-in-time copy of every entry in the price store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceSnapshot(BTreeMap<Instrument, PriceState>);

impl PriceSnapshot {
    /// Get the state for an instrument.
    #[must_use]
    pub fn get(&self, instrument: &str) -> Option<&PriceState> {
        self.0.get(instrument)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the snapshot has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries ordered by instrument identifier.
    pub fn iter(&self) -> impl Iterator<Item = (&Instrument, &PriceState)> {
        self.0.iter()
    }
}

impl FromIterator<(Instrument, PriceState)> for PriceSnapshot {
    fn from_iter<T: IntoIterator<Item = (Instrument, PriceState)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// PriceTick
// =============================================================================

/// Where a price observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    /// Request/response quote fetched when a feed session starts.
    Snapshot,
    /// Trade streamed over the live feed.
    Stream,
}

impl TickSource {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Stream => "stream",
        }
    }
}

/// A single price observation for a registered instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    /// Registered instrument.
    pub instrument: Instrument,
    /// Observed price.
    pub price: f64,
    /// Origin of the observation.
    pub source: TickSource,
}

impl PriceTick {
    /// Tick from the live stream.
    #[must_use]
    pub const fn stream(instrument: Instrument, price: f64) -> Self {
        Self {
            instrument,
            price,
            source: TickSource::Stream,
        }
    }

    /// Tick from a snapshot quote.
    #[must_use]
    pub const fn snapshot(instrument: Instrument, price: f64) -> Self {
        Self {
            instrument,
            price,
            source: TickSource::Snapshot,
        }
    }
}

// =============================================================================
// Formatting
// =============================================================================

fn to_cents(price: f64) -> Option<Decimal> {
    let mut cents = Decimal::try_from(price)
        .ok()?
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    cents.rescale(2);
    Some(cents)
}

/// Format a price with exactly two decimal places (`700.123` -> `"700.12"`).
#[must_use]
pub fn format_price(price: f64) -> String {
    to_cents(price).map_or_else(|| format!("{price:.2}"), |cents| cents.to_string())
}

/// Round a price to cents, keeping it numeric.
#[must_use]
pub fn round_to_cents(price: f64) -> f64 {
    to_cents(price)
        .and_then(|cents| cents.to_f64())
        .unwrap_or(price)
}
