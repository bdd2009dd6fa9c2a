//! Symbol Registry
//!
//! The fixed, ordered set of instruments the relay cares about. Built once
//! at startup and shared read-only by every component.
//!
//! Registry order matters: it is the order of the upstream subscription
//! handshake and of the snapshot fetch batch.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Instruments relayed when no explicit list is configured.
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "AAPL",
    "TSLA",
    "NVDA",
    "MSFT",
    "AMZN",
    "GOOGL",
    "META",
    "BINANCE:ETHUSDT",
];

// =============================================================================
// Instrument
// =============================================================================

/// Opaque instrument identifier (e.g. `AAPL`, `BINANCE:ETHUSDT`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    /// Create an instrument from its identifier.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Instrument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Instrument {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Errors raised while building the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No instruments configured.
    #[error("symbol registry cannot be empty")]
    Empty,

    /// A blank identifier was supplied.
    #[error("symbol at position {0} is blank")]
    BlankSymbol(usize),

    /// The same identifier appears more than once.
    #[error("duplicate symbol: {0}")]
    Duplicate(String),
}

/// Immutable, ordered set of registered instruments.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    ordered: Vec<Instrument>,
    members: HashSet<Instrument>,
}

impl SymbolRegistry {
    /// Build a registry from identifiers, preserving their order.
    ///
    /// Identifiers are trimmed. Matching is exact and case-sensitive since
    /// upstream identifiers such as `BINANCE:ETHUSDT` are opaque.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if the list is empty, contains a blank entry,
    /// or contains duplicates.
    pub fn new<I, S>(symbols: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut members = HashSet::new();

        for (position, symbol) in symbols.into_iter().enumerate() {
            let symbol = symbol.as_ref().trim();
            if symbol.is_empty() {
                return Err(RegistryError::BlankSymbol(position));
            }

            let instrument = Instrument::new(symbol);
            if !members.insert(instrument.clone()) {
                return Err(RegistryError::Duplicate(symbol.to_string()));
            }
            ordered.push(instrument);
        }

        if ordered.is_empty() {
            return Err(RegistryError::Empty);
        }

        Ok(Self { ordered, members })
    }

    /// Registry seeded with [`DEFAULT_SYMBOLS`].
    ///
    /// # Errors
    ///
    /// Never fails in practice; the default list is non-empty and unique.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        Self::new(DEFAULT_SYMBOLS)
    }

    /// Instruments in registry order.
    #[must_use]
    pub fn instruments(&self) -> &[Instrument] {
        &self.ordered
    }

    /// Look up a registered instrument by identifier.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<&Instrument> {
        self.members.get(symbol)
    }

    /// Whether the identifier is registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.members.contains(symbol)
    }

    /// Number of registered instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Always false for a constructed registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_configured_order() {
        let registry = SymbolRegistry::new(["TSLA", "AAPL", "MSFT"]).unwrap();
        let order: Vec<_> = registry.instruments().iter().map(Instrument::as_str).collect();
        assert_eq!(order, vec!["TSLA", "AAPL", "MSFT"]);
    }

    #[test]
    fn resolves_registered_symbols_only() {
        let registry = SymbolRegistry::new(["AAPL", "BINANCE:ETHUSDT"]).unwrap();
        assert_eq!(
            registry.resolve("BINANCE:ETHUSDT").map(Instrument::as_str),
            Some("BINANCE:ETHUSDT")
        );
        assert!(registry.resolve("aapl").is_none());
        assert!(!registry.contains("GME"));
    }

    #[test]
    fn trims_whitespace() {
        let registry = SymbolRegistry::new([" AAPL ", "TSLA"]).unwrap();
        assert!(registry.contains("AAPL"));
    }

    #[test]
    fn rejects_empty_list() {
        let empty: [&str; 0] = [];
        assert_eq!(SymbolRegistry::new(empty).unwrap_err(), RegistryError::Empty);
    }

    #[test]
    fn rejects_blank_symbol() {
        assert_eq!(
            SymbolRegistry::new(["AAPL", "  "]).unwrap_err(),
            RegistryError::BlankSymbol(1)
        );
    }

    #[test]
    fn rejects_duplicates() {
        assert_eq!(
            SymbolRegistry::new(["AAPL", "TSLA", "AAPL"]).unwrap_err(),
            RegistryError::Duplicate("AAPL".to_string())
        );
    }

    #[test]
    fn default_registry_matches_default_symbols() {
        let registry = SymbolRegistry::with_defaults().unwrap();
        assert_eq!(registry.len(), DEFAULT_SYMBOLS.len());
        assert!(registry.contains("BINANCE:ETHUSDT"));
    }

    #[test]
    fn instrument_serializes_as_plain_string() {
        let json = serde_json::to_string(&Instrument::new("AAPL")).unwrap();
        assert_eq!(json, "\"AAPL\"");
    }
}
