// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! In-memory last-value NBBO store. One entry per option symbol plus the
//! underlying index entry; updates are last-writer-wins on the wire
//! timestamp and crossed quotes are rejected outright. Reads hand back
//! copies, never references into the map.

use core_types::types::Quote;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Outcome of a `put`, so the ingest path can count rejects without the
/// store owning any metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteUpdate {
    Applied,
    /// Strictly older than the stored entry; dropped per last-writer-wins.
    StaleDiscarded,
    /// Crossed (`bid > ask`); never admitted into classification math.
    Rejected,
}

#[derive(Default)]
pub struct QuoteStore {
    quotes: Mutex<HashMap<String, Quote>>,
}

impl QuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, symbol: &str, quote: Quote) -> QuoteUpdate {
        if quote.is_crossed() {
            return QuoteUpdate::Rejected;
        }
        let mut guard = self.quotes.lock();
        match guard.get(symbol) {
            Some(existing) if quote.ts_ms < existing.ts_ms => QuoteUpdate::StaleDiscarded,
            _ => {
                guard.insert(symbol.to_string(), quote);
                QuoteUpdate::Applied
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Quote> {
        self.quotes.lock().get(symbol).copied()
    }

    /// Midpoint when both sides are positive and the entry is fresh.
    pub fn mid(&self, symbol: &str, now_ms: i64, stale_ms: i64) -> Option<f64> {
        let quote = self.get(symbol)?;
        if !quote.is_usable(now_ms, stale_ms) {
            return None;
        }
        quote.mid()
    }

    /// Underlying spot from the index entry. Index feeds publish the level
    /// on both sides, so this is the same freshness-gated midpoint.
    pub fn spot(&self, index_symbol: &str, now_ms: i64, stale_ms: i64) -> Option<f64> {
        self.mid(index_symbol, now_ms, stale_ms)
    }

    pub fn len(&self) -> usize {
        self.quotes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(bid: f64, ask: f64, ts_ms: i64) -> Quote {
        Quote { bid, ask, ts_ms }
    }

    #[test]
    fn newer_quote_wins_older_discarded() {
        let store = QuoteStore::new();
        assert_eq!(store.put("SPXW250530C05900000", q(5.0, 5.1, 100)), QuoteUpdate::Applied);
        assert_eq!(
            store.put("SPXW250530C05900000", q(4.9, 5.0, 50)),
            QuoteUpdate::StaleDiscarded
        );
        assert_eq!(store.get("SPXW250530C05900000").unwrap().bid, 5.0);
        assert_eq!(store.put("SPXW250530C05900000", q(5.1, 5.2, 200)), QuoteUpdate::Applied);
        assert_eq!(store.get("SPXW250530C05900000").unwrap().ts_ms, 200);
    }

    #[test]
    fn equal_timestamp_update_is_idempotent_overwrite() {
        let store = QuoteStore::new();
        store.put("X", q(1.0, 1.1, 100));
        assert_eq!(store.put("X", q(1.0, 1.1, 100)), QuoteUpdate::Applied);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn crossed_quote_is_rejected() {
        let store = QuoteStore::new();
        assert_eq!(store.put("X", q(5.2, 5.1, 100)), QuoteUpdate::Rejected);
        assert!(store.get("X").is_none());
    }

    #[test]
    fn mid_respects_staleness_and_positivity() {
        let store = QuoteStore::new();
        store.put("X", q(5.0, 5.1, 1_000));
        assert_eq!(store.mid("X", 2_000, 5_000), Some(5.05));
        assert_eq!(store.mid("X", 10_000, 5_000), None); // stale
        store.put("Y", q(0.0, 5.1, 1_000));
        assert_eq!(store.mid("Y", 2_000, 5_000), None);
        assert_eq!(store.mid("missing", 2_000, 5_000), None);
    }

    #[test]
    fn index_entry_serves_as_spot() {
        let store = QuoteStore::new();
        store.put("I:SPX", q(5900.0, 5900.0, 1_000));
        assert_eq!(store.spot("I:SPX", 2_000, 5_000), Some(5900.0));
        assert_eq!(store.spot("I:SPX", 7_500, 5_000), None);
    }
}
