use std::sync::Arc;

use core_types::config::EngineConfig;
use metrics::Metrics;
use parking_lot::{Mutex, RwLock};
use quote_cache::QuoteStore;
use strike_book::{StrikeBook, StrikeLevels};
use vol_surface::VolSurface;

/// Shared session state handed to every task. One instance per process;
/// nothing in here is a module-level singleton.
pub struct EngineContext {
    pub cfg: EngineConfig,
    pub quotes: Arc<QuoteStore>,
    pub surface: Arc<VolSurface>,
    pub metrics: Arc<Metrics>,
    book: Mutex<StrikeBook>,
    /// Spot seeded from the startup chain snapshot, used when the live
    /// index entry is missing or stale.
    fallback_spot: RwLock<Option<f64>>,
}

impl EngineContext {
    pub fn new(
        cfg: EngineConfig,
        quotes: Arc<QuoteStore>,
        surface: Arc<VolSurface>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let book = Mutex::new(StrikeBook::new(cfg.contract_multiplier));
        Arc::new(Self {
            cfg,
            quotes,
            surface,
            metrics,
            book,
            fallback_spot: RwLock::new(None),
        })
    }

    pub fn set_fallback_spot(&self, spot: f64) {
        if spot > 0.0 {
            *self.fallback_spot.write() = Some(spot);
        }
    }

    /// Current underlying spot: live index quote first, snapshot-seeded
    /// fallback second.
    pub fn spot(&self, now_ms: i64) -> Option<f64> {
        self.quotes
            .spot(&self.cfg.index_symbol, now_ms, self.stale_ms())
            .or(*self.fallback_spot.read())
    }

    pub fn stale_ms(&self) -> i64 {
        (self.cfg.quote_stale_s * 1_000.0) as i64
    }

    /// Run `f` against the book under its lock. The engine task is the only
    /// mutator; the snapshot task takes read-style passes through here too,
    /// which keeps its view consistent.
    pub fn with_book<T>(&self, f: impl FnOnce(&mut StrikeBook) -> T) -> T {
        f(&mut self.book.lock())
    }

    pub fn aggregate_gamma(&self) -> f64 {
        self.book.lock().aggregate_gamma()
    }

    pub fn by_strike(&self) -> Vec<StrikeLevels> {
        self.book.lock().by_strike()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::types::Quote;

    fn context() -> Arc<EngineContext> {
        let cfg = EngineConfig::default();
        let surface = Arc::new(VolSurface::new(
            core_types::config::SurfaceConfig::default(),
            cfg.risk_free_rate,
            cfg.dividend_yield,
        ));
        EngineContext::new(
            cfg,
            Arc::new(QuoteStore::new()),
            surface,
            Arc::new(Metrics::new()),
        )
    }

    #[test]
    fn spot_prefers_live_index_over_fallback() {
        let ctx = context();
        ctx.set_fallback_spot(5890.0);
        assert_eq!(ctx.spot(1_000), Some(5890.0));
        ctx.quotes.put(
            "I:SPX",
            Quote {
                bid: 5900.0,
                ask: 5900.0,
                ts_ms: 1_000,
            },
        );
        assert_eq!(ctx.spot(1_500), Some(5900.0));
        // Stale index entry falls back to the seeded spot.
        assert_eq!(ctx.spot(10_000), Some(5890.0));
    }

    #[test]
    fn missing_spot_everywhere_is_none() {
        let ctx = context();
        assert_eq!(ctx.spot(1_000), None);
        ctx.set_fallback_spot(-1.0); // ignored
        assert_eq!(ctx.spot(1_000), None);
    }
}
