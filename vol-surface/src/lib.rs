// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Memoized implied-vol surface. Keys are coarsened (underlying bucketed to
//! whole points, time-to-expiry bucketed to minutes) so neighbouring trades
//! share a solve; entries expire on a TTL and the whole cache is bounded
//! with LRU eviction. When the solver fails, a moneyness fallback vol is
//! served and cached under a shorter TTL so a real solve replaces it soon.

use core_types::config::SurfaceConfig;
use core_types::types::OptionRight;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

const SECONDS_PER_YEAR: f64 = 31_536_000.0;
const FALLBACK_MIN_VOL: f64 = 0.05;
const FALLBACK_MAX_VOL: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SurfaceKey {
    symbol: String,
    under_bucket: i64,
    ttm_bucket: i64,
}

#[derive(Debug, Clone, Copy)]
struct SurfaceEntry {
    sigma: f64,
    computed_at_ms: i64,
    fallback: bool,
}

/// A vol handed back to the pricing path, flagged when it came from the
/// moneyness fallback rather than a converged solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvSolution {
    pub sigma: f64,
    pub from_fallback: bool,
}

pub struct VolSurface {
    cfg: SurfaceConfig,
    rate: f64,
    dividend_yield: f64,
    entries: Mutex<LruCache<SurfaceKey, SurfaceEntry>>,
}

impl VolSurface {
    pub fn new(cfg: SurfaceConfig, rate: f64, dividend_yield: f64) -> Self {
        let capacity = NonZeroUsize::new(cfg.capacity.max(1)).expect("nonzero capacity");
        Self {
            cfg,
            rate,
            dividend_yield,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached-or-computed sigma for one contract at the current market.
    /// `None` only when the inputs are unusable for both the solver and the
    /// fallback (non-positive spot or strike).
    pub fn iv_for(
        &self,
        symbol: &str,
        right: OptionRight,
        spot: f64,
        strike: f64,
        tau_years: f64,
        mid_price: f64,
        now_ms: i64,
    ) -> Option<IvSolution> {
        if spot <= 0.0 || strike <= 0.0 {
            return None;
        }
        let key = self.bucket_key(symbol, spot, tau_years);
        {
            let mut guard = self.entries.lock();
            if let Some(entry) = guard.get(&key) {
                let ttl_ms = self.ttl_ms(entry.fallback);
                if now_ms.saturating_sub(entry.computed_at_ms) <= ttl_ms {
                    return Some(IvSolution {
                        sigma: entry.sigma,
                        from_fallback: entry.fallback,
                    });
                }
            }
        }

        let solved = greeks_engine::implied_vol(
            right,
            mid_price,
            spot,
            strike,
            self.rate,
            self.dividend_yield,
            tau_years,
        )
        .filter(|sigma| sigma.is_finite() && *sigma > 0.0 && *sigma < greeks_engine::MAX_VOL);

        let (sigma, fallback) = match solved {
            Some(sigma) => (sigma, false),
            None => (self.moneyness_fallback(spot, strike), true),
        };
        let mut guard = self.entries.lock();
        guard.put(
            key,
            SurfaceEntry {
                sigma,
                computed_at_ms: now_ms,
                fallback,
            },
        );
        Some(IvSolution {
            sigma,
            from_fallback: fallback,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn bucket_key(&self, symbol: &str, spot: f64, tau_years: f64) -> SurfaceKey {
        let points = self.cfg.under_bucket_points.max(1e-9);
        let ttm_step = self.cfg.ttm_bucket_s.max(1.0);
        SurfaceKey {
            symbol: symbol.to_string(),
            under_bucket: (spot / points).round() as i64,
            ttm_bucket: (tau_years * SECONDS_PER_YEAR / ttm_step).floor() as i64,
        }
    }

    fn ttl_ms(&self, fallback: bool) -> i64 {
        let ttl_s = if fallback {
            self.cfg.fallback_ttl_s
        } else {
            self.cfg.ttl_s
        };
        (ttl_s * 1_000.0) as i64
    }

    fn moneyness_fallback(&self, spot: f64, strike: f64) -> f64 {
        let moneyness = (strike / spot).ln().abs();
        (self.cfg.fallback_base_iv + self.cfg.fallback_slope * moneyness)
            .clamp(FALLBACK_MIN_VOL, FALLBACK_MAX_VOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::types::OptionRight;

    const TAU: f64 = 0.02;

    fn surface(capacity: usize) -> VolSurface {
        let cfg = SurfaceConfig {
            capacity,
            ..SurfaceConfig::default()
        };
        VolSurface::new(cfg, 0.0, 0.0)
    }

    fn fair_mid(vol: f64) -> f64 {
        greeks_engine::bs_price(OptionRight::Call, 5900.0, 5850.0, 0.0, 0.0, vol, TAU).unwrap()
    }

    #[test]
    fn solves_and_memoizes_within_ttl() {
        let surface = surface(16);
        let first = surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5850.0, TAU, fair_mid(0.2), 1_000)
            .unwrap();
        assert!(!first.from_fallback);
        assert!((first.sigma - 0.2).abs() < 1e-2);
        // Different mid inside the TTL: the cached sigma is returned as-is.
        let second = surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5850.0, TAU, fair_mid(0.5), 2_000)
            .unwrap();
        assert_eq!(second.sigma, first.sigma);
        assert_eq!(surface.len(), 1);
    }

    #[test]
    fn expired_entry_is_resolved() {
        let surface = surface(16);
        surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5850.0, TAU, fair_mid(0.2), 0)
            .unwrap();
        let after_ttl = surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5850.0, TAU, fair_mid(0.5), 31_000)
            .unwrap();
        assert!((after_ttl.sigma - 0.5).abs() < 1e-2);
    }

    #[test]
    fn solver_failure_serves_clamped_moneyness_fallback() {
        let surface = surface(16);
        // Mid below intrinsic: unsolvable, so the smile approximation kicks in.
        let out = surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5800.0, TAU, 1.0, 1_000)
            .unwrap();
        assert!(out.from_fallback);
        let expected = 0.2 + 0.5 * (5800.0f64 / 5900.0).ln().abs();
        assert!((out.sigma - expected).abs() < 1e-12);
    }

    #[test]
    fn fallback_expires_on_the_short_ttl() {
        let surface = surface(16);
        let fb = surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5850.0, TAU, 1e-7, 0)
            .unwrap();
        assert!(fb.from_fallback);
        // 11s later the fallback entry is stale (10s TTL) and a good mid
        // produces a converged solve.
        let solved = surface
            .iv_for("SPXW...C", OptionRight::Call, 5900.0, 5850.0, TAU, fair_mid(0.3), 11_000)
            .unwrap();
        assert!(!solved.from_fallback);
        assert!((solved.sigma - 0.3).abs() < 1e-2);
    }

    #[test]
    fn capacity_bound_evicts_least_recently_used() {
        let surface = surface(2);
        for (i, sym) in ["A", "B", "C"].iter().enumerate() {
            surface
                .iv_for(sym, OptionRight::Call, 5900.0, 5850.0, TAU, fair_mid(0.2), i as i64)
                .unwrap();
        }
        assert_eq!(surface.len(), 2);
    }

    #[test]
    fn invalid_market_inputs_yield_none() {
        let surface = surface(16);
        assert!(surface
            .iv_for("X", OptionRight::Call, 0.0, 5850.0, TAU, 5.0, 0)
            .is_none());
        assert!(surface
            .iv_for("X", OptionRight::Call, 5900.0, -1.0, TAU, 5.0, 0)
            .is_none());
    }
}
