// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Intraday dealer book keyed by (expiry, right, strike).
//!
//! Sign convention: `net_customer_contracts` is the customer's net position
//! (+ = customer bought from the dealer), while `cum_gamma_weighted` carries
//! the dealer's side, so a customer buy subtracts gamma and a customer sell
//! adds it. Expired contracts never reach `apply`; the engine drops them
//! before pricing, so a row only ever moves by a classified live trade.

use core_types::types::{OptionRight, StrikeKey, TradeSide};
use std::collections::HashMap;

/// One row of the book. Created lazily on first trade, retained for the
/// whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BookEntry {
    pub net_customer_contracts: i64,
    pub cum_gamma_weighted: f64,
    pub last_update_ms: i64,
}

/// Per-strike rollup for pin analysis: calls and puts separately, plus net.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrikeLevels {
    pub strike: f64,
    pub call_gamma: f64,
    pub put_gamma: f64,
    pub net_gamma: f64,
    pub net_customer_contracts: i64,
}

pub struct StrikeBook {
    entries: HashMap<StrikeKey, BookEntry>,
    multiplier: f64,
}

impl StrikeBook {
    pub fn new(contract_multiplier: f64) -> Self {
        Self {
            entries: HashMap::new(),
            multiplier: contract_multiplier,
        }
    }

    /// Apply one classified trade. Returns the dealer-gamma delta that was
    /// booked (`-sign * size * gamma * multiplier`); unknown-side trades
    /// leave the book untouched and return 0.
    pub fn apply(
        &mut self,
        key: StrikeKey,
        side: TradeSide,
        size: u32,
        gamma_per_contract: f64,
        ts_ms: i64,
    ) -> f64 {
        let sign = side.customer_sign();
        if sign == 0 {
            return 0.0;
        }
        let entry = self.entries.entry(key).or_default();
        entry.net_customer_contracts += sign * size as i64;
        let delta = -(sign as f64) * size as f64 * gamma_per_contract * self.multiplier;
        entry.cum_gamma_weighted += delta;
        entry.last_update_ms = ts_ms;
        delta
    }

    /// Aggregate dealer gamma across every row. O(rows), bounded by the
    /// option chain.
    pub fn aggregate_gamma(&self) -> f64 {
        self.entries.values().map(|e| e.cum_gamma_weighted).sum()
    }

    /// Snapshot grouped by strike (expiries collapse together), sorted
    /// ascending by strike.
    pub fn by_strike(&self) -> Vec<StrikeLevels> {
        let mut grouped: HashMap<i64, StrikeLevels> = HashMap::new();
        for (key, entry) in &self.entries {
            let level = grouped.entry(key.strike_mils).or_insert(StrikeLevels {
                strike: key.strike(),
                call_gamma: 0.0,
                put_gamma: 0.0,
                net_gamma: 0.0,
                net_customer_contracts: 0,
            });
            match key.right {
                OptionRight::Call => level.call_gamma += entry.cum_gamma_weighted,
                OptionRight::Put => level.put_gamma += entry.cum_gamma_weighted,
            }
            level.net_gamma += entry.cum_gamma_weighted;
            level.net_customer_contracts += entry.net_customer_contracts;
        }
        let mut levels: Vec<StrikeLevels> = grouped.into_values().collect();
        levels.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        levels
    }

    pub fn entry(&self, key: &StrikeKey) -> Option<BookEntry> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
