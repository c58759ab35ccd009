// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Call/put discriminator carried through every strike-level structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'C' | 'c' => Some(OptionRight::Call),
            'P' | 'p' => Some(OptionRight::Put),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            OptionRight::Call => 'C',
            OptionRight::Put => 'P',
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, OptionRight::Call)
    }
}

/// Inferred aggressor of a trade, from the customer's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

impl TradeSide {
    /// Customer sign: +1 when the customer bought, -1 when the customer
    /// sold, 0 when unclassified. The dealer carries the opposite sign.
    pub fn customer_sign(&self) -> i64 {
        match self {
            TradeSide::Buy => 1,
            TradeSide::Sell => -1,
            TradeSide::Unknown => 0,
        }
    }
}

/// Latest NBBO (or index value) for one symbol. Timestamps are wire epoch
/// milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub ts_ms: i64,
}

impl Quote {
    /// A quote participates in classification only when both sides are
    /// strictly positive, uncrossed, and within the staleness window.
    pub fn is_usable(&self, now_ms: i64, stale_ms: i64) -> bool {
        self.bid > 0.0
            && self.ask > 0.0
            && self.bid <= self.ask
            && now_ms.saturating_sub(self.ts_ms) <= stale_ms
    }

    pub fn is_crossed(&self) -> bool {
        self.bid > self.ask
    }

    pub fn mid(&self) -> Option<f64> {
        if self.bid > 0.0 && self.ask > 0.0 {
            Some(0.5 * (self.bid + self.ask))
        } else {
            None
        }
    }
}

/// One option trade as it moves through the engine. `side` starts out
/// `Unknown` and is filled in by classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionTrade {
    pub symbol: String,
    pub price: f64,
    pub size: u32,
    pub ts_ms: i64,
    pub side: TradeSide,
    pub conditions: Vec<i32>,
    /// Dealer side as reported by the venue on rare prints. Parsed and
    /// retained, but never consulted by the accounting path.
    pub reported_dealer_side: Option<char>,
}

impl OptionTrade {
    pub fn new(symbol: impl Into<String>, price: f64, size: u32, ts_ms: i64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            size,
            ts_ms,
            side: TradeSide::Unknown,
            conditions: Vec::new(),
            reported_dealer_side: None,
        }
    }
}

/// Identity of a strike-book row. Strikes are kept in integer thousandths
/// (the OCC wire encoding) so the key is hashable and exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrikeKey {
    pub expiry: NaiveDate,
    pub right: OptionRight,
    pub strike_mils: i64,
}

impl StrikeKey {
    pub fn strike(&self) -> f64 {
        self.strike_mils as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_quote_requires_positive_uncrossed_fresh() {
        let q = Quote {
            bid: 5.0,
            ask: 5.1,
            ts_ms: 1_000,
        };
        assert!(q.is_usable(2_000, 5_000));
        assert!(!q.is_usable(7_000, 5_000)); // stale
        let crossed = Quote {
            bid: 5.2,
            ask: 5.1,
            ts_ms: 1_000,
        };
        assert!(crossed.is_crossed());
        assert!(!crossed.is_usable(2_000, 5_000));
        let one_sided = Quote {
            bid: 0.0,
            ask: 5.1,
            ts_ms: 1_000,
        };
        assert!(!one_sided.is_usable(2_000, 5_000));
        assert_eq!(one_sided.mid(), None);
    }

    #[test]
    fn customer_sign_convention() {
        assert_eq!(TradeSide::Buy.customer_sign(), 1);
        assert_eq!(TradeSide::Sell.customer_sign(), -1);
        assert_eq!(TradeSide::Unknown.customer_sign(), 0);
    }

    #[test]
    fn strike_key_restores_decimal_strike() {
        let key = StrikeKey {
            expiry: NaiveDate::from_ymd_opt(2025, 5, 30).unwrap(),
            right: OptionRight::Call,
            strike_mils: 5_900_000,
        };
        assert_eq!(key.strike(), 5900.0);
    }
}
