// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! OCC option-symbol grammar: `[O:]<root><YYMMDD><C|P><strike*1000, 8 digits>`,
//! e.g. `SPXW250530C05900000` = SPXW, 2025-05-30, call, strike 5900.000.

use chrono::NaiveDate;
use thiserror::Error;

use crate::types::{OptionRight, StrikeKey};

/// The trailing fixed-width portion: 6 date digits + right + 8 strike digits.
const TAIL_LEN: usize = 15;

/// Index options settle on the New York close; 16:00 ET is approximated as
/// 20:00 UTC for time-to-expiry purposes.
const SESSION_CLOSE_UTC_HOUR: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccContract {
    pub root: String,
    pub expiry: NaiveDate,
    pub right: OptionRight,
    pub strike_mils: i64,
}

impl OccContract {
    pub fn strike(&self) -> f64 {
        self.strike_mils as f64 / 1000.0
    }

    pub fn strike_key(&self) -> StrikeKey {
        StrikeKey {
            expiry: self.expiry,
            right: self.right,
            strike_mils: self.strike_mils,
        }
    }

    /// Epoch milliseconds of the contract's session-close settlement.
    pub fn expiry_close_ms(&self) -> i64 {
        self.expiry
            .and_hms_opt(SESSION_CLOSE_UTC_HOUR, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OccError {
    #[error("symbol too short for OCC grammar: {0}")]
    TooShort(String),
    #[error("bad expiry date in symbol: {0}")]
    BadDate(String),
    #[error("bad right character '{right}' in symbol: {symbol}")]
    BadRight { symbol: String, right: char },
    #[error("bad strike digits in symbol: {0}")]
    BadStrike(String),
}

/// Parse an OCC symbol with or without the `O:` feed prefix.
pub fn parse_occ(symbol: &str) -> Result<OccContract, OccError> {
    let body = symbol.strip_prefix("O:").unwrap_or(symbol);
    if body.len() < TAIL_LEN + 1 || !body.is_ascii() {
        return Err(OccError::TooShort(symbol.to_string()));
    }
    let split = body.len() - TAIL_LEN;
    let (root, tail) = body.split_at(split);

    let yy: u32 = tail[0..2]
        .parse()
        .map_err(|_| OccError::BadDate(symbol.to_string()))?;
    let mm: u32 = tail[2..4]
        .parse()
        .map_err(|_| OccError::BadDate(symbol.to_string()))?;
    let dd: u32 = tail[4..6]
        .parse()
        .map_err(|_| OccError::BadDate(symbol.to_string()))?;
    let expiry = NaiveDate::from_ymd_opt(2000 + yy as i32, mm, dd)
        .ok_or_else(|| OccError::BadDate(symbol.to_string()))?;

    let right_char = tail.as_bytes()[6] as char;
    let right = OptionRight::from_char(right_char).ok_or(OccError::BadRight {
        symbol: symbol.to_string(),
        right: right_char,
    })?;

    let strike_digits = &tail[7..];
    if !strike_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(OccError::BadStrike(symbol.to_string()));
    }
    let strike_mils: i64 = strike_digits
        .parse()
        .map_err(|_| OccError::BadStrike(symbol.to_string()))?;

    Ok(OccContract {
        root: root.to_string(),
        expiry,
        right,
        strike_mils,
    })
}

/// Render the wire form (no `O:` prefix) for a contract.
pub fn format_occ(root: &str, expiry: NaiveDate, right: OptionRight, strike_mils: i64) -> String {
    use chrono::Datelike;
    format!(
        "{}{:02}{:02}{:02}{}{:08}",
        root,
        expiry.year() % 100,
        expiry.month(),
        expiry.day(),
        right.as_char(),
        strike_mils
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_prefixed_symbols() {
        for sym in ["SPXW250530C05900000", "O:SPXW250530C05900000"] {
            let c = parse_occ(sym).unwrap();
            assert_eq!(c.root, "SPXW");
            assert_eq!(c.expiry, NaiveDate::from_ymd_opt(2025, 5, 30).unwrap());
            assert_eq!(c.right, OptionRight::Call);
            assert_eq!(c.strike(), 5900.0);
        }
    }

    #[test]
    fn parses_puts_and_fractional_strikes() {
        let c = parse_occ("O:SPX250530P05872500").unwrap();
        assert_eq!(c.root, "SPX");
        assert_eq!(c.right, OptionRight::Put);
        assert_eq!(c.strike(), 5872.5);
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert!(matches!(parse_occ("SPXW"), Err(OccError::TooShort(_))));
        assert!(matches!(
            parse_occ("SPXW259930C05900000"),
            Err(OccError::BadDate(_))
        ));
        assert!(matches!(
            parse_occ("SPXW250530X05900000"),
            Err(OccError::BadRight { .. })
        ));
        assert!(matches!(
            parse_occ("SPXW250530C05900X00"),
            Err(OccError::BadStrike(_))
        ));
    }

    #[test]
    fn round_trips_through_format() {
        let c = parse_occ("SPXW250530C05900000").unwrap();
        assert_eq!(
            format_occ(&c.root, c.expiry, c.right, c.strike_mils),
            "SPXW250530C05900000"
        );
    }

    #[test]
    fn expiry_close_lands_same_day() {
        let c = parse_occ("SPXW250530C05900000").unwrap();
        let close_ms = c.expiry_close_ms();
        // 2025-05-30T20:00:00Z
        assert_eq!(close_ms, 1_748_635_200_000);
    }
}
