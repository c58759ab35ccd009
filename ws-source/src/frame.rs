// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Wire frames. The feed delivers JSON arrays of heterogeneous events
//! discriminated by `ev`: trades (`T`), quotes (`Q`), and control/status
//! frames. Index-level prints arrive as quotes under the `I:` symbol
//! prefix and flow through the same path.

use core_types::types::{OptionTrade, Quote, TradeSide};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "ev")]
pub enum WireFrame {
    #[serde(rename = "T")]
    Trade(WireTrade),
    #[serde(rename = "Q")]
    Quote(WireQuote),
    #[serde(rename = "status")]
    Status(WireStatus),
    /// Heartbeats and event kinds this engine does not consume.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WireTrade {
    pub sym: String,
    pub p: f64,
    pub s: u32,
    pub t: i64,
    #[serde(default)]
    pub c: Vec<i32>,
    /// Venue-reported dealer side on rare prints; carried but unused.
    #[serde(default)]
    pub ds: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WireQuote {
    pub sym: String,
    pub bp: f64,
    pub ap: f64,
    pub t: i64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WireStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl WireTrade {
    pub fn into_trade(self) -> OptionTrade {
        OptionTrade {
            symbol: self.sym,
            price: self.p,
            size: self.s,
            ts_ms: self.t,
            side: TradeSide::Unknown,
            conditions: self.c,
            reported_dealer_side: self.ds.and_then(|s| s.chars().next()),
        }
    }
}

impl WireQuote {
    pub fn quote(&self) -> Quote {
        Quote {
            bid: self.bp,
            ask: self.ap,
            ts_ms: self.t,
        }
    }
}

/// Parse one text message. The feed batches events into arrays but sends
/// some control frames as bare objects.
pub fn parse_frames(text: &str) -> Result<Vec<WireFrame>, serde_json::Error> {
    match serde_json::from_str::<Vec<WireFrame>>(text) {
        Ok(frames) => Ok(frames),
        Err(_) => serde_json::from_str::<WireFrame>(text).map(|frame| vec![frame]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_event_array() {
        let text = r#"[
            {"ev":"T","sym":"O:SPXW250530C05900000","p":5.1,"s":10,"t":1748600000000},
            {"ev":"Q","sym":"O:SPXW250530C05900000","bp":5.0,"ap":5.1,"t":1748600000100},
            {"ev":"status","status":"success","message":"subscribed"}
        ]"#;
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 3);
        match &frames[0] {
            WireFrame::Trade(t) => {
                assert_eq!(t.sym, "O:SPXW250530C05900000");
                assert_eq!(t.s, 10);
                assert!(t.ds.is_none());
            }
            other => panic!("expected trade, got {other:?}"),
        }
        match &frames[1] {
            WireFrame::Quote(q) => assert_eq!(q.quote().mid(), Some(5.05)),
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn parses_bare_status_object() {
        let frames = parse_frames(r#"{"ev":"status","status":"connected"}"#).unwrap();
        assert_eq!(
            frames,
            vec![WireFrame::Status(WireStatus {
                status: "connected".to_string(),
                message: String::new(),
            })]
        );
    }

    #[test]
    fn unknown_event_kinds_are_tolerated() {
        let frames = parse_frames(r#"[{"ev":"A","sym":"SPY","v":100}]"#).unwrap();
        assert_eq!(frames, vec![WireFrame::Other]);
    }

    #[test]
    fn index_quote_parses_like_any_other() {
        let frames =
            parse_frames(r#"[{"ev":"Q","sym":"I:SPX","bp":5900.0,"ap":5900.0,"t":1748600000000}]"#)
                .unwrap();
        match &frames[0] {
            WireFrame::Quote(q) => {
                assert_eq!(q.sym, "I:SPX");
                assert_eq!(q.quote().mid(), Some(5900.0));
            }
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn reported_dealer_side_is_retained() {
        let frames = parse_frames(
            r#"[{"ev":"T","sym":"O:SPXW250530C05900000","p":5.1,"s":1,"t":1,"ds":"B"}]"#,
        )
        .unwrap();
        match frames.into_iter().next().unwrap() {
            WireFrame::Trade(t) => {
                let trade = t.into_trade();
                assert_eq!(trade.reported_dealer_side, Some('B'));
                assert_eq!(trade.side, TradeSide::Unknown);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }
}
