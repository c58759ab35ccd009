use core_types::types::{Quote, TradeSide};

/// Infer the customer side of a print from the freshest NBBO.
///
/// At or through the ask is a customer buy; at or through the bid is a
/// customer sell. Inside the spread the print leans toward whichever side
/// of the midpoint it landed on, and an exact-mid print stays unknown even
/// on a one-tick market. No usable quote (missing, stale, crossed, or
/// one-sided) also yields unknown.
pub fn classify(price: f64, quote: Option<&Quote>, now_ms: i64, stale_ms: i64) -> TradeSide {
    let Some(quote) = quote else {
        return TradeSide::Unknown;
    };
    if !quote.is_usable(now_ms, stale_ms) {
        return TradeSide::Unknown;
    }
    if price >= quote.ask {
        return TradeSide::Buy;
    }
    if price <= quote.bid {
        return TradeSide::Sell;
    }
    let mid = 0.5 * (quote.bid + quote.ask);
    if price > mid {
        TradeSide::Buy
    } else if price < mid {
        TradeSide::Sell
    } else {
        TradeSide::Unknown
    }
}
