use std::sync::Arc;

use core_types::channel::TradeReceiver;
use core_types::occ::parse_occ;
use core_types::status::{OverallStatus, ServiceStatusHandle, StatusGauge};
use core_types::types::{OptionTrade, TradeSide};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::classify::classify;
use crate::context::EngineContext;

const SECONDS_PER_YEAR: f64 = 31_536_000.0;

/// Terminal state of one trade through the
/// received -> classified -> priced -> applied lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TradeOutcome {
    Applied { side: TradeSide, gamma: f64, delta_g: f64 },
    UnknownSide,
    ParseFailure,
    Expired,
    MissingSpot,
    NonFiniteGamma,
}

pub struct DealerEngine {
    ctx: Arc<EngineContext>,
    status: ServiceStatusHandle,
}

impl DealerEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let status = ServiceStatusHandle::new("dealer_engine");
        status.push_warning("engine not started");
        Self { ctx, status }
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    /// Drain the trade channel until it closes (orderly shutdown) or the
    /// token fires (abandon). Trades apply strictly in arrival order.
    pub fn start(self, rx: TradeReceiver, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(rx, cancel).await })
    }

    async fn run(self, mut rx: TradeReceiver, cancel: CancellationToken) {
        self.status.clear_warnings_matching(|_| true);
        self.status.set_overall(OverallStatus::Ok);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("dealer engine abandoned with {} trades unread", rx.len());
                    break;
                }
                maybe_trade = rx.recv() => {
                    let Some(trade) = maybe_trade else {
                        info!("trade channel closed; dealer engine drained");
                        break;
                    };
                    self.process(&trade);
                    self.publish_gauges(rx.len());
                }
            }
        }
        self.status.set_overall(OverallStatus::Warn);
        self.status.push_warning("engine stopped");
    }

    /// Classify, revalue, and book one trade. Every return path lands in
    /// exactly one counter.
    pub fn process(&self, trade: &OptionTrade) -> TradeOutcome {
        let metrics = &self.ctx.metrics;
        let contract = match parse_occ(&trade.symbol) {
            Ok(contract) => contract,
            Err(err) => {
                metrics.trades_parse_failure.inc();
                debug!("dropping trade with bad symbol: {err}");
                return TradeOutcome::ParseFailure;
            }
        };

        let now_ms = trade.ts_ms;
        let quote = self.ctx.quotes.get(&trade.symbol);
        let side = classify(trade.price, quote.as_ref(), now_ms, self.ctx.stale_ms());
        if side == TradeSide::Unknown {
            metrics.trades_unknown_side.inc();
            return TradeOutcome::UnknownSide;
        }

        let tau = (contract.expiry_close_ms() - now_ms) as f64 / 1_000.0 / SECONDS_PER_YEAR;
        if tau <= 0.0 {
            metrics.trades_expired.inc();
            return TradeOutcome::Expired;
        }

        let Some(spot) = self.ctx.spot(now_ms) else {
            metrics.trades_missing_spot.inc();
            return TradeOutcome::MissingSpot;
        };

        // A Buy/Sell classification implies a usable two-sided quote.
        let Some(mid) = quote.as_ref().and_then(|q| q.mid()) else {
            metrics.trades_unknown_side.inc();
            return TradeOutcome::UnknownSide;
        };

        let Some(iv) = self.ctx.surface.iv_for(
            &trade.symbol,
            contract.right,
            spot,
            contract.strike(),
            tau,
            mid,
            now_ms,
        ) else {
            metrics.trades_non_finite_gamma.inc();
            return TradeOutcome::NonFiniteGamma;
        };
        if iv.from_fallback {
            metrics.iv_fallback_used.inc();
        }

        let gamma = greeks_engine::gamma(
            spot,
            contract.strike(),
            tau,
            iv.sigma,
            self.ctx.cfg.risk_free_rate,
            self.ctx.cfg.dividend_yield,
        );
        if !gamma.is_finite() {
            metrics.trades_non_finite_gamma.inc();
            return TradeOutcome::NonFiniteGamma;
        }

        let delta_g = self.ctx.with_book(|book| {
            book.apply(contract.strike_key(), side, trade.size, gamma, trade.ts_ms)
        });
        metrics.trades_applied.inc();
        TradeOutcome::Applied { side, gamma, delta_g }
    }

    fn publish_gauges(&self, channel_depth: usize) {
        let metrics = &self.ctx.metrics;
        metrics.channel_depth.set(channel_depth as i64);
        let strikes = self.ctx.with_book(|book| book.len());
        metrics.book_strikes.set(strikes as i64);
        self.status.set_gauges(vec![
            StatusGauge {
                label: "channel_depth".to_string(),
                value: channel_depth as f64,
                max: Some(self.ctx.cfg.channel_capacity as f64),
                unit: Some("trades".to_string()),
            },
            StatusGauge {
                label: "book_strikes".to_string(),
                value: strikes as f64,
                max: None,
                unit: Some("rows".to_string()),
            },
        ]);
    }
}
