// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Ingest task plus its reconnect supervisor. Owns the upstream websocket:
//! parses frames, writes quotes into the cache in place (synchronously,
//! before the next frame is touched, which is what makes a quote visible
//! to the engine before any trade enqueued after it), and pushes trades
//! onto the bounded channel. On disconnect the supervisor redials with
//! jittered exponential backoff and re-subscribes the full symbol set in
//! batches.

use std::sync::Arc;
use std::time::Duration;

use core_types::channel::{ChannelClosed, SendOutcome, TradeSender};
use core_types::config::WsConfig;
use core_types::retry::Backoff;
use core_types::status::{OverallStatus, ServiceStatusHandle};
use log::{debug, error, info, warn};
use metrics::Metrics;
use quote_cache::{QuoteStore, QuoteUpdate};
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use ws_source::frame::WireFrame;
use ws_source::worker::{WsError, WsWorker};

/// Backoff exponent that pins the delay at the configured cap, used after
/// authentication gives up entirely.
const CAP_ATTEMPT: u32 = 31;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Ws(#[from] WsError),
    #[error("trade channel closed under the ingest task")]
    ChannelClosed,
}

enum SessionEnd {
    Cancelled,
    /// Upstream closed or errored; carries the number of frames seen so the
    /// supervisor can tell a working session from a flapping one.
    Closed(u64),
}

pub struct IngestService {
    cfg: WsConfig,
    api_key: String,
    topics: Vec<String>,
    quotes: Arc<QuoteStore>,
    metrics: Arc<Metrics>,
    status: ServiceStatusHandle,
}

impl IngestService {
    pub fn new(
        cfg: WsConfig,
        api_key: impl Into<String>,
        topics: Vec<String>,
        quotes: Arc<QuoteStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let status = ServiceStatusHandle::new("ingest");
        status.push_warning("ingest not started");
        Self {
            cfg,
            api_key: api_key.into(),
            topics,
            quotes,
            metrics,
            status,
        }
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    pub fn start(self, tx: TradeSender, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(tx, cancel).await })
    }

    async fn run(self, tx: TradeSender, cancel: CancellationToken) {
        self.status.clear_warnings_matching(|_| true);
        if self.topics.is_empty() {
            error!("ingest has no subscription topics; refusing to start");
            self.status.set_overall(OverallStatus::Crit);
            self.status.push_error("empty subscription topic set");
            return;
        }
        let worker = match WsWorker::new(&self.cfg.ws_url, self.api_key.clone()) {
            Ok(worker) => worker,
            Err(err) => {
                error!("bad websocket endpoint: {err}");
                self.status.set_overall(OverallStatus::Crit);
                self.status.push_error(format!("bad websocket endpoint: {err}"));
                return;
            }
        };
        let backoff = Backoff::from_seconds(
            self.cfg.reconnect_initial_s,
            self.cfg.reconnect_cap_s,
            self.cfg.reconnect_jitter_pct,
        );
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.run_session(&worker, &tx, &cancel).await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::Closed(frames_seen)) => {
                    if frames_seen > 0 {
                        attempt = 0;
                    }
                    warn!("upstream closed after {frames_seen} frames; reconnecting");
                    self.status.set_overall(OverallStatus::Warn);
                    self.status.push_warning("upstream disconnected; reconnecting");
                }
                Err(IngestError::ChannelClosed) => {
                    info!("trade channel closed; ingest exiting");
                    break;
                }
                Err(IngestError::Ws(err)) => {
                    self.status.set_overall(OverallStatus::Crit);
                    self.status.push_error(format!("ws session error: {err}"));
                    error!("ws session error: {err}");
                    if matches!(err, WsError::AuthRejected(_) | WsError::AuthTimeout) {
                        // Auth retries are exhausted inside the session;
                        // restart only after the cap backoff.
                        attempt = CAP_ATTEMPT;
                    }
                }
            }
            self.metrics.ws_reconnects.inc();
            let delay = backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            info!("reconnecting in {delay:?}");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        tx.close();
        self.status.set_overall(OverallStatus::Warn);
        self.status.push_warning("ingest stopped");
    }

    async fn run_session(
        &self,
        worker: &WsWorker,
        tx: &TradeSender,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, IngestError> {
        let auth_backoff = Backoff::from_seconds(1.0, self.cfg.reconnect_cap_s, 0.25);
        let mut session = auth_backoff
            .retry(self.cfg.auth_max_attempts, |attempt| {
                if attempt > 0 {
                    debug!("auth attempt {}", attempt + 1);
                }
                worker.connect()
            })
            .await?;
        session
            .subscribe(
                &self.topics,
                self.cfg.subscribe_batch,
                Duration::from_millis(self.cfg.subscribe_batch_delay_ms),
            )
            .await?;
        self.status.clear_errors_matching(|m| m.contains("ws session"));
        self.status.clear_warnings_matching(|m| m.contains("reconnecting"));
        self.status.set_overall(OverallStatus::Ok);
        info!("streaming {} topics", self.topics.len());

        let mut frames_seen = 0u64;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    session.close().await;
                    return Ok(SessionEnd::Cancelled);
                }
                next = session.next_events() => {
                    let Some(frames) = next? else {
                        return Ok(SessionEnd::Closed(frames_seen));
                    };
                    frames_seen += frames.len() as u64;
                    for frame in frames {
                        apply_frame(frame, &self.quotes, &self.metrics, tx)
                            .await
                            .map_err(|ChannelClosed| IngestError::ChannelClosed)?;
                    }
                }
            }
        }
    }
}

/// Route one parsed frame: quotes mutate the cache in place, trades go to
/// the engine channel with the drop-oldest backpressure accounting.
pub async fn apply_frame(
    frame: WireFrame,
    quotes: &QuoteStore,
    metrics: &Metrics,
    tx: &TradeSender,
) -> Result<(), ChannelClosed> {
    match frame {
        WireFrame::Quote(wire) => {
            let quote = wire.quote();
            match quotes.put(&wire.sym, quote) {
                QuoteUpdate::Applied | QuoteUpdate::StaleDiscarded => {}
                QuoteUpdate::Rejected => {
                    metrics.quote_rejected.inc();
                    warn!(
                        "rejected crossed quote {} {}x{}",
                        wire.sym, quote.bid, quote.ask
                    );
                }
            }
        }
        WireFrame::Trade(wire) => match tx.send(wire.into_trade()).await? {
            SendOutcome::Enqueued => {}
            SendOutcome::DroppedOldest => {
                metrics.trade_dropped_backpressure.inc();
            }
        },
        WireFrame::Status(status) => {
            debug!("upstream status: {} {}", status.status, status.message);
        }
        WireFrame::Other => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::channel::trade_channel;
    use ws_source::frame::{WireQuote, WireTrade};

    fn quote_frame(sym: &str, bid: f64, ask: f64, ts: i64) -> WireFrame {
        WireFrame::Quote(WireQuote {
            sym: sym.to_string(),
            bp: bid,
            ap: ask,
            t: ts,
        })
    }

    fn trade_frame(sym: &str, price: f64, size: u32, ts: i64) -> WireFrame {
        WireFrame::Trade(WireTrade {
            sym: sym.to_string(),
            p: price,
            s: size,
            t: ts,
            c: Vec::new(),
            ds: None,
        })
    }

    #[tokio::test]
    async fn quotes_update_cache_and_trades_enqueue() {
        let quotes = QuoteStore::new();
        let metrics = Metrics::new();
        let (tx, mut rx) = trade_channel(8, Duration::from_secs(5));

        apply_frame(quote_frame("O:X250530C05900000", 5.0, 5.1, 100), &quotes, &metrics, &tx)
            .await
            .unwrap();
        apply_frame(trade_frame("O:X250530C05900000", 5.1, 10, 200), &quotes, &metrics, &tx)
            .await
            .unwrap();

        assert_eq!(quotes.get("O:X250530C05900000").unwrap().ask, 5.1);
        let trade = rx.recv().await.unwrap();
        assert_eq!(trade.size, 10);
        assert_eq!(metrics.quote_rejected.get(), 0);
    }

    #[tokio::test]
    async fn crossed_quote_is_counted_and_dropped() {
        let quotes = QuoteStore::new();
        let metrics = Metrics::new();
        let (tx, _rx) = trade_channel(8, Duration::from_secs(5));

        apply_frame(quote_frame("O:X250530C05900000", 5.2, 5.1, 100), &quotes, &metrics, &tx)
            .await
            .unwrap();
        assert!(quotes.get("O:X250530C05900000").is_none());
        assert_eq!(metrics.quote_rejected.get(), 1);
    }

    #[tokio::test]
    async fn backpressure_shedding_is_counted() {
        tokio::time::pause();
        let quotes = QuoteStore::new();
        let metrics = Metrics::new();
        let (tx, mut rx) = trade_channel(1, Duration::from_secs(5));

        apply_frame(trade_frame("O:X250530C05900000", 5.1, 1, 1), &quotes, &metrics, &tx)
            .await
            .unwrap();
        // Channel full; the paused clock runs out the 5s window and the
        // oldest trade is shed.
        apply_frame(trade_frame("O:X250530C05900000", 5.2, 2, 2), &quotes, &metrics, &tx)
            .await
            .unwrap();
        assert_eq!(metrics.trade_dropped_backpressure.get(), 1);
        assert_eq!(rx.recv().await.unwrap().ts_ms, 2);
    }

    #[tokio::test]
    async fn closed_channel_propagates() {
        let quotes = QuoteStore::new();
        let metrics = Metrics::new();
        let (tx, rx) = trade_channel(8, Duration::from_secs(5));
        drop(rx);
        tx.close();
        let err = apply_frame(trade_frame("O:X250530C05900000", 5.1, 1, 1), &quotes, &metrics, &tx)
            .await
            .unwrap_err();
        assert_eq!(err, ChannelClosed);
    }
}
