// Copyright (c) James Kassemi, SC, US. All rights reserved.
//! Prometheus metrics for the dealer-gamma engine. hyper v1.+

use core_types::status::ServiceStatusHandle;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use log::error;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpListener;

/// Central metric registry. Each `Metrics` owns a private prometheus
/// registry; nothing registers globally.
pub struct Metrics {
    registry: Registry,
    start_time: Instant,
    statuses: Mutex<Vec<ServiceStatusHandle>>,

    pub trades_applied: IntCounter,
    pub trades_unknown_side: IntCounter,
    pub trades_parse_failure: IntCounter,
    pub trades_missing_spot: IntCounter,
    pub trades_expired: IntCounter,
    pub trades_non_finite_gamma: IntCounter,
    pub iv_fallback_used: IntCounter,
    pub trade_dropped_backpressure: IntCounter,
    pub quote_rejected: IntCounter,
    pub snapshots_written: IntCounter,
    pub snapshot_append_failures: IntCounter,
    pub ws_reconnects: IntCounter,

    pub dealer_gamma: Gauge,
    pub channel_depth: IntGauge,
    pub book_strikes: IntGauge,
    uptime: IntGauge,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::with_opts(Opts::new(name, help)).expect("counter opts");
    registry.register(Box::new(c.clone())).expect("register counter");
    c
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let g = IntGauge::with_opts(Opts::new(name, help)).expect("gauge opts");
    registry.register(Box::new(g.clone())).expect("register gauge");
    g
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let dealer_gamma = Gauge::with_opts(Opts::new(
            "dealer_gamma_aggregate",
            "Current aggregate dealer gamma across the strike book",
        ))
        .expect("gauge opts");
        registry
            .register(Box::new(dealer_gamma.clone()))
            .expect("register gauge");
        Self {
            trades_applied: counter(
                &registry,
                "trades_applied_total",
                "Classified trades whose gamma landed in the strike book",
            ),
            trades_unknown_side: counter(
                &registry,
                "trades_unknown_side_total",
                "Trades left unclassified (missing/stale NBBO or exact-mid print)",
            ),
            trades_parse_failure: counter(
                &registry,
                "trades_parse_failure_total",
                "Trades dropped on OCC symbol parse failure",
            ),
            trades_missing_spot: counter(
                &registry,
                "trades_missing_spot_total",
                "Trades dropped because no underlying spot was available",
            ),
            trades_expired: counter(
                &registry,
                "trades_expired_total",
                "Trades dropped because the contract was already past expiry",
            ),
            trades_non_finite_gamma: counter(
                &registry,
                "trades_non_finite_gamma_total",
                "Trades dropped on a non-finite gamma evaluation",
            ),
            iv_fallback_used: counter(
                &registry,
                "iv_fallback_used_total",
                "Gamma evaluations priced off the moneyness fallback vol",
            ),
            trade_dropped_backpressure: counter(
                &registry,
                "trade_dropped_backpressure_total",
                "Oldest trades shed from the ingest channel under backpressure",
            ),
            quote_rejected: counter(
                &registry,
                "quote_rejected_total",
                "Crossed quote updates rejected by the quote cache",
            ),
            snapshots_written: counter(
                &registry,
                "gamma_snapshots_written_total",
                "Gamma snapshot rows accepted by the sink",
            ),
            snapshot_append_failures: counter(
                &registry,
                "gamma_snapshot_append_failures_total",
                "Gamma snapshot appends that failed and were queued for retry",
            ),
            ws_reconnects: counter(
                &registry,
                "ws_reconnects_total",
                "Upstream websocket reconnect attempts",
            ),
            dealer_gamma,
            channel_depth: int_gauge(
                &registry,
                "trade_channel_depth",
                "Trades buffered between ingest and the engine task",
            ),
            book_strikes: int_gauge(
                &registry,
                "strike_book_rows",
                "Distinct (expiry, right, strike) rows touched this session",
            ),
            uptime: int_gauge(&registry, "uptime_seconds", "Process uptime in seconds"),
            registry,
            start_time: Instant::now(),
            statuses: Mutex::new(Vec::new()),
        }
    }

    pub fn register_status(&self, handle: ServiceStatusHandle) {
        self.statuses.lock().unwrap().push(handle);
    }

    pub fn status_snapshots(&self) -> Vec<core_types::status::ServiceStatusSnapshot> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .map(|handle| handle.snapshot())
            .collect()
    }

    pub fn render(&self) -> Vec<u8> {
        self.uptime.set(self.start_time.elapsed().as_secs() as i64);
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            error!("metrics encode failed: {err}");
        }
        buffer
    }

    async fn handle_metrics(
        &self,
        _req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
        let response = Response::builder()
            .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
            .body(Full::new(Bytes::from(self.render())))
            .expect("static response");
        Ok(response)
    }

    pub async fn serve(
        self: &Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            let (socket, _) = listener.accept().await?;
            let io = TokioIo::new(socket);
            let metrics = self.clone();
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { metrics.handle_metrics(req).await }
            });
            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("metrics connection error: {err:?}");
                }
            });
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
