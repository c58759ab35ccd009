use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use core_types::status::{OverallStatus, ServiceStatusHandle, StatusGauge};
use log::{error, info, warn};
use storage::GammaSink;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::context::EngineContext;

/// Rows held for retry after a sink failure. Beyond this the oldest row is
/// abandoned; the table stays monotonic either way.
const MAX_PENDING_ROWS: usize = 600;

type ClockFn = dyn Fn() -> f64 + Send + Sync;

/// Timer-driven gamma snapshotter. Reads the book aggregate every interval
/// and appends `(ts, dealer_gamma)` through the injected sink; the engine
/// task never blocks on this path. Sink failures are retried on the next
/// tick, oldest row first, so accepted timestamps stay monotonic.
pub struct SnapshotTask {
    ctx: Arc<EngineContext>,
    sink: Arc<dyn GammaSink>,
    status: ServiceStatusHandle,
    clock: Box<ClockFn>,
}

fn wall_clock() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl SnapshotTask {
    pub fn new(ctx: Arc<EngineContext>, sink: Arc<dyn GammaSink>) -> Self {
        Self::with_clock(ctx, sink, Box::new(wall_clock))
    }

    /// Test constructor with an injected timestamp source.
    pub fn with_clock(ctx: Arc<EngineContext>, sink: Arc<dyn GammaSink>, clock: Box<ClockFn>) -> Self {
        let status = ServiceStatusHandle::new("gamma_snapshot");
        status.push_warning("snapshotter not started");
        Self {
            ctx,
            sink,
            status,
            clock,
        }
    }

    pub fn status_handle(&self) -> ServiceStatusHandle {
        self.status.clone()
    }

    pub fn start(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        self.status.clear_warnings_matching(|_| true);
        self.status.set_overall(OverallStatus::Ok);
        let period = Duration::from_secs_f64(self.ctx.cfg.snapshot_interval_s.max(0.01));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pending: VecDeque<(f64, f64)> = VecDeque::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.emit(&mut pending);
                }
            }
        }
        // Final snapshot, then flush whatever the sink buffered.
        self.emit(&mut pending);
        if let Err(err) = self.sink.flush() {
            error!("gamma sink flush failed on shutdown: {err}");
        }
        info!("snapshotter stopped ({} rows still pending)", pending.len());
        self.status.set_overall(OverallStatus::Warn);
        self.status.push_warning("snapshotter stopped");
    }

    fn emit(&self, pending: &mut VecDeque<(f64, f64)>) {
        let gamma = self.ctx.aggregate_gamma();
        let ts = (self.clock)();
        pending.push_back((ts, gamma));
        while pending.len() > MAX_PENDING_ROWS {
            pending.pop_front();
            warn!("snapshot retry buffer overflow; abandoning oldest row");
        }
        while let Some(&(row_ts, row_gamma)) = pending.front() {
            match self.sink.append(row_ts, row_gamma) {
                Ok(()) => {
                    pending.pop_front();
                    self.ctx.metrics.snapshots_written.inc();
                }
                Err(err) => {
                    self.ctx.metrics.snapshot_append_failures.inc();
                    warn!("gamma sink append failed, will retry next tick: {err}");
                    break;
                }
            }
        }
        self.ctx.metrics.dealer_gamma.set(gamma);
        self.status.set_gauges(vec![StatusGauge {
            label: "pending_snapshot_rows".to_string(),
            value: pending.len() as f64,
            max: Some(MAX_PENDING_ROWS as f64),
            unit: Some("rows".to_string()),
        }]);
    }
}
