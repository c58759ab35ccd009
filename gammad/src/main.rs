mod config;

use std::{env, path::Path, process, str::FromStr, sync::Arc, time::Duration};

use chrono::Utc;
use config::{ConfigError, Mode, Secrets};
use core_types::channel::trade_channel;
use core_types::config::{AppConfig, SettingsError};
use core_types::occ::format_occ;
use core_types::types::OptionRight;
use dealer_engine::{DealerEngine, EngineContext, SnapshotTask};
use ingest_service::IngestService;
use log::{error, info, warn};
use metrics::Metrics;
use quote_cache::QuoteStore;
use storage::{read_latest_snapshot, ChainSnapshot, GammaSink, ParquetGammaStore, StorageError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use vol_surface::VolSurface;

/// Per-phase shutdown budget; a phase that overruns is abandoned.
const SHUTDOWN_PHASE_TIMEOUT: Duration = Duration::from_secs(5);

/// Synthetic-universe shape for sim mode without a snapshot.
const SIM_SPOT: f64 = 5900.0;
const SIM_STRIKE_STEP: f64 = 25.0;
const SIM_STRIKE_SPAN: f64 = 200.0;

fn main() {
    env_logger::init();
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    if let Err(err) = runtime.block_on(run()) {
        error!("gammad failed: {err}");
        eprintln!("gammad failed: {err}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let mode = parse_mode()?;
    let cfg = AppConfig::load()?;
    let secrets = Secrets::from_env()?;

    let snapshot = load_snapshot(&cfg, mode)?;
    let universe = match &snapshot {
        Some(snapshot) => snapshot.symbol_universe(&cfg.engine.option_root),
        None => synthetic_universe(&cfg.engine.option_root),
    };
    info!(
        "gammad starting in {:?} mode with {} contracts",
        mode,
        universe.len()
    );

    let metrics = Arc::new(Metrics::new());
    let quotes = Arc::new(QuoteStore::new());
    let surface = Arc::new(VolSurface::new(
        cfg.surface.clone(),
        cfg.engine.risk_free_rate,
        cfg.engine.dividend_yield,
    ));
    let ctx = EngineContext::new(cfg.engine.clone(), quotes.clone(), surface, metrics.clone());
    match snapshot.as_ref().and_then(|s| s.under_px()) {
        Some(spot) => ctx.set_fallback_spot(spot),
        None => ctx.set_fallback_spot(SIM_SPOT),
    }

    let store = Arc::new(ParquetGammaStore::open(
        cfg.storage.gamma_dir.clone(),
        cfg.storage.flush_rows,
    )?);

    serve_metrics(&cfg.metrics.addr, metrics.clone()).await;

    // All shared channels are created here, inside the supervisor scope.
    let (trade_tx, trade_rx) = trade_channel(
        cfg.engine.channel_capacity,
        Duration::from_secs_f64(cfg.engine.backpressure_max_s),
    );
    let ingest_cancel = CancellationToken::new();
    let engine_cancel = CancellationToken::new();
    let snapshot_cancel = CancellationToken::new();

    let ingest = IngestService::new(
        cfg.ws.clone(),
        secrets.api_key.clone(),
        subscription_topics(&universe, &cfg.engine.index_symbol),
        quotes,
        metrics.clone(),
    );
    metrics.register_status(ingest.status_handle());
    let ingest_handle = ingest.start(trade_tx, ingest_cancel.clone());

    let engine = DealerEngine::new(ctx.clone());
    metrics.register_status(engine.status_handle());
    let engine_handle = engine.start(trade_rx, engine_cancel.clone());

    let snapshotter = SnapshotTask::new(ctx.clone(), store.clone() as Arc<dyn GammaSink>);
    metrics.register_status(snapshotter.status_handle());
    let snapshot_handle = snapshotter.start(snapshot_cancel.clone());

    tokio::signal::ctrl_c().await.map_err(AppError::Io)?;
    info!("shutdown signal received");

    // Ingest stops accepting frames and closes the trade channel.
    ingest_cancel.cancel();
    await_phase("ingest", ingest_handle).await;
    // The engine drains whatever the channel still holds.
    if timeout(SHUTDOWN_PHASE_TIMEOUT, engine_handle).await.is_err() {
        warn!("engine drain overran its budget; abandoning");
        engine_cancel.cancel();
    }
    // Final snapshot and sink flush.
    snapshot_cancel.cancel();
    await_phase("snapshot", snapshot_handle).await;

    info!("gammad stopped cleanly");
    Ok(())
}

async fn await_phase(name: &str, handle: tokio::task::JoinHandle<()>) {
    match timeout(SHUTDOWN_PHASE_TIMEOUT, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("{name} task panicked during shutdown: {err}"),
        Err(_) => warn!("{name} shutdown phase timed out; abandoning"),
    }
}

fn parse_mode() -> Result<Mode, AppError> {
    let arg = env::args().nth(1).ok_or(AppError::Usage)?;
    Mode::from_str(&arg).map_err(AppError::from)
}

fn load_snapshot(cfg: &AppConfig, mode: Mode) -> Result<Option<ChainSnapshot>, AppError> {
    match read_latest_snapshot(Path::new(&cfg.storage.snapshot_dir)) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) if mode == Mode::Sim => {
            warn!("no chain snapshot ({err}); using a synthetic universe");
            Ok(None)
        }
        Err(err) => Err(AppError::Snapshot(err)),
    }
}

fn synthetic_universe(root: &str) -> Vec<String> {
    let today = Utc::now().date_naive();
    let mut symbols = Vec::new();
    let mut strike = SIM_SPOT - SIM_STRIKE_SPAN;
    while strike <= SIM_SPOT + SIM_STRIKE_SPAN {
        let strike_mils = (strike * 1000.0).round() as i64;
        symbols.push(format_occ(root, today, OptionRight::Call, strike_mils));
        symbols.push(format_occ(root, today, OptionRight::Put, strike_mils));
        strike += SIM_STRIKE_STEP;
    }
    symbols
}

fn subscription_topics(universe: &[String], index_symbol: &str) -> Vec<String> {
    let mut topics = Vec::with_capacity(universe.len() * 2 + 1);
    for symbol in universe {
        topics.push(format!("T.{symbol}"));
        topics.push(format!("Q.{symbol}"));
    }
    // The index value rides the same connection under its own prefix.
    topics.push(format!("Q.{index_symbol}"));
    topics
}

async fn serve_metrics(addr: &str, metrics: Arc<Metrics>) {
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("metrics listening on {addr}");
            tokio::spawn(async move {
                if let Err(err) = metrics.serve(listener).await {
                    error!("metrics server exited: {err}");
                }
            });
        }
        Err(err) => warn!("metrics bind on {addr} failed: {err}"),
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: gammad <live|sim>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("configuration load failed: {0}")]
    Settings(#[from] SettingsError),
    #[error("chain snapshot required in live mode: {0}")]
    Snapshot(StorageError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_universe_covers_both_rights() {
        let universe = synthetic_universe("SPXW");
        assert_eq!(universe.len(), 34); // 17 strikes x 2 rights
        assert!(universe.iter().all(|s| s.starts_with("SPXW")));
        assert!(universe.iter().any(|s| s.contains('C')));
        assert!(universe.iter().any(|s| s.contains('P')));
    }

    #[test]
    fn topics_cover_trades_quotes_and_the_index() {
        let universe = vec!["SPXW250530C05900000".to_string()];
        let topics = subscription_topics(&universe, "I:SPX");
        assert_eq!(
            topics,
            vec![
                "T.SPXW250530C05900000".to_string(),
                "Q.SPXW250530C05900000".to_string(),
                "Q.I:SPX".to_string(),
            ]
        );
    }
}
