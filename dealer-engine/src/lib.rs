//! The dealer-gamma engine proper: trade classification against the live
//! NBBO, per-trade gamma revaluation, strike-book accounting, and the
//! periodic gamma snapshot loop.

pub mod classify;
pub mod context;
pub mod engine;
pub mod snapshot;

pub use classify::classify;
pub use context::EngineContext;
pub use engine::{DealerEngine, TradeOutcome};
pub use snapshot::SnapshotTask;
