// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Parquet-backed persistence: the append-only intraday gamma table and the
//! option-chain snapshot reader used to seed the symbol universe at startup.

pub mod chain;
pub mod sink;

use thiserror::Error;

pub use chain::{read_latest_snapshot, write_snapshot, ChainRow, ChainSnapshot};
pub use sink::{GammaSink, MemoryGammaSink, ParquetGammaStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("snapshot column {0} has unexpected type")]
    Schema(String),
    #[error("no chain snapshot found under {0}")]
    NoSnapshot(String),
    #[error("sink unavailable: {0}")]
    Sink(String),
}
