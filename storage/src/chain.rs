// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Option-chain snapshot reader. An external collaborator drops parquet
//! snapshots of the 0DTE chain; the engine only reads the newest one at
//! startup to seed its symbol universe and a fallback underlying spot.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Float64Array, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use chrono::NaiveDate;
use core_types::occ::format_occ;
use core_types::types::OptionRight;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use crate::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct ChainRow {
    pub strike: f64,
    pub right: OptionRight,
    pub bid: f64,
    pub ask: f64,
    pub iv: f64,
    pub gamma: f64,
    pub under_px: f64,
    pub expiry: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub path: PathBuf,
    pub rows: Vec<ChainRow>,
}

impl ChainSnapshot {
    /// Fallback spot seeded from the snapshot; rows all carry the same
    /// underlying print.
    pub fn under_px(&self) -> Option<f64> {
        self.rows.first().map(|r| r.under_px).filter(|px| *px > 0.0)
    }

    /// OCC wire symbols for every contract in the snapshot, deduplicated
    /// and sorted, ready for subscription topics.
    pub fn symbol_universe(&self, root: &str) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                format_occ(
                    root,
                    row.expiry,
                    row.right,
                    (row.strike * 1000.0).round() as i64,
                )
            })
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

fn chain_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("strike", DataType::Float64, false),
        Field::new("right", DataType::Utf8, false),
        Field::new("bid", DataType::Float64, false),
        Field::new("ask", DataType::Float64, false),
        Field::new("iv", DataType::Float64, false),
        Field::new("gamma", DataType::Float64, false),
        Field::new("under_px", DataType::Float64, false),
        Field::new("expiry", DataType::Utf8, false),
    ]))
}

/// Load the lexicographically newest `*.parquet` under `dir`. Snapshot
/// filenames embed their capture time, so name order is time order.
pub fn read_latest_snapshot(dir: &Path) -> Result<ChainSnapshot, StorageError> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|_| StorageError::NoSnapshot(dir.display().to_string()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "parquet").unwrap_or(false))
        .collect();
    candidates.sort();
    let path = candidates
        .pop()
        .ok_or_else(|| StorageError::NoSnapshot(dir.display().to_string()))?;
    let rows = read_rows(&path)?;
    info!(
        "chain snapshot {} loaded: {} contracts",
        path.display(),
        rows.len()
    );
    Ok(ChainSnapshot { path, rows })
}

fn read_rows(path: &Path) -> Result<Vec<ChainRow>, StorageError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        rows.extend(parse_batch(&batch)?);
    }
    Ok(rows)
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<ChainRow>, StorageError> {
    let strike = float_col(batch, 0, "strike")?;
    let right = string_col(batch, 1, "right")?;
    let bid = float_col(batch, 2, "bid")?;
    let ask = float_col(batch, 3, "ask")?;
    let iv = float_col(batch, 4, "iv")?;
    let gamma = float_col(batch, 5, "gamma")?;
    let under_px = float_col(batch, 6, "under_px")?;
    let expiry = string_col(batch, 7, "expiry")?;
    let mut rows = Vec::with_capacity(batch.num_rows());
    for idx in 0..batch.num_rows() {
        let right_char = right.value(idx).chars().next().unwrap_or(' ');
        let right = OptionRight::from_char(right_char)
            .ok_or_else(|| StorageError::Schema("right".to_string()))?;
        let expiry = NaiveDate::parse_from_str(expiry.value(idx), "%Y-%m-%d")
            .map_err(|_| StorageError::Schema("expiry".to_string()))?;
        rows.push(ChainRow {
            strike: strike.value(idx),
            right,
            bid: bid.value(idx),
            ask: ask.value(idx),
            iv: iv.value(idx),
            gamma: gamma.value(idx),
            under_px: under_px.value(idx),
            expiry,
        });
    }
    Ok(rows)
}

/// Write a snapshot in the collaborator's layout. Exercised by tests and
/// the sim tooling; the live loader never writes.
pub fn write_snapshot(path: &Path, rows: &[ChainRow]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let schema = chain_schema();
    let strike = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.strike).collect::<Vec<_>>(),
    )) as ArrayRef;
    let right = Arc::new(StringArray::from(
        rows.iter().map(|r| r.right.as_char().to_string()).collect::<Vec<_>>(),
    )) as ArrayRef;
    let bid = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.bid).collect::<Vec<_>>(),
    )) as ArrayRef;
    let ask = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.ask).collect::<Vec<_>>(),
    )) as ArrayRef;
    let iv = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.iv).collect::<Vec<_>>(),
    )) as ArrayRef;
    let gamma = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.gamma).collect::<Vec<_>>(),
    )) as ArrayRef;
    let under_px = Arc::new(Float64Array::from(
        rows.iter().map(|r| r.under_px).collect::<Vec<_>>(),
    )) as ArrayRef;
    let expiry = Arc::new(StringArray::from(
        rows.iter()
            .map(|r| r.expiry.format("%Y-%m-%d").to_string())
            .collect::<Vec<_>>(),
    )) as ArrayRef;
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![strike, right, bid, ask, iv, gamma, under_px, expiry],
    )?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn float_col<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    name: &str,
) -> Result<&'a Float64Array, StorageError> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| StorageError::Schema(name.to_string()))
}

fn string_col<'a>(
    batch: &'a RecordBatch,
    idx: usize,
    name: &str,
) -> Result<&'a StringArray, StorageError> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StorageError::Schema(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn row(strike: f64, right: OptionRight) -> ChainRow {
        ChainRow {
            strike,
            right,
            bid: 5.0,
            ask: 5.1,
            iv: 0.2,
            gamma: 0.005,
            under_px: 5900.0,
            expiry: NaiveDate::from_ymd_opt(2025, 5, 30).unwrap(),
        }
    }

    #[test]
    fn snapshot_round_trip_and_latest_selection() {
        let dir = tempdir().unwrap();
        let older = dir.path().join("spx_chain_20250529_160000.parquet");
        let newer = dir.path().join("spx_chain_20250530_093000.parquet");
        write_snapshot(&older, &[row(5800.0, OptionRight::Put)]).unwrap();
        write_snapshot(
            &newer,
            &[row(5900.0, OptionRight::Call), row(5900.0, OptionRight::Put)],
        )
        .unwrap();
        let snapshot = read_latest_snapshot(dir.path()).unwrap();
        assert_eq!(snapshot.path, newer);
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.under_px(), Some(5900.0));
    }

    #[test]
    fn universe_renders_occ_symbols() {
        let snapshot = ChainSnapshot {
            path: PathBuf::from("x.parquet"),
            rows: vec![row(5900.0, OptionRight::Call), row(5872.5, OptionRight::Put)],
        };
        let universe = snapshot.symbol_universe("SPXW");
        assert_eq!(
            universe,
            vec!["SPXW250530C05900000", "SPXW250530P05872500"]
        );
    }

    #[test]
    fn missing_directory_is_a_startup_error() {
        let err = read_latest_snapshot(Path::new("/nonexistent/snapshots")).unwrap_err();
        assert!(matches!(err, StorageError::NoSnapshot(_)));
    }
}
