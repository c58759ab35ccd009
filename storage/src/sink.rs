// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
};

use arrow::{
    array::{ArrayRef, Float64Array},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use parking_lot::Mutex;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::StorageError;

/// Capability handed to the snapshot loop. Implementations must be
/// idempotent on `ts`: a row at or before the last accepted timestamp is
/// silently ignored, which keeps the table monotonic per writer.
pub trait GammaSink: Send + Sync {
    fn append(&self, ts: f64, dealer_gamma: f64) -> Result<(), StorageError>;
    fn flush(&self) -> Result<(), StorageError>;
}

fn gamma_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("ts", DataType::Float64, false),
        Field::new("dealer_gamma", DataType::Float64, false),
    ]))
}

struct StoreState {
    pending: Vec<(f64, f64)>,
    last_ts: f64,
    part_seq: u32,
}

/// Append-only `intraday_gamma(ts, dealer_gamma)` table written as a
/// sequence of parquet part files under one directory. Rows buffer in
/// memory and land on disk every `flush_rows` appends (and on `flush`),
/// through a tmp-file rename so readers never see a half-written part.
pub struct ParquetGammaStore {
    dir: PathBuf,
    flush_rows: usize,
    state: Mutex<StoreState>,
}

impl ParquetGammaStore {
    pub fn open(dir: impl Into<PathBuf>, flush_rows: usize) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            flush_rows: flush_rows.max(1),
            state: Mutex::new(StoreState {
                pending: Vec::new(),
                last_ts: f64::NEG_INFINITY,
                part_seq: 0,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_part(&self, state: &mut StoreState) -> Result<(), StorageError> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let schema = gamma_schema();
        let ts = Arc::new(Float64Array::from(
            state.pending.iter().map(|r| r.0).collect::<Vec<_>>(),
        )) as ArrayRef;
        let gamma = Arc::new(Float64Array::from(
            state.pending.iter().map(|r| r.1).collect::<Vec<_>>(),
        )) as ArrayRef;
        let batch = RecordBatch::try_new(schema.clone(), vec![ts, gamma])?;

        state.part_seq += 1;
        let first_ts_ms = (state.pending[0].0 * 1_000.0) as i64;
        let final_path = self
            .dir
            .join(format!("intraday_gamma-{:06}-{}.parquet", state.part_seq, first_ts_ms));
        let tmp_path = final_path.with_extension("tmp");
        let file = File::create(&tmp_path)?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;
        if final_path.exists() {
            fs::remove_file(&final_path)?;
        }
        fs::rename(&tmp_path, &final_path)?;
        state.pending.clear();
        Ok(())
    }
}

impl GammaSink for ParquetGammaStore {
    fn append(&self, ts: f64, dealer_gamma: f64) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if ts <= state.last_ts {
            return Ok(());
        }
        state.last_ts = ts;
        state.pending.push((ts, dealer_gamma));
        if state.pending.len() >= self.flush_rows {
            self.write_part(&mut state)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        self.write_part(&mut state)
    }
}

/// Read every part file back, sorted by `ts`. Used by tests and offline
/// tooling, not by the live path.
pub fn read_gamma_rows(dir: &Path) -> Result<Vec<(f64, f64)>, StorageError> {
    let mut rows = Vec::new();
    let mut parts: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "parquet").unwrap_or(false))
        .collect();
    parts.sort();
    for part in parts {
        let file = File::open(&part)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        for batch in reader {
            let batch = batch?;
            let ts = batch
                .column(0)
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| StorageError::Schema("ts".to_string()))?;
            let gamma = batch
                .column(1)
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| StorageError::Schema("dealer_gamma".to_string()))?;
            for idx in 0..batch.num_rows() {
                rows.push((ts.value(idx), gamma.value(idx)));
            }
        }
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(rows)
}

/// In-memory sink for tests: captures rows and can be told to fail the next
/// N appends to exercise the snapshot loop's retry path.
#[derive(Default)]
pub struct MemoryGammaSink {
    rows: Mutex<Vec<(f64, f64)>>,
    fail_remaining: AtomicUsize,
    last_ts: Mutex<f64>,
}

impl MemoryGammaSink {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(0),
            last_ts: Mutex::new(f64::NEG_INFINITY),
        }
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<(f64, f64)> {
        self.rows.lock().clone()
    }
}

impl GammaSink for MemoryGammaSink {
    fn append(&self, ts: f64, dealer_gamma: f64) -> Result<(), StorageError> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StorageError::Sink("injected failure".to_string()));
        }
        let mut last = self.last_ts.lock();
        if ts <= *last {
            return Ok(());
        }
        *last = ts;
        self.rows.lock().push((ts, dealer_gamma));
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
