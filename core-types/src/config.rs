// Copyright (c) James Kassemi, SC, US. All rights reserved.

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

/// Error surface of the settings loader, re-exported so binaries do not
/// need the loader crate on their own dependency list.
pub use config::ConfigError as SettingsError;

/// Full configuration surface. Every knob has the default called out in the
/// operations runbook; a `config.toml` next to the binary or `GAMMAD_*`
/// environment variables override individual values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ws: WsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub surface: SurfaceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    pub ws_url: String,
    pub reconnect_initial_s: f64,
    pub reconnect_cap_s: f64,
    pub reconnect_jitter_pct: f64,
    pub subscribe_batch: usize,
    pub subscribe_batch_delay_ms: u64,
    pub auth_max_attempts: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://socket.massive.com/options".to_string(),
            reconnect_initial_s: 1.0,
            reconnect_cap_s: 60.0,
            reconnect_jitter_pct: 0.10,
            subscribe_batch: 50,
            subscribe_batch_delay_ms: 50,
            auth_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub snapshot_interval_s: f64,
    pub quote_stale_s: f64,
    pub channel_capacity: usize,
    pub backpressure_max_s: f64,
    pub contract_multiplier: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    pub index_symbol: String,
    pub option_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_s: 1.0,
            quote_stale_s: 5.0,
            channel_capacity: 4096,
            backpressure_max_s: 5.0,
            contract_multiplier: 100.0,
            risk_free_rate: 0.0,
            dividend_yield: 0.0,
            index_symbol: "I:SPX".to_string(),
            option_root: "SPXW".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    pub ttl_s: f64,
    pub fallback_ttl_s: f64,
    pub capacity: usize,
    pub under_bucket_points: f64,
    pub ttm_bucket_s: f64,
    pub fallback_base_iv: f64,
    pub fallback_slope: f64,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            ttl_s: 30.0,
            fallback_ttl_s: 10.0,
            capacity: 50_000,
            under_bucket_points: 1.0,
            ttm_bucket_s: 60.0,
            fallback_base_iv: 0.2,
            fallback_slope: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub gamma_dir: String,
    pub snapshot_dir: String,
    /// Buffered snapshot rows per flushed part file.
    pub flush_rows: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            gamma_dir: "data/intraday".to_string(),
            snapshot_dir: "data/snapshots".to_string(),
            flush_rows: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9105".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("GAMMAD").separator("__"))
            .build()?;
        settings.try_deserialize()
    }
}
