// Copyright (c) James Kassemi, SC, US. All rights reserved.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Discrete health level exposed by each long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Ok,
    Warn,
    Crit,
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Warn
    }
}

/// Lightweight gauge descriptor exported alongside status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusGauge {
    pub label: String,
    pub value: f64,
    pub max: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub overall: OverallStatus,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

/// Immutable snapshot handed to consumers (metrics exporter, shutdown log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusSnapshot {
    pub name: String,
    pub overall: OverallStatus,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub gauges: Vec<StatusGauge>,
}

/// Shared handle so a task can mutate its own status safely while other
/// tasks read snapshots.
#[derive(Clone)]
pub struct ServiceStatusHandle {
    name: &'static str,
    inner: Arc<RwLock<ServiceStatus>>,
}

impl ServiceStatusHandle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(ServiceStatus::default())),
        }
    }

    pub fn service_name(&self) -> &'static str {
        self.name
    }

    pub fn update<F>(&self, mutator: F)
    where
        F: FnOnce(&mut ServiceStatus),
    {
        let mut guard = self.inner.write().expect("status poisoned");
        mutator(&mut guard);
    }

    pub fn set_overall(&self, overall: OverallStatus) {
        self.update(|status| status.overall = overall);
    }

    pub fn push_warning(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|status| {
            if !status.warnings.contains(&message) {
                status.warnings.push(message);
            }
        });
    }

    pub fn push_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|status| {
            if !status.errors.contains(&message) {
                status.errors.push(message);
            }
        });
    }

    pub fn clear_warnings_matching<F>(&self, predicate: F)
    where
        F: Fn(&str) -> bool,
    {
        self.update(|status| status.warnings.retain(|m| !predicate(m)));
    }

    pub fn clear_errors_matching<F>(&self, predicate: F)
    where
        F: Fn(&str) -> bool,
    {
        self.update(|status| status.errors.retain(|m| !predicate(m)));
    }

    pub fn set_gauges(&self, gauges: Vec<StatusGauge>) {
        self.update(|status| status.gauges = gauges);
    }

    pub fn snapshot(&self) -> ServiceStatusSnapshot {
        let guard = self.inner.read().expect("status poisoned");
        ServiceStatusSnapshot {
            name: self.name.to_string(),
            overall: guard.overall,
            warnings: guard.warnings.clone(),
            errors: guard.errors.clone(),
            gauges: guard.gauges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_and_dedup() {
        let handle = ServiceStatusHandle::new("ingest");
        assert_eq!(handle.snapshot().overall, OverallStatus::Warn);
        handle.set_overall(OverallStatus::Ok);
        handle.push_error("ws stream error: timeout");
        handle.push_error("ws stream error: timeout");
        assert_eq!(handle.snapshot().errors.len(), 1);
        handle.clear_errors_matching(|m| m.contains("ws stream"));
        assert!(handle.snapshot().errors.is_empty());
        assert_eq!(handle.snapshot().overall, OverallStatus::Ok);
    }
}
