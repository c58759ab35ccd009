// Copyright (c) James Kassemi, SC, US. All rights reserved.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Jittered exponential backoff. Used bounded (auth/subscription retries)
/// and unbounded (the reconnect supervisor, which tracks its own attempt
/// counter and only asks for delays).
#[derive(Debug, Clone)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
    pub jitter_pct: f64,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, jitter_pct: f64) -> Self {
        Self {
            base: base.max(Duration::from_millis(1)),
            cap: cap.max(base),
            jitter_pct: jitter_pct.clamp(0.0, 1.0),
        }
    }

    pub fn from_seconds(base_s: f64, cap_s: f64, jitter_pct: f64) -> Self {
        Self::new(
            Duration::from_secs_f64(base_s.max(0.001)),
            Duration::from_secs_f64(cap_s.max(base_s.max(0.001))),
            jitter_pct,
        )
    }

    /// Delay before retry number `attempt` (0-based), doubling up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let raw_ms = (self.base.as_millis() as u64).saturating_mul(exp);
        let capped_ms = raw_ms.min(self.cap.as_millis() as u64);
        if self.jitter_pct == 0.0 {
            return Duration::from_millis(capped_ms);
        }
        let spread = (capped_ms as f64 * self.jitter_pct) as i64;
        let delta = if spread > 0 {
            rand::thread_rng().gen_range(-spread..=spread)
        } else {
            0
        };
        Duration::from_millis(capped_ms.saturating_add_signed(delta))
    }

    /// Run `op` up to `max_attempts` times, sleeping the scheduled delay
    /// between failures. The final error is returned unchanged.
    pub async fn retry<F, Fut, T, E>(&self, max_attempts: usize, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let attempts = max_attempts.max(1);
        let mut attempt = 0usize;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(err);
                    }
                    sleep(self.delay((attempt - 1) as u32)).await;
                }
            }
        }
    }
}
