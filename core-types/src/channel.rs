// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Bounded single-producer/single-consumer trade channel. When the buffer
//! stays full past a configured window the sender sheds the oldest queued
//! trade in favor of the newest, so a stalled consumer degrades to fresh
//! data rather than an ever-older backlog. Quotes never travel here; they
//! are written to the quote cache in place by the ingest task.

use crate::types::OptionTrade;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Enqueued,
    /// The buffer was full past the backpressure window; the oldest queued
    /// trade was discarded to make room.
    DroppedOldest,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ChannelClosed;

struct State {
    buf: VecDeque<OptionTrade>,
    closed: bool,
    full_since: Option<Instant>,
}

struct Shared {
    state: Mutex<State>,
    capacity: usize,
    max_full_wait: Duration,
    not_empty: Notify,
    not_full: Notify,
}

pub struct TradeSender {
    shared: Arc<Shared>,
}

pub struct TradeReceiver {
    shared: Arc<Shared>,
}

/// Build the channel. Must be called inside the task-supervisor scope so
/// the buffer is bound to the running runtime, never to module init.
pub fn trade_channel(capacity: usize, max_full_wait: Duration) -> (TradeSender, TradeReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: VecDeque::with_capacity(capacity.max(1)),
            closed: false,
            full_since: None,
        }),
        capacity: capacity.max(1),
        max_full_wait,
        not_empty: Notify::new(),
        not_full: Notify::new(),
    });
    (
        TradeSender {
            shared: shared.clone(),
        },
        TradeReceiver { shared },
    )
}

impl TradeSender {
    /// Enqueue one trade, blocking while the buffer is full. Once fullness
    /// persists past the backpressure window the oldest entry is shed and
    /// the new trade goes in immediately.
    pub async fn send(&self, trade: OptionTrade) -> Result<SendOutcome, ChannelClosed> {
        let mut pending = Some(trade);
        loop {
            let wait_hint = {
                let mut state = self.shared.state.lock().expect("channel poisoned");
                if state.closed {
                    return Err(ChannelClosed);
                }
                if state.buf.len() < self.shared.capacity {
                    state.full_since = None;
                    state.buf.push_back(pending.take().expect("pending trade"));
                    self.shared.not_empty.notify_one();
                    return Ok(SendOutcome::Enqueued);
                }
                let since = *state.full_since.get_or_insert_with(Instant::now);
                let waited = since.elapsed();
                if waited >= self.shared.max_full_wait {
                    state.buf.pop_front();
                    state.buf.push_back(pending.take().expect("pending trade"));
                    self.shared.not_empty.notify_one();
                    return Ok(SendOutcome::DroppedOldest);
                }
                self.shared.max_full_wait - waited
            };
            tokio::select! {
                _ = self.shared.not_full.notified() => {}
                _ = sleep(wait_hint) => {}
            }
        }
    }

    pub fn close(&self) {
        let mut state = self.shared.state.lock().expect("channel poisoned");
        state.closed = true;
        self.shared.not_empty.notify_waiters();
        self.shared.not_full.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().expect("channel poisoned").buf.len()
    }
}

impl Drop for TradeSender {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TradeSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeSender").field("len", &self.len()).finish()
    }
}

impl TradeReceiver {
    /// Next trade in arrival order; `None` once the sender closed and the
    /// buffer drained.
    pub async fn recv(&mut self) -> Option<OptionTrade> {
        loop {
            {
                let mut state = self.shared.state.lock().expect("channel poisoned");
                if let Some(trade) = state.buf.pop_front() {
                    state.full_since = None;
                    self.shared.not_full.notify_one();
                    return Some(trade);
                }
                if state.closed {
                    return None;
                }
            }
            self.shared.not_empty.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().expect("channel poisoned").buf.len()
    }
}
