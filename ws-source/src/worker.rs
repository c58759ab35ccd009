// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::frame::{parse_frames, WireFrame};

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum WsError {
    #[error("invalid websocket url: {0}")]
    Url(String),
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("authentication rejected by upstream: {0}")]
    AuthRejected(String),
    #[error("timed out waiting for authentication ack")]
    AuthTimeout,
    #[error("connection closed by upstream")]
    Closed,
}

/// One upstream endpoint plus credentials. `connect` yields a session; the
/// reconnect supervisor owns the worker and calls `connect` again after a
/// drop.
pub struct WsWorker {
    url: Url,
    api_key: String,
}

impl WsWorker {
    pub fn new(url: &str, api_key: impl Into<String>) -> Result<Self, WsError> {
        crate::ensure_tls_provider();
        let url = Url::parse(url).map_err(|err| WsError::Url(err.to_string()))?;
        Ok(Self {
            url,
            api_key: api_key.into(),
        })
    }

    /// Dial, authenticate, and hand back a live session. The auth exchange
    /// is one key frame answered by a status frame; anything else within
    /// the window is buffered market data from a previous subscription and
    /// is discarded.
    pub async fn connect(&self) -> Result<WsSession, WsError> {
        let (stream, _) = connect_async(self.url.as_str()).await?;
        info!("connected to {}", self.url);
        let mut session = WsSession { stream };
        session
            .send_json(&json!({"action": "auth", "params": self.api_key}))
            .await?;
        timeout(AUTH_TIMEOUT, session.await_auth_ack())
            .await
            .map_err(|_| WsError::AuthTimeout)??;
        Ok(session)
    }
}

pub struct WsSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsSession {
    /// Subscribe to `topics` in fixed-size comma-joined batches with a
    /// small inter-batch delay, the way the upstream expects large symbol
    /// sets to arrive.
    pub async fn subscribe(
        &mut self,
        topics: &[String],
        batch_size: usize,
        inter_batch_delay: Duration,
    ) -> Result<(), WsError> {
        let batches = batch_topics(topics, batch_size);
        let total = batches.len();
        for (idx, params) in batches.into_iter().enumerate() {
            self.send_json(&json!({"action": "subscribe", "params": params}))
                .await?;
            debug!("subscribe batch {}/{} sent", idx + 1, total);
            if idx + 1 < total && !inter_batch_delay.is_zero() {
                sleep(inter_batch_delay).await;
            }
        }
        info!("subscribed to {} topics in {} batches", topics.len(), total);
        Ok(())
    }

    /// Next batch of parsed frames. `Ok(None)` on an orderly close; pings
    /// are answered inline and unparseable text is dropped with a warning.
    pub async fn next_events(&mut self) -> Result<Option<Vec<WireFrame>>, WsError> {
        loop {
            let Some(message) = self.stream.next().await else {
                return Ok(None);
            };
            match message? {
                Message::Text(text) => match parse_frames(&text) {
                    Ok(frames) => return Ok(Some(frames)),
                    Err(err) => {
                        warn!("dropping unparseable frame: {err}");
                    }
                },
                Message::Ping(payload) => {
                    self.stream.send(Message::Pong(payload)).await?;
                }
                Message::Close(_) => return Ok(None),
                Message::Binary(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }

    async fn send_json(&mut self, value: &serde_json::Value) -> Result<(), WsError> {
        self.stream
            .send(Message::Text(value.to_string().into()))
            .await?;
        Ok(())
    }

    async fn await_auth_ack(&mut self) -> Result<(), WsError> {
        loop {
            let Some(frames) = self.next_events().await? else {
                return Err(WsError::Closed);
            };
            for frame in frames {
                if let WireFrame::Status(status) = frame {
                    match status.status.as_str() {
                        "auth_success" => return Ok(()),
                        "auth_failed" => return Err(WsError::AuthRejected(status.message)),
                        other => debug!("status during auth: {other}"),
                    }
                }
            }
        }
    }
}

/// Comma-joined subscription parameter strings, `batch_size` topics each.
pub fn batch_topics(topics: &[String], batch_size: usize) -> Vec<String> {
    let size = batch_size.max(1);
    topics.chunks(size).map(|chunk| chunk.join(",")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_batch_into_joined_params() {
        let topics: Vec<String> = (0..5).map(|i| format!("T.SYM{i}")).collect();
        let batches = batch_topics(&topics, 2);
        assert_eq!(
            batches,
            vec!["T.SYM0,T.SYM1", "T.SYM2,T.SYM3", "T.SYM4"]
        );
    }

    #[test]
    fn zero_batch_size_degrades_to_one() {
        let topics: Vec<String> = vec!["T.A".to_string(), "T.B".to_string()];
        assert_eq!(batch_topics(&topics, 0).len(), 2);
    }

    #[test]
    fn empty_topic_set_produces_no_batches() {
        assert!(batch_topics(&[], 50).is_empty());
    }

    #[test]
    fn bad_url_is_rejected_up_front() {
        assert!(matches!(
            WsWorker::new("not a url", "key"),
            Err(WsError::Url(_))
        ));
    }
}
