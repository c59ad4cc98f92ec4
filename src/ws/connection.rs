//! Stream connection primitives: the writer handle shared with the session,
//! and the per-endpoint reconnect backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::adapter::StreamEndpoint;
use crate::error::Result;
use crate::time::TimePoint;

/// Close reason used when the idle-timeout monitor force-closes a
/// connection.
pub const IDLE_TIMEOUT_CLOSE_REASON: &str = "application level heartbeat timeout";

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WriterHalf = SplitSink<WsStream, Message>;
pub(crate) type ReaderHalf = SplitStream<WsStream>;

/// Open the endpoint's URL and split the socket.
pub(crate) async fn connect(endpoint: &StreamEndpoint) -> Result<(WriterHalf, ReaderHalf)> {
    let url = endpoint.key();
    let (ws, _response) = connect_async(url.as_str()).await?;
    let (writer, reader) = ws.split();
    Ok((writer, reader))
}

/// Shared handle to one live connection. The reader half stays with the
/// endpoint task; everything else (heartbeats, idle monitor, order path)
/// reaches the socket through this handle.
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    /// Registry key: composed endpoint URL.
    pub key: String,
    writer: Arc<Mutex<Option<WriterHalf>>>,
    /// When the last frame of any kind arrived.
    last_frame_at: Arc<StdMutex<Option<TimePoint>>>,
}

impl ConnectionHandle {
    pub fn new(key: String, writer: WriterHalf) -> Self {
        Self {
            key,
            writer: Arc::new(Mutex::new(Some(writer))),
            last_frame_at: Arc::new(StdMutex::new(None)),
        }
    }

    /// Record frame arrival for the idle-timeout monitor.
    pub fn touch(&self, at: TimePoint) {
        if let Ok(mut guard) = self.last_frame_at.lock() {
            *guard = Some(at);
        }
    }

    /// Seconds since the last received frame, if any frame has arrived.
    pub fn idle_seconds(&self, now: TimePoint) -> Option<f64> {
        self.last_frame_at
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .map(|last| now.seconds_since(last))
    }

    /// Send a text frame. Fails when the connection is already closed.
    pub async fn send_text(&self, payload: String) -> Result<()> {
        use futures_util::SinkExt;
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => {
                writer.send(Message::Text(payload.into())).await?;
                Ok(())
            }
            None => Err(crate::error::ExchangeError::InvalidArgument(format!(
                "connection {} is closed",
                self.key
            ))),
        }
    }

    /// Send a protocol-level ping.
    pub async fn send_ping(&self) -> Result<()> {
        use futures_util::SinkExt;
        let mut guard = self.writer.lock().await;
        if let Some(writer) = guard.as_mut() {
            writer.send(Message::Ping(bytes::Bytes::new())).await?;
        }
        Ok(())
    }

    /// Send a close frame with a reason and drop the writer. The read side
    /// observes the close and exits its loop.
    pub async fn close(&self, reason: &'static str) {
        use futures_util::SinkExt;
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: reason.into(),
            };
            let _ = writer.send(Message::Close(Some(frame))).await;
        }
    }

    /// Whether the writer is still present.
    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }
}

// ---------------------------------------------------------------------------
// Reconnect backoff
// ---------------------------------------------------------------------------

const BACKOFF_INITIAL_SECONDS: u64 = 1;
const BACKOFF_BASE: u64 = 2;
const BACKOFF_MAX_SECONDS: u64 = 60;

/// Seconds an endpoint must stay quiet-healthy before its backoff clears.
pub(crate) const BACKOFF_RESET_AFTER_SECONDS: u64 = 60;

/// Per-endpoint exponential reconnect backoff: 1 s initially, doubling to a
/// 60 s cap, cleared after the endpoint has been healthy for 60 s.
#[derive(Debug, Default)]
pub(crate) struct ReconnectBackoff {
    delays: HashMap<String, u64>,
}

impl ReconnectBackoff {
    /// The delay to wait before the next reconnect attempt for `key`,
    /// advancing the schedule.
    pub fn next_delay_seconds(&mut self, key: &str) -> u64 {
        let next = match self.delays.get(key) {
            None => BACKOFF_INITIAL_SECONDS,
            Some(current) => (current * BACKOFF_BASE).min(BACKOFF_MAX_SECONDS),
        };
        self.delays.insert(key.to_owned(), next);
        next
    }

    /// Clear the schedule for `key` after a healthy period.
    pub fn reset(&mut self, key: &str) {
        self.delays.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_to_cap() {
        let mut backoff = ReconnectBackoff::default();
        let key = "wss://ws.example.com/ws/v5/public";
        let schedule: Vec<u64> = (0..8).map(|_| backoff.next_delay_seconds(key)).collect();
        assert_eq!(schedule, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn backoff_is_per_endpoint_and_resettable() {
        let mut backoff = ReconnectBackoff::default();
        assert_eq!(backoff.next_delay_seconds("a"), 1);
        assert_eq!(backoff.next_delay_seconds("a"), 2);
        // Another endpoint starts from scratch.
        assert_eq!(backoff.next_delay_seconds("b"), 1);
        // Quiet-healthy reset returns the schedule to the initial delay.
        backoff.reset("a");
        assert_eq!(backoff.next_delay_seconds("a"), 1);
    }

    #[test]
    fn idle_seconds_tracks_last_frame() {
        // Exercised without a socket: the handle's bookkeeping is plain state.
        let handle = ConnectionHandle {
            key: "k".into(),
            writer: Arc::new(Mutex::new(None)),
            last_frame_at: Arc::new(StdMutex::new(None)),
        };
        let t0 = TimePoint::from_unix_secs(1_000);
        assert!(handle.idle_seconds(t0).is_none());
        handle.touch(t0);
        let idle = handle.idle_seconds(TimePoint::from_unix_secs(1_021)).unwrap();
        assert!((idle - 21.0).abs() < 1e-9);
    }
}
