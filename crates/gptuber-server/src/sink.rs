use gptuber_core::collab::DisplaySink;
use tokio::sync::broadcast;

/// Fans display messages out to every connected websocket.
///
/// Messages sent while nobody is connected are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<String> {
        self.tx.clone()
    }
}

impl DisplaySink for BroadcastSink {
    fn send(&self, message: String) {
        match self.tx.send(message) {
            Ok(n) => tracing::debug!(receivers = n, "display message sent"),
            Err(_) => tracing::debug!("no front end connected, display message dropped"),
        }
    }
}
