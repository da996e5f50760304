use std::sync::Arc;

use gptuber_core::canned::ChatBuffer;
use gptuber_core::scheduler::Scheduler;
use tokio::sync::broadcast;

use crate::sink::BroadcastSink;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Serialized display messages for every connected front end.
    pub display_tx: broadcast::Sender<String>,
    /// Chat typed into the front end, drained by the report tick.
    pub chat: Arc<ChatBuffer>,
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(scheduler: Scheduler, chat: Arc<ChatBuffer>, display: &BroadcastSink) -> Self {
        Self {
            display_tx: display.sender(),
            chat,
            scheduler,
        }
    }
}
