//! Scripted channel for testing code that sits on top of an engine

use std::sync::{Arc, Mutex};

use super::{ChannelError, EngineChannel, Inbound, InboundCallback, Subscribers};
use crate::lock;

/// Mock channel - only compiled in test mode or with mock feature.
///
/// Clones share state, so a test can keep one clone to inspect sent commands
/// and inject engine output after boxing the other into an adapter.
#[derive(Clone, Default)]
pub struct MockChannel {
    sent: Arc<Mutex<Vec<String>>>,
    subscribers: Arc<Subscribers>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command sent so far, oldest first
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    pub fn clear_sent(&self) {
        lock(&self.sent).clear()
    }

    /// Pretend the engine printed `line`
    pub fn push_line(&self, line: &str) {
        self.subscribers.deliver(Inbound::Line(line.to_string()));
    }

    pub fn push_lines(&self, lines: &[&str]) {
        for line in lines {
            self.push_line(line);
        }
    }

    /// Pretend the engine went away
    pub fn disconnect(&self, reason: &str) {
        self.subscribers.deliver(Inbound::Disconnected(reason.to_string()));
    }
}

impl EngineChannel for MockChannel {
    fn send(&self, command: &str) -> Result<(), ChannelError> {
        if self.subscribers.is_closed() {
            return Err(ChannelError::Closed);
        }
        lock(&self.sent).push(command.to_string());
        Ok(())
    }

    fn on_receive(&self, callback: InboundCallback) {
        self.subscribers.register(callback);
    }

    fn close(&self) {
        self.subscribers.close();
    }

    fn is_closed(&self) -> bool {
        self.subscribers.is_closed()
    }
}
