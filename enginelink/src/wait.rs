//! Deadline-bound waiting on an engine adapter.
//!
//! The adapter itself never blocks and promises nothing about when a result
//! arrives. A one-shot command line run needs both, so these helpers turn its
//! observers into futures and put a caller-side deadline on them.

use std::time::Duration;

use engine::{EngineAdapter, EngineEvent, EventKind};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Error type for wait operations.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("timeout waiting for {0} after {1:?}")]
    Timeout(&'static str, Duration),

    #[error("engine channel lost: {0}")]
    ChannelLost(String),

    #[error("engine terminated before {0}")]
    Terminated(&'static str),
}

/// Forward every event of `adapter` into a channel.
pub fn subscribe(adapter: &EngineAdapter) -> mpsc::UnboundedReceiver<EngineEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    adapter.on_message(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Wait until the handshake has completed.
///
/// # Errors
///
/// Returns [`WaitError::Timeout`] if `readyok` does not arrive in time, and
/// [`WaitError::Terminated`] if the adapter is torn down first.
pub async fn wait_for_ready(adapter: &EngineAdapter, timeout: Duration) -> Result<(), WaitError> {
    let (tx, rx) = oneshot::channel();
    adapter.on_ready(move || {
        let _ = tx.send(());
    });

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(())) => Ok(()),
        // Observers were dropped: terminated or channel lost
        Ok(Err(_)) => Err(WaitError::Terminated("handshake")),
        Err(_) => Err(WaitError::Timeout("handshake", timeout)),
    }
}

/// Drain `events` until one carries a best move, handing every event to
/// `on_event` on the way.
///
/// # Errors
///
/// Returns [`WaitError::ChannelLost`] if the engine goes away,
/// [`WaitError::Terminated`] if the adapter stops producing events, and
/// [`WaitError::Timeout`] if nothing terminal arrives before the deadline.
pub async fn wait_for_result<F>(
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    timeout: Duration,
    mut on_event: F,
) -> Result<EngineEvent, WaitError>
where
    F: FnMut(&EngineEvent),
{
    let deadline = Instant::now() + timeout;

    loop {
        let event = match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => return Err(WaitError::Terminated("a result")),
            Err(_) => return Err(WaitError::Timeout("a result", timeout)),
        };

        on_event(&event);

        if event.kind == EventKind::ChannelLost {
            return Err(WaitError::ChannelLost(event.raw_text));
        }
        if event.is_terminal() {
            return Ok(event);
        }
    }
}
