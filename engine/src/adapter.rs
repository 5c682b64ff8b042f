//! The engine adapter: owns a channel, drives the handshake, and fans parsed
//! events out to observers.
//!
//! Every public method returns immediately. Results arrive later through the
//! observers registered with [`EngineAdapter::on_message`], called from a
//! single dispatcher task in the order the channel produced the lines.
//!
//! If the channel goes away on its own, the adapter moves to
//! [`ReadinessState::Terminated`], delivers one [`EventKind::ChannelLost`]
//! event whose `raw_text` is the reason, and drops all observers. A
//! disconnect after [`EngineAdapter::terminate`] is not reported.
//!
//! Overlapping `evaluate` calls are not correlated: their events are
//! indistinguishable, and superseding a running search is left to the engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::{EngineChannel, Inbound, ProcessChannel, SimulatedChannel};
use crate::config::{ChannelKind, EngineConfig};
use crate::readiness::{Readiness, ReadinessState};
use crate::request::AnalysisRequest;
use crate::uci::{self, parse_line, EngineEvent, EventKind, MIN_DEPTH};
use crate::{lock, EngineError};

/// Characters of the FEN shown when an analysis starts.
const FEN_LOG_PREFIX: usize = 30;

type Observer = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Returned on registration; pass to [`EngineAdapter::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct Shared {
    channel: Box<dyn EngineChannel>,
    readiness: Mutex<Readiness>,
    observers: Mutex<Vec<(ObserverId, Observer)>>,
    /// One-shot observers that have fired and can be dropped.
    spent: Arc<Mutex<Vec<ObserverId>>>,
    next_observer: AtomicU64,
    engine_name: Mutex<Option<String>>,
    last_score: Mutex<Option<EngineEvent>>,
}

pub struct EngineAdapter {
    shared: Arc<Shared>,
    dispatcher: JoinHandle<()>,
}

impl EngineAdapter {
    /// Take ownership of `channel` and start the handshake.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(channel: Box<dyn EngineChannel>) -> Self {
        Self::with_options(channel, &[])
    }

    /// Like [`EngineAdapter::new`], setting engine options between `uci` and
    /// `isready` so that `readyok` confirms they were applied.
    pub fn with_options(channel: Box<dyn EngineChannel>, options: &[(String, String)]) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        channel.on_receive(Arc::new(move |inbound| {
            let _ = inbound_tx.send(inbound);
        }));

        let shared = Arc::new(Shared {
            channel,
            readiness: Mutex::new(Readiness::new()),
            observers: Mutex::new(Vec::new()),
            spent: Arc::new(Mutex::new(Vec::new())),
            next_observer: AtomicU64::new(0),
            engine_name: Mutex::new(None),
            last_score: Mutex::new(None),
        });
        let dispatcher = tokio::spawn(dispatch(Arc::downgrade(&shared), inbound_rx));

        let [uci_cmd, isready_cmd] = uci::encode_handshake();
        shared.send(&uci_cmd);
        for (name, value) in options {
            tracing::info!("Setting engine option {} = {}", name, value);
            shared.send(&uci::encode_set_option(name, Some(value)));
        }
        shared.send(&isready_cmd);
        lock(&shared.readiness).begin_handshake();

        Self { shared, dispatcher }
    }

    /// Build the channel `config` asks for and start the handshake.
    ///
    /// Failing to create the channel is the one hard error: there is nothing
    /// to fall back to.
    #[tracing::instrument(level = "info", skip(config), fields(channel = %config.channel))]
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let channel: Box<dyn EngineChannel> = match config.channel {
            ChannelKind::Process => {
                let path = config.resolve_engine_path()?;
                tracing::info!("Using engine process at {:?}", path);
                Box::new(ProcessChannel::spawn(&path)?)
            }
            ChannelKind::Simulated => {
                tracing::info!("Using simulated engine");
                Box::new(SimulatedChannel::spawn(config.simulator.clone()))
            }
        };
        Ok(Self::with_options(channel, &config.uci_options()))
    }

    pub fn state(&self) -> ReadinessState {
        lock(&self.shared.readiness).state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ReadinessState::Ready
    }

    /// Engine name from `id name`, once the engine has reported it.
    pub fn engine_name(&self) -> Option<String> {
        lock(&self.shared.engine_name).clone()
    }

    /// Start a depth-limited search of `fen`.
    ///
    /// Depths above 24 are capped; a depth of 0 is rejected. Before the
    /// handshake completes this logs a warning and sends nothing. After
    /// [`EngineAdapter::terminate`] it does nothing.
    pub fn evaluate(&self, fen: &str, depth: u32) -> Result<(), EngineError> {
        let state = self.state();
        if state == ReadinessState::Terminated {
            tracing::debug!("Ignoring evaluate on terminated engine");
            return Ok(());
        }
        if depth < MIN_DEPTH {
            return Err(EngineError::InvalidDepth(depth));
        }
        if state != ReadinessState::Ready {
            tracing::warn!("Engine not ready ({:?}), ignoring evaluate", state);
            return Ok(());
        }

        let capped = uci::clamp_depth(depth);
        if capped != depth {
            tracing::debug!("Capping search depth {} to {}", depth, capped);
        }
        let preview: String = fen.chars().take(FEN_LOG_PREFIX).collect();
        tracing::info!("Analyzing position: {}... (depth {})", preview, capped);

        self.shared.send(&uci::encode_position(fen));
        self.shared.send(&uci::encode_go(capped));
        Ok(())
    }

    /// Validate a relay-shaped request and evaluate it.
    pub fn submit(&self, request: &AnalysisRequest) -> Result<(), EngineError> {
        request.validate()?;
        self.evaluate(&request.fen, request.depth)
    }

    /// Ask the engine to stop searching. Advisory: a `bestmove` may still
    /// arrive afterwards. Sent in any state until the channel is closed.
    pub fn stop(&self) {
        if self.shared.is_terminated() || self.shared.channel.is_closed() {
            tracing::debug!("Ignoring stop on closed engine");
            return;
        }
        tracing::info!("Sending stop command to engine");
        self.shared.send(&uci::encode_stop());
    }

    /// Register an observer for every parsed event, handshake sentinels
    /// included. Observers run in registration order.
    pub fn on_message<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_id();
        if self.shared.is_terminated() {
            tracing::debug!("Not registering observer on terminated engine");
            return id;
        }
        lock(&self.shared.observers).push((id, Arc::new(callback)));
        id
    }

    /// Run `callback` once, when the handshake completes. If the engine is
    /// already ready it runs immediately.
    pub fn on_ready<F>(&self, callback: F) -> ObserverId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.shared.next_id();
        let readiness = lock(&self.shared.readiness);
        match readiness.state() {
            ReadinessState::Ready => {
                drop(readiness);
                callback();
            }
            ReadinessState::Terminated => {}
            _ => {
                let pending = Mutex::new(Some(callback));
                let spent = self.shared.spent.clone();
                let observer: Observer = Arc::new(move |event: &EngineEvent| {
                    if event.kind == EventKind::ReadyOk {
                        if let Some(callback) = lock(&pending).take() {
                            lock(&spent).push(id);
                            callback();
                        }
                    }
                });
                // Registered under the readiness lock so the transition cannot slip past
                lock(&self.shared.observers).push((id, observer));
            }
        }
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.shared.observers);
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    /// Send `quit`, close the channel and drop every observer.
    /// Idempotent; later calls on the adapter become no-ops.
    pub fn terminate(&self) {
        if !lock(&self.shared.readiness).terminate() {
            return;
        }
        tracing::info!("Terminating engine");
        self.shared.send(&uci::encode_quit());
        self.shared.channel.close();
        lock(&self.shared.observers).clear();
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        self.terminate();
        self.dispatcher.abort();
    }
}

impl Shared {
    fn next_id(&self) -> ObserverId {
        ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed))
    }

    fn is_terminated(&self) -> bool {
        lock(&self.readiness).is_terminated()
    }

    fn send(&self, command: &str) {
        tracing::debug!("UCI >> {}", command);
        if let Err(e) = self.channel.send(command) {
            tracing::warn!("Failed to send '{}' to engine: {}", command, e);
        }
    }

    fn handle_line(&self, line: &str) {
        let event = parse_line(line);

        {
            let mut readiness = lock(&self.readiness);
            if readiness.is_terminated() {
                tracing::trace!("Dropping line after termination: {}", line);
                return;
            }
            if event.kind == EventKind::ReadyOk && readiness.mark_ready() {
                tracing::info!("Engine ready");
            }
        }

        match event.kind {
            EventKind::Id => {
                if let Some(id) = event.id.as_ref().filter(|id| id.key == "name") {
                    tracing::info!("Engine identified as {}", id.value);
                    *lock(&self.engine_name) = Some(id.value.clone());
                }
            }
            EventKind::Info if event.score_centipawns.is_some() || event.mate_in.is_some() => {
                *lock(&self.last_score) = Some(event.clone());
            }
            EventKind::BestMove => {
                let last = lock(&self.last_score).take();
                tracing::info!(
                    best_move = event.best_move.as_deref().unwrap_or(""),
                    score_cp = last.as_ref().and_then(|e| e.score_centipawns),
                    mate_in = last.as_ref().and_then(|e| e.mate_in),
                    depth = last.as_ref().map(|e| e.search_depth).unwrap_or(0),
                    "Analysis complete"
                );
            }
            _ => {}
        }

        self.notify(&event);
        self.drop_spent();
    }

    fn drop_spent(&self) {
        let spent = std::mem::take(&mut *lock(&self.spent));
        if spent.is_empty() {
            return;
        }
        lock(&self.observers).retain(|(id, _)| !spent.contains(id));
    }

    fn notify(&self, event: &EngineEvent) {
        let observers: Vec<Observer> = lock(&self.observers)
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            // An observer may terminate the adapter
            if self.is_terminated() {
                break;
            }
            observer(event);
        }
    }

    fn handle_channel_lost(&self, reason: &str) {
        if !lock(&self.readiness).terminate() {
            tracing::debug!("Channel closed after termination: {}", reason);
            return;
        }
        tracing::error!("Engine channel lost: {}", reason);

        let observers = std::mem::take(&mut *lock(&self.observers));
        self.channel.close();

        let event = EngineEvent::channel_lost(reason);
        for (_, observer) in observers {
            observer(&event);
        }
    }
}

async fn dispatch(weak: Weak<Shared>, mut inbound_rx: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(inbound) = inbound_rx.recv().await {
        let Some(shared) = weak.upgrade() else {
            break;
        };
        match inbound {
            Inbound::Line(line) => shared.handle_line(&line),
            Inbound::Disconnected(reason) => {
                shared.handle_channel_lost(&reason);
                break;
            }
        }
    }
    tracing::debug!("Engine dispatcher exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannel;
    use std::time::Duration;
    use tokio::time::timeout;

    const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    fn mock_adapter() -> (EngineAdapter, MockChannel) {
        let mock = MockChannel::new();
        let adapter = EngineAdapter::new(Box::new(mock.clone()));
        (adapter, mock)
    }

    fn collect(adapter: &EngineAdapter) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        adapter.on_message(move |event| {
            let _ = tx.send(event.clone());
        });
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> EngineEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("observer dropped")
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) {
        let result = timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(!matches!(result, Ok(Some(_))), "unexpected event: {:?}", result);
    }

    async fn ready_adapter() -> (EngineAdapter, MockChannel, mpsc::UnboundedReceiver<EngineEvent>) {
        let (adapter, mock) = mock_adapter();
        let mut events = collect(&adapter);
        mock.push_lines(&["uciok", "readyok"]);
        next_event(&mut events).await;
        next_event(&mut events).await;
        assert!(adapter.is_ready());
        mock.clear_sent();
        (adapter, mock, events)
    }

    #[tokio::test]
    async fn test_construction_sends_handshake() {
        let (adapter, mock) = mock_adapter();
        assert_eq!(mock.sent(), vec!["uci", "isready"]);
        assert_eq!(adapter.state(), ReadinessState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn test_options_sent_inside_handshake() {
        let mock = MockChannel::new();
        let options = vec![("Threads".to_string(), "2".to_string())];
        let _adapter = EngineAdapter::with_options(Box::new(mock.clone()), &options);
        assert_eq!(
            mock.sent(),
            vec!["uci", "setoption name Threads value 2", "isready"]
        );
    }

    #[tokio::test]
    async fn test_events_arrive_in_channel_order() {
        let (adapter, mock) = mock_adapter();
        let mut events = collect(&adapter);

        mock.push_lines(&[
            "uciok",
            "readyok",
            "info depth 10 score cp 32 pv e2e4",
            "bestmove e2e4",
        ]);

        let first = next_event(&mut events).await;
        let second = next_event(&mut events).await;
        let third = next_event(&mut events).await;
        let fourth = next_event(&mut events).await;

        assert_eq!(first.kind, EventKind::UciOk);
        assert_eq!(second.kind, EventKind::ReadyOk);
        assert_eq!(third.score_centipawns, Some(32));
        assert_eq!(third.search_depth, 10);
        assert_eq!(third.principal_variation, Some(vec!["e2e4".to_string()]));
        assert_eq!(fourth.best_move.as_deref(), Some("e2e4"));
        assert!(adapter.is_ready());
    }

    #[tokio::test]
    async fn test_evaluate_before_ready_sends_nothing() {
        let (adapter, mock) = mock_adapter();
        mock.clear_sent();

        assert!(adapter.evaluate(START_FEN, 10).is_ok());
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_sends_position_then_go() {
        let (adapter, mock, _events) = ready_adapter().await;

        adapter.evaluate(START_FEN, 10).unwrap();
        assert_eq!(
            mock.sent(),
            vec![format!("position fen {}", START_FEN), "go depth 10".to_string()]
        );
    }

    #[tokio::test]
    async fn test_evaluate_caps_depth() {
        let (adapter, mock, _events) = ready_adapter().await;

        adapter.evaluate(START_FEN, 99).unwrap();
        assert_eq!(mock.sent().last().map(String::as_str), Some("go depth 24"));
    }

    #[tokio::test]
    async fn test_evaluate_rejects_zero_depth() {
        let (adapter, mock, _events) = ready_adapter().await;

        assert!(matches!(
            adapter.evaluate(START_FEN, 0),
            Err(EngineError::InvalidDepth(0))
        ));
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_submit_validates_request() {
        let (adapter, mock, _events) = ready_adapter().await;

        assert!(matches!(
            adapter.submit(&AnalysisRequest::new("")),
            Err(EngineError::Protocol(_))
        ));
        adapter.submit(&AnalysisRequest::new(START_FEN)).unwrap();
        assert_eq!(mock.sent().last().map(String::as_str), Some("go depth 20"));
    }

    #[tokio::test]
    async fn test_stop_is_sent_before_ready() {
        let (adapter, mock) = mock_adapter();
        mock.clear_sent();
        adapter.stop();
        assert_eq!(adapter.state(), ReadinessState::AwaitingHandshake);
        assert_eq!(mock.sent(), vec!["stop"]);

        let mut events = collect(&adapter);
        mock.push_line("readyok");
        next_event(&mut events).await;
        adapter.stop();
        assert_eq!(mock.sent(), vec!["stop", "stop"]);
    }

    #[tokio::test]
    async fn test_stop_after_channel_closed_sends_nothing() {
        let (adapter, mock) = mock_adapter();
        mock.close();
        mock.clear_sent();
        adapter.stop();
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (adapter, mock, _events) = ready_adapter().await;

        adapter.terminate();
        adapter.terminate();

        assert_eq!(adapter.state(), ReadinessState::Terminated);
        assert_eq!(mock.sent(), vec!["quit"]);
        assert!(mock.is_closed());

        assert!(adapter.evaluate(START_FEN, 10).is_ok());
        assert!(adapter.evaluate(START_FEN, 0).is_ok());
        adapter.stop();
        assert_eq!(mock.sent(), vec!["quit"]);
    }

    #[tokio::test]
    async fn test_no_events_after_terminate() {
        let (adapter, mock, mut events) = ready_adapter().await;

        adapter.terminate();
        mock.push_line("bestmove e2e4");
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn test_on_ready_fires_once() {
        let (adapter, mock) = mock_adapter();
        let (tx, mut rx) = mpsc::unbounded_channel();
        adapter.on_ready(move || {
            let _ = tx.send(());
        });
        let mut events = collect(&adapter);

        mock.push_lines(&["uciok", "readyok", "readyok"]);
        for _ in 0..3 {
            next_event(&mut events).await;
        }

        assert_eq!(rx.recv().await, Some(()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_on_ready_observer_is_dropped_after_firing() {
        let (adapter, mock) = mock_adapter();
        adapter.on_ready(|| {});
        adapter.on_ready(|| {});
        let mut events = collect(&adapter);
        assert_eq!(lock(&adapter.shared.observers).len(), 3);

        mock.push_lines(&["uciok", "readyok", "info string after ready"]);
        for _ in 0..3 {
            next_event(&mut events).await;
        }

        // The readyok line has been fully dispatched once a later event arrives
        assert_eq!(lock(&adapter.shared.observers).len(), 1);
    }

    #[tokio::test]
    async fn test_on_ready_after_ready_runs_immediately() {
        let (adapter, _mock, _events) = ready_adapter().await;
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        adapter.on_ready(move || *flag.lock().unwrap() = true);
        assert!(*fired.lock().unwrap());
    }

    #[tokio::test]
    async fn test_on_ready_can_evaluate() {
        let mock = MockChannel::new();
        let adapter = Arc::new(EngineAdapter::new(Box::new(mock.clone())));
        let weak = Arc::downgrade(&adapter);
        adapter.on_ready(move || {
            if let Some(adapter) = weak.upgrade() {
                adapter.evaluate(START_FEN, 6).unwrap();
            }
        });
        let mut events = collect(&adapter);

        mock.push_line("readyok");
        next_event(&mut events).await;
        assert_eq!(mock.sent().last().map(String::as_str), Some("go depth 6"));
    }

    #[tokio::test]
    async fn test_observers_in_registration_order() {
        let (adapter, mock) = mock_adapter();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let order = order.clone();
            adapter.on_message(move |_| order.lock().unwrap().push(name));
        }
        let mut events = collect(&adapter);

        mock.push_line("uciok");
        next_event(&mut events).await;
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (adapter, mock) = mock_adapter();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let id = adapter.on_message(move |_| *counter.lock().unwrap() += 1);
        let mut events = collect(&adapter);

        assert!(adapter.unsubscribe(id));
        assert!(!adapter.unsubscribe(id));

        mock.push_line("uciok");
        next_event(&mut events).await;
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrecognized_lines_are_delivered() {
        let (adapter, mock) = mock_adapter();
        let mut events = collect(&adapter);

        mock.push_line("Stockfish 16 by the Stockfish developers");
        let event = next_event(&mut events).await;
        assert_eq!(event.kind, EventKind::Other);
        assert_eq!(event.raw_text, "Stockfish 16 by the Stockfish developers");
        assert_eq!(adapter.state(), ReadinessState::AwaitingHandshake);
    }

    #[tokio::test]
    async fn test_engine_name_is_captured() {
        let (adapter, mock) = mock_adapter();
        let mut events = collect(&adapter);

        mock.push_line("id name Stockfish 16");
        next_event(&mut events).await;
        assert_eq!(adapter.engine_name().as_deref(), Some("Stockfish 16"));
    }

    #[tokio::test]
    async fn test_channel_loss_terminates() {
        let (adapter, mock, mut events) = ready_adapter().await;

        mock.disconnect("engine closed its output");
        let event = next_event(&mut events).await;

        assert_eq!(event.kind, EventKind::ChannelLost);
        assert_eq!(event.raw_text, "engine closed its output");
        assert_eq!(adapter.state(), ReadinessState::Terminated);
        assert!(mock.is_closed());
        assert_quiet(&mut events).await;

        adapter.terminate();
        assert!(mock.sent().is_empty());
    }

    #[tokio::test]
    async fn test_observer_may_terminate() {
        let mock = MockChannel::new();
        let adapter = Arc::new(EngineAdapter::new(Box::new(mock.clone())));
        let weak = Arc::downgrade(&adapter);
        adapter.on_message(move |event| {
            if event.is_terminal() {
                if let Some(adapter) = weak.upgrade() {
                    adapter.terminate();
                }
            }
        });
        let mut events = collect(&adapter);

        mock.push_lines(&["uciok", "bestmove e2e4", "info depth 1"]);
        next_event(&mut events).await;
        assert_quiet(&mut events).await;
        assert_eq!(adapter.state(), ReadinessState::Terminated);
    }
}
