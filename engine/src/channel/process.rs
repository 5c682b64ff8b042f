use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};

use super::{ChannelError, EngineChannel, Inbound, InboundCallback, Subscribers};
use crate::lock;

/// How long a closed engine gets to exit on its own before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Channel backed by a real engine executable speaking UCI on stdin/stdout.
pub struct ProcessChannel {
    stdin_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    subscribers: Arc<Subscribers>,
}

impl ProcessChannel {
    /// Spawn the engine at `path`. Must be called from within a tokio runtime.
    #[tracing::instrument(level = "info")]
    pub fn spawn(path: &Path) -> Result<Self, ChannelError> {
        tracing::info!("Spawning engine process");
        let mut process = tokio::process::Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to spawn engine: {}", source);
                ChannelError::Spawn {
                    path: path.display().to_string(),
                    source,
                }
            })?;

        let stdin = process.stdin.take().ok_or(ChannelError::NoStdin)?;
        let stdout = process.stdout.take().ok_or(ChannelError::NoStdout)?;
        let subscribers = Arc::new(Subscribers::new());

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel::<String>();
        tokio::spawn(write_commands(stdin, stdin_rx));
        tokio::spawn(read_lines(stdout, subscribers.clone()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(reap(process, shutdown_rx));

        tracing::info!("Engine process spawned");
        Ok(Self {
            stdin_tx: Mutex::new(Some(stdin_tx)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            subscribers,
        })
    }
}

impl EngineChannel for ProcessChannel {
    fn send(&self, command: &str) -> Result<(), ChannelError> {
        let stdin_tx = lock(&self.stdin_tx);
        let tx = stdin_tx.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(command.to_string()).map_err(|_| ChannelError::Closed)
    }

    fn on_receive(&self, callback: InboundCallback) {
        self.subscribers.register(callback);
    }

    fn close(&self) {
        if !self.subscribers.close() {
            return;
        }
        tracing::debug!("Closing engine process channel");
        // Dropping the sender lets the writer flush what is queued, then EOF stdin
        lock(&self.stdin_tx).take();
        if let Some(shutdown_tx) = lock(&self.shutdown_tx).take() {
            let _ = shutdown_tx.send(());
        }
    }

    fn is_closed(&self) -> bool {
        self.subscribers.is_closed()
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn write_commands(mut stdin: ChildStdin, mut stdin_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(cmd) = stdin_rx.recv().await {
        tracing::trace!("UCI >> {}", cmd);
        let framed = format!("{}\n", cmd);
        if let Err(e) = stdin.write_all(framed.as_bytes()).await {
            tracing::error!("Failed to write to stdin: {}", e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            tracing::error!("Failed to flush stdin: {}", e);
            break;
        }
    }
    tracing::debug!("Stdin writer task exiting");
}

async fn read_lines(stdout: ChildStdout, subscribers: Arc<Subscribers>) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    let lost = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break Some("engine closed its output".to_string()),
            Ok(_) => {
                let line = decode_line(&buf);
                tracing::trace!("UCI << {}", line);
                if !subscribers.deliver(Inbound::Line(line)) {
                    break None;
                }
            }
            Err(e) => break Some(format!("error reading engine output: {}", e)),
        }
    };

    if let Some(reason) = lost {
        if subscribers.deliver(Inbound::Disconnected(reason.clone())) {
            tracing::warn!("Engine channel lost: {}", reason);
        }
    }
    tracing::debug!("Stdout reader task exiting");
}

/// One line of engine output without its terminator. Invalid UTF-8 is
/// replaced, never rejected.
fn decode_line(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

async fn reap(mut process: Child, shutdown_rx: oneshot::Receiver<()>) {
    tokio::select! {
        status = process.wait() => match status {
            Ok(status) => tracing::info!("Engine exited: {}", status),
            Err(e) => tracing::error!("Failed to wait for engine: {}", e),
        },
        _ = shutdown_rx => {
            match tokio::time::timeout(SHUTDOWN_GRACE, process.wait()).await {
                Ok(_) => tracing::debug!("Engine exited after close"),
                Err(_) => {
                    tracing::warn!("Engine did not exit within {:?}, killing", SHUTDOWN_GRACE);
                    let _ = process.kill().await;
                }
            }
        }
    }
}

/// Find a Stockfish executable in common locations
pub fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
    ];

    if let Some(found) = paths.iter().map(Path::new).find(|path| path.exists()) {
        return Some(found.to_path_buf());
    }

    // In PATH
    std::process::Command::new("stockfish")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .arg("quit")
        .status()
        .ok()
        .map(|_| PathBuf::from("stockfish"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let result = ProcessChannel::spawn(Path::new("/nonexistent/engine-binary"));
        assert!(matches!(result, Err(ChannelError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lines_and_disconnect_from_real_process() {
        // `cat` echoes each command back and exits once stdin is closed
        let channel = ProcessChannel::spawn(Path::new("cat")).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.on_receive(Arc::new(move |inbound| {
            let _ = tx.send(inbound);
        }));

        channel.send("uciok").unwrap();
        channel.send("readyok").unwrap();

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(first, Some(Inbound::Line("uciok".to_string())));
        assert_eq!(second, Some(Inbound::Line("readyok".to_string())));

        // Closing the writer side without close() looks like an engine crash
        lock(&channel.stdin_tx).take();
        let lost = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(lost, Some(Inbound::Disconnected(_))));
    }

    #[test]
    fn test_decode_line_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"readyok\r\n"), "readyok");
        assert_eq!(decode_line(b"info string caf\xe9\n"), "info string caf\u{FFFD}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_line_does_not_drop_the_channel() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("latin1-engine.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf 'info string caf\\351\\n'\nprintf 'bestmove e2e4\\n'\nexec cat\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let channel = ProcessChannel::spawn(&script).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.on_receive(Arc::new(move |inbound| {
            let _ = tx.send(inbound);
        }));

        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(first, Some(Inbound::Line("info string caf\u{FFFD}".to_string())));
        assert_eq!(second, Some(Inbound::Line("bestmove e2e4".to_string())));
        assert!(!channel.is_closed());

        channel.close();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_send_after_close_is_rejected() {
        let channel = ProcessChannel::spawn(Path::new("cat")).unwrap();
        channel.close();
        assert!(channel.is_closed());
        assert!(matches!(channel.send("isready"), Err(ChannelError::Closed)));
    }
}
