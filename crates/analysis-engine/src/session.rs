//! UCI engine session over an async line transport (usually a Stockfish
//! child process).
//!
//! One reader task dispatches every inbound line; it is the only writer of
//! the observation cell and the only place pending best moves resolve.
//! Outbound commands go through an unbounded queue drained by a writer task,
//! so requests never block the caller.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::observation::{EngineObservation, Score};
use crate::port::{AnalysisEngine, BestMove};
use crate::protocol::{parse_line, EngineCommand, EngineLine, GoParams, InfoLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Uninitialized,
    Handshaking,
    Ready,
    Searching,
    Terminated,
}

impl EngineState {
    pub fn accepts_requests(self) -> bool {
        matches!(self, EngineState::Ready | EngineState::Searching)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Analyze,
    FindBestMove,
}

/// A search issued to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    pub request_id: u64,
    pub kind: RequestKind,
    pub position: String,
    pub search_depth: u8,
    pub time_limit_ms: Option<u64>,
}

/// A search whose `bestmove` has not arrived yet. The engine answers
/// searches strictly in order, so the front entry owns every inbound line.
struct InFlight {
    request: EngineRequest,
    reply: Option<oneshot::Sender<Option<String>>>,
}

struct Inner {
    state: EngineState,
    next_request_id: u64,
    latest_request_id: u64,
    in_flight: VecDeque<InFlight>,
}

struct Shared {
    inner: Mutex<Inner>,
    commands: mpsc::UnboundedSender<EngineCommand>,
    state_tx: watch::Sender<EngineState>,
    observation_tx: watch::Sender<Option<EngineObservation>>,
    child: Mutex<Option<Child>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, cmd: EngineCommand) {
        debug!(cmd = %cmd, "SF <");
        if self.commands.send(cmd).is_err() {
            debug!("Engine writer gone, command dropped");
        }
    }

    fn set_state(&self, inner: &mut Inner, state: EngineState) {
        if inner.state != state {
            debug!(from = ?inner.state, to = ?state, "Engine state change");
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Move to `Terminated` and release every pending best-move awaiter.
    fn terminate(&self, reason: &str) {
        let mut inner = self.lock();
        if inner.state == EngineState::Terminated {
            return;
        }
        let pending = inner.in_flight.len();
        // Dropping the reply senders resolves the awaiters with `None`.
        inner.in_flight.clear();
        self.set_state(&mut inner, EngineState::Terminated);
        info!(reason, pending, "Engine session terminated");
    }

    fn kill_child(&self) {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(child) = child.as_mut() {
            // Best-effort synchronous kill
            let _ = child.start_kill();
        }
    }

    fn handle_line(&self, line: &str) {
        let trimmed = line.trim();
        debug!(line = trimmed, "SF >");

        match parse_line(trimmed) {
            Ok(EngineLine::ReadyOk) => {
                let mut inner = self.lock();
                if inner.state == EngineState::Handshaking {
                    self.set_state(&mut inner, EngineState::Ready);
                    info!("Engine ready");
                }
            }
            Ok(EngineLine::Info(info)) => self.handle_info(info),
            Ok(EngineLine::BestMove(mv)) => self.handle_best_move(mv),
            Ok(EngineLine::UciOk) | Ok(EngineLine::Other) => {}
            Err(e) => warn!(error = %e, "Ignoring engine output"),
        }
    }

    fn handle_info(&self, info: InfoLine) {
        let inner = self.lock();
        let request_id = match inner.in_flight.front() {
            // Progress from a superseded search is not worth showing.
            Some(front) if front.request.request_id == inner.latest_request_id => {
                front.request.request_id
            }
            _ => return,
        };

        let previous = self.observation_tx.borrow().clone();
        let (best, pv) = match (info.pv.first(), previous) {
            (Some(first), _) => (Some(first.clone()), info.pv.clone()),
            (None, Some(prev)) if prev.request_id == request_id => {
                (prev.principal_best_move, prev.principal_variation)
            }
            (None, _) => (None, Vec::new()),
        };

        let (cp, mate) = match info.score {
            Score::Centipawns(cp) => (Some(cp), None),
            Score::Mate(m) => (None, Some(m)),
        };

        self.observation_tx.send_replace(Some(EngineObservation {
            request_id,
            evaluation_centipawns: cp,
            mate_in_moves: mate,
            reached_depth: info.depth,
            principal_best_move: best,
            principal_variation: pv,
        }));
    }

    fn handle_best_move(&self, mv: Option<String>) {
        let mut inner = self.lock();
        match inner.in_flight.pop_front() {
            Some(done) => {
                debug!(
                    request_id = done.request.request_id,
                    kind = ?done.request.kind,
                    mv = ?mv,
                    "Search finished"
                );
                if let Some(reply) = done.reply {
                    let _ = reply.send(mv);
                }
            }
            None => debug!(mv = ?mv, "Unsolicited bestmove"),
        }
        if inner.in_flight.is_empty() && inner.state == EngineState::Searching {
            self.set_state(&mut inner, EngineState::Ready);
        }
    }
}

/// One external engine and the conversation with it.
pub struct EngineSession {
    shared: Arc<Shared>,
    handshake_timeout: Duration,
    options: Vec<(String, String)>,
}

impl EngineSession {
    /// Spawn the engine process. The session starts `Uninitialized`; call
    /// [`EngineSession::initialize`] to perform the handshake.
    pub fn spawn(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut child = Command::new(&config.stockfish_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "Failed to spawn {}: {e}",
                    config.stockfish_path
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdout not captured".into()))?;

        let session = Self::with_transport(stdout, stdin, config);
        *session
            .shared
            .child
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(child);
        info!(path = %config.stockfish_path, "Engine process spawned");
        Ok(session)
    }

    /// Run the protocol over an arbitrary line transport. Must be called
    /// from within a tokio runtime.
    pub fn with_transport<R, W>(reader: R, writer: W, config: &EngineConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(EngineState::Uninitialized);
        let (observation_tx, _) = watch::channel(None);

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: EngineState::Uninitialized,
                next_request_id: 1,
                latest_request_id: 0,
                in_flight: VecDeque::new(),
            }),
            commands,
            state_tx,
            observation_tx,
            child: Mutex::new(None),
        });

        tokio::spawn(write_loop(writer, command_rx, Arc::downgrade(&shared)));
        tokio::spawn(read_loop(reader, shared.clone()));

        Self {
            shared,
            handshake_timeout: config.handshake_timeout,
            options: vec![
                ("Threads".to_string(), config.threads.to_string()),
                ("Hash".to_string(), config.hash_mb.to_string()),
            ],
        }
    }

    /// Perform the UCI handshake. Resolves once the engine has answered
    /// `readyok`; fails with [`EngineError::Unavailable`] if it exits or
    /// does not answer in time. Not retried.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        {
            let mut inner = self.shared.lock();
            match inner.state {
                EngineState::Ready | EngineState::Searching => return Ok(()),
                EngineState::Terminated => {
                    return Err(EngineError::Unavailable("engine session terminated".into()))
                }
                EngineState::Handshaking => {}
                EngineState::Uninitialized => {
                    self.shared.set_state(&mut inner, EngineState::Handshaking);
                    self.shared.send(EngineCommand::Uci);
                    for (name, value) in &self.options {
                        self.shared.send(EngineCommand::SetOption {
                            name: name.clone(),
                            value: value.clone(),
                        });
                    }
                    self.shared.send(EngineCommand::IsReady);
                }
            }
        }

        let mut state_rx = self.shared.state_tx.subscribe();
        let settled = tokio::time::timeout(self.handshake_timeout, async {
            state_rx
                .wait_for(|s| !matches!(s, EngineState::Uninitialized | EngineState::Handshaking))
                .await
                .map(|s| *s)
        })
        .await;

        match settled {
            Ok(Ok(state)) if state.accepts_requests() => Ok(()),
            Ok(_) => Err(EngineError::Unavailable(
                "engine exited during handshake".into(),
            )),
            Err(_) => {
                self.shared.terminate("handshake timed out");
                self.shared.kill_child();
                Err(EngineError::Unavailable(format!(
                    "no readyok within {:?}",
                    self.handshake_timeout
                )))
            }
        }
    }

    pub fn state(&self) -> EngineState {
        *self.shared.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.shared.state_tx.subscribe()
    }

    pub fn latest_observation(&self) -> Option<EngineObservation> {
        self.shared.observation_tx.borrow().clone()
    }

    /// Start a depth-bounded analysis. No-op unless the session is ready.
    pub fn request_analysis(&self, position: &str, depth: u8) {
        self.issue(RequestKind::Analyze, position, depth, None, None);
    }

    /// Search for a move to play. Resolves with `None` if the session is
    /// not ready or is torn down before the engine answers.
    pub fn request_best_move(&self, position: &str, depth: u8, time_limit_ms: u64) -> BestMove {
        let (tx, best) = BestMove::channel();
        if self.issue(
            RequestKind::FindBestMove,
            position,
            depth,
            Some(time_limit_ms),
            Some(tx),
        ) {
            best
        } else {
            BestMove::empty()
        }
    }

    /// Cancel the running search, if any.
    pub fn stop(&self) {
        let inner = self.shared.lock();
        if inner.state == EngineState::Searching {
            self.shared.send(EngineCommand::Stop);
        }
    }

    /// Quit the engine and release every pending awaiter.
    pub fn shutdown(&self) {
        if self.state() != EngineState::Terminated {
            self.shared.send(EngineCommand::Quit);
        }
        self.shared.terminate("shutdown requested");
        self.shared.kill_child();
    }

    fn issue(
        &self,
        kind: RequestKind,
        position: &str,
        depth: u8,
        time_limit_ms: Option<u64>,
        reply: Option<oneshot::Sender<Option<String>>>,
    ) -> bool {
        let mut inner = self.shared.lock();
        if !inner.state.accepts_requests() {
            debug!(state = ?inner.state, kind = ?kind, "Engine not ready, request ignored");
            return false;
        }

        let request_id = inner.next_request_id;
        inner.next_request_id += 1;
        inner.latest_request_id = request_id;

        // Implicit cancel of whatever is running; its bestmove still arrives
        // and is matched to its own entry in `in_flight`.
        self.shared.send(EngineCommand::Stop);
        self.shared.send(EngineCommand::Position {
            fen: position.to_string(),
        });
        self.shared.send(EngineCommand::Go(GoParams {
            depth,
            movetime_ms: time_limit_ms,
        }));

        inner.in_flight.push_back(InFlight {
            request: EngineRequest {
                request_id,
                kind,
                position: position.to_string(),
                search_depth: depth,
                time_limit_ms,
            },
            reply,
        });
        self.shared.set_state(&mut inner, EngineState::Searching);
        true
    }
}

impl AnalysisEngine for EngineSession {
    fn request_analysis(&self, position: &str, depth: u8) {
        EngineSession::request_analysis(self, position, depth)
    }

    fn request_best_move(&self, position: &str, depth: u8, time_limit_ms: u64) -> BestMove {
        EngineSession::request_best_move(self, position, depth, time_limit_ms)
    }

    fn stop(&self) {
        EngineSession::stop(self)
    }

    fn is_ready(&self) -> bool {
        self.state().accepts_requests()
    }

    fn observations(&self) -> watch::Receiver<Option<EngineObservation>> {
        self.shared.observation_tx.subscribe()
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.shared.terminate("session dropped");
        self.shared.kill_child();
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<EngineCommand>,
    shared: Weak<Shared>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(cmd) = commands.recv().await {
        let line = format!("{cmd}\n");
        let written = match writer.write_all(line.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(error = %e, "Failed to write to engine");
            if let Some(shared) = shared.upgrade() {
                shared.terminate("engine stdin closed");
            }
            return;
        }
        if matches!(cmd, EngineCommand::Quit) {
            return;
        }
    }
}

async fn read_loop<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => shared.handle_line(&line),
            Ok(None) => {
                shared.terminate("engine output closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read from engine");
                shared.terminate("engine output unreadable");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, Lines, ReadHalf, WriteHalf};

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// The engine side of an in-memory transport.
    struct FakeEngine {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl FakeEngine {
        async fn next(&mut self) -> String {
            self.lines.next_line().await.unwrap().expect("session closed")
        }

        async fn expect(&mut self, line: &str) {
            assert_eq!(self.next().await, line);
        }

        async fn skip_until(&mut self, line: &str) {
            while self.next().await != line {}
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{line}\n").as_bytes())
                .await
                .unwrap();
        }
    }

    fn pair(config: &EngineConfig) -> (EngineSession, FakeEngine) {
        let (ours, theirs) = tokio::io::duplex(64 * 1024);
        let (r, w) = tokio::io::split(ours);
        let session = EngineSession::with_transport(r, w, config);
        let (tr, tw) = tokio::io::split(theirs);
        (
            session,
            FakeEngine {
                lines: BufReader::new(tr).lines(),
                writer: tw,
            },
        )
    }

    async fn ready_pair() -> (EngineSession, FakeEngine) {
        let (session, mut engine) = pair(&EngineConfig::default());
        let (res, ()) = tokio::join!(session.initialize(), async {
            engine.expect("uci").await;
            engine.skip_until("isready").await;
            engine.send("uciok").await;
            engine.send("readyok").await;
        });
        res.unwrap();
        (session, engine)
    }

    #[tokio::test]
    async fn test_handshake_reaches_ready() {
        let (session, mut engine) = pair(&EngineConfig::default());
        assert_eq!(session.state(), EngineState::Uninitialized);

        let (res, ()) = tokio::join!(session.initialize(), async {
            engine.expect("uci").await;
            engine.expect("setoption name Threads value 1").await;
            engine.expect("setoption name Hash value 64").await;
            engine.expect("isready").await;
            engine.send("id name FakeFish").await;
            engine.send("readyok").await;
        });
        res.unwrap();
        assert_eq!(session.state(), EngineState::Ready);
        assert!(AnalysisEngine::is_ready(&session));

        // A second call is a no-op.
        session.initialize().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_is_unavailable() {
        let config = EngineConfig {
            handshake_timeout: Duration::from_secs(1),
            ..EngineConfig::default()
        };
        let (session, _engine) = pair(&config);
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
        assert_eq!(session.state(), EngineState::Terminated);
    }

    #[tokio::test]
    async fn test_engine_exit_during_handshake_is_unavailable() {
        let (session, engine) = pair(&EngineConfig::default());
        drop(engine);
        let err = session.initialize().await.unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_unavailable() {
        let config = EngineConfig {
            stockfish_path: "/nonexistent/engine-binary".into(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            EngineSession::spawn(&config),
            Err(EngineError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_requests_before_ready_are_noops() {
        let (session, _engine) = pair(&EngineConfig::default());
        session.request_analysis(START, 10);
        assert_eq!(session.request_best_move(START, 5, 100).await, None);
        assert_eq!(session.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn test_analysis_streams_observations() {
        let (session, mut engine) = ready_pair().await;
        let mut observations = AnalysisEngine::observations(&session);

        session.request_analysis(START, 15);
        assert_eq!(session.state(), EngineState::Searching);
        engine.expect("stop").await;
        engine.expect(&format!("position fen {START}")).await;
        engine.expect("go depth 15").await;

        engine
            .send("info depth 10 seldepth 14 multipv 1 score cp 45 nodes 12345 pv e2e4 e7e5")
            .await;
        observations.changed().await.unwrap();
        let obs = observations.borrow_and_update().clone().unwrap();
        assert_eq!(obs.request_id, 1);
        assert_eq!(obs.evaluation_centipawns, Some(45));
        assert_eq!(obs.reached_depth, 10);
        assert_eq!(obs.principal_best_move.as_deref(), Some("e2e4"));

        // A later line without a pv keeps the known best move.
        engine.send("info depth 11 score mate 4 nodes 20000").await;
        observations.changed().await.unwrap();
        let obs = observations.borrow_and_update().clone().unwrap();
        assert_eq!(obs.mate_in_moves, Some(4));
        assert_eq!(obs.evaluation_centipawns, None);
        assert_eq!(obs.principal_best_move.as_deref(), Some("e2e4"));

        engine.send("bestmove e2e4 ponder e7e5").await;
        let mut state = session.subscribe_state();
        state.wait_for(|s| *s == EngineState::Ready).await.unwrap();
    }

    #[tokio::test]
    async fn test_best_move_resolves() {
        let (session, mut engine) = ready_pair().await;

        let best = session.request_best_move(START, 8, 500);
        engine.expect("stop").await;
        engine.expect(&format!("position fen {START}")).await;
        engine.expect("go movetime 500 depth 8").await;
        engine.send("info depth 8 score cp 20 pv d2d4").await;
        engine.send("bestmove d2d4").await;

        assert_eq!(best.await, Some("d2d4".to_string()));
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_older() {
        let (session, mut engine) = ready_pair().await;

        let first = session.request_best_move(START, 5, 100);
        let second = session.request_best_move(START, 8, 200);
        engine.skip_until("go movetime 100 depth 5").await;
        engine.expect("stop").await;
        engine.skip_until("go movetime 200 depth 8").await;

        // The stopped search still reports before the new one starts.
        engine.send("info depth 3 score cp -300 pv g1h3").await;
        engine.send("bestmove g1h3").await;
        engine.send("info depth 8 score cp 25 pv e2e4").await;
        engine.send("bestmove e2e4").await;

        assert_eq!(first.await, Some("g1h3".to_string()));
        assert_eq!(second.await, Some("e2e4".to_string()));

        let obs = session.latest_observation().unwrap();
        assert_eq!(obs.request_id, 2);
        assert_eq!(obs.evaluation_centipawns, Some(25));
    }

    #[tokio::test]
    async fn test_malformed_lines_are_ignored() {
        let (session, mut engine) = ready_pair().await;

        let best = session.request_best_move(START, 5, 100);
        engine.skip_until("go movetime 100 depth 5").await;
        engine.send("info depth banana score cp 1 pv e2e4").await;
        engine.send("bestmove").await;
        engine.send("complete nonsense").await;
        engine.send("bestmove c2c4").await;

        assert_eq!(best.await, Some("c2c4".to_string()));
        assert_eq!(session.latest_observation(), None);
    }

    #[tokio::test]
    async fn test_no_legal_move_resolves_none() {
        let (session, mut engine) = ready_pair().await;
        let best = session.request_best_move(START, 5, 100);
        engine.skip_until("go movetime 100 depth 5").await;
        engine.send("bestmove (none)").await;
        assert_eq!(best.await, None);
    }

    #[tokio::test]
    async fn test_stop_when_idle_sends_nothing() {
        let (session, mut engine) = ready_pair().await;
        session.stop();
        session.stop();

        let _best = session.request_best_move(START, 5, 100);
        // Only the request's own implicit cancel shows up.
        engine.expect("stop").await;
        engine.expect(&format!("position fen {START}")).await;

        session.stop();
        engine.expect("go movetime 100 depth 5").await;
        engine.expect("stop").await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_pending_best_move() {
        let (session, mut engine) = ready_pair().await;
        let best = session.request_best_move(START, 20, 4000);
        engine.skip_until("go movetime 4000 depth 20").await;

        session.shutdown();
        assert_eq!(best.await, None);
        assert_eq!(session.state(), EngineState::Terminated);
        engine.expect("quit").await;

        // Requests after teardown resolve immediately.
        assert_eq!(session.request_best_move(START, 5, 100).await, None);
    }

    #[tokio::test]
    async fn test_process_exit_releases_pending_best_move() {
        let (session, mut engine) = ready_pair().await;
        let best = session.request_best_move(START, 20, 4000);
        engine.skip_until("go movetime 4000 depth 20").await;

        drop(engine);
        assert_eq!(best.await, None);
        assert_eq!(session.state(), EngineState::Terminated);
    }
}
