//! Session orchestrator
//!
//! A single task owns the game state, the move history and the mode flags.
//! Everything else talks to it through [`SessionHandle`], so mutations are
//! serialized by the command queue. Debounced analysis, AI pacing and the
//! pending best move are all branches of one `select!` loop; none of them
//! blocks command handling.
//!
//! Every change that could invalidate an AI computation bumps `generation`.
//! An AI move is requested and applied only while its [`AiTicket`] is still
//! relevant, checked once before the request and again on resolution.

use std::sync::Arc;

use analysis_engine::{AnalysisEngine, BestMove, EngineObservation};
use chess_core::pgn;
use chess_core::{
    CandidateMove, GameState, GameStatus, MoveRecord, RulesEngine, Side, STARTING_FEN,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::history::MoveHistoryManager;
use crate::settings::{strength, Mode, SessionTimings, Settings};
use crate::snapshot::{SessionEvent, SessionSnapshot};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands sent to the session actor. Each embeds a oneshot for the reply.
pub enum SessionCommand {
    ApplyMove {
        candidate: CandidateMove,
        reply: Reply<SessionSnapshot>,
    },
    Undo {
        reply: Reply<SessionSnapshot>,
    },
    Redo {
        reply: Reply<SessionSnapshot>,
    },
    Reset {
        reply: Reply<SessionSnapshot>,
    },
    UpdateSettings {
        settings: Settings,
        reply: Reply<SessionSnapshot>,
    },
    SetAiPaused {
        paused: bool,
        reply: Reply<SessionSnapshot>,
    },
    SetAiVsAiActive {
        active: bool,
        reply: Reply<SessionSnapshot>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Subscribe {
        reply: oneshot::Sender<(SessionSnapshot, broadcast::Receiver<SessionEvent>)>,
    },
    Shutdown,
}

/// The conditions an AI computation was started under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AiTicket {
    generation: u64,
    mode: Mode,
    side: Side,
}

pub struct SessionOrchestrator {
    rules: Arc<dyn RulesEngine>,
    engine: Arc<dyn AnalysisEngine>,
    timings: SessionTimings,
    initial: GameState,
    state: GameState,
    history: MoveHistoryManager,
    settings: Settings,
    ai_vs_ai_active: bool,
    /// Only holds back the vsAI opponent
    ai_paused: bool,
    generation: u64,
    analysis_due: Option<Instant>,
    ai_due: Option<(Instant, AiTicket)>,
    ai_search: Option<(AiTicket, BestMove)>,
    /// Latest engine request id seen before we asked about the current
    /// position. Only newer observations belong to it.
    eval_baseline: Option<u64>,
    evaluation: Option<EngineObservation>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionOrchestrator {
    pub fn new(
        rules: Arc<dyn RulesEngine>,
        engine: Arc<dyn AnalysisEngine>,
        settings: Settings,
        timings: SessionTimings,
    ) -> Result<Self, SessionError> {
        let initial = rules.game_state(STARTING_FEN)?;
        let history = MoveHistoryManager::new(rules.clone(), STARTING_FEN);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            rules,
            engine,
            timings,
            state: initial.clone(),
            initial,
            history,
            settings: settings.clamped(),
            ai_vs_ai_active: false,
            ai_paused: false,
            generation: 0,
            analysis_due: None,
            ai_due: None,
            ai_search: None,
            eval_baseline: None,
            evaluation: None,
            events,
        })
    }

    /// Start the actor on the current runtime.
    pub fn spawn(self) -> SessionHandle {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        tokio::spawn(self.run(rx));
        SessionHandle { tx }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!(mode = ?self.settings.mode, engine_ready = self.engine.is_ready(), "Session started");
        let mut observations = self.engine.observations();
        let mut observing = true;

        // Settings may already call for an AI move (e.g. vsAI as black).
        self.bump(true);

        loop {
            let analysis_due = self.analysis_due;
            let ai_due = self.ai_due.map(|(at, _)| at);

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = sleep_until(analysis_due.unwrap_or_else(Instant::now)), if analysis_due.is_some() => {
                    self.fire_analysis();
                }
                _ = sleep_until(ai_due.unwrap_or_else(Instant::now)), if ai_due.is_some() => {
                    self.fire_ai();
                }
                (ticket, best) = next_best_move(&mut self.ai_search) => {
                    self.ai_search = None;
                    self.on_ai_result(ticket, best);
                }
                changed = observations.changed(), if observing => match changed {
                    Ok(()) => {
                        let obs = observations.borrow_and_update().clone();
                        self.on_observation(obs);
                    }
                    Err(_) => {
                        warn!("Engine observation channel closed");
                        observing = false;
                    }
                },
            }
        }

        self.engine.stop();
        info!(generation = self.generation, "Session stopped");
    }

    fn handle(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::ApplyMove { candidate, reply } => {
                let _ = reply.send(self.apply_move(&candidate));
            }
            SessionCommand::Undo { reply } => {
                let _ = reply.send(self.undo());
            }
            SessionCommand::Redo { reply } => {
                let _ = reply.send(self.redo());
            }
            SessionCommand::Reset { reply } => {
                let _ = reply.send(Ok(self.reset()));
            }
            SessionCommand::UpdateSettings { settings, reply } => {
                let _ = reply.send(Ok(self.update_settings(settings)));
            }
            SessionCommand::SetAiPaused { paused, reply } => {
                let _ = reply.send(Ok(self.set_ai_paused(paused)));
            }
            SessionCommand::SetAiVsAiActive { active, reply } => {
                let _ = reply.send(self.set_ai_vs_ai_active(active));
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            SessionCommand::Subscribe { reply } => {
                let _ = reply.send((self.snapshot(), self.events.subscribe()));
            }
            SessionCommand::Shutdown => {}
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn apply_move(&mut self, candidate: &CandidateMove) -> Result<SessionSnapshot, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::GameOver);
        }
        match self.settings.mode {
            Mode::AiVsAi => return Err(SessionError::AiControlled),
            Mode::VsAi if self.state.turn_color != self.settings.player_color => {
                return Err(SessionError::NotYourTurn)
            }
            _ => {}
        }

        let record = self.play(candidate)?;
        info!(mv = %record.algebraic_notation, generation = self.generation, "Move played");
        Ok(self.snapshot())
    }

    fn undo(&mut self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_not_ai_vs_ai()?;
        self.engine.stop();

        let rewind = self.history.undo()?.ok_or(SessionError::NothingToUndo)?;
        if rewind.used_fallback {
            warn!(mv = %rewind.record.algebraic_notation, "Undo used single-step rollback");
        }
        if self.settings.mode == Mode::VsAi {
            // Resuming is an explicit player action.
            self.ai_paused = true;
        }
        self.state = self.adjudicate(rewind.state);
        self.bump(true);
        info!(mv = %rewind.record.algebraic_notation, generation = self.generation, "Move undone");
        Ok(self.snapshot())
    }

    fn redo(&mut self) -> Result<SessionSnapshot, SessionError> {
        self.ensure_not_ai_vs_ai()?;
        self.engine.stop();

        let redone = self.history.redo(&self.state.position);
        let transition = match redone {
            Ok(Some(transition)) => transition,
            Ok(None) => return Err(SessionError::NothingToRedo),
            Err(e) => {
                // The discarded entry changed what can be redone.
                self.publish();
                return Err(e);
            }
        };

        self.state = self.adjudicate(transition.state);
        self.bump(true);
        info!(mv = %transition.record.algebraic_notation, generation = self.generation, "Move redone");
        Ok(self.snapshot())
    }

    fn reset(&mut self) -> SessionSnapshot {
        self.engine.stop();
        self.state = self.initial.clone();
        self.history.reset(self.initial.position.clone());
        self.ai_vs_ai_active = false;
        self.ai_paused = false;
        self.ai_search = None;
        self.bump(true);
        info!(generation = self.generation, "New game");
        self.snapshot()
    }

    fn update_settings(&mut self, settings: Settings) -> SessionSnapshot {
        let settings = settings.clamped();
        if settings == self.settings {
            return self.snapshot();
        }

        if settings.mode != self.settings.mode {
            self.engine.stop();
            self.ai_vs_ai_active = false;
            self.ai_paused = false;
            info!(from = ?self.settings.mode, to = ?settings.mode, "Mode changed");
        }
        self.settings = settings;
        self.bump(false);
        self.snapshot()
    }

    fn set_ai_paused(&mut self, paused: bool) -> SessionSnapshot {
        if paused != self.ai_paused {
            if paused && self.settings.mode == Mode::VsAi {
                self.engine.stop();
            }
            self.ai_paused = paused;
            info!(paused, "AI pause toggled");
            self.bump(false);
        }
        self.snapshot()
    }

    fn set_ai_vs_ai_active(&mut self, active: bool) -> Result<SessionSnapshot, SessionError> {
        if active == self.ai_vs_ai_active {
            return Ok(self.snapshot());
        }
        if active {
            if self.settings.mode != Mode::AiVsAi {
                return Err(SessionError::WrongMode);
            }
            if self.state.is_terminal() {
                return Err(SessionError::GameOver);
            }
        } else {
            self.engine.stop();
        }

        self.ai_vs_ai_active = active;
        info!(active, "AI vs AI toggled");
        self.bump(false);
        Ok(self.snapshot())
    }

    // ========================================================================
    // State transitions
    // ========================================================================

    /// Validate and apply `candidate` on top of the current state.
    fn play(&mut self, candidate: &CandidateMove) -> Result<MoveRecord, SessionError> {
        if self.history.is_full() {
            return Err(SessionError::HistoryFull(self.history.capacity()));
        }
        let transition = self
            .rules
            .validate_and_apply(&self.state.position, candidate)?;
        self.history.record_move(&transition)?;

        self.state = self.adjudicate(transition.state);
        self.bump(true);
        Ok(transition.record)
    }

    /// Threefold repetition is not visible to the rules engine, which only
    /// sees one position.
    fn adjudicate(&self, mut state: GameState) -> GameState {
        if !state.is_terminal() && self.history.occurrences(&state.position) >= 3 {
            info!(fen = %state.position, "Threefold repetition");
            state.status = GameStatus::DrawOther;
        }
        state
    }

    fn ensure_not_ai_vs_ai(&self) -> Result<(), SessionError> {
        if self.settings.mode == Mode::AiVsAi && self.ai_vs_ai_active {
            return Err(SessionError::AiControlled);
        }
        Ok(())
    }

    /// Record that something relevant changed: invalidate pending AI work,
    /// restart the analysis debounce if the position moved, reschedule.
    fn bump(&mut self, position_changed: bool) {
        self.generation += 1;

        if self.state.is_terminal() && self.ai_vs_ai_active {
            info!(status = ?self.state.status, "Game over, AI vs AI stopped");
            self.ai_vs_ai_active = false;
        }

        if position_changed {
            self.evaluation = None;
            self.eval_baseline = None;
            self.analysis_due = Some(Instant::now() + self.timings.debounce);
        }

        self.schedule_ai();
        self.publish();
    }

    fn schedule_ai(&mut self) {
        self.ai_due = self.ai_side().map(|side| {
            let delay = match self.settings.mode {
                Mode::AiVsAi => self.timings.ai_vs_ai_delay,
                _ => self.timings.vs_ai_delay,
            };
            let ticket = AiTicket {
                generation: self.generation,
                mode: self.settings.mode,
                side,
            };
            debug!(generation = ticket.generation, side = %side, "AI move scheduled");
            (Instant::now() + delay, ticket)
        });
    }

    /// The side the engine should move for right now, if any.
    fn ai_side(&self) -> Option<Side> {
        if self.state.is_terminal() {
            return None;
        }
        let turn = self.state.turn_color;
        match self.settings.mode {
            Mode::VsAi if !self.ai_paused && turn != self.settings.player_color => Some(turn),
            Mode::AiVsAi if self.ai_vs_ai_active => Some(turn),
            _ => None,
        }
    }

    fn is_relevant(&self, ticket: &AiTicket) -> bool {
        ticket.generation == self.generation
            && ticket.mode == self.settings.mode
            && self.ai_side() == Some(ticket.side)
    }

    fn ai_thinking(&self) -> bool {
        self.ai_due.is_some()
            || self
                .ai_search
                .as_ref()
                .is_some_and(|(ticket, _)| self.is_relevant(ticket))
    }

    // ========================================================================
    // Timers and engine results
    // ========================================================================

    fn fire_analysis(&mut self) {
        self.analysis_due = None;

        // A best-move search for this very position is already streaming
        // observations; a new request would cancel it.
        if let Some((ticket, _)) = &self.ai_search {
            if self.is_relevant(ticket) {
                debug!(generation = self.generation, "AI search in flight, analysis skipped");
                return;
            }
        }

        self.mark_eval_baseline();
        self.engine
            .request_analysis(&self.state.position, self.timings.analysis_depth);
        debug!(fen = %self.state.position, generation = self.generation, "Analysis requested");
    }

    fn fire_ai(&mut self) {
        let Some((_, ticket)) = self.ai_due.take() else {
            return;
        };
        if !self.is_relevant(&ticket) {
            debug!(generation = ticket.generation, "AI move no longer needed");
            self.publish();
            return;
        }
        if !self.engine.is_ready() {
            warn!("Engine not ready, AI move skipped");
            self.notice("Engine unavailable, the computer cannot move");
            self.halt_after_engine_failure();
            return;
        }

        let level = self.settings.level_for(ticket.side);
        let budget = strength(level);
        self.mark_eval_baseline();
        let best = self.engine.request_best_move(
            &self.state.position,
            budget.depth,
            budget.think_time_ms,
        );
        info!(
            side = %ticket.side,
            level,
            depth = budget.depth,
            generation = ticket.generation,
            "AI move requested"
        );
        self.ai_search = Some((ticket, best));
    }

    fn on_ai_result(&mut self, ticket: AiTicket, best: Option<String>) {
        if !self.is_relevant(&ticket) {
            info!(
                generation = ticket.generation,
                current = self.generation,
                mv = ?best,
                "Discarding stale AI move"
            );
            self.publish();
            return;
        }

        let Some(uci) = best else {
            warn!(generation = ticket.generation, "Engine returned no move");
            self.notice("The engine did not find a move");
            self.halt_after_engine_failure();
            return;
        };

        let played = uci
            .parse::<CandidateMove>()
            .map_err(SessionError::from)
            .and_then(|candidate| self.play(&candidate));
        match played {
            Ok(record) => {
                info!(mv = %record.algebraic_notation, side = %ticket.side, "AI move played");
                let _ = self.events.send(SessionEvent::AiMove { record });
            }
            Err(e) => {
                warn!(error = %e, mv = %uci, "Engine move rejected");
                self.notice(&format!("Engine move {uci} was rejected: {e}"));
                self.halt_after_engine_failure();
            }
        }
    }

    /// Nothing gets rescheduled after a failed AI turn, so an AI vs AI
    /// game stops rather than reporting itself as running.
    fn halt_after_engine_failure(&mut self) {
        if self.ai_vs_ai_active {
            info!("AI vs AI stopped after engine failure");
            self.ai_vs_ai_active = false;
            self.bump(false);
        } else {
            self.publish();
        }
    }

    fn on_observation(&mut self, obs: Option<EngineObservation>) {
        let (Some(obs), Some(baseline)) = (obs, self.eval_baseline) else {
            return;
        };
        if obs.request_id <= baseline {
            return;
        }
        let white_to_move = self.state.turn_color == Side::White;
        let white_score = obs.white_score(white_to_move);
        self.evaluation = Some(obs.clone());
        let _ = self.events.send(SessionEvent::Evaluation {
            white_score,
            score_text: white_score.map(|s| s.display()),
            bar_percent: obs.white_bar_percent(white_to_move),
            observation: obs,
            white_to_move,
            generation: self.generation,
        });
    }

    fn mark_eval_baseline(&mut self) {
        let latest = self.engine.observations().borrow().as_ref().map(|o| o.request_id);
        self.eval_baseline = Some(latest.unwrap_or(0));
    }

    // ========================================================================
    // Output
    // ========================================================================

    fn snapshot(&self) -> SessionSnapshot {
        let played = self.history.played();
        SessionSnapshot {
            state: self.state.clone(),
            status_text: self.state.status_text().to_string(),
            movetext: pgn::movetext(&played),
            played,
            redo_buffer: self.history.redo_buffer(),
            settings: self.settings.clone(),
            ai_vs_ai_active: self.ai_vs_ai_active,
            ai_paused: self.ai_paused,
            ai_thinking: self.ai_thinking(),
            engine_ready: self.engine.is_ready(),
            evaluation: self.evaluation.clone(),
            generation: self.generation,
        }
    }

    fn publish(&self) {
        let _ = self.events.send(SessionEvent::State {
            snapshot: Box::new(self.snapshot()),
        });
    }

    fn notice(&self, message: &str) {
        let _ = self.events.send(SessionEvent::Notice {
            message: message.to_string(),
        });
    }
}

/// Resolves when the pending best move does; never while there is none.
async fn next_best_move(search: &mut Option<(AiTicket, BestMove)>) -> (AiTicket, Option<String>) {
    match search {
        Some((ticket, best)) => {
            let mv = best.await;
            (*ticket, mv)
        }
        None => std::future::pending().await,
    }
}

/// Cheap, cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn apply_move(&self, candidate: CandidateMove) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::ApplyMove { candidate, reply })
            .await
    }

    pub async fn undo(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Undo { reply }).await
    }

    pub async fn redo(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Redo { reply }).await
    }

    pub async fn reset(&self) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::Reset { reply }).await
    }

    pub async fn update_settings(&self, settings: Settings) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::UpdateSettings { settings, reply })
            .await
    }

    pub async fn set_ai_paused(&self, paused: bool) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::SetAiPaused { paused, reply })
            .await
    }

    pub async fn set_ai_vs_ai_active(&self, active: bool) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| SessionCommand::SetAiVsAiActive { active, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn subscribe(
        &self,
    ) -> Result<(SessionSnapshot, broadcast::Receiver<SessionEvent>), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Subscribe { reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(SessionCommand::Shutdown).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
