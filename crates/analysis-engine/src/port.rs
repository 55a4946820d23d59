//! The engine surface the game session talks to.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::{oneshot, watch};

use crate::observation::EngineObservation;

/// Fire-and-forget analysis plus an awaitable best move. Every request
/// implicitly supersedes the previous one.
pub trait AnalysisEngine: Send + Sync + 'static {
    fn request_analysis(&self, position: &str, depth: u8);

    fn request_best_move(&self, position: &str, depth: u8, time_limit_ms: u64) -> BestMove;

    /// Cancel whatever is running. Safe to call when idle.
    fn stop(&self);

    fn is_ready(&self) -> bool;

    fn observations(&self) -> watch::Receiver<Option<EngineObservation>>;
}

/// Resolves to the engine's chosen move in coordinate notation, or `None`
/// when the engine had no move or the session went away first.
#[derive(Debug)]
pub struct BestMove {
    rx: Option<oneshot::Receiver<Option<String>>>,
}

impl BestMove {
    /// A best move that will be delivered through the returned sender.
    pub fn channel() -> (oneshot::Sender<Option<String>>, BestMove) {
        let (tx, rx) = oneshot::channel();
        (tx, BestMove { rx: Some(rx) })
    }

    /// Resolves immediately with `None`.
    pub fn empty() -> BestMove {
        BestMove { rx: None }
    }
}

impl Future for BestMove {
    type Output = Option<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.rx.as_mut() {
            None => Poll::Ready(None),
            Some(rx) => Pin::new(rx).poll(cx).map(|res| res.ok().flatten()),
        }
    }
}

/// Stand-in used when no engine process could be started. Never ready;
/// every request is a no-op.
#[derive(Debug)]
pub struct OfflineEngine {
    observations: watch::Sender<Option<EngineObservation>>,
}

impl OfflineEngine {
    pub fn new() -> Self {
        let (observations, _) = watch::channel(None);
        Self { observations }
    }
}

impl Default for OfflineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisEngine for OfflineEngine {
    fn request_analysis(&self, _position: &str, _depth: u8) {}

    fn request_best_move(&self, _position: &str, _depth: u8, _time_limit_ms: u64) -> BestMove {
        BestMove::empty()
    }

    fn stop(&self) {}

    fn is_ready(&self) -> bool {
        false
    }

    fn observations(&self) -> watch::Receiver<Option<EngineObservation>> {
        self.observations.subscribe()
    }
}
