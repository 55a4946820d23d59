#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analysis_engine::{AnalysisEngine, EngineConfig, EngineSession};
use axum::{extract::Query, http::StatusCode, routing::get, Json, Router};
use chess_core::ShakmatyRules;
use game_session::{SessionHandle, SessionOrchestrator, SessionSnapshot, SessionTimings, Settings};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use server::clients::explorer::ExplorerClient;
use server::opening_cache::OpeningLookup;
use server::settings_store::MemorySettingsStore;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::net::TcpListener;

pub const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}

/// Short enough that scenarios finish quickly on real time.
pub fn fast_timings() -> SessionTimings {
    SessionTimings {
        debounce: Duration::from_millis(10),
        vs_ai_delay: Duration::from_millis(20),
        ai_vs_ai_delay: Duration::from_millis(20),
        analysis_depth: 12,
    }
}

// ---- Scripted UCI engine ----

/// Moves the fake engine answers best-move searches with, in order.
/// Once empty it answers `bestmove (none)`.
#[derive(Clone, Default)]
pub struct Script {
    moves: Arc<Mutex<VecDeque<String>>>,
    positions: Arc<Mutex<Vec<String>>>,
}

impl Script {
    pub fn new(moves: &[&str]) -> Self {
        Self {
            moves: Arc::new(Mutex::new(moves.iter().map(|m| m.to_string()).collect())),
            positions: Arc::default(),
        }
    }

    fn next_move(&self) -> Option<String> {
        self.moves.lock().unwrap().pop_front()
    }

    fn peek_move(&self) -> Option<String> {
        self.moves.lock().unwrap().front().cloned()
    }

    /// Every position the engine was asked to search, in order.
    pub fn positions(&self) -> Vec<String> {
        self.positions.lock().unwrap().clone()
    }
}

/// Answers the handshake, then each `go` with one info line and one
/// bestmove. Analysis searches report the next scripted move as their PV
/// without consuming it.
async fn run_fake_engine(stream: DuplexStream, script: Script) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let mut replies = Vec::new();
        if line == "uci" {
            replies.push("id name ScriptFish".to_string());
            replies.push("uciok".to_string());
        } else if line == "isready" {
            replies.push("readyok".to_string());
        } else if let Some(fen) = line.strip_prefix("position fen ") {
            script.positions.lock().unwrap().push(fen.to_string());
        } else if line.starts_with("go movetime") {
            let mv = script.next_move();
            let pv = mv.clone().unwrap_or_default();
            replies.push(format!("info depth 8 score cp 30 pv {pv}").trim_end().to_string());
            replies.push(format!("bestmove {}", mv.unwrap_or_else(|| "(none)".into())));
        } else if line.starts_with("go depth") {
            match script.peek_move() {
                Some(mv) => {
                    replies.push(format!("info depth 12 score cp 25 pv {mv}"));
                    replies.push(format!("bestmove {mv}"));
                }
                None => {
                    replies.push("info depth 12 score cp 25".to_string());
                    replies.push("bestmove (none)".to_string());
                }
            }
        } else if line == "quit" {
            return;
        }

        for reply in replies {
            if writer.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// A real engine session wired to the scripted engine, already past the
/// handshake.
pub async fn scripted_engine(script: Script) -> Arc<EngineSession> {
    let (ours, theirs) = tokio::io::duplex(64 * 1024);
    tokio::spawn(run_fake_engine(theirs, script));
    let (r, w) = tokio::io::split(ours);
    let engine = EngineSession::with_transport(r, w, &EngineConfig::default());
    engine.initialize().await.unwrap();
    Arc::new(engine)
}

pub fn start_session(engine: Arc<dyn AnalysisEngine>, settings: Settings) -> SessionHandle {
    SessionOrchestrator::new(Arc::new(ShakmatyRules), engine, settings, fast_timings())
        .unwrap()
        .spawn()
}

/// Poll snapshots until `pred` holds. Panics after five seconds.
pub async fn wait_for<F>(session: &SessionHandle, pred: F) -> SessionSnapshot
where
    F: Fn(&SessionSnapshot) -> bool,
{
    within(Duration::from_secs(5), async {
        loop {
            let snapshot = session.snapshot().await.unwrap();
            if pred(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
}

pub async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, fut)
        .await
        .expect("timed out waiting for session")
}

// ---- HTTP ----

/// Serve the full router on an ephemeral port; returns the base URL.
pub async fn start_server(session: SessionHandle, explorer_url: &str) -> String {
    let explorer = ExplorerClient::new(explorer_url, Duration::from_secs(2)).unwrap();
    let app = server::router(
        session,
        Arc::new(MemorySettingsStore::new()),
        Arc::new(OpeningLookup::new(explorer)),
    );
    serve(app).await
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[derive(Deserialize)]
struct ExplorerQuery {
    fen: String,
}

/// Stand-in for the masters explorer: knows the starting position, rate
/// limits any position with White to move after 1.e4 e5, and has never
/// seen anything else.
pub async fn start_explorer() -> String {
    async fn masters(Query(q): Query<ExplorerQuery>) -> Result<Json<Value>, StatusCode> {
        if q.fen == START {
            return Ok(Json(json!({
                "white": 100, "draws": 150, "black": 50,
                "moves": [
                    {"uci": "e2e4", "san": "e4", "averageRating": 2400, "white": 60, "draws": 80, "black": 20},
                    {"uci": "d2d4", "san": "d4", "averageRating": 2410, "white": 40, "draws": 70, "black": 30}
                ],
                "topGames": []
            })));
        }
        if q.fen.starts_with("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w") {
            return Err(StatusCode::TOO_MANY_REQUESTS);
        }
        Err(StatusCode::NOT_FOUND)
    }

    let app = Router::new().route("/masters", get(masters));
    let base = serve(app).await;
    format!("{base}/masters")
}
