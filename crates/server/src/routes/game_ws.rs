/// WebSocket game route
///
/// Pushes every session event to the client and accepts the same game
/// commands as the REST routes. Command results arrive as regular `state`
/// events; only failures get a direct `error` reply.

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use chess_core::CandidateMove;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use game_session::{SessionError, SessionEvent, SessionHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

// ---- Message types ----

/// Server → Client messages that are not session events
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Error { message: String },
}

/// Client → Server messages
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Move { uci: String },
    Undo,
    Redo,
    Reset,
    Pause { paused: bool },
    AiVsAi { active: bool },
    Snapshot,
}

// ---- WebSocket handler ----

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(session): Extension<SessionHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, session))
}

async fn handle_socket(socket: WebSocket, session: SessionHandle) {
    match run_socket(socket, &session).await {
        Ok(()) => tracing::debug!("Game socket closed"),
        Err(e) => tracing::debug!("Game socket ended: {e}"),
    }
}

async fn run_socket(socket: WebSocket, session: &SessionHandle) -> Result<()> {
    let (mut sender, mut receiver) = socket.split();
    let (snapshot, mut events) = session.subscribe().await?;
    send_msg(
        &mut sender,
        &SessionEvent::State {
            snapshot: Box::new(snapshot),
        },
    )
    .await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => send_msg(&mut sender, &event).await?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Game socket lagging, resending state");
                    resend_state(&mut sender, session).await?;
                }
                Err(RecvError::Closed) => break,
            },
            msg = recv_text(&mut receiver) => match msg {
                Some(text) => handle_text(&mut sender, session, &text).await?,
                None => break,
            },
        }
    }
    Ok(())
}

async fn handle_text(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &SessionHandle,
    text: &str,
) -> Result<()> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            return send_msg(
                sender,
                &ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                },
            )
            .await;
        }
    };

    let outcome = match client_msg {
        ClientMessage::Move { uci } => match uci.parse::<CandidateMove>() {
            Ok(candidate) => session.apply_move(candidate).await.map(|_| ()),
            Err(e) => Err(SessionError::from(e)),
        },
        ClientMessage::Undo => session.undo().await.map(|_| ()),
        ClientMessage::Redo => session.redo().await.map(|_| ()),
        ClientMessage::Reset => session.reset().await.map(|_| ()),
        ClientMessage::Pause { paused } => session.set_ai_paused(paused).await.map(|_| ()),
        ClientMessage::AiVsAi { active } => session.set_ai_vs_ai_active(active).await.map(|_| ()),
        ClientMessage::Snapshot => return resend_state(sender, session).await,
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(SessionError::Closed) => anyhow::bail!("Session closed"),
        Err(e) => {
            send_msg(
                sender,
                &ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await
        }
    }
}

// ---- Helper: resend full state ----

async fn resend_state(
    sender: &mut SplitSink<WebSocket, Message>,
    session: &SessionHandle,
) -> Result<()> {
    let snapshot = session.snapshot().await?;
    send_msg(
        sender,
        &SessionEvent::State {
            snapshot: Box::new(snapshot),
        },
    )
    .await
}

// ---- Helper: send message ----

async fn send_msg<T: Serialize>(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &T,
) -> Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

// ---- Helper: receive next text frame ----

/// `None` once the client is gone.
async fn recv_text(receiver: &mut SplitStream<WebSocket>) -> Option<String> {
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(t))) => return Some(t.to_string()),
            Some(Ok(Message::Close(_))) | None => return None,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::debug!("Game socket read error: {e}");
                return None;
            }
        }
    }
}
