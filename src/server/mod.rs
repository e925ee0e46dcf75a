//! WebSocket surface.
//!
//! Accepts client connections and speaks the protocol defined in
//! `deskpilot_core::protocol`. Each connection runs at most one
//! interaction at a time; events stream back as JSON text frames.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

use deskpilot_core::desktop::RemoteDesktop;
use deskpilot_core::llm::AnthropicClient;
use deskpilot_core::protocol::{ClientMessage, ServerEvent};
use deskpilot_core::{logger, CancellationToken, Orchestrator};

use crate::config::Config;

/// Binds the listener and serves connections until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!("deskpilot server listening on: ws://{addr}");

    let config = Arc::new(config);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, config.clone()));
                }
                Err(e) => log::warn!("failed to accept connection: {e}"),
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

/// An interaction in flight on one connection.
struct Interaction {
    session_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, config: Arc<Config>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("websocket handshake with {peer} failed: {e}");
            return;
        }
    };
    log::info!("client connected: {peer}");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Both the request handler and the interaction task write to the
    // socket, so frames funnel through one channel.
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(64);

    // Task to forward events to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    log::error!("failed to serialize event: {e}");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    let mut active: Option<Interaction> = None;

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_message(&text, &mut active, &tx, &config).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::warn!("websocket error from {peer}: {e}");
                break;
            }
        }
    }

    // The client is gone; stop whatever is still running.
    if let Some(interaction) = active.take() {
        interaction.cancel.cancel();
    }
    send_task.abort();
    log::info!("client disconnected: {peer}");
}

async fn handle_client_message(
    text: &str,
    active: &mut Option<Interaction>,
    events: &mpsc::Sender<ServerEvent>,
    config: &Config,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            log::warn!("unparseable client message: {e}");
            let _ = events
                .send(ServerEvent::Error {
                    code: "bad_request".to_string(),
                    message: "unrecognized client message".to_string(),
                })
                .await;
            return;
        }
    };

    match message {
        ClientMessage::Chat {
            session_id,
            sandbox_id,
            messages,
        } => {
            if active.as_ref().is_some_and(|i| !i.task.is_finished()) {
                let _ = events
                    .send(ServerEvent::Error {
                        code: "busy".to_string(),
                        message: "an interaction is already running on this connection"
                            .to_string(),
                    })
                    .await;
                return;
            }
            match start_interaction(session_id, sandbox_id, messages, events.clone(), config) {
                Ok(interaction) => *active = Some(interaction),
                Err(err) => {
                    log::error!("could not start interaction for session {session_id}: {err}");
                    let _ = events
                        .send(ServerEvent::Error {
                            code: err.code().to_string(),
                            message: err.user_message(),
                        })
                        .await;
                }
            }
        }
        ClientMessage::Abort { session_id } => match active.as_ref() {
            Some(interaction) if interaction.session_id == session_id => {
                log::info!("abort requested for session {session_id}");
                interaction.cancel.cancel();
            }
            _ => log::debug!("abort for unknown session {session_id} ignored"),
        },
        ClientMessage::Logs { lines } => {
            let _ = events
                .send(ServerEvent::Logs {
                    lines: logger::recent(lines),
                })
                .await;
        }
    }
}

fn start_interaction(
    session_id: Uuid,
    sandbox_id: String,
    messages: Vec<deskpilot_core::Message>,
    events: mpsc::Sender<ServerEvent>,
    config: &Config,
) -> deskpilot_core::Result<Interaction> {
    let desktop = RemoteDesktop::new(sandbox_id, config.desktop.clone())?;
    let model = AnthropicClient::new(config.model.clone())?;
    let orchestrator = Orchestrator::new(Arc::new(desktop), Arc::new(model), config.agent.clone());

    let interaction_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        if let Err(err) = orchestrator
            .run(session_id, interaction_id, messages, events.clone(), task_cancel)
            .await
        {
            let _ = events
                .send(ServerEvent::Error {
                    code: err.code().to_string(),
                    message: err.user_message(),
                })
                .await;
        }
    });

    Ok(Interaction {
        session_id,
        cancel,
        task,
    })
}
