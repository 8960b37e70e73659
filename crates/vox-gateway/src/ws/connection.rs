use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use vox_core::types::new_id;
use vox_protocol::ws::{ClientMessage, ServerMessage, SessionConfig};
use vox_voice::{AudioIngestOutcome, Session};

use crate::app::AppState;

const WS_IDLE_TIMEOUT_MS: u64 = 60_000;
const AUDIO_WINDOW_MS: u64 = 20;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = new_id();
    info!(conn_id = %conn_id, "new voice connection");

    let (mut tx, mut rx) = socket.split();
    let mut session: Option<Arc<Session>> = None;

    loop {
        let idle_guard = tokio::time::sleep(Duration::from_millis(WS_IDLE_TIMEOUT_MS));
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text(&text, &state, &mut session, &mut tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if !handle_audio(&bytes, &state, &session, &mut tx).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "ws receive error");
                        break;
                    }
                }
            }
            _ = idle_guard => {
                warn!(conn_id = %conn_id, "ws idle timeout, closing");
                break;
            }
        }
    }

    if let Some(session) = &session {
        state.sessions.end_session(&session.id).await;
    }
    info!(conn_id = %conn_id, "voice connection closed");
}

async fn handle_text(
    text: &str,
    state: &Arc<AppState>,
    session: &mut Option<Arc<Session>>,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> bool {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            let _ = send_json(tx, &ServerMessage::Error {
                code: "PROTOCOL_ERROR".to_string(),
                message: format!("malformed message: {e}"),
            })
            .await;
            return true;
        }
    };

    match msg {
        ClientMessage::StartSession { user_id, config } => {
            if session.is_some() {
                let _ = send_json(tx, &ServerMessage::Error {
                    code: "STATE_VIOLATION".to_string(),
                    message: "session already started".to_string(),
                })
                .await;
                return true;
            }

            let conversation_id = user_id.unwrap_or_else(new_id);
            let cfg = config.unwrap_or_default();
            let vad_threshold = cfg.vad_threshold.unwrap_or(state.config.voice.vad_threshold);
            let silence_timeout_ms =
                cfg.silence_timeout_ms.unwrap_or(state.config.voice.silence_timeout_ms);
            let max_audio_duration_ms =
                cfg.max_audio_duration_ms.unwrap_or(state.config.voice.max_audio_duration_ms);

            let Some(new_session) = state.sessions.create_session(&conversation_id) else {
                let _ = send_json(tx, &ServerMessage::Error {
                    code: "SESSION_CAPACITY_EXCEEDED".to_string(),
                    message: "too many concurrent sessions".to_string(),
                })
                .await;
                return false;
            };
            new_session.start_session().await;

            let _ = send_json(
                tx,
                &ServerMessage::SessionStarted {
                    session_id: new_session.id.clone(),
                    config: SessionConfig {
                        vad_threshold: Some(vad_threshold),
                        silence_timeout_ms: Some(silence_timeout_ms),
                        max_audio_duration_ms: Some(max_audio_duration_ms),
                        language: cfg.language,
                    },
                },
            )
            .await;
            let _ = send_json(tx, &ServerMessage::StateChange { state: "listening" }).await;
            *session = Some(new_session);
            true
        }

        ClientMessage::EndSession => {
            if let Some(s) = session.take() {
                state.sessions.end_session(&s.id).await;
            }
            false
        }

        ClientMessage::Config { .. } => {
            // Mid-session overrides are accepted but the VAD/session timing
            // already captured at start_session is what continues to govern
            // the running session; acknowledge and move on.
            true
        }

        ClientMessage::AudioBase64 { data } => {
            match base64::engine::general_purpose::STANDARD.decode(data) {
                Ok(bytes) => handle_audio(&bytes, state, session, tx).await,
                Err(_) => {
                    let _ = send_json(tx, &ServerMessage::Error {
                        code: "PROTOCOL_ERROR".to_string(),
                        message: "invalid base64 audio".to_string(),
                    })
                    .await;
                    true
                }
            }
        }
    }
}

/// Run one window of PCM through the session's state machine, draining a
/// full turn through STT -> orchestrator -> TTS when end-of-speech fires.
async fn handle_audio(
    bytes: &[u8],
    state: &Arc<AppState>,
    session: &Option<Arc<Session>>,
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
) -> bool {
    let Some(session) = session else {
        let _ = send_json(tx, &ServerMessage::Error {
            code: "STATE_VIOLATION".to_string(),
            message: "no active session, send start_session first".to_string(),
        })
        .await;
        return true;
    };

    let samples = pcm_bytes_to_i16(bytes);
    match session.ingest_audio_window(&samples, AUDIO_WINDOW_MS).await {
        AudioIngestOutcome::Buffering => return true,
        AudioIngestOutcome::WrongState => {
            let _ = send_json(tx, &ServerMessage::Error {
                code: "STATE_VIOLATION".to_string(),
                message: "audio frame received while session is not listening".to_string(),
            })
            .await;
            return true;
        }
        AudioIngestOutcome::EndOfSpeech => {}
    }

    let _ = send_json(tx, &ServerMessage::StateChange { state: "processing" }).await;

    match state.sessions.process_turn(session).await {
        Ok(outcome) => {
            if !outcome.transcript.is_empty() {
                let _ = send_json(tx, &ServerMessage::Transcript { text: outcome.transcript }).await;
            }
            if !outcome.response_text.is_empty() {
                let _ = send_json(
                    tx,
                    &ServerMessage::Response {
                        text: outcome.response_text,
                        timing: serde_json::json!({}),
                    },
                )
                .await;

                let _ = send_json(tx, &ServerMessage::StateChange { state: "speaking" }).await;
                for (_, pcm) in outcome.speech_chunks {
                    if tx.send(Message::Binary(i16_to_pcm_bytes(&pcm).into())).await.is_err() {
                        return false;
                    }
                }
            }
            let _ = send_json(tx, &ServerMessage::StateChange { state: "listening" }).await;
            true
        }
        Err(e) => {
            warn!(error = %e, "turn processing failed");
            let _ = send_json(tx, &ServerMessage::Error {
                code: e.code().to_string(),
                message: "turn failed".to_string(),
            })
            .await;
            true
        }
    }
}

fn pcm_bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
}

fn i16_to_pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

async fn send_json(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}
