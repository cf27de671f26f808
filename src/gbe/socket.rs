//! Duplex WebSocket bridge: one connection per subscriber, multiplexed onto
//! its session's tick task via `SessionCommand` (`spec.md` §4.2).

use crate::gbe::server::AppState;
use crate::protocol::message::StreamMessage;
use crate::registry::{JoinAck, SessionCommand, SessionHandle};
use crate::session::input::PlayerCommand;
use crate::session::SocketId;
use crate::tank::Role;
use actix_web::{web, HttpRequest, HttpResponse};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> actix_web::Result<HttpResponse> {
    let (response, mut ws_session, mut msg_stream) = actix_ws::handle(&req, body)?;
    let session_id = query.session_id.clone();
    let registry = state.registry.clone();

    actix_web::rt::spawn(async move {
        let Some(handle) = registry.get(&session_id).await else {
            let _ = ws_session.close(None).await;
            return;
        };

        let (out_tx, mut out_rx) = unbounded_channel::<String>();
        let mut socket_id: Option<SocketId> = None;

        loop {
            tokio::select! {
                outgoing = out_rx.recv() => {
                    match outgoing {
                        Some(text) => {
                            if ws_session.text(text).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = msg_stream.next() => {
                    match incoming {
                        Some(Ok(actix_ws::Message::Text(text))) => {
                            match serde_json::from_str::<StreamMessage>(&text) {
                                Ok(parsed) => {
                                    if handle_message(&handle, &mut socket_id, &out_tx, parsed).await.is_err() {
                                        break;
                                    }
                                }
                                Err(_) => {
                                    // malformed/unknown frame; counted under otherWsInBytes by
                                    // `spec.md` §4.2's error policy, not worth tearing down the socket
                                }
                            }
                        }
                        Some(Ok(actix_ws::Message::Ping(bytes))) => {
                            let _ = ws_session.pong(&bytes).await;
                        }
                        Some(Ok(actix_ws::Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        _ => {}
                    }
                }
            }
        }

        if let Some(id) = socket_id {
            let _ = handle.tx.send(SessionCommand::Disconnect { socket_id: id });
        }
        let _ = ws_session.close(None).await;
    });

    Ok(response)
}

async fn handle_message(
    handle: &SessionHandle,
    socket_id: &mut Option<SocketId>,
    out_tx: &UnboundedSender<String>,
    msg: StreamMessage,
) -> Result<(), ()> {
    match msg {
        StreamMessage::Join { role, player_id, .. } => {
            let (reply_tx, mut reply_rx) = unbounded_channel::<JoinAck>();
            let role = match role {
                crate::protocol::message::StreamRole::Player => Role::Player,
                crate::protocol::message::StreamRole::Ai => Role::Ai,
            };
            handle
                .tx
                .send(SessionCommand::Join { role, player_id, reply: reply_tx, socket_tx: out_tx.clone() })
                .map_err(|_| ())?;
            let ack = reply_rx.recv().await.ok_or(())?;
            *socket_id = Some(ack.socket_id);
            Ok(())
        }
        StreamMessage::Input { role, tank_id, move_cmd, fire, .. } => {
            let cmd = PlayerCommand { move_cmd, fire };
            let command = match role {
                crate::protocol::message::StreamRole::Ai => SessionCommand::AiInput { tank_id, cmd },
                crate::protocol::message::StreamRole::Player => SessionCommand::PlayerInput { tank_id, cmd },
            };
            handle.tx.send(command).map_err(|_| ())
        }
        StreamMessage::DebugAiToggle { enabled } => {
            let id = socket_id.ok_or(())?;
            handle.tx.send(SessionCommand::DebugToggle { socket_id: id, ai: true, enabled }).map_err(|_| ())
        }
        StreamMessage::DebugGbeToggle { enabled } => {
            let id = socket_id.ok_or(())?;
            handle.tx.send(SessionCommand::DebugToggle { socket_id: id, ai: false, enabled }).map_err(|_| ())
        }
    }
}
