//! The per-session tokio task: owns a `Session` and runs its fixed-interval
//! tick loop. Mirrors the teacher's `Room::run(self) -> !` spawned via
//! `tokio::spawn` (`SPEC_FULL.md` §5).

use crate::config::GbeConfig;
use crate::registry::{JoinAck, JoinHttpAck, SessionCommand, SessionHandle, SessionRegistry, SessionSummary};
use crate::session::input::PlayerCommand;
use crate::session::{Session, SocketId, SubscriberMeta};
use crate::tank::Role;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// Spawns the session's tick-loop task and returns the registry-facing
/// handle. `sockets` maps a subscriber's `SocketId` to the outgoing text
/// channel the connection layer reads from.
pub fn spawn_session(mut session: Session, registry: Arc<SessionRegistry>, config: GbeConfig) -> SessionHandle {
    let (cmd_tx, mut cmd_rx) = unbounded_channel::<SessionCommand>();
    let id = session.id.clone();
    let map_key = session.map_key.clone();
    let model_key = session.model_key.clone();

    tokio::spawn(async move {
        let interval = Duration::from_millis(crate::TICK_MS);
        let mut next_tick_time = Instant::now() + interval;
        let mut sockets: HashMap<SocketId, UnboundedSender<String>> = HashMap::new();
        let mut bytes_logged_at: u64 = 0;

        loop {
            tokio::select! {
                biased;
                Some(cmd) = cmd_rx.recv() => {
                    apply_command(&mut session, &mut sockets, cmd);
                }
                _ = tokio::time::sleep_until(next_tick_time) => {
                    let mut ticks_run = 0u32;
                    while Instant::now() >= next_tick_time && ticks_run < config.max_tick_catch_up {
                        drain_pending_commands(&mut session, &mut sockets, &mut cmd_rx);
                        let output = session.tick_step(&config);
                        fan_out(&mut session, &sockets, &output);
                        ticks_run += 1;
                        next_tick_time += interval;
                    }
                    if Instant::now() >= next_tick_time {
                        next_tick_time = Instant::now() + interval;
                    }
                    if session.tick >= bytes_logged_at + 30 {
                        bytes_logged_at = session.tick;
                        log::info!(
                            "session={} tick={} bytesTick={} bytesTotal={}",
                            session.id, session.tick, session.bytes.state_bytes, session.bytes.state_bytes_total
                        );
                    }
                    if let Some(removal) = session.scheduled_removal_tick {
                        if session.tick >= removal {
                            break;
                        }
                    }
                    if !session.has_subscribers() && session.tick > 0 {
                        break;
                    }
                }
            }
        }
        registry.remove(&session.id).await;
    });

    SessionHandle { id, tx: cmd_tx, map_key, model_key }
}

fn apply_command(session: &mut Session, sockets: &mut HashMap<SocketId, UnboundedSender<String>>, cmd: SessionCommand) {
    match cmd {
        SessionCommand::PlayerInput { tank_id, cmd } => {
            let bytes = estimate_bytes(&cmd);
            session.bytes.player_input_ws_bytes += bytes;
            session.bytes.player_input_ws_bytes_total += bytes;
            session.inputs.push_player(tank_id, cmd);
        }
        SessionCommand::AiInput { tank_id, cmd } => {
            let bytes = estimate_bytes(&cmd);
            session.bytes.ai_input_ws_bytes += bytes;
            session.bytes.ai_input_ws_bytes_total += bytes;
            session.last_ai_input.received = Some(json!({"tankId": tank_id, "move": format!("{:?}", cmd.move_cmd), "fire": cmd.fire}));
            session.inputs.push_ai(tank_id, cmd);
        }
        SessionCommand::AiInputHttp { tank_id, cmd } => {
            let bytes = estimate_bytes(&cmd);
            session.bytes.ai_input_http_bytes += bytes;
            session.bytes.ai_input_http_bytes_total += bytes;
            session.last_ai_input.received = Some(json!({"tankId": tank_id, "move": format!("{:?}", cmd.move_cmd), "fire": cmd.fire}));
            session.inputs.push_ai(tank_id, cmd);
        }
        SessionCommand::JoinPlayerHttp { label, reply } => {
            let ack = session.spawn_player(&label).map(|player_id| {
                let map = json!(session.map.to_wire());
                let state = session.initial_state();
                JoinHttpAck { player_id, map, state }
            });
            let _ = reply.send(ack);
        }
        SessionCommand::Summary { reply } => {
            let players = session.tanks.iter().filter(|t| t.role == Role::Player).count();
            let _ = reply.send(SessionSummary {
                tick: session.tick,
                game_over: session.game_over,
                players,
                map_name: session.map.name.clone(),
            });
        }
        SessionCommand::Join { role, player_id, reply, socket_tx } => {
            let (socket_id, displaced) = session.register_subscriber(role, player_id);
            if let Some(old) = displaced {
                sockets.remove(&old);
                session.pending_events.push(json!({"type": "ai_ws_replaced"}));
            }
            if let Some(snapshot) = session.last_snapshot.clone() {
                let mut wire = snapshot.to_wire();
                if let Some(meta) = session.subscribers.get_mut(&socket_id) {
                    filter_debug_channels(meta, &mut wire);
                }
                let catch_up = json!({"type": "state", "state": wire, "full": true}).to_string();
                let _ = socket_tx.send(catch_up);
            }
            sockets.insert(socket_id, socket_tx);
            session.bytes.join_ws_bytes += 32;
            session.bytes.join_ws_bytes_total += 32;
            let _ = reply.send(JoinAck { socket_id, displaced });
        }
        SessionCommand::DebugToggle { socket_id, ai, enabled } => {
            if let Some(meta) = session.subscribers.get_mut(&socket_id) {
                if ai {
                    meta.debug_ai = enabled;
                } else {
                    meta.debug_gbe = enabled;
                }
            }
            session.bytes.debug_toggle_ws_bytes += 16;
            session.bytes.debug_toggle_ws_bytes_total += 16;
        }
        SessionCommand::Disconnect { socket_id } => {
            sockets.remove(&socket_id);
            session.remove_subscriber(socket_id);
        }
    }
}

fn drain_pending_commands(session: &mut Session, sockets: &mut HashMap<SocketId, UnboundedSender<String>>, rx: &mut UnboundedReceiver<SessionCommand>) {
    while let Ok(cmd) = rx.try_recv() {
        apply_command(session, sockets, cmd);
    }
}

fn estimate_bytes(cmd: &PlayerCommand) -> u64 {
    let _ = cmd;
    48
}

fn fan_out(session: &mut Session, sockets: &HashMap<SocketId, UnboundedSender<String>>, output: &crate::session::tick::TickOutput) {
    let delta_text = json!({"type": "state", "state": &output.delta}).to_string();
    let bytes = delta_text.len() as u64;
    session.bytes.state_bytes += bytes;
    session.bytes.state_bytes_total += bytes;

    let has_debug = output.delta.get("aiDebug").is_some() || output.delta.get("gbeDebug").is_some();
    for (socket_id, tx) in sockets.iter() {
        if !has_debug {
            let _ = tx.send(delta_text.clone());
            continue;
        }
        let mut state = output.delta.clone();
        if let Some(meta) = session.subscribers.get_mut(socket_id) {
            filter_debug_channels(meta, &mut state);
        }
        let _ = tx.send(json!({"type": "state", "state": state}).to_string());
    }

    if let Some(transition) = &output.transition {
        let text = transition.to_string();
        let tbytes = text.len() as u64;
        session.bytes.transition_bytes += tbytes;
        session.bytes.transition_bytes_total += tbytes;
        for (socket_id, meta) in session.subscribers.iter() {
            if meta.role == Role::Ai {
                if let Some(tx) = sockets.get(socket_id) {
                    let _ = tx.send(text.clone());
                }
            }
        }
    }
}

/// Applies a subscriber's `debugAI`/`debugGBE` opt-in flags to a wire
/// payload in place: drops a channel the socket never toggled on, and
/// strips `labels` down to values-only once that label set has already
/// been sent to this socket (`spec.md` §3 "Debug channels").
fn filter_debug_channels(meta: &mut SubscriberMeta, wire: &mut Value) {
    let Some(obj) = wire.as_object_mut() else { return };
    strip_or_evolve_channel(obj, "aiDebug", meta.debug_ai, &mut meta.ai_debug_labels_sent);
    strip_or_evolve_channel(obj, "gbeDebug", meta.debug_gbe, &mut meta.gbe_debug_labels_sent);
}

fn strip_or_evolve_channel(obj: &mut serde_json::Map<String, Value>, key: &str, enabled: bool, sent: &mut Option<Vec<String>>) {
    let Some(channel) = obj.get_mut(key) else { return };
    if !enabled {
        obj.remove(key);
        return;
    }
    let Some(channel_obj) = channel.as_object_mut() else { return };
    let current_labels: Option<Vec<String>> = channel_obj
        .get("labels")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect());
    match &current_labels {
        Some(labels) if Some(labels) == sent.as_ref() => {
            channel_obj.remove("labels");
        }
        Some(labels) => {
            *sent = Some(labels.clone());
        }
        None => {}
    }
}
