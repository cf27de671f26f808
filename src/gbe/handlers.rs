//! HTTP control-plane handlers (`spec.md` §6 "HTTP (GBE)").

use crate::gbe::server::AppState;
use crate::gbe::task;
use crate::map::map_key_from_name;
use crate::protocol::message::AiInputHttpBody;
use crate::reward::RewardWeights;
use crate::session::input::PlayerCommand;
use crate::session::Session;
use crate::tank::TankDefTable;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    #[serde(rename = "mapName")]
    pub map_name: String,
    #[serde(rename = "maxEnemiesAlive", default)]
    pub max_enemies_alive: Option<usize>,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    #[serde(rename = "sessionId")]
    session_id: String,
    tick: u64,
    #[serde(rename = "gameOver")]
    game_over: bool,
    players: usize,
    #[serde(rename = "mapName")]
    map_name: String,
    #[serde(rename = "modelKey")]
    model_key: Option<String>,
    #[serde(rename = "mapKey")]
    map_key: String,
}

fn default_player_label(tank_defs: &TankDefTable) -> Option<String> {
    tank_defs.values().find(|d| d.is_player()).map(|d| d.tank_label.clone())
}

fn session_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub async fn create_session(state: web::Data<AppState>, body: web::Json<CreateSessionBody>) -> impl Responder {
    let map_key = map_key_from_name(&body.map_name);
    let Some(map) = state.assets.map_for(&map_key) else {
        return HttpResponse::BadRequest().json(json!({"error": format!("unknown map {}", body.map_name)}));
    };
    if map.player_spawns().is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "no available player spawns"}));
    }
    let Some(player_label) = default_player_label(&state.assets.tank_defs) else {
        return HttpResponse::BadRequest().json(json!({"error": "no player tank definition"}));
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let max_enemies = body.max_enemies_alive.unwrap_or(state.config.max_enemies_alive);
    let mut session = Session::new(
        session_id.clone(),
        map,
        map_key.clone(),
        state.assets.tank_defs.clone(),
        session_seed(),
        max_enemies,
        RewardWeights::default(),
    );
    let Some(player_id) = session.spawn_player(&player_label) else {
        return HttpResponse::BadRequest().json(json!({"error": "no available player spawns"}));
    };
    let map_wire = session.map.to_wire();
    let model_key = session.model_key.clone();
    let initial_state = session.initial_state();

    let handle = task::spawn_session(session, state.registry.clone(), state.config.clone());
    state.registry.insert(handle).await;

    HttpResponse::Ok().json(json!({
        "sessionId": session_id,
        "playerId": player_id,
        "map": map_wire,
        "state": initial_state,
        "modelKey": model_key,
        "mapKey": map_key,
    }))
}

pub async fn join_session(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let session_id = path.into_inner();
    let Some(handle) = state.registry.get(&session_id).await else {
        return HttpResponse::NotFound().json(json!({"error": format!("session {session_id} not found")}));
    };
    let Some(player_label) = default_player_label(&state.assets.tank_defs) else {
        return HttpResponse::BadRequest().json(json!({"error": "no player tank definition"}));
    };

    let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel();
    if handle
        .tx
        .send(crate::registry::SessionCommand::JoinPlayerHttp { label: player_label, reply: reply_tx })
        .is_err()
    {
        return HttpResponse::NotFound().json(json!({"error": format!("session {session_id} not found")}));
    }
    match reply_rx.recv().await {
        Some(Some(ack)) => HttpResponse::Ok().json(json!({
            "playerId": ack.player_id,
            "map": ack.map,
            "state": ack.state,
        })),
        _ => HttpResponse::BadRequest().json(json!({"error": "no available player spawns"})),
    }
}

pub async fn list_sessions(state: web::Data<AppState>) -> impl Responder {
    let mut summaries = Vec::new();
    for handle in state.registry.list().await {
        let (reply_tx, mut reply_rx) = tokio::sync::mpsc::unbounded_channel();
        if handle.tx.send(crate::registry::SessionCommand::Summary { reply: reply_tx }).is_ok() {
            if let Some(summary) = reply_rx.recv().await {
                summaries.push(SessionSummary {
                    session_id: handle.id.clone(),
                    tick: summary.tick,
                    game_over: summary.game_over,
                    players: summary.players,
                    map_name: summary.map_name,
                    model_key: handle.model_key.clone(),
                    map_key: handle.map_key.clone(),
                });
            }
        }
    }
    HttpResponse::Ok().json(json!({"sessions": summaries}))
}

pub async fn ai_input(state: web::Data<AppState>, path: web::Path<String>, body: web::Json<AiInputHttpBody>) -> impl Responder {
    let session_id = path.into_inner();
    let Some(handle) = state.registry.get(&session_id).await else {
        return HttpResponse::NotFound().json(json!({"error": format!("session {session_id} not found")}));
    };
    for event in &body.events {
        let cmd = PlayerCommand { move_cmd: event.move_cmd, fire: event.fire };
        let _ = handle.tx.send(crate::registry::SessionCommand::AiInputHttp { tank_id: event.tank_id.clone(), cmd });
    }
    HttpResponse::Ok().json(json!({"ok": true}))
}

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}
