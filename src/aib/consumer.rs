//! Per-session stream consumer (`spec.md` §4.3): one task per live session,
//! holding the session's shared Q-model, training on each transition, and
//! dispatching actions for every alive AI tank.

use crate::aib::client::{MsClient, SessionSummary};
use crate::aib::feature::{build_feature_vector, FeatureWindow, LocalMirror, TankTrack, STACKED_FEATURE_LEN};
use crate::aib::model::QModel;
use crate::config::AibConfig;
use crate::episode::EpisodeWindow;
use crate::map::MapGrid;
use crate::protocol::action::{command_for_index, ACTION_SIZE};
use futures::{SinkExt, StreamExt};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;

struct PendingStep {
    state: Vec<f32>,
    action_index: usize,
}

/// Releases the session's model-key back to MS when the consumer exits,
/// whether it exits cleanly or is aborted by the poller.
struct ModelLease {
    ms: Arc<MsClient>,
    map_key: String,
    model_key: String,
}

impl Drop for ModelLease {
    fn drop(&mut self) {
        let ms = self.ms.clone();
        let map_key = self.map_key.clone();
        let model_key = self.model_key.clone();
        tokio::spawn(async move {
            if let Err(e) = ms.release(&map_key, &model_key).await {
                log::warn!("failed to release model {model_key} for map {map_key}: {e}");
            }
        });
    }
}

fn model_seed() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}

async fn load_model(ms: &MsClient, config: &AibConfig, map_key: &str, model_key: &str) -> QModel {
    match ms.get_model(model_key).await {
        Ok(Some(record)) => {
            let topology = record.get("modelTopology").cloned().unwrap_or(Value::Null);
            let specs = record.get("weightSpecs").cloned().unwrap_or(Value::Null);
            let blob = record.get("weightDataBase64").and_then(Value::as_str).unwrap_or("").to_string();
            let training_config = record.get("trainingConfig").cloned().unwrap_or(Value::Null);
            let payload_json = json!({
                "modelTopology": topology,
                "weightSpecs": specs,
                "weightDataBase64": blob,
                "userDefinedMetadata": record.get("userDefinedMetadata").cloned().unwrap_or(Value::Null),
            });
            match serde_json::from_value::<crate::protocol::model_payload::ModelPayload>(payload_json) {
                Ok(payload) if payload.model_topology.state_size == STACKED_FEATURE_LEN => {
                    match QModel::from_payload(model_key.to_string(), map_key.to_string(), &payload, &training_config) {
                        Ok(model) => return model,
                        Err(e) => log::warn!("discarding malformed stored model {model_key}: {e}"),
                    }
                }
                Ok(_) => log::info!("stored model {model_key} has mismatched stateSize, starting fresh"),
                Err(e) => log::warn!("stored model {model_key} payload unparsable: {e}"),
            }
        }
        Ok(None) => {}
        Err(e) => log::warn!("could not fetch stored model {model_key}: {e}"),
    }
    QModel::new_mlp(model_key.to_string(), map_key.to_string(), STACKED_FEATURE_LEN, ACTION_SIZE, config.epsilon_start, model_seed())
}

/// Runs one session's AI consumer to completion: connects, trains, and
/// dispatches actions until the socket closes or the task is aborted.
pub async fn run(
    summary: SessionSummary,
    config: Arc<AibConfig>,
    tank_defs: Arc<crate::tank::TankDefTable>,
    map: Arc<MapGrid>,
    ms: Arc<MsClient>,
    persistence: crate::aib::persistence::PersistenceHandle,
) -> anyhow::Result<()> {
    let allocation = ms.allocate(&summary.map_key, &config.model_base_key).await?;
    let _lease = ModelLease { ms: ms.clone(), map_key: summary.map_key.clone(), model_key: allocation.model_key.clone() };
    let mut model = load_model(&ms, &config, &summary.map_key, &allocation.model_key).await;

    let url = format!("{}?sessionId={}", config.game_backend_ws_url, summary.session_id);
    let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();
    write
        .send(Message::Text(json!({"type": "join", "sessionId": summary.session_id, "role": "ai"}).to_string().into()))
        .await?;

    let mut mirror = LocalMirror::default();
    let mut windows: HashMap<String, FeatureWindow> = HashMap::new();
    let mut tracks: HashMap<String, TankTrack> = HashMap::new();
    let mut pending: HashMap<String, PendingStep> = HashMap::new();
    let mut episodes = EpisodeWindow::new(0);
    let mut rng = SmallRng::seed_from_u64(model_seed());
    let label_order = sorted_labels(&tank_defs);
    let max_enemy_speed = tank_defs.values().filter(|d| d.is_ai()).map(|d| d.speed).max().unwrap_or(1);
    let save_latency = Arc::new(AtomicU64::new(0));
    let mut was_game_over = false;
    let mut episode_reward_total = 0.0f32;

    while let Some(msg) = read.next().await {
        let Ok(Message::Text(text)) = msg else { break };
        let Ok(parsed) = serde_json::from_str::<Value>(&text) else { continue };
        match parsed.get("type").and_then(Value::as_str) {
            Some("state") => {
                if let Some(state) = parsed.get("state") {
                    mirror.apply(state);
                }
            }
            Some("transition") => {
                let Some(next_state) = parsed.get("nextState") else { continue };
                let ai_rewards = parsed.get("aiRewards").and_then(Value::as_object).cloned().unwrap_or_default();
                let tick = parsed.get("tick").and_then(Value::as_u64).unwrap_or(mirror.tick);

                mirror.apply(next_state);
                let mut transition_reward = 0.0f32;
                let mut transition_hit = false;

                for (tank_id, tank) in mirror.players.clone() {
                    if tank.role != crate::tank::Role::Ai {
                        continue;
                    }
                    let track = tracks.entry(tank_id.clone()).or_default();
                    track.observe(tank.x, tank.y);

                    let player = mirror.players.values().find(|p| p.role == crate::tank::Role::Player);
                    let hq = map.hq();
                    let features = build_feature_vector(
                        &tank,
                        player,
                        hq,
                        &map,
                        &tank_defs,
                        track,
                        config.idle_threshold,
                        max_enemy_speed,
                        &label_order,
                    );
                    let window = windows.entry(tank_id.clone()).or_default();
                    window.push(features);
                    let stacked = window.stacked();

                    if let Some(reward_entry) = ai_rewards.get(&tank_id) {
                        let reward = reward_entry.get("reward").and_then(Value::as_f64).unwrap_or(0.0) as f32;
                        transition_reward += reward;
                        if let Some(reasons) = reward_entry.get("reasons").and_then(Value::as_object) {
                            if reasons.contains_key("hitPlayer") || reasons.contains_key("destructiveShot") || reasons.contains_key("destroyHq") {
                                transition_hit = true;
                            }
                        }
                        if let Some(step) = pending.get(&tank_id) {
                            let _ = model.train_step(
                                &step.state,
                                step.action_index,
                                reward,
                                &stacked,
                                config.gamma,
                                config.learning_rate,
                                config.epsilon_min,
                                config.epsilon_decay,
                            );
                        }
                    }

                    if let Ok(action_index) = model.select_action(&stacked, &mut rng) {
                        if let Some(cmd) = command_for_index(action_index) {
                            if cmd.fire {
                                track.record_fire(tank_defs.get(&tank.label).map(|d| d.cooldown).unwrap_or(1));
                            }
                            let input = json!({
                                "type": "input",
                                "role": "ai",
                                "tankId": tank_id,
                                "move": cmd.move_cmd,
                                "fire": cmd.fire,
                            });
                            let _ = write.send(Message::Text(input.to_string().into())).await;
                        }
                        pending.insert(tank_id, PendingStep { state: stacked, action_index });
                    }
                }

                episodes.current.observe_step(transition_reward, transition_hit);
                if mirror.game_over && !was_game_over {
                    let reward_sum = episodes.current.reward_sum;
                    episodes.close_episode(tick, mirror.game_over_reason.is_some());
                    model.episodes += 1;
                    episode_reward_total += reward_sum;
                    let avg_reward = episode_reward_total / model.episodes as f32;
                    let time_to_win = episodes.closed().back().and_then(|log| log.time_to_win_ticks);
                    let episode_log = format!(
                        "episode={} avgReward={:.2} timeToWin={}",
                        model.episodes,
                        avg_reward,
                        time_to_win.map(|t| t.to_string()).unwrap_or_else(|| "--".to_string())
                    );
                    let _ = write
                        .send(Message::Text(json!({"type": "episode_log", "episodeLog": episode_log, "episodeLogTick": tick}).to_string().into()))
                        .await;
                }
                was_game_over = mirror.game_over;

                if model.steps.saturating_sub(model.last_saved_steps) >= config.save_every_steps {
                    model.last_saved_steps = model.steps;
                    let (payload, training_config, metadata) = model.to_payload();
                    let body = json!({
                        "modelTopology": payload.model_topology,
                        "weightSpecs": payload.weight_specs,
                        "weightDataBase64": payload.weight_data_base64,
                        "trainingConfig": training_config,
                        "userDefinedMetadata": metadata,
                    });
                    persistence.enqueue(crate::aib::persistence::SaveJob {
                        model_key: model.model_key.clone(),
                        body,
                        latency_ms: save_latency.clone(),
                    });
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn sorted_labels(tank_defs: &crate::tank::TankDefTable) -> Vec<String> {
    let mut labels: Vec<String> = tank_defs.keys().cloned().collect();
    labels.sort();
    labels
}
