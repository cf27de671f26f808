//! The fixed-interval tick step (`spec.md` §4.1): the only place session
//! state mutates. Everything outside this module only appends to
//! `Session::inputs` or reads a completed `TickOutput`.

use super::Session;
use crate::ai_runtime::AiRuntime;
use crate::bullet::{self, Bullet, BulletOutcome, PredictedResult};
use crate::config::GbeConfig;
use crate::protocol::snapshot::{build_delta, BulletSnapshot, DebugChannel, PlayerSnapshot, Snapshot};
use crate::reward::{reasons_for_predicted_shot, RewardAccumulator, RewardReason};
use crate::session::input::PlayerCommand;
use crate::tank::{Heading, Rect, Role, Tank};
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

pub struct TickOutput {
    pub delta: Value,
    pub transition: Option<Value>,
}

impl Session {
    pub fn tick_step(&mut self, config: &GbeConfig) -> TickOutput {
        self.tick += 1;
        self.bytes.reset_tick();

        if !self.game_over {
            self.maybe_spawn_ai(config);
        }

        let mut fires = self.apply_player_commands();
        fires.extend(self.apply_ai_commands(config));
        self.step_bullets();
        self.decrement_cooldowns();
        self.apply_rewards(config, &fires);

        if self.game_over && self.scheduled_removal_tick.is_none() {
            self.scheduled_removal_tick = Some(self.tick + crate::removal_delay_ticks());
        }

        let snapshot = self.build_snapshot();
        let delta = build_delta(self.last_snapshot.as_ref(), &snapshot);
        self.last_snapshot = Some(snapshot.clone());

        let transition = self.maybe_build_transition(config, &snapshot);

        self.pending_events.clear();
        self.tile_changes.clear();
        for runtime in self.ai_runtimes.values_mut() {
            runtime.clear_blocked_move();
        }
        for tank in self.tanks.iter_mut() {
            tank.blocked_move = false;
        }

        TickOutput { delta, transition }
    }

    /// Builds a full (non-delta) snapshot without advancing the tick, for
    /// the `POST /session` and `POST /session/{id}/join` responses
    /// (`spec.md` §4.1 "create-session" / "join-session" contracts).
    pub fn initial_state(&mut self) -> Value {
        let snapshot = self.build_snapshot();
        let wire = snapshot.to_wire();
        self.last_snapshot = Some(snapshot);
        wire
    }

    fn maybe_spawn_ai(&mut self, config: &GbeConfig) {
        self.enemy_spawn_timer += 1;
        if self.enemy_spawn_timer < config.enemy_spawn_interval_ticks {
            return;
        }
        if self.alive_ai_count() >= self.max_enemy_count() {
            return;
        }
        let ai_spawns = self.map.ai_spawns().to_vec();
        if ai_spawns.is_empty() {
            return;
        }
        self.enemy_spawn_timer = 0;
        let idx = self.rng.gen_range(0..ai_spawns.len());
        let spawn_tile = ai_spawns[idx];
        let label = match config.ai_tank_labels.first() {
            Some(l) => l.clone(),
            None => return,
        };
        let Some((x, y)) = super::spawn::find_free_spawn_rect(&self.map, spawn_tile, &label, &self.tank_defs, &self.tanks) else {
            return;
        };
        let Some(def) = self.tank_defs.get(&label).cloned() else {
            log::warn!("missing tank definition for label {label}");
            return;
        };
        let id = Uuid::new_v4().to_string();
        let tank = Tank::new(id.clone(), &def, Role::Ai, x, y, Heading::UP);
        self.tanks.push(tank);
        self.ai_runtimes.insert(id.clone(), AiRuntime::new(spawn_tile, self.tick));
        self.ai_reward_accum.insert(id, RewardAccumulator::default());
    }

    /// returns the set of (tank_id, heading, predicted outcome) for tanks
    /// that fired this tick, used by the reward step.
    fn apply_player_commands(&mut self) -> Vec<(String, Heading, PredictedResult)> {
        let tank_ids: Vec<String> = self.tanks.iter().filter(|t| t.role == Role::Player).map(|t| t.id.clone()).collect();
        let mut fires = Vec::new();
        for id in tank_ids {
            let Some(cmd) = self.inputs.drain_player(&id) else { continue };
            if let Some(fired) = self.apply_command(&id, cmd, false) {
                fires.push(fired);
            }
        }
        fires
    }

    /// returns the set of (tank_id, heading, predicted outcome) for tanks
    /// that fired this tick, used by the reward step.
    fn apply_ai_commands(&mut self, _config: &GbeConfig) -> Vec<(String, Heading, PredictedResult)> {
        let tank_ids: Vec<String> = self.tanks.iter().filter(|t| t.role == Role::Ai && t.is_alive()).map(|t| t.id.clone()).collect();
        let mut fires = Vec::new();
        for id in tank_ids {
            let cmd = self.inputs.pop_ai_sticky(&id);
            if let Some(fired) = self.apply_command(&id, cmd, true) {
                fires.push(fired);
            }
        }
        fires
    }

    /// Applies one command to a tank: sets heading, attempts movement, and
    /// creates a bullet on fire. Returns the fire-time predicted outcome
    /// tuple when the tank actually fired.
    fn apply_command(&mut self, tank_id: &str, cmd: PlayerCommand, is_ai: bool) -> Option<(String, Heading, PredictedResult)> {
        let Some(idx) = self.tanks.iter().position(|t| t.id == tank_id) else { return None };
        if !self.tanks[idx].is_alive() {
            return None;
        }
        let label = self.tanks[idx].label.clone();
        let Some(def) = self.tank_defs.get(&label).cloned() else { return None };

        let attempted_move = cmd.move_cmd.is_some();
        let mut did_move = false;
        if let Some(mv) = cmd.move_cmd {
            let (dx, dy) = mv.heading();
            self.tanks[idx].heading = Heading { dx, dy };
            did_move = self.try_step(idx, &def, dx * self.tanks[idx].speed, 0) || did_move;
            did_move = self.try_step(idx, &def, 0, dy * self.tanks[idx].speed) || did_move;
        }

        if is_ai {
            if let Some(runtime) = self.ai_runtimes.get_mut(tank_id) {
                let (row, col) = self.map.px_to_tile(self.tanks[idx].x, self.tanks[idx].y);
                let tile = (row.max(0) as usize, col.max(0) as usize);
                let heading = (self.tanks[idx].heading.dx, self.tanks[idx].heading.dy);
                runtime.observe_move(did_move, heading, tile, self.tick);
                // Collision penalty is for a move that was attempted and blocked,
                // not for simply not issuing a move command this tick.
                if attempted_move && !did_move {
                    runtime.blocked_move = true;
                    self.tanks[idx].blocked_move = true;
                }
            }
        }

        if cmd.fire && self.tanks[idx].shoot_cooldown == 0 {
            self.tanks[idx].shoot_cooldown = self.tanks[idx].cooldown;
            let heading = self.tanks[idx].heading;
            let predicted = bullet::predict_outcome(&self.map, &self.tanks[idx], heading, &self.tanks, &self.tank_defs, self.map.map_size);
            let (cx, cy) = self.tanks[idx].bound_center(&def);
            let bullet = Bullet {
                id: Uuid::new_v4().to_string(),
                owner_id: tank_id.to_string(),
                x: cx,
                y: cy,
                heading,
                speed: self.tanks[idx].shell_speed,
                radius: self.tanks[idx].shell_size as i32 * 2,
                predicted: predicted.clone(),
                spawn_tick: self.tick,
            };
            self.bullets.push(bullet);
            return Some((tank_id.to_string(), heading, predicted));
        }
        None
    }

    fn try_step(&mut self, idx: usize, def: &crate::tank::TankDef, dx: i32, dy: i32) -> bool {
        if dx == 0 && dy == 0 {
            return false;
        }
        let candidate_rect = {
            let tank = &self.tanks[idx];
            Rect {
                min_x: tank.x + dx + def.bound_min.x,
                min_y: tank.y + dy + def.bound_min.y,
                max_x: tank.x + dx + def.bound_max.x,
                max_y: tank.y + dy + def.bound_max.y,
            }
        };
        if !self.rect_is_free(&candidate_rect, idx) {
            return false;
        }
        let tank = &mut self.tanks[idx];
        tank.x += dx;
        tank.y += dy;
        true
    }

    fn rect_is_free(&self, rect: &Rect, ignore_idx: usize) -> bool {
        for row in (rect.min_y / self.map.tile_size)..=((rect.max_y - 1) / self.map.tile_size) {
            for col in (rect.min_x / self.map.tile_size)..=((rect.max_x - 1) / self.map.tile_size) {
                if row < 0 || col < 0 || !self.map.in_bounds(row as isize, col as isize) {
                    return false;
                }
                let tile = self.map.get(row as usize, col as usize).unwrap();
                if !tile.properties().accessible {
                    return false;
                }
            }
        }
        for (i, other) in self.tanks.iter().enumerate() {
            if i == ignore_idx || !other.is_alive() {
                continue;
            }
            let Some(other_def) = self.tank_defs.get(&other.label) else { continue };
            if other.bound_rect(other_def).intersects(rect) {
                return false;
            }
        }
        true
    }

    fn step_bullets(&mut self) {
        let mut still_alive = Vec::with_capacity(self.bullets.len());
        let mut bullets = std::mem::take(&mut self.bullets);
        for mut b in bullets.drain(..) {
            let outcome = b.step(&mut self.map, &mut self.tanks, &self.tank_defs, self.tick);
            match outcome {
                None => still_alive.push(b),
                Some(BulletOutcome::TileDestroyed { row, col, hq }) => {
                    self.tile_changes.push(json!({"row": row, "col": col, "tile": "soil"}));
                    self.pending_events.push(json!({"type": "fx_hit", "kind": "tile", "x": b.x, "y": b.y}));
                    if hq && !self.hq_rewarded {
                        self.game_over = true;
                        self.game_over_reason = Some("hq_destroyed".to_string());
                        self.game_over_fx = Some(json!({"reason": "hq_destroyed"}));
                        if let Some(acc) = self.ai_reward_accum.get_mut(&b.owner_id) {
                            acc.credit(&self.reward_weights, RewardReason::DestroyHq);
                        }
                        self.hq_rewarded = true;
                    }
                }
                Some(BulletOutcome::TileBlocked) => {
                    self.pending_events.push(json!({"type": "fx_hit", "kind": "wall", "x": b.x, "y": b.y}));
                }
                Some(BulletOutcome::TankHit { tank_id, tank_destroyed }) => {
                    self.pending_events.push(json!({"type": "fx_hit", "kind": "tank", "tankId": tank_id, "x": b.x, "y": b.y}));
                    if tank_destroyed {
                        self.handle_tank_destroyed(&tank_id);
                    }
                }
                Some(BulletOutcome::OutOfBounds) => {}
                Some(BulletOutcome::None) => still_alive.push(b),
            }
        }
        self.bullets = still_alive;
    }

    fn handle_tank_destroyed(&mut self, tank_id: &str) {
        let Some(idx) = self.tanks.iter().position(|t| t.id == tank_id) else { return };
        let role = self.tanks[idx].role;
        match role {
            Role::Ai => {
                self.tanks.remove(idx);
                self.ai_runtimes.remove(tank_id);
                self.ai_reward_accum.remove(tank_id);
                self.inputs.forget_tank(tank_id);
                self.enemies_destroyed += 1;
            }
            Role::Player => {
                if self.tanks[idx].respawns_used >= crate::MAX_PLAYER_RESPAWNS {
                    self.game_over = true;
                    self.game_over_reason = Some("player_destroyed".to_string());
                } else if let Some(spawn_tile) = self.map.player_spawns().first().copied() {
                    let (x, y) = self.map.tile_center_px(spawn_tile.0, spawn_tile.1);
                    let label = self.tanks[idx].label.clone();
                    if let Some(def) = self.tank_defs.get(&label).cloned() {
                        self.tanks[idx].respawn_at(&def, x, y);
                    }
                }
            }
        }
    }

    fn decrement_cooldowns(&mut self) {
        for tank in self.tanks.iter_mut() {
            if tank.shoot_cooldown > 0 {
                tank.shoot_cooldown -= 1;
            }
        }
    }

    fn apply_rewards(&mut self, config: &GbeConfig, fires: &[(String, Heading, PredictedResult)]) {
        let player_rect = self
            .tanks
            .iter()
            .find(|t| t.role == Role::Player && t.is_alive())
            .and_then(|p| self.tank_defs.get(&p.label).map(|d| p.bound_rect(d)));
        let hq_rect = self.map.hq().map(|(row, col)| {
            let (cx, cy) = self.map.tile_center_px(row, col);
            let half = self.map.tile_size / 2;
            Rect { min_x: cx - half, min_y: cy - half, max_x: cx + half, max_y: cy + half }
        });

        let tick = self.tick;
        let accessible = self.map.accessible_tile_count();
        let facts: Vec<AiRewardFacts> = self
            .tanks
            .iter()
            .filter(|t| t.role == Role::Ai && t.is_alive())
            .filter_map(|t| {
                let def = self.tank_defs.get(&t.label)?;
                let runtime = self.ai_runtimes.get(&t.id)?;
                Some(AiRewardFacts {
                    id: t.id.clone(),
                    center: t.bound_center(def),
                    heading: t.heading,
                    blocked_move: t.blocked_move,
                    dead: t.health <= 0,
                    idle_ticks: runtime.idle_ticks,
                    touched_new_tile: runtime.last_new_tile_tick == tick,
                    explore_stalled: runtime.explored_fraction(accessible) < 0.75
                        && runtime.ticks_since_new_tile(tick) >= config.rl_explore_stall_ticks,
                    direction_changed: runtime.direction_changed_within_cooldown(config.rl_dir_change_cooldown),
                    stuck: runtime.stuck_area_ticks >= config.rl_stuck_area_ticks,
                })
            })
            .collect();

        let weights = self.reward_weights;
        let map_size = self.map.map_size;
        for fact in facts {
            let Some(acc) = self.ai_reward_accum.get_mut(&fact.id) else { continue };

            if let Some(player_rect) = &player_rect {
                if bullet::has_line_of_sight(&self.map, fact.center.0, fact.center.1, fact.heading, player_rect, map_size) {
                    acc.credit(&weights, RewardReason::PlayerAim);
                }
            }
            if let Some(hq_rect) = &hq_rect {
                if bullet::has_line_of_sight(&self.map, fact.center.0, fact.center.1, fact.heading, hq_rect, map_size) {
                    acc.credit(&weights, RewardReason::HqAim);
                }
            }
            if fact.idle_ticks > config.rl_idle_ticks {
                acc.credit(&weights, RewardReason::IdlePenalty);
            }
            if fact.touched_new_tile {
                acc.credit(&weights, RewardReason::MapTileTouched);
            }
            if fact.explore_stalled {
                acc.credit(&weights, RewardReason::ExploreStallPenalty);
            }
            if fact.direction_changed {
                acc.credit(&weights, RewardReason::DirectionChangePenalty);
            }
            if fact.stuck {
                acc.credit(&weights, RewardReason::StuckAreaPenalty);
            }
            if fact.blocked_move {
                acc.credit(&weights, RewardReason::CollisionPenalty);
            }
            if fact.dead {
                acc.credit(&weights, RewardReason::Death);
            }
        }

        self.credit_predicted_shots(fires);
    }

    /// Credits predicted-shot rewards from the fire-time outcome, not from
    /// whether the bullet is still alive: a point-blank hit consumes the
    /// bullet on its spawn tick but must still pay out the same as any
    /// other hit. Targets are credited by stable tank id since a tank may
    /// already have been removed from `self.tanks` by the time rewards run.
    fn credit_predicted_shots(&mut self, fires: &[(String, Heading, PredictedResult)]) {
        let weights = self.reward_weights;
        for (owner, _heading, predicted) in fires {
            let reasons = reasons_for_predicted_shot(predicted.clone());
            if let Some(acc) = self.ai_reward_accum.get_mut(owner) {
                for reason in reasons {
                    acc.credit(&weights, reason);
                }
            }
            if let PredictedResult::Ai { target_id } = predicted {
                if let Some(acc) = self.ai_reward_accum.get_mut(target_id) {
                    acc.credit(&weights, RewardReason::GotHit);
                }
            }
        }
    }

    fn build_snapshot(&mut self) -> Snapshot {
        let mut players = Vec::with_capacity(self.tanks.len());
        for tank in &self.tanks {
            let short_id = self.id_table.to_network_id(&tank.id);
            players.push(PlayerSnapshot {
                id: short_id,
                label: tank.label.clone(),
                role: tank.role,
                x: tank.x,
                y: tank.y,
                dir_x: tank.heading.dx,
                dir_y: tank.heading.dy,
                health: tank.health,
                max_health: tank.max_health,
            });
        }
        let mut bullets = Vec::with_capacity(self.bullets.len());
        for b in &self.bullets {
            let short_id = self.id_table.to_network_id(&b.id);
            bullets.push(BulletSnapshot { id: short_id, x: b.x, y: b.y, dir_x: b.heading.dx, dir_y: b.heading.dy, radius: b.radius });
        }
        Snapshot {
            tick: self.tick,
            map_name: self.map.name.clone(),
            players,
            bullets,
            events: std::mem::take(&mut self.pending_events).into_iter().collect(),
            game_over: self.game_over,
            game_over_reason: self.game_over_reason.clone(),
            game_over_fx: self.game_over_fx.clone(),
            stats: json!({"enemiesDestroyed": self.enemies_destroyed}),
            ai_debug: self.build_ai_debug_channel(),
            gbe_debug: self.build_gbe_debug_channel(),
            map_tiles_changed: self.tile_changes.clone(),
        }
    }

    /// Per-AI-tank training metrics (`spec.md` §3 "Debug channels"), keyed
    /// by the session's short id so the label set is stable across ticks
    /// and only churns when an AI tank spawns or dies.
    fn build_ai_debug_channel(&mut self) -> Option<DebugChannel> {
        const FIELDS: [&str; 6] =
            ["idleTicks", "exploredFraction", "stuckAreaTicks", "reward", "prevDistPlayer", "prevDistHq"];
        let accessible = self.map.accessible_tile_count();
        let ai_ids: Vec<String> =
            self.tanks.iter().filter(|t| t.role == Role::Ai && t.is_alive()).map(|t| t.id.clone()).collect();
        if ai_ids.is_empty() {
            return None;
        }

        let mut entries: Vec<(String, [f32; 6])> = Vec::with_capacity(ai_ids.len());
        for id in &ai_ids {
            let Some(runtime) = self.ai_runtimes.get(id) else { continue };
            let reward = self.ai_reward_accum.get(id).map(|a| a.total()).unwrap_or(0.0);
            let metrics = [
                runtime.idle_ticks as f32,
                runtime.explored_fraction(accessible),
                runtime.stuck_area_ticks as f32,
                reward,
                runtime.prev_dist_player.unwrap_or(0.0),
                runtime.prev_dist_hq.unwrap_or(0.0),
            ];
            let short = self.id_table.to_network_id(id);
            entries.push((short, metrics));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut labels = Vec::with_capacity(entries.len() * FIELDS.len());
        let mut values = Vec::with_capacity(entries.len() * FIELDS.len());
        for (short, metrics) in entries {
            for (field, value) in FIELDS.iter().zip(metrics) {
                labels.push(format!("ai.{short}.{field}"));
                values.push(value);
            }
        }
        Some(DebugChannel { labels: Some(labels), values })
    }

    /// Session/engine-level metrics surfaced to GBE debug overlays.
    fn build_gbe_debug_channel(&self) -> Option<DebugChannel> {
        let labels = vec![
            "tick".to_string(),
            "aliveAiCount".to_string(),
            "aliveBulletCount".to_string(),
            "enemiesDestroyed".to_string(),
            "stateBytesTick".to_string(),
            "transitionBytesTick".to_string(),
            "lastAiInputReceived".to_string(),
            "lastAiInputApplied".to_string(),
        ];
        let values = vec![
            self.tick as f32,
            self.alive_ai_count() as f32,
            self.bullets.len() as f32,
            self.enemies_destroyed as f32,
            self.bytes.state_bytes as f32,
            self.bytes.transition_bytes as f32,
            if self.last_ai_input.received.is_some() { 1.0 } else { 0.0 },
            if self.last_ai_input.applied.is_some() { 1.0 } else { 0.0 },
        ];
        Some(DebugChannel { labels: Some(labels), values })
    }

    fn maybe_build_transition(&mut self, config: &GbeConfig, snapshot: &Snapshot) -> Option<Value> {
        let has_ai_socket = self.ai_socket().is_some();
        let strided = self.tick % config.rl_transition_interval == 0;
        if !has_ai_socket {
            if !self.ai_disconnected_logged {
                log::info!("ai_backend_disconnected session={}", self.id);
                self.ai_disconnected_logged = true;
            }
            return None;
        }
        self.ai_disconnected_logged = false;
        if !(strided || self.game_over) {
            return None;
        }

        let was_over = self.last_transition_snapshot.as_ref().map(|s| s.game_over).unwrap_or(false);
        if self.game_over && !was_over {
            self.episodes.close_episode(self.tick, self.game_over_reason.as_deref() == Some("hq_destroyed"));
        } else if !self.game_over && was_over {
            self.episodes.start_new_episode(self.tick);
        }

        let mut ai_rewards = serde_json::Map::new();
        for (tank_id, acc) in self.ai_reward_accum.iter_mut() {
            let (total, reasons) = acc.take();
            let short_id = self.id_table.to_network_id(tank_id);
            ai_rewards.insert(short_id, json!({"reward": total, "reasons": reasons}));
        }

        let prev_state = self.last_transition_snapshot.clone().unwrap_or_else(|| snapshot.clone());
        let transition = json!({
            "type": "transition",
            "prevState": prev_state.to_wire(),
            "nextState": snapshot.to_wire(),
            "aiRewards": Value::Object(ai_rewards),
            "tick": self.tick,
        });
        self.last_transition_snapshot = Some(snapshot.clone());
        Some(transition)
    }
}

struct AiRewardFacts {
    id: String,
    center: (i32, i32),
    heading: Heading,
    blocked_move: bool,
    dead: bool,
    idle_ticks: u64,
    touched_new_tile: bool,
    explore_stalled: bool,
    direction_changed: bool,
    stuck: bool,
}
