//! Local state mirror and per-tank feature vector construction
//! (`spec.md` §4.3 "Per-session consumer" and §6 "Feature vector").

use crate::bullet::has_line_of_sight;
use crate::map::MapGrid;
use crate::tank::{Heading, Offset, Rect, Role, TankDefTable};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

const FEATURE_LEN: usize = 27;
const WINDOW_DEPTH: usize = 4;

#[derive(Debug, Clone)]
pub struct MirrorTank {
    pub label: String,
    pub role: Role,
    pub x: i32,
    pub y: i32,
    pub dir_x: i32,
    pub dir_y: i32,
    pub health: i32,
    pub max_health: i32,
}

/// A local reconstruction of a session's state, built by applying the
/// `state` messages received over the AI stream. Maintained per-session by
/// the consumer (`spec.md` §4.3: "maintain a local mirror ... by applying
/// received deltas").
#[derive(Debug, Clone, Default)]
pub struct LocalMirror {
    pub tick: u64,
    pub game_over: bool,
    pub game_over_reason: Option<String>,
    pub players: HashMap<String, MirrorTank>,
}

fn parse_tank_array(entry: &Value) -> Option<(String, MirrorTank)> {
    let arr = entry.as_array()?;
    if arr.len() < 9 {
        return None;
    }
    let id = arr[0].as_str()?.to_string();
    let label = arr[1].as_str()?.to_string();
    let role = match arr[2].as_str()? {
        "ai" => Role::Ai,
        _ => Role::Player,
    };
    Some((
        id,
        MirrorTank {
            label,
            role,
            x: arr[3].as_i64()? as i32,
            y: arr[4].as_i64()? as i32,
            dir_x: arr[5].as_i64()? as i32,
            dir_y: arr[6].as_i64()? as i32,
            health: arr[7].as_i64()? as i32,
            max_health: arr[8].as_i64()? as i32,
        },
    ))
}

impl LocalMirror {
    /// Applies one `state` stream message, whether it is a full snapshot
    /// (`full:true`, plain `players` array) or a per-tick delta
    /// (`players:{upserts,removed}`).
    pub fn apply(&mut self, state: &Value) {
        if let Some(tick) = state.get("tick").and_then(Value::as_u64) {
            self.tick = tick;
        }
        if let Some(go) = state.get("gameOver").and_then(Value::as_bool) {
            self.game_over = go;
        }
        if state.get("gameOverReason").is_some() {
            self.game_over_reason = state.get("gameOverReason").and_then(Value::as_str).map(|s| s.to_string());
        }

        match state.get("players") {
            Some(Value::Array(full)) => {
                self.players.clear();
                for entry in full {
                    if let Some((id, tank)) = parse_tank_array(entry) {
                        self.players.insert(id, tank);
                    }
                }
            }
            Some(Value::Object(patch)) => {
                if let Some(Value::Array(upserts)) = patch.get("upserts") {
                    for entry in upserts {
                        if let Some((id, tank)) = parse_tank_array(entry) {
                            self.players.insert(id, tank);
                        }
                    }
                }
                if let Some(Value::Array(removed)) = patch.get("removed") {
                    for id in removed {
                        if let Some(id) = id.as_str() {
                            self.players.remove(id);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Per-tank local tracking the wire protocol doesn't expose directly:
/// idle ticks (derived from position deltas) and shoot-cooldown (derived
/// from AIB's own dispatched fire actions, since the session's state stream
/// never reports it). Recorded here rather than invented as new wire fields.
#[derive(Debug, Clone)]
pub struct TankTrack {
    pub last_pos: Option<(i32, i32)>,
    pub idle_ticks: u64,
    pub shoot_cooldown_estimate: u32,
}

impl Default for TankTrack {
    fn default() -> Self {
        Self { last_pos: None, idle_ticks: 0, shoot_cooldown_estimate: 0 }
    }
}

impl TankTrack {
    pub fn observe(&mut self, x: i32, y: i32) {
        match self.last_pos {
            Some(prev) if prev == (x, y) => self.idle_ticks += 1,
            _ => self.idle_ticks = 0,
        }
        self.last_pos = Some((x, y));
        self.shoot_cooldown_estimate = self.shoot_cooldown_estimate.saturating_sub(1);
    }

    pub fn record_fire(&mut self, cooldown: u32) {
        self.shoot_cooldown_estimate = cooldown;
    }
}

/// Builds the 27-scalar per-tank feature vector (`spec.md` §6).
#[allow(clippy::too_many_arguments)]
pub fn build_feature_vector(
    tank: &MirrorTank,
    player: Option<&MirrorTank>,
    hq: Option<(usize, usize)>,
    map: &MapGrid,
    tank_defs: &TankDefTable,
    track: &TankTrack,
    idle_threshold: u64,
    max_enemy_speed: i32,
    label_order: &[String],
) -> [f32; FEATURE_LEN] {
    let map_size = map.map_size.max(1) as f32;
    let def = tank_defs.get(&tank.label);
    let speed = def.map(|d| d.speed).unwrap_or(1).max(1) as f32;
    let cooldown = def.map(|d| d.cooldown).unwrap_or(1).max(1);
    let bound_min = def.map(|d| d.bound_min).unwrap_or(Offset { x: 4, y: 4 });
    let bound_max = def.map(|d| d.bound_max).unwrap_or(Offset { x: 28, y: 28 });
    let heading = Heading { dx: tank.dir_x, dy: tank.dir_y };
    let tank_center = (tank.x + (bound_min.x + bound_max.x) / 2, tank.y + (bound_min.y + bound_max.y) / 2);

    let (player_dx, player_dy, player_dist, player_los, player_health) = match player {
        Some(p) => {
            let p_def = tank_defs.get(&p.label);
            let p_min = p_def.map(|d| d.bound_min).unwrap_or(Offset { x: 4, y: 4 });
            let p_max = p_def.map(|d| d.bound_max).unwrap_or(Offset { x: 28, y: 28 });
            let rect = Rect { min_x: p.x + p_min.x, min_y: p.y + p_min.y, max_x: p.x + p_max.x, max_y: p.y + p_max.y };
            let dx = (p.x - tank.x) as f32;
            let dy = (p.y - tank.y) as f32;
            let dist = (dx * dx + dy * dy).sqrt();
            let los = has_line_of_sight(map, tank_center.0, tank_center.1, heading, &rect, map.map_size);
            (dx, dy, dist, los, p.health as f32 / (p.max_health.max(1) as f32))
        }
        None => (0.0, 0.0, 0.0, false, 0.0),
    };

    let (hq_dx, hq_dy, hq_dist, hq_los) = match hq {
        Some((row, col)) => {
            let (cx, cy) = map.tile_center_px(row, col);
            let half = map.tile_size / 2;
            let rect = Rect { min_x: cx - half, min_y: cy - half, max_x: cx + half, max_y: cy + half };
            let dx = (cx - tank.x) as f32;
            let dy = (cy - tank.y) as f32;
            let dist = (dx * dx + dy * dy).sqrt();
            let los = has_line_of_sight(map, tank_center.0, tank_center.1, heading, &rect, map.map_size);
            (dx, dy, dist, los)
        }
        None => (0.0, 0.0, 0.0, false),
    };

    let label_index = label_order.iter().position(|l| l == &tank.label).unwrap_or(0);
    let label_count = label_order.len().max(2);

    let mut v = [0.0f32; FEATURE_LEN];
    v[0] = tank.x as f32 / map_size;
    v[1] = tank.y as f32 / map_size;
    v[2] = tank.dir_x as f32;
    v[3] = tank.dir_y as f32;
    v[4] = speed / (max_enemy_speed.max(1) as f32);
    v[5] = tank.health as f32 / (tank.max_health.max(1) as f32);
    v[6] = track.shoot_cooldown_estimate as f32 / cooldown as f32;
    v[7] = player_dx / map_size;
    v[8] = player_dy / map_size;
    v[9] = player_dist / map_size;
    v[10] = if player_los { 1.0 } else { 0.0 };
    v[11] = player_health;
    v[12] = hq_dx / map_size;
    v[13] = hq_dy / map_size;
    v[14] = hq_dist / map_size;
    v[15] = if hq_los { 1.0 } else { 0.0 };
    v[16] = track.idle_ticks as f32 / idle_threshold.max(1) as f32;
    v[17] = label_index as f32 / (label_count - 1) as f32;

    let (row, col) = map.px_to_tile(tank.x, tank.y);
    let max_tile_id = 7.0f32;
    let mut i = 18;
    for dr in -1i32..=1 {
        for dc in -1i32..=1 {
            let r = row + dr as isize;
            let c = col + dc as isize;
            let tile_id = if map.in_bounds(r, c) { u8::from(map.get(r as usize, c as usize).unwrap()) as f32 } else { 1.0 };
            v[i] = (tile_id + 1.0) / (max_tile_id + 1.0);
            i += 1;
        }
    }
    v
}

/// Rolling window of the most recent `WINDOW_DEPTH` feature vectors for one
/// tank, stacked oldest-first into a 108-length vector.
#[derive(Debug, Clone, Default)]
pub struct FeatureWindow {
    frames: VecDeque<[f32; FEATURE_LEN]>,
}

impl FeatureWindow {
    pub fn push(&mut self, frame: [f32; FEATURE_LEN]) {
        if self.frames.len() == WINDOW_DEPTH {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Stacks the window to `WINDOW_DEPTH * FEATURE_LEN`, front-padding with
    /// the oldest available frame until the window fills.
    pub fn stacked(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(WINDOW_DEPTH * FEATURE_LEN);
        let pad = WINDOW_DEPTH.saturating_sub(self.frames.len());
        if let Some(first) = self.frames.front() {
            for _ in 0..pad {
                out.extend_from_slice(first);
            }
        }
        for frame in &self.frames {
            out.extend_from_slice(frame);
        }
        out
    }
}

pub const STACKED_FEATURE_LEN: usize = WINDOW_DEPTH * FEATURE_LEN;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_state_replaces_player_set() {
        let mut mirror = LocalMirror::default();
        let msg = serde_json::json!({
            "tick": 5,
            "players": [["1","heavy_en","ai",10,10,0,-1,3,3]],
        });
        mirror.apply(&msg);
        assert_eq!(mirror.tick, 5);
        assert_eq!(mirror.players.len(), 1);
        assert_eq!(mirror.players["1"].label, "heavy_en");
    }

    #[test]
    fn delta_upsert_and_remove() {
        let mut mirror = LocalMirror::default();
        mirror.apply(&serde_json::json!({"tick": 1, "players": [["1","heavy_en","ai",0,0,0,-1,3,3]]}));
        mirror.apply(&serde_json::json!({"tick": 2, "players": {"upserts": [["1","heavy_en","ai",1,0,0,-1,3,3]], "removed": []}}));
        assert_eq!(mirror.players["1"].x, 1);
        mirror.apply(&serde_json::json!({"tick": 3, "players": {"upserts": [], "removed": ["1"]}}));
        assert!(mirror.players.is_empty());
    }

    #[test]
    fn feature_window_pads_with_oldest_frame_until_full() {
        let mut window = FeatureWindow::default();
        window.push([1.0; FEATURE_LEN]);
        let stacked = window.stacked();
        assert_eq!(stacked.len(), STACKED_FEATURE_LEN);
        assert!(stacked.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn idle_ticks_increment_only_when_position_unchanged() {
        let mut track = TankTrack::default();
        track.observe(0, 0);
        track.observe(0, 0);
        track.observe(0, 0);
        assert_eq!(track.idle_ticks, 2);
        track.observe(1, 0);
        assert_eq!(track.idle_ticks, 0);
    }
}
