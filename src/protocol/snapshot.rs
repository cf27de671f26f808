//! Snapshot and delta-state wire format (`spec.md` §4.6).
//!
//! Field order for `players`/`bullets` entries is fixed by the spec rather
//! than keyed by name, so entries are serialized as value arrays; the
//! session layer is responsible for resolving ids through its `IdTable`
//! before building a `Snapshot`.

use crate::tank::Role;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub id: String,
    pub label: String,
    pub role: Role,
    pub x: i32,
    pub y: i32,
    pub dir_x: i32,
    pub dir_y: i32,
    pub health: i32,
    pub max_health: i32,
}

impl PlayerSnapshot {
    /// `[id,label,role,x,y,dirX,dirY,health,maxHealth]` per `spec.md` §4.6.
    pub fn to_value_array(&self) -> Value {
        let role = match self.role {
            Role::Player => "player",
            Role::Ai => "ai",
        };
        json!([self.id, self.label, role, self.x, self.y, self.dir_x, self.dir_y, self.health, self.max_health])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulletSnapshot {
    pub id: String,
    pub x: i32,
    pub y: i32,
    pub dir_x: i32,
    pub dir_y: i32,
    pub radius: i32,
}

impl BulletSnapshot {
    /// `[id,x,y,dirX,dirY,radius]` per `spec.md` §4.6.
    pub fn to_value_array(&self) -> Value {
        json!([self.id, self.x, self.y, self.dir_x, self.dir_y, self.radius])
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugChannel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tick: u64,
    pub map_name: String,
    pub players: Vec<PlayerSnapshot>,
    pub bullets: Vec<BulletSnapshot>,
    pub events: Vec<Value>,
    pub game_over: bool,
    pub game_over_reason: Option<String>,
    pub game_over_fx: Option<Value>,
    pub stats: Value,
    pub ai_debug: Option<DebugChannel>,
    pub gbe_debug: Option<DebugChannel>,
    pub map_tiles_changed: Vec<Value>,
}

impl Snapshot {
    pub fn to_wire(&self) -> Value {
        let mut obj = json!({
            "tick": self.tick,
            "mapName": self.map_name,
            "players": self.players.iter().map(PlayerSnapshot::to_value_array).collect::<Vec<_>>(),
            "bullets": self.bullets.iter().map(BulletSnapshot::to_value_array).collect::<Vec<_>>(),
            "events": self.events,
            "gameOver": self.game_over,
            "gameOverReason": self.game_over_reason,
            "stats": self.stats,
        });
        let map = obj.as_object_mut().expect("object literal");
        if let Some(fx) = &self.game_over_fx {
            map.insert("gameOverFx".to_string(), fx.clone());
        }
        if let Some(ai) = &self.ai_debug {
            map.insert("aiDebug".to_string(), serde_json::to_value(ai).unwrap());
        }
        if let Some(gbe) = &self.gbe_debug {
            map.insert("gbeDebug".to_string(), serde_json::to_value(gbe).unwrap());
        }
        if !self.map_tiles_changed.is_empty() {
            map.insert("mapTilesChanged".to_string(), Value::Array(self.map_tiles_changed.clone()));
        }
        obj
    }
}

/// Builds the delta-state message between `prev` (or `None` for the first
/// emit) and `curr`. Unchanged scalar top-level fields are omitted; `players`
/// and `bullets` carry only upserted entries (by full value array) plus a
/// removed-id list (`spec.md` §4.6).
pub fn build_delta(prev: Option<&Snapshot>, curr: &Snapshot) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("delta".to_string(), Value::Bool(true));
    out.insert("tick".to_string(), json!(curr.tick));

    let changed_scalar = |a: &Value, b: &Value| a != b;
    if prev.map(|p| p.map_name != curr.map_name).unwrap_or(true) {
        out.insert("mapName".to_string(), json!(curr.map_name));
    }
    if prev.map(|p| p.game_over != curr.game_over).unwrap_or(true) {
        out.insert("gameOver".to_string(), json!(curr.game_over));
    }
    if prev.map(|p| p.game_over_reason != curr.game_over_reason).unwrap_or(true) {
        out.insert("gameOverReason".to_string(), json!(curr.game_over_reason));
    }
    if let Some(fx) = &curr.game_over_fx {
        out.insert("gameOverFx".to_string(), fx.clone());
    }
    let prev_stats = prev.map(|p| &p.stats);
    if prev_stats.map(|s| changed_scalar(s, &curr.stats)).unwrap_or(true) {
        out.insert("stats".to_string(), curr.stats.clone());
    }

    let (upserts, removed) = diff_entities(prev.map(|p| &p.players[..]), &curr.players, |p| &p.id, |p| p.to_value_array());
    if !upserts.is_empty() || !removed.is_empty() {
        out.insert("players".to_string(), json!({ "upserts": upserts, "removed": removed }));
    }

    let (upserts, removed) = diff_entities(prev.map(|p| &p.bullets[..]), &curr.bullets, |b| &b.id, |b| b.to_value_array());
    if !upserts.is_empty() || !removed.is_empty() {
        out.insert("bullets".to_string(), json!({ "upserts": upserts, "removed": removed }));
    }

    if !curr.events.is_empty() {
        out.insert("events".to_string(), json!(curr.events));
    }
    if !curr.map_tiles_changed.is_empty() {
        out.insert("mapTilesChanged".to_string(), Value::Array(curr.map_tiles_changed.clone()));
    }
    if let Some(ai) = &curr.ai_debug {
        out.insert("aiDebug".to_string(), serde_json::to_value(ai).unwrap());
    }
    if let Some(gbe) = &curr.gbe_debug {
        out.insert("gbeDebug".to_string(), serde_json::to_value(gbe).unwrap());
    }

    Value::Object(out)
}

fn diff_entities<T: PartialEq, Id: Fn(&T) -> &String, Wire: Fn(&T) -> Value>(
    prev: Option<&[T]>,
    curr: &[T],
    id_of: Id,
    wire_of: Wire,
) -> (Vec<Value>, Vec<String>) {
    let prev = prev.unwrap_or(&[]);
    let mut upserts = Vec::new();
    for entity in curr {
        let id = id_of(entity);
        match prev.iter().find(|p| id_of(p) == id) {
            Some(old) if old == entity => {}
            _ => upserts.push(wire_of(entity)),
        }
    }
    let removed: Vec<String> = prev
        .iter()
        .map(id_of)
        .filter(|id| !curr.iter().any(|c| id_of(c) == *id))
        .cloned()
        .collect();
    (upserts, removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_snapshot(tick: u64) -> Snapshot {
        Snapshot {
            tick,
            map_name: "stage03".to_string(),
            players: vec![],
            bullets: vec![],
            events: vec![],
            game_over: false,
            game_over_reason: None,
            game_over_fx: None,
            stats: json!({}),
            ai_debug: None,
            gbe_debug: None,
            map_tiles_changed: vec![],
        }
    }

    #[test]
    fn stable_tick_emits_no_entity_fields() {
        let prev = base_snapshot(5);
        let curr = base_snapshot(6);
        let delta = build_delta(Some(&prev), &curr);
        let obj = delta.as_object().unwrap();
        assert_eq!(obj["tick"], json!(6));
        assert!(!obj.contains_key("players"));
        assert!(!obj.contains_key("bullets"));
        assert!(!obj.contains_key("events"));
        assert!(!obj.contains_key("mapTilesChanged"));
    }

    #[test]
    fn new_player_appears_as_upsert() {
        let prev = base_snapshot(1);
        let mut curr = base_snapshot(2);
        curr.players.push(PlayerSnapshot {
            id: "1".into(),
            label: "heavy_pl".into(),
            role: Role::Player,
            x: 0,
            y: 0,
            dir_x: 0,
            dir_y: -1,
            health: 3,
            max_health: 3,
        });
        let delta = build_delta(Some(&prev), &curr);
        let players = &delta["players"];
        assert_eq!(players["upserts"].as_array().unwrap().len(), 1);
        assert!(players["removed"].as_array().unwrap().is_empty());
    }

    #[test]
    fn removed_player_appears_in_removed_list() {
        let mut prev = base_snapshot(1);
        prev.players.push(PlayerSnapshot {
            id: "1".into(),
            label: "heavy_pl".into(),
            role: Role::Player,
            x: 0,
            y: 0,
            dir_x: 0,
            dir_y: -1,
            health: 0,
            max_health: 3,
        });
        let curr = base_snapshot(2);
        let delta = build_delta(Some(&prev), &curr);
        let players = &delta["players"];
        assert_eq!(players["removed"].as_array().unwrap(), &vec![json!("1")]);
    }
}
