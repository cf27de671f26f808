//! Session state: the GBE's central per-game-room aggregate
//! (`spec.md` §3 "Session"). A session is a serial actor (`spec.md` §9):
//! exactly one task owns it and drains its input queues once per tick.

pub mod input;
pub mod spawn;
pub mod tick;

use crate::ai_runtime::AiRuntime;
use crate::bullet::Bullet;
use crate::episode::EpisodeWindow;
use crate::map::MapGrid;
use crate::protocol::ids::IdTable;
use crate::protocol::snapshot::Snapshot;
use crate::reward::{RewardAccumulator, RewardWeights};
use crate::tank::{Role, Tank, TankDefTable};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde_json::Value;
use std::collections::HashMap;

pub type SocketId = u64;

#[derive(Debug, Clone, Default)]
pub struct ByteCounters {
    pub state_bytes: u64,
    pub state_bytes_total: u64,
    pub transition_bytes: u64,
    pub transition_bytes_total: u64,
    pub player_input_ws_bytes: u64,
    pub player_input_ws_bytes_total: u64,
    pub ai_input_ws_bytes: u64,
    pub ai_input_ws_bytes_total: u64,
    pub ai_input_http_bytes: u64,
    pub ai_input_http_bytes_total: u64,
    pub join_ws_bytes: u64,
    pub join_ws_bytes_total: u64,
    pub debug_toggle_ws_bytes: u64,
    pub debug_toggle_ws_bytes_total: u64,
    pub other_ws_in_bytes: u64,
    pub other_ws_in_bytes_total: u64,
}

impl ByteCounters {
    pub fn reset_tick(&mut self) {
        self.state_bytes = 0;
        self.transition_bytes = 0;
        self.player_input_ws_bytes = 0;
        self.ai_input_ws_bytes = 0;
        self.ai_input_http_bytes = 0;
        self.join_ws_bytes = 0;
        self.debug_toggle_ws_bytes = 0;
        self.other_ws_in_bytes = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriberMeta {
    pub role: Role,
    pub player_id: Option<String>,
    pub debug_ai: bool,
    pub debug_gbe: bool,
    pub ai_debug_labels_sent: Option<Vec<String>>,
    pub gbe_debug_labels_sent: Option<Vec<String>>,
}

/// Debug metric snapshot fed by `{type:"input", debug:{...}}` messages
/// (`SPEC_FULL.md` §3 "last-AI-input-received / last-AI-input-applied").
#[derive(Debug, Clone, Default)]
pub struct LastAiInput {
    pub received: Option<Value>,
    pub applied: Option<Value>,
}

pub struct Session {
    pub id: String,
    pub map: MapGrid,
    pub map_key: String,
    pub tank_defs: TankDefTable,
    pub model_key: Option<String>,
    pub tick: u64,
    pub rng: SmallRng,
    pub max_enemies_alive: usize,
    pub enemy_spawn_timer: u64,
    pub enemies_destroyed: u64,

    pub tanks: Vec<Tank>,
    pub bullets: Vec<Bullet>,
    pub ai_runtimes: HashMap<String, AiRuntime>,

    pub inputs: input::InputQueues,
    pub pending_events: Vec<Value>,
    pub tile_changes: Vec<Value>,

    pub reward_weights: RewardWeights,
    pub ai_reward_accum: HashMap<String, RewardAccumulator>,
    pub last_transition_tick: u64,

    pub game_over: bool,
    pub game_over_reason: Option<String>,
    pub game_over_fx: Option<Value>,
    pub hq_rewarded: bool,
    pub scheduled_removal_tick: Option<u64>,

    pub episodes: EpisodeWindow,

    pub id_table: IdTable,
    pub subscribers: HashMap<SocketId, SubscriberMeta>,
    pub next_socket_id: SocketId,

    pub bytes: ByteCounters,
    pub last_snapshot: Option<Snapshot>,
    pub last_transition_snapshot: Option<Snapshot>,

    pub last_ai_input: LastAiInput,
    pub ai_disconnected_logged: bool,

    pub player_spawns_used: usize,
}

impl Session {
    pub fn new(
        id: String,
        map: MapGrid,
        map_key: String,
        tank_defs: TankDefTable,
        seed: u64,
        max_enemies_alive: usize,
        reward_weights: RewardWeights,
    ) -> Self {
        Self {
            id,
            map,
            map_key,
            tank_defs,
            model_key: None,
            tick: 0,
            rng: SmallRng::seed_from_u64(seed),
            max_enemies_alive,
            enemy_spawn_timer: 0,
            enemies_destroyed: 0,
            tanks: Vec::new(),
            bullets: Vec::new(),
            ai_runtimes: HashMap::new(),
            inputs: input::InputQueues::default(),
            pending_events: Vec::new(),
            tile_changes: Vec::new(),
            reward_weights,
            ai_reward_accum: HashMap::new(),
            last_transition_tick: 0,
            game_over: false,
            game_over_reason: None,
            game_over_fx: None,
            hq_rewarded: false,
            scheduled_removal_tick: None,
            episodes: EpisodeWindow::new(0),
            id_table: IdTable::new(),
            subscribers: HashMap::new(),
            next_socket_id: 1,
            bytes: ByteCounters::default(),
            last_snapshot: None,
            last_transition_snapshot: None,
            last_ai_input: LastAiInput::default(),
            ai_disconnected_logged: false,
            player_spawns_used: 0,
        }
    }

    pub fn max_enemy_count(&self) -> usize {
        self.max_enemies_alive.min(self.map.ai_spawns().len())
    }

    pub fn alive_ai_count(&self) -> usize {
        self.tanks.iter().filter(|t| t.role == Role::Ai && t.is_alive()).count()
    }

    pub fn ai_socket(&self) -> Option<SocketId> {
        self.subscribers.iter().find(|(_, m)| m.role == Role::Ai).map(|(id, _)| *id)
    }

    /// registers a subscriber; an existing AI socket is displaced per
    /// `spec.md` §3's "at most one AI subscriber" invariant. Returns the
    /// displaced socket id, if any, so the caller can close it and emit
    /// `ai_ws_replaced`.
    pub fn register_subscriber(&mut self, role: Role, player_id: Option<String>) -> (SocketId, Option<SocketId>) {
        let displaced = if role == Role::Ai { self.ai_socket() } else { None };
        if let Some(old) = displaced {
            self.subscribers.remove(&old);
        }
        let socket_id = self.next_socket_id;
        self.next_socket_id += 1;
        self.subscribers.insert(socket_id, SubscriberMeta { role, player_id, ..Default::default() });
        (socket_id, displaced)
    }

    pub fn remove_subscriber(&mut self, socket_id: SocketId) {
        self.subscribers.remove(&socket_id);
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Spawns one player tank at the next free player-spawn point, up to
    /// `|playerSpawnPoints|` (`spec.md` §3 "Tank" lifecycle: "player tanks
    /// created on session create/join"). Returns the new tank's full id.
    pub fn spawn_player(&mut self, label: &str) -> Option<String> {
        let spawns = self.map.player_spawns();
        if self.player_spawns_used >= spawns.len() {
            return None;
        }
        let spawn_tile = spawns[self.player_spawns_used];
        let (x, y) = spawn::find_free_spawn_rect(&self.map, spawn_tile, label, &self.tank_defs, &self.tanks)?;
        let def = self.tank_defs.get(label)?.clone();
        let id = uuid::Uuid::new_v4().to_string();
        let tank = Tank::new(id.clone(), &def, Role::Player, x, y, crate::tank::Heading::UP);
        self.tanks.push(tank);
        self.player_spawns_used += 1;
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFile;

    fn empty_session() -> Session {
        let map = MapGrid::from_file("t".into(), MapFile { version: 1, map_size: 96, tile_size: 32, tiles: vec![vec![0; 3]; 3] }).unwrap();
        Session::new("s1".into(), map, "t".into(), TankDefTable::new(), 42, 2, RewardWeights::default())
    }

    #[test]
    fn late_ai_join_displaces_existing_ai_socket() {
        let mut session = empty_session();
        let (first, displaced) = session.register_subscriber(Role::Ai, None);
        assert!(displaced.is_none());
        let (second, displaced) = session.register_subscriber(Role::Ai, None);
        assert_eq!(displaced, Some(first));
        assert!(session.subscribers.contains_key(&second));
        assert_eq!(session.subscribers.len(), 1);
    }

    #[test]
    fn max_enemy_count_is_bounded_by_spawn_points_and_cap() {
        let session = empty_session();
        assert_eq!(session.max_enemy_count(), 0);
    }
}
