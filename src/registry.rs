//! Session registry: the only cross-session mutable structure
//! (`spec.md` §5 "Shared resources"). Mirrors the teacher's `Casino`
//! (`RwLock<HashMap<RoomId, RoomHandle>>`), append/remove only so that a
//! concurrent poll-list read and a tick-sweep removal never race.

use crate::map::MapGrid;
use crate::tank::TankDefTable;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;

/// A command appended to a session's input channel from outside its tick
/// task (HTTP handler or stream reader). Lock-free from the handler's
/// perspective: it is just a channel send.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    PlayerInput { tank_id: String, cmd: crate::session::input::PlayerCommand },
    AiInput { tank_id: String, cmd: crate::session::input::PlayerCommand },
    /// `POST /session/{id}/ai-input`: queues identically to a stream `input`
    /// message but is counted under the `aiInputHttpBytes` bucket (`spec.md`
    /// §4.2).
    AiInputHttp { tank_id: String, cmd: crate::session::input::PlayerCommand },
    Join { role: crate::tank::Role, player_id: Option<String>, reply: UnboundedSender<JoinAck>, socket_tx: UnboundedSender<String> },
    /// `POST /session/{id}/join`: spawns a player tank without an attached
    /// socket (`spec.md` §6).
    JoinPlayerHttp { label: String, reply: UnboundedSender<Option<JoinHttpAck>> },
    Summary { reply: UnboundedSender<SessionSummary> },
    DebugToggle { socket_id: crate::session::SocketId, ai: bool, enabled: bool },
    Disconnect { socket_id: crate::session::SocketId },
}

#[derive(Debug, Clone)]
pub struct JoinAck {
    pub socket_id: crate::session::SocketId,
    pub displaced: Option<crate::session::SocketId>,
}

#[derive(Debug, Clone)]
pub struct JoinHttpAck {
    pub player_id: String,
    pub map: serde_json::Value,
    pub state: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub tick: u64,
    pub game_over: bool,
    pub players: usize,
    pub map_name: String,
}

/// Handle to a running session task: everything the connection layer needs
/// without touching `Session` directly.
pub struct SessionHandle {
    pub id: String,
    pub tx: UnboundedSender<SessionCommand>,
    pub map_key: String,
    pub model_key: Option<String>,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: SessionHandle) -> Arc<SessionHandle> {
        let handle = Arc::new(handle);
        self.sessions.write().await.insert(handle.id.clone(), handle.clone());
        handle
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) {
        if self.sessions.write().await.remove(id).is_some() {
            log::info!("removed session {id}");
        }
    }

    pub async fn list(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

/// Static map/tank-definition assets shared read-only across all sessions
/// (loaded once at startup from the map and tank-definition files).
pub struct Assets {
    pub maps: HashMap<String, MapGrid>,
    pub tank_defs: TankDefTable,
}

impl Assets {
    pub fn map_for(&self, name: &str) -> Option<MapGrid> {
        self.maps.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = unbounded_channel();
        registry.insert(SessionHandle { id: "s1".into(), tx, map_key: "default".into(), model_key: None }).await;
        assert!(registry.get("s1").await.is_some());
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn remove_drops_session_from_list() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = unbounded_channel();
        registry.insert(SessionHandle { id: "s1".into(), tx, map_key: "default".into(), model_key: None }).await;
        registry.remove("s1").await;
        assert!(registry.list().await.is_empty());
    }
}
