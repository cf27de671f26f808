//! Inbound stream message vocabulary (`spec.md` §4.2).

use super::action::MoveCommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamRole {
    Player,
    Ai,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Join {
        #[serde(rename = "sessionId")]
        session_id: String,
        role: StreamRole,
        #[serde(rename = "playerId", default)]
        player_id: Option<String>,
    },
    Input {
        role: StreamRole,
        #[serde(rename = "tankId")]
        tank_id: String,
        #[serde(rename = "move", default)]
        move_cmd: Option<MoveCommand>,
        #[serde(default)]
        fire: bool,
        #[serde(default)]
        debug: Option<Value>,
    },
    DebugAiToggle {
        enabled: bool,
    },
    DebugGbeToggle {
        enabled: bool,
    },
}

/// `POST /session/{id}/ai-input {events:[...]}` queues identically to a
/// stream `Input` message, one per array entry (`spec.md` §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct AiInputHttpBody {
    pub events: Vec<AiInputEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiInputEvent {
    #[serde(rename = "tankId")]
    pub tank_id: String,
    #[serde(rename = "move", default)]
    pub move_cmd: Option<MoveCommand>,
    #[serde(default)]
    pub fire: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_message() {
        let raw = r#"{"type":"join","sessionId":"s1","role":"ai"}"#;
        let msg: StreamMessage = serde_json::from_str(raw).unwrap();
        match msg {
            StreamMessage::Join { session_id, role, player_id } => {
                assert_eq!(session_id, "s1");
                assert_eq!(role, StreamRole::Ai);
                assert_eq!(player_id, None);
            }
            _ => panic!("expected join"),
        }
    }

    #[test]
    fn parses_input_message_with_null_move() {
        let raw = r#"{"type":"input","role":"player","tankId":"t1","move":null,"fire":true}"#;
        let msg: StreamMessage = serde_json::from_str(raw).unwrap();
        match msg {
            StreamMessage::Input { move_cmd, fire, .. } => {
                assert_eq!(move_cmd, None);
                assert!(fire);
            }
            _ => panic!("expected input"),
        }
    }

    #[test]
    fn parses_debug_toggle() {
        let raw = r#"{"type":"debug_ai_toggle","enabled":true}"#;
        let msg: StreamMessage = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, StreamMessage::DebugAiToggle { enabled: true }));
    }
}
