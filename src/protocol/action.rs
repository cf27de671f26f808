//! Move command vocabulary and the 10-entry action table
//! (`spec.md` §6 "Action space").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveCommand {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
}

impl MoveCommand {
    pub fn heading(self) -> (i32, i32) {
        match self {
            MoveCommand::MoveUp => (0, -1),
            MoveCommand::MoveDown => (0, 1),
            MoveCommand::MoveLeft => (-1, 0),
            MoveCommand::MoveRight => (1, 0),
        }
    }
}

/// One command applied to a tank on a tick: an optional move and a fire bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TankCommand {
    #[serde(rename = "move")]
    pub move_cmd: Option<MoveCommand>,
    pub fire: bool,
}

/// The fixed 10-entry action table AIB selects from (`spec.md` §6).
pub const ACTION_TABLE: [TankCommand; 10] = [
    TankCommand { move_cmd: None, fire: false },
    TankCommand { move_cmd: Some(MoveCommand::MoveUp), fire: false },
    TankCommand { move_cmd: Some(MoveCommand::MoveDown), fire: false },
    TankCommand { move_cmd: Some(MoveCommand::MoveLeft), fire: false },
    TankCommand { move_cmd: Some(MoveCommand::MoveRight), fire: false },
    TankCommand { move_cmd: None, fire: true },
    TankCommand { move_cmd: Some(MoveCommand::MoveUp), fire: true },
    TankCommand { move_cmd: Some(MoveCommand::MoveDown), fire: true },
    TankCommand { move_cmd: Some(MoveCommand::MoveLeft), fire: true },
    TankCommand { move_cmd: Some(MoveCommand::MoveRight), fire: true },
];

pub const ACTION_SIZE: usize = ACTION_TABLE.len();

pub fn command_for_index(index: usize) -> Option<TankCommand> {
    ACTION_TABLE.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_table_has_ten_entries() {
        assert_eq!(ACTION_TABLE.len(), 10);
    }

    #[test]
    fn index_five_is_idle_fire() {
        let cmd = command_for_index(5).unwrap();
        assert_eq!(cmd.move_cmd, None);
        assert!(cmd.fire);
    }

    #[test]
    fn index_nine_is_right_fire() {
        let cmd = command_for_index(9).unwrap();
        assert_eq!(cmd.move_cmd, Some(MoveCommand::MoveRight));
        assert!(cmd.fire);
    }
}
