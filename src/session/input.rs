//! Append-only per-tick input queues drained at the start of each tick step
//! (`spec.md` §4.1 steps 3-4, §5 "Shared resources").

use crate::protocol::action::MoveCommand;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerCommand {
    pub move_cmd: Option<MoveCommand>,
    pub fire: bool,
}

/// Inputs appended by stream/HTTP handlers; drained by the tick step.
/// Append is lock-free from the handler's perspective — the session task
/// owns this struct and only the tick loop mutates it.
#[derive(Debug, Clone, Default)]
pub struct InputQueues {
    /// last command per player tank id, overwritten on each append (the GBE
    /// only remembers the most recent player command, per `spec.md` §4.1.3).
    pub player_commands: HashMap<String, PlayerCommand>,
    /// one FIFO queue per AI tank id (`spec.md` §4.1.4).
    pub ai_queues: HashMap<String, VecDeque<PlayerCommand>>,
    /// last applied command per AI tank, for the sticky-action fallback.
    pub ai_sticky: HashMap<String, PlayerCommand>,
}

impl InputQueues {
    pub fn push_player(&mut self, tank_id: String, cmd: PlayerCommand) {
        self.player_commands.insert(tank_id, cmd);
    }

    pub fn push_ai(&mut self, tank_id: String, cmd: PlayerCommand) {
        let queue = self.ai_queues.entry(tank_id).or_default();
        queue.push_back(cmd);
    }

    pub fn drain_player(&mut self, tank_id: &str) -> Option<PlayerCommand> {
        self.player_commands.remove(tank_id)
    }

    /// Pops the next queued AI command for `tank_id`, or repeats the last
    /// applied one ("sticky action", `spec.md` §4.1.4 / glossary).
    pub fn pop_ai_sticky(&mut self, tank_id: &str) -> PlayerCommand {
        let queue_depth = self.ai_queues.get(tank_id).map(|q| q.len()).unwrap_or(0);
        if queue_depth > 3 {
            log::warn!("ai input queue depth {queue_depth} for tank {tank_id}");
        }
        let popped = self.ai_queues.get_mut(tank_id).and_then(|q| q.pop_front());
        match popped {
            Some(cmd) => {
                self.ai_sticky.insert(tank_id.to_string(), cmd);
                cmd
            }
            None => self.ai_sticky.get(tank_id).copied().unwrap_or_default(),
        }
    }

    pub fn forget_tank(&mut self, tank_id: &str) {
        self.player_commands.remove(tank_id);
        self.ai_queues.remove(tank_id);
        self.ai_sticky.remove(tank_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_action_repeats_last_command_when_queue_empty() {
        let mut q = InputQueues::default();
        q.push_ai("a1".into(), PlayerCommand { move_cmd: Some(MoveCommand::MoveUp), fire: false });
        let first = q.pop_ai_sticky("a1");
        assert_eq!(first.move_cmd, Some(MoveCommand::MoveUp));
        let second = q.pop_ai_sticky("a1");
        assert_eq!(second.move_cmd, Some(MoveCommand::MoveUp));
    }

    #[test]
    fn empty_prior_implies_no_movement() {
        let mut q = InputQueues::default();
        let cmd = q.pop_ai_sticky("unknown");
        assert_eq!(cmd.move_cmd, None);
        assert!(!cmd.fire);
    }

    #[test]
    fn player_command_overwrites_rather_than_queues() {
        let mut q = InputQueues::default();
        q.push_player("p1".into(), PlayerCommand { move_cmd: Some(MoveCommand::MoveUp), fire: false });
        q.push_player("p1".into(), PlayerCommand { move_cmd: Some(MoveCommand::MoveDown), fire: true });
        let cmd = q.drain_player("p1").unwrap();
        assert_eq!(cmd.move_cmd, Some(MoveCommand::MoveDown));
        assert!(q.drain_player("p1").is_none());
    }
}
