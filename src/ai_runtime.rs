//! Per-AI-tank runtime state used by the reward shaper, owned by the GBE
//! session (`spec.md` §3 "AI-Runtime").

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct AiRuntime {
    pub idle_ticks: u64,
    pub last_move: Option<(i32, i32)>,
    pub blocked_move: bool,
    pub visited: HashSet<(usize, usize)>,
    pub last_visited_count: usize,
    pub last_new_tile_tick: u64,
    pub prev_heading: Option<(i32, i32)>,
    pub ticks_since_direction_change: u64,
    pub stuck_area_center: Option<(usize, usize)>,
    pub stuck_area_ticks: u64,
    /// retained for the debug surface; not an activated reward term
    /// (see DESIGN.md Open Questions).
    pub prev_dist_player: Option<f32>,
    pub prev_dist_hq: Option<f32>,
}

impl AiRuntime {
    pub fn new(spawn_tile: (usize, usize), tick: u64) -> Self {
        let mut visited = HashSet::new();
        visited.insert(spawn_tile);
        Self {
            idle_ticks: 0,
            last_move: None,
            blocked_move: false,
            visited,
            last_visited_count: 1,
            last_new_tile_tick: tick,
            prev_heading: None,
            // a tank that has never had a heading recorded hasn't "recently
            // changed direction" — start far outside any realistic cooldown
            // window rather than at 0, which would otherwise flag every
            // freshly spawned tank as having just turned.
            ticks_since_direction_change: u64::MAX / 2,
            stuck_area_center: None,
            stuck_area_ticks: 0,
            prev_dist_player: None,
            prev_dist_hq: None,
        }
    }

    /// Records a tick's movement outcome; updates idle/oscillation/stuck
    /// tracking. `tile` is the tank's current tile coordinate this tick.
    pub fn observe_move(&mut self, did_move: bool, heading: (i32, i32), tile: (usize, usize), tick: u64) {
        if did_move {
            self.idle_ticks = 0;
        } else {
            self.idle_ticks += 1;
        }

        if self.visited.insert(tile) {
            self.last_visited_count = self.visited.len();
            self.last_new_tile_tick = tick;
        }

        match self.prev_heading {
            Some(prev) if prev != heading => {
                self.ticks_since_direction_change = 0;
            }
            Some(_) => self.ticks_since_direction_change += 1,
            None => self.ticks_since_direction_change += 1,
        }
        self.prev_heading = Some(heading);

        match self.stuck_area_center {
            Some((cr, cc)) => {
                let (r, c) = tile;
                if (r as isize - cr as isize).abs() <= 1 && (c as isize - cc as isize).abs() <= 1 {
                    self.stuck_area_ticks += 1;
                } else {
                    self.stuck_area_center = Some(tile);
                    self.stuck_area_ticks = 0;
                }
            }
            None => self.stuck_area_center = Some(tile),
        }
    }

    /// clears the per-tick blocked-move flag; must run after reward
    /// application so it is never observable on the next tick
    /// (`spec.md` §9 Open Question c).
    pub fn clear_blocked_move(&mut self) {
        self.blocked_move = false;
    }

    pub fn direction_changed_within_cooldown(&self, cooldown_ticks: u64) -> bool {
        self.ticks_since_direction_change < cooldown_ticks
    }

    pub fn explored_fraction(&self, accessible_tile_count: usize) -> f32 {
        if accessible_tile_count == 0 {
            return 1.0;
        }
        self.visited.len() as f32 / accessible_tile_count as f32
    }

    pub fn ticks_since_new_tile(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.last_new_tile_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_ticks_reset_on_movement() {
        let mut rt = AiRuntime::new((0, 0), 0);
        rt.observe_move(false, (0, -1), (0, 0), 1);
        rt.observe_move(false, (0, -1), (0, 0), 2);
        assert_eq!(rt.idle_ticks, 2);
        rt.observe_move(true, (0, -1), (0, 1), 3);
        assert_eq!(rt.idle_ticks, 0);
    }

    #[test]
    fn visiting_new_tile_updates_last_new_tile_tick() {
        let mut rt = AiRuntime::new((0, 0), 0);
        rt.observe_move(true, (0, -1), (1, 0), 5);
        assert_eq!(rt.last_new_tile_tick, 5);
        rt.observe_move(true, (0, -1), (1, 0), 6);
        assert_eq!(rt.last_new_tile_tick, 5);
    }

    #[test]
    fn direction_change_resets_cooldown_counter() {
        let mut rt = AiRuntime::new((0, 0), 0);
        rt.observe_move(true, (0, -1), (1, 0), 1);
        rt.observe_move(true, (0, -1), (2, 0), 2);
        rt.observe_move(true, (0, -1), (3, 0), 3);
        rt.observe_move(true, (0, -1), (4, 0), 4);
        assert!(!rt.direction_changed_within_cooldown(3));
        rt.observe_move(true, (1, 0), (4, 1), 5);
        assert!(rt.direction_changed_within_cooldown(3));
    }
}
