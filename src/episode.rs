//! Inference episode accumulator: a rolling window of the 10 most recent
//! closed episodes (`spec.md` §9 "Inference episode accumulator").

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const WINDOW_SIZE: usize = 10;

/// Metrics for one closed episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeLog {
    pub steps: u64,
    pub reward_sum: f32,
    pub hit_count: u32,
    pub won: bool,
    pub time_to_win_ticks: Option<u64>,
}

/// The in-progress accumulator for the current (still-open) episode.
#[derive(Debug, Clone, Default)]
pub struct EpisodeAccumulator {
    pub steps: u64,
    pub reward_sum: f32,
    pub hit_count: u32,
    started_tick: u64,
}

impl EpisodeAccumulator {
    pub fn start(tick: u64) -> Self {
        Self { started_tick: tick, ..Default::default() }
    }

    pub fn observe_step(&mut self, reward: f32, hit: bool) {
        self.steps += 1;
        self.reward_sum += reward;
        if hit {
            self.hit_count += 1;
        }
    }

    /// Closes the episode at `tick`, producing a log entry.
    pub fn close(self, tick: u64, won: bool) -> EpisodeLog {
        EpisodeLog {
            steps: self.steps,
            reward_sum: self.reward_sum,
            hit_count: self.hit_count,
            won,
            time_to_win_ticks: if won { Some(tick.saturating_sub(self.started_tick)) } else { None },
        }
    }
}

/// Rolling window of the last `WINDOW_SIZE` closed episodes, plus the
/// currently-open accumulator.
#[derive(Debug, Clone)]
pub struct EpisodeWindow {
    pub current: EpisodeAccumulator,
    closed: VecDeque<EpisodeLog>,
}

impl EpisodeWindow {
    pub fn new(tick: u64) -> Self {
        Self { current: EpisodeAccumulator::start(tick), closed: VecDeque::with_capacity(WINDOW_SIZE) }
    }

    /// Called when `gameOver` transitions false→true: closes the current
    /// episode and pushes it into the window, evicting the oldest entry.
    pub fn close_episode(&mut self, tick: u64, won: bool) {
        let finished = std::mem::replace(&mut self.current, EpisodeAccumulator::start(tick));
        let log = finished.close(tick, won);
        if self.closed.len() == WINDOW_SIZE {
            self.closed.pop_front();
        }
        self.closed.push_back(log);
    }

    /// Restarts the open accumulator; called on the tick after `gameOver`
    /// returns to false.
    pub fn start_new_episode(&mut self, tick: u64) {
        self.current = EpisodeAccumulator::start(tick);
    }

    pub fn closed(&self) -> &VecDeque<EpisodeLog> {
        &self.closed
    }

    pub fn episodes_seen(&self) -> usize {
        self.closed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_beyond_ten() {
        let mut window = EpisodeWindow::new(0);
        for i in 0..12u64 {
            window.current.observe_step(1.0, false);
            window.close_episode(i + 1, false);
        }
        assert_eq!(window.episodes_seen(), WINDOW_SIZE);
    }

    #[test]
    fn win_records_time_to_win() {
        let mut window = EpisodeWindow::new(10);
        window.close_episode(25, true);
        let last = window.closed().back().unwrap();
        assert_eq!(last.time_to_win_ticks, Some(15));
    }

    #[test]
    fn loss_has_no_time_to_win() {
        let mut window = EpisodeWindow::new(10);
        window.close_episode(25, false);
        let last = window.closed().back().unwrap();
        assert_eq!(last.time_to_win_ticks, None);
    }
}
