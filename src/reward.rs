//! Reward weight table and per-tick reward accumulation
//! (`spec.md` §4.1 step 9, defaults from `SPEC_FULL.md` §4.1).

use crate::bullet::PredictedResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardWeights {
    pub hit_player: f32,
    pub got_hit: f32,
    pub destroy_hq: f32,
    pub death: f32,
    pub player_aim: f32,
    pub hq_aim: f32,
    pub map_tile_touched: f32,
    pub explore_stall_penalty: f32,
    pub idle_penalty: f32,
    pub direction_change_penalty: f32,
    pub non_destructive_shot_penalty: f32,
    pub destructive_shot: f32,
    pub collision_penalty: f32,
    pub hit_ally: f32,
    pub stuck_area_penalty: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            hit_player: 2.0,
            got_hit: -2.0,
            destroy_hq: 5.0,
            death: -5.0,
            player_aim: 0.01,
            hq_aim: 0.01,
            map_tile_touched: 0.02,
            explore_stall_penalty: -0.001,
            idle_penalty: -0.05,
            direction_change_penalty: -0.05,
            non_destructive_shot_penalty: -0.03,
            destructive_shot: 0.5,
            collision_penalty: -0.05,
            hit_ally: -1.0,
            stuck_area_penalty: -0.02,
        }
    }
}

/// A single reward reason credited to an AI tank this tick. Mirrors the
/// original's `reasons` set carried on the transition packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RewardReason {
    HitPlayer,
    GotHit,
    DestroyHq,
    Death,
    PlayerAim,
    HqAim,
    MapTileTouched,
    ExploreStallPenalty,
    IdlePenalty,
    DirectionChangePenalty,
    NonDestructiveShotPenalty,
    DestructiveShot,
    CollisionPenalty,
    HitAlly,
    StuckAreaPenalty,
}

impl RewardWeights {
    pub fn value_for(&self, reason: RewardReason) -> f32 {
        match reason {
            RewardReason::HitPlayer => self.hit_player,
            RewardReason::GotHit => self.got_hit,
            RewardReason::DestroyHq => self.destroy_hq,
            RewardReason::Death => self.death,
            RewardReason::PlayerAim => self.player_aim,
            RewardReason::HqAim => self.hq_aim,
            RewardReason::MapTileTouched => self.map_tile_touched,
            RewardReason::ExploreStallPenalty => self.explore_stall_penalty,
            RewardReason::IdlePenalty => self.idle_penalty,
            RewardReason::DirectionChangePenalty => self.direction_change_penalty,
            RewardReason::NonDestructiveShotPenalty => self.non_destructive_shot_penalty,
            RewardReason::DestructiveShot => self.destructive_shot,
            RewardReason::CollisionPenalty => self.collision_penalty,
            RewardReason::HitAlly => self.hit_ally,
            RewardReason::StuckAreaPenalty => self.stuck_area_penalty,
        }
    }
}

/// Accumulates reward across ticks between transition flushes
/// (`spec.md` §4.1 step 12).
#[derive(Debug, Clone, Default)]
pub struct RewardAccumulator {
    total: f32,
    reasons: HashMap<RewardReason, f32>,
}

impl RewardAccumulator {
    pub fn credit(&mut self, weights: &RewardWeights, reason: RewardReason) {
        let value = weights.value_for(reason);
        self.total += value;
        *self.reasons.entry(reason).or_insert(0.0) += value;
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn reasons(&self) -> &HashMap<RewardReason, f32> {
        &self.reasons
    }

    pub fn take(&mut self) -> (f32, HashMap<RewardReason, f32>) {
        let total = self.total;
        let reasons = std::mem::take(&mut self.reasons);
        self.total = 0.0;
        (total, reasons)
    }
}

/// Classifies a bullet's predicted outcome into the reward reason(s) it pays
/// the shooter, per `spec.md` §4.1 step 9.
pub fn reasons_for_predicted_shot(predicted: PredictedResult) -> Vec<RewardReason> {
    match predicted {
        PredictedResult::Player => vec![RewardReason::HitPlayer],
        PredictedResult::Ai { .. } => vec![RewardReason::HitAlly],
        PredictedResult::Hq => vec![RewardReason::DestroyHq],
        PredictedResult::TileDestructible => vec![RewardReason::DestructiveShot],
        PredictedResult::TileNonDestructible => vec![RewardReason::NonDestructiveShotPenalty],
        PredictedResult::None => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_sums_repeated_idle_penalty_over_transition_window() {
        let weights = RewardWeights::default();
        let mut acc = RewardAccumulator::default();
        for _ in 0..3 {
            acc.credit(&weights, RewardReason::IdlePenalty);
        }
        let (total, reasons) = acc.take();
        assert!((total - 3.0 * weights.idle_penalty).abs() < 1e-6);
        assert_eq!(reasons.len(), 1);
        assert!((reasons[&RewardReason::IdlePenalty] - 3.0 * weights.idle_penalty).abs() < 1e-6);
    }

    #[test]
    fn take_resets_accumulator() {
        let weights = RewardWeights::default();
        let mut acc = RewardAccumulator::default();
        acc.credit(&weights, RewardReason::HitPlayer);
        acc.take();
        assert_eq!(acc.total(), 0.0);
        assert!(acc.reasons().is_empty());
    }

    #[test]
    fn predicted_hq_shot_pays_destroy_hq_reason() {
        assert_eq!(reasons_for_predicted_shot(PredictedResult::Hq), vec![RewardReason::DestroyHq]);
    }
}
