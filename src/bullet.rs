//! Bullet lifecycle: fire-time predicted outcome, integer DDA stepping,
//! and collision resolution against tiles and tanks.

use crate::map::{MapGrid, Tile};
use crate::tank::{Heading, Rect, Role, Tank, TankDefTable};
use serde::{Deserialize, Serialize};

/// Outcome tag computed at fire time along the bullet's ray, used for reward
/// shaping without waiting for the bullet to actually land (`spec.md` §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictedResult {
    None,
    Player,
    Ai { target_id: String },
    Hq,
    TileDestructible,
    TileNonDestructible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub id: String,
    pub owner_id: String,
    pub x: i32,
    pub y: i32,
    pub heading: Heading,
    pub speed: i32,
    pub radius: i32,
    pub predicted: PredictedResult,
    /// tick the bullet was created on; a bullet never collides with its
    /// owner during the tick it was fired.
    pub spawn_tick: u64,
}

/// What happened at the end of a single tick's worth of bullet stepping.
#[derive(Debug, Clone)]
pub enum BulletOutcome {
    TileDestroyed { row: usize, col: usize, hq: bool },
    TileBlocked,
    TankHit { tank_id: String, tank_destroyed: bool },
    OutOfBounds,
    None,
}

impl Bullet {
    /// Advances the bullet by `speed` pixels along `heading`, substep by
    /// substep (`spec.md` §4.5), stopping at the first hit. Tile test
    /// precedes tank test at the same pixel. Returns `Some` once consumed.
    pub fn step(
        &mut self,
        map: &mut MapGrid,
        tanks: &mut [Tank],
        defs: &TankDefTable,
        current_tick: u64,
    ) -> Option<BulletOutcome> {
        let total_dx = self.heading.dx * self.speed;
        let total_dy = self.heading.dy * self.speed;
        let steps = total_dx.abs().max(total_dy.abs()).max(1);
        let step_dx = if steps != 0 { total_dx / steps } else { 0 };
        let step_dy = if steps != 0 { total_dy / steps } else { 0 };

        for _ in 0..steps {
            self.x += step_dx;
            self.y += step_dy;

            if self.x < 0 || self.y < 0 || self.x > map.map_size || self.y > map.map_size {
                return Some(BulletOutcome::OutOfBounds);
            }

            let (row, col) = map.px_to_tile(self.x, self.y);
            if !map.in_bounds(row, col) {
                return Some(BulletOutcome::OutOfBounds);
            }
            let (row, col) = (row as usize, col as usize);
            let tile = map.get(row, col).unwrap_or(Tile::Soil);
            let props = tile.properties();
            if props.destructible {
                let hq = tile.is_hq();
                map.set(row, col, tile.destroyed_into());
                return Some(BulletOutcome::TileDestroyed { row, col, hq });
            }
            if props.blocks_bullet {
                return Some(BulletOutcome::TileBlocked);
            }

            for tank in tanks.iter_mut() {
                if tank.id == self.owner_id && self.spawn_tick == current_tick {
                    continue;
                }
                if !tank.is_alive() {
                    continue;
                }
                let Some(def) = defs.get(&tank.label) else { continue };
                let rect = tank.bound_rect(def);
                if rect.intersects_circle(self.x, self.y, self.radius) {
                    tank.health -= 1;
                    let destroyed = tank.health <= 0;
                    return Some(BulletOutcome::TankHit { tank_id: tank.id.clone(), tank_destroyed: destroyed });
                }
            }
        }
        None
    }
}

/// Result of walking an axis-aligned ray through the tile grid.
#[derive(Debug, Clone, Copy)]
pub struct LosResult {
    pub end_x: i32,
    pub end_y: i32,
    pub blocked_by: Option<(usize, usize)>,
}

/// Casts an axis-aligned ray from `(x,y)` along `heading` through the tile
/// grid, stopping at the first blocks-bullet tile (`spec.md` glossary: LOS).
pub fn cast_los(map: &MapGrid, x: i32, y: i32, heading: Heading, max_pixels: i32) -> LosResult {
    let mut cx = x;
    let mut cy = y;
    let mut traveled = 0;
    while traveled < max_pixels {
        let nx = cx + heading.dx;
        let ny = cy + heading.dy;
        if nx < 0 || ny < 0 || nx > map.map_size || ny > map.map_size {
            return LosResult { end_x: cx, end_y: cy, blocked_by: None };
        }
        let (row, col) = map.px_to_tile(nx, ny);
        if !map.in_bounds(row, col) {
            return LosResult { end_x: cx, end_y: cy, blocked_by: None };
        }
        let (row, col) = (row as usize, col as usize);
        if map.get(row, col).map(|t| t.properties().blocks_bullet).unwrap_or(true) {
            return LosResult { end_x: cx, end_y: cy, blocked_by: Some((row, col)) };
        }
        cx = nx;
        cy = ny;
        traveled += 1;
    }
    LosResult { end_x: cx, end_y: cy, blocked_by: None }
}

/// `true` if a straight ray from `(x,y)` along `heading` reaches `target`
/// before hitting a non-destructible blocker (`spec.md` §4.1 step 9).
pub fn has_line_of_sight(map: &MapGrid, x: i32, y: i32, heading: Heading, target: &Rect, max_pixels: i32) -> bool {
    let los = cast_los(map, x, y, heading, max_pixels);
    target.contains_point(los.end_x, los.end_y)
}

/// Computes the predicted outcome of a bullet fired from `shooter` toward
/// `heading`, used at fire time before the bullet physically travels.
pub fn predict_outcome(
    map: &MapGrid,
    shooter: &Tank,
    heading: Heading,
    tanks: &[Tank],
    defs: &TankDefTable,
    max_pixels: i32,
) -> PredictedResult {
    let Some(shooter_def) = defs.get(&shooter.label) else { return PredictedResult::None };
    let (sx, sy) = shooter.bound_center(shooter_def);
    let los = cast_los(map, sx, sy, heading, max_pixels);

    if let Some((hq_row, hq_col)) = map.hq() {
        let (cx, cy) = map.tile_center_px(hq_row, hq_col);
        let half = map.tile_size / 2;
        let rect = Rect { min_x: cx - half, min_y: cy - half, max_x: cx + half, max_y: cy + half };
        if rect.contains_point(los.end_x, los.end_y) {
            return PredictedResult::Hq;
        }
    }

    for tank in tanks.iter() {
        if tank.id == shooter.id || !tank.is_alive() {
            continue;
        }
        let Some(def) = defs.get(&tank.label) else { continue };
        let rect = tank.bound_rect(def);
        if rect.contains_point(los.end_x, los.end_y) {
            return match tank.role {
                Role::Player => PredictedResult::Player,
                Role::Ai => PredictedResult::Ai { target_id: tank.id.clone() },
            };
        }
    }

    if let Some((row, col)) = los.blocked_by {
        let tile = map.get(row, col).unwrap_or(Tile::Soil);
        if tile.properties().destructible {
            return PredictedResult::TileDestructible;
        }
        if tile.properties().blocks_bullet {
            return PredictedResult::TileNonDestructible;
        }
    }
    PredictedResult::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFile;
    use crate::tank::{Offset, ShellColor};
    use std::collections::HashMap;

    fn open_map() -> MapGrid {
        MapGrid::from_file(
            "t".into(),
            MapFile { version: 1, map_size: 96, tile_size: 32, tiles: vec![vec![0; 3]; 3] },
        )
        .unwrap()
    }

    fn defs() -> TankDefTable {
        let mut m = HashMap::new();
        m.insert(
            "heavy_en".to_string(),
            crate::tank::TankDef {
                tank_label: "heavy_en".into(),
                texture: "t".into(),
                speed: 2,
                cooldown: 10,
                tank_hit_point: 1,
                bound_min: Offset { x: 4, y: 4 },
                bound_max: Offset { x: 28, y: 28 },
                shell_size: 1,
                shell_speed: 6,
                shell_color: ShellColor::Red,
            },
        );
        m
    }

    #[test]
    fn bullet_destroys_brick_and_stops() {
        let mut map = MapGrid::from_file(
            "t".into(),
            MapFile { version: 1, map_size: 96, tile_size: 32, tiles: vec![vec![0, 0, 2], vec![0, 0, 0], vec![0, 0, 0]] },
        )
        .unwrap();
        let mut bullet = Bullet {
            id: "b".into(),
            owner_id: "shooter".into(),
            x: 16,
            y: 16,
            heading: Heading::RIGHT,
            speed: 60,
            radius: 4,
            predicted: PredictedResult::None,
            spawn_tick: 0,
        };
        let mut tanks = vec![];
        let outcome = bullet.step(&mut map, &mut tanks, &defs(), 1);
        assert!(matches!(outcome, Some(BulletOutcome::TileDestroyed { hq: false, .. })));
        assert_eq!(map.get(0, 2), Some(Tile::Soil));
    }

    #[test]
    fn bullet_does_not_hit_owner_on_spawn_tick() {
        let map_grid = open_map();
        let shooter = Tank::new("shooter".into(), defs().get("heavy_en").unwrap(), Role::Ai, 16, 16, Heading::RIGHT);
        let mut tanks = vec![shooter];
        let mut bullet = Bullet {
            id: "b".into(),
            owner_id: "shooter".into(),
            x: 16,
            y: 16,
            heading: Heading::RIGHT,
            speed: 4,
            radius: 4,
            predicted: PredictedResult::None,
            spawn_tick: 5,
        };
        let mut map = map_grid;
        let outcome = bullet.step(&mut map, &mut tanks, &defs(), 5);
        assert!(!matches!(outcome, Some(BulletOutcome::TankHit { .. })));
    }

    #[test]
    fn predicted_outcome_stops_at_steel_wall() {
        let map = MapGrid::from_file(
            "t".into(),
            MapFile { version: 1, map_size: 96, tile_size: 32, tiles: vec![vec![0, 0, 4], vec![0, 0, 0], vec![0, 0, 0]] },
        )
        .unwrap();
        let shooter = Tank::new("shooter".into(), defs().get("heavy_en").unwrap(), Role::Ai, 16, 16, Heading::RIGHT);
        let result = predict_outcome(&map, &shooter, Heading::RIGHT, &[], &defs(), 200);
        assert_eq!(result, PredictedResult::TileNonDestructible);
    }

    #[test]
    fn predicted_outcome_is_none_on_fully_open_map() {
        let map = open_map();
        let shooter = Tank::new("shooter".into(), defs().get("heavy_en").unwrap(), Role::Ai, 48, 48, Heading::RIGHT);
        let result = predict_outcome(&map, &shooter, Heading::RIGHT, &[], &defs(), 200);
        assert_eq!(result, PredictedResult::None);
    }
}
