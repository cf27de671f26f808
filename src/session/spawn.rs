//! Spawn-point search for AI tanks (`spec.md` §4.1 step 2) and the
//! player/AI spawn-count invariants (`spec.md` §3, §8).

use crate::map::MapGrid;
use crate::tank::{Rect, Tank, TankDefTable};

/// Searches the 3x3 tile neighborhood around `spawn_tile` for a rect free of
/// blocking tiles and other tanks, falling back to the base spawn tile
/// center if nothing else is free.
pub fn find_free_spawn_rect(
    map: &MapGrid,
    spawn_tile: (usize, usize),
    label: &str,
    defs: &TankDefTable,
    tanks: &[Tank],
) -> Option<(i32, i32)> {
    let def = defs.get(label)?;
    let (base_row, base_col) = spawn_tile;

    let mut candidates = Vec::new();
    for dr in -1i32..=1 {
        for dc in -1i32..=1 {
            let row = base_row as i32 + dr;
            let col = base_col as i32 + dc;
            if row < 0 || col < 0 {
                continue;
            }
            candidates.push((row as usize, col as usize));
        }
    }
    candidates.sort_by_key(|(r, c)| {
        let dr = *r as i32 - base_row as i32;
        let dc = *c as i32 - base_col as i32;
        dr * dr + dc * dc
    });

    for (row, col) in candidates {
        if !map.in_bounds(row as isize, col as isize) {
            continue;
        }
        let tile = match map.get(row, col) {
            Some(t) => t,
            None => continue,
        };
        if !tile.properties().accessible {
            continue;
        }
        let (cx, cy) = map.tile_center_px(row, col);
        let candidate_rect = Rect {
            min_x: cx + def.bound_min.x,
            min_y: cy + def.bound_min.y,
            max_x: cx + def.bound_max.x,
            max_y: cy + def.bound_max.y,
        };
        let occupied = tanks.iter().any(|t| {
            defs.get(&t.label)
                .map(|other_def| t.bound_rect(other_def).intersects(&candidate_rect))
                .unwrap_or(false)
        });
        if !occupied {
            return Some((cx, cy));
        }
    }

    let (cx, cy) = map.tile_center_px(base_row, base_col);
    Some((cx, cy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapFile;
    use crate::tank::{Offset, Role, ShellColor, TankDef};
    use std::collections::HashMap;

    fn defs() -> TankDefTable {
        let mut m = HashMap::new();
        m.insert(
            "normal_en".to_string(),
            TankDef {
                tank_label: "normal_en".into(),
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

    fn open_map() -> MapGrid {
        MapGrid::from_file("t".into(), MapFile { version: 1, map_size: 160, tile_size: 32, tiles: vec![vec![5; 5]; 5] })
            .unwrap()
    }

    #[test]
    fn returns_base_spawn_when_clear() {
        let map = open_map();
        let spot = find_free_spawn_rect(&map, (2, 2), "normal_en", &defs(), &[]).unwrap();
        assert_eq!(spot, map.tile_center_px(2, 2));
    }

    #[test]
    fn picks_alternate_tile_when_base_occupied() {
        let map = open_map();
        let def = defs();
        let occupying = Tank::new("occupant".into(), def.get("normal_en").unwrap(), Role::Ai, map.tile_center_px(2, 2).0, map.tile_center_px(2, 2).1, crate::tank::Heading::UP);
        let spot = find_free_spawn_rect(&map, (2, 2), "normal_en", &def, &[occupying]).unwrap();
        assert_ne!(spot, map.tile_center_px(2, 2));
    }
}
