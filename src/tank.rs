//! Tank entities, movement, and the label-keyed definition table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role a tank plays within a session. Drives spawn caps, reward targeting,
/// and the wire label suffix convention (`_pl` / `_en`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    Ai,
}

/// One axis-aligned unit vector; exactly one of `x`/`y` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Heading {
    pub dx: i32,
    pub dy: i32,
}

impl Heading {
    pub const UP: Heading = Heading { dx: 0, dy: -1 };
    pub const DOWN: Heading = Heading { dx: 0, dy: 1 };
    pub const LEFT: Heading = Heading { dx: -1, dy: 0 };
    pub const RIGHT: Heading = Heading { dx: 1, dy: 0 };
}

/// An axis-aligned bounding box offset from a tile's 32x32 top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellColor {
    Red,
    Green,
    Blue,
}

/// Static, label-keyed tank stats loaded from the tank-definition table
/// (`spec.md` §6). Labels ending `_en` are AI; labels ending `_pl` are player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TankDef {
    pub tank_label: String,
    pub texture: String,
    pub speed: i32,
    pub cooldown: u32,
    pub tank_hit_point: i32,
    pub bound_min: Offset,
    pub bound_max: Offset,
    pub shell_size: u8,
    pub shell_speed: i32,
    pub shell_color: ShellColor,
}

impl TankDef {
    pub fn is_ai(&self) -> bool {
        self.tank_label.ends_with("_en")
    }

    pub fn is_player(&self) -> bool {
        self.tank_label.ends_with("_pl")
    }
}

pub type TankDefTable = HashMap<String, TankDef>;

/// A live tank instance. Ids are full UUIDs internally; the wire layer
/// compresses them through the session's id-shortening table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    pub id: String,
    pub label: String,
    pub role: Role,
    pub x: i32,
    pub y: i32,
    pub heading: Heading,
    pub speed: i32,
    pub shell_size: u8,
    pub shell_speed: i32,
    pub shell_color: ShellColor,
    pub cooldown: u32,
    pub shoot_cooldown: u32,
    pub health: i32,
    pub max_health: i32,
    pub respawns_used: u32,
    /// set by the tick engine's movement step; consumed (and cleared) during
    /// this tick's reward application, never observable on the next tick.
    pub blocked_move: bool,
}

impl Tank {
    pub fn new(id: String, def: &TankDef, role: Role, x: i32, y: i32, heading: Heading) -> Self {
        Self {
            id,
            label: def.tank_label.clone(),
            role,
            x,
            y,
            heading,
            speed: def.speed,
            shell_size: def.shell_size,
            shell_speed: def.shell_speed,
            shell_color: def.shell_color,
            cooldown: def.cooldown,
            shoot_cooldown: 0,
            health: def.tank_hit_point,
            max_health: def.tank_hit_point,
            respawns_used: 0,
            blocked_move: false,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Axis-aligned bound rect in world pixels, given the label's offsets.
    pub fn bound_rect(&self, def: &TankDef) -> Rect {
        Rect {
            min_x: self.x + def.bound_min.x,
            min_y: self.y + def.bound_min.y,
            max_x: self.x + def.bound_max.x,
            max_y: self.y + def.bound_max.y,
        }
    }

    pub fn bound_center(&self, def: &TankDef) -> (i32, i32) {
        let r = self.bound_rect(def);
        ((r.min_x + r.max_x) / 2, (r.min_y + r.max_y) / 2)
    }

    /// Re-centers the tank at a respawn point with full health and a fixed
    /// default heading (facing up), per the original implementation.
    pub fn respawn_at(&mut self, def: &TankDef, x: i32, y: i32) {
        self.x = x;
        self.y = y;
        self.heading = Heading::UP;
        self.health = def.tank_hit_point;
        self.shoot_cooldown = 0;
        self.blocked_move = false;
        self.respawns_used += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    pub fn intersects(&self, other: &Rect) -> bool {
        self.min_x < other.max_x && self.max_x > other.min_x && self.min_y < other.max_y && self.max_y > other.min_y
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.min_x && x < self.max_x && y >= self.min_y && y < self.max_y
    }

    pub fn intersects_circle(&self, cx: i32, cy: i32, radius: i32) -> bool {
        let nearest_x = cx.clamp(self.min_x, self.max_x);
        let nearest_y = cy.clamp(self.min_y, self.max_y);
        let dx = cx - nearest_x;
        let dy = cy - nearest_y;
        dx * dx + dy * dy <= radius * radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def() -> TankDef {
        TankDef {
            tank_label: "heavy_en".into(),
            texture: "t".into(),
            speed: 2,
            cooldown: 10,
            tank_hit_point: 3,
            bound_min: Offset { x: 4, y: 4 },
            bound_max: Offset { x: 28, y: 28 },
            shell_size: 1,
            shell_speed: 6,
            shell_color: ShellColor::Red,
        }
    }

    #[test]
    fn label_suffix_determines_role() {
        let d = def();
        assert!(d.is_ai());
        assert!(!d.is_player());
    }

    #[test]
    fn respawn_resets_health_and_heading() {
        let d = def();
        let mut t = Tank::new("a".into(), &d, Role::Ai, 0, 0, Heading::DOWN);
        t.health = 0;
        t.respawn_at(&d, 64, 64);
        assert_eq!(t.health, d.tank_hit_point);
        assert_eq!(t.heading, Heading::UP);
        assert_eq!(t.respawns_used, 1);
    }

    #[test]
    fn rect_circle_intersection() {
        let r = Rect { min_x: 0, min_y: 0, max_x: 10, max_y: 10 };
        assert!(r.intersects_circle(15, 5, 6));
        assert!(!r.intersects_circle(20, 5, 2));
    }
}
