use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};

/// A single tile id from the fixed tile table in the spec's data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Tile {
    Soil = 0,
    Water = 1,
    Brick = 2,
    Grass = 3,
    Steel = 4,
    AiSpawn = 5,
    PlayerSpawn = 6,
    PlayerHq = 7,
}

/// Static accessibility/destructibility/bullet-blocking facts for a tile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileProperties {
    pub accessible: bool,
    pub destructible: bool,
    pub blocks_bullet: bool,
}

impl Tile {
    pub fn properties(self) -> TileProperties {
        match self {
            Tile::Soil => TileProperties { accessible: true, destructible: false, blocks_bullet: false },
            Tile::Water => TileProperties { accessible: false, destructible: false, blocks_bullet: false },
            Tile::Brick => TileProperties { accessible: false, destructible: true, blocks_bullet: false },
            Tile::Grass => TileProperties { accessible: true, destructible: false, blocks_bullet: false },
            Tile::Steel => TileProperties { accessible: false, destructible: false, blocks_bullet: true },
            Tile::AiSpawn => TileProperties { accessible: true, destructible: false, blocks_bullet: false },
            Tile::PlayerSpawn => TileProperties { accessible: true, destructible: false, blocks_bullet: false },
            Tile::PlayerHq => TileProperties { accessible: false, destructible: true, blocks_bullet: false },
        }
    }

    pub fn is_hq(self) -> bool {
        matches!(self, Tile::PlayerHq)
    }

    /// the tile a destructible tile becomes once destroyed. Soil never reverts.
    pub fn destroyed_into(self) -> Tile {
        Tile::Soil
    }
}

impl TryFrom<u8> for Tile {
    type Error = u8;
    fn try_from(n: u8) -> std::result::Result<Self, u8> {
        match n {
            0 => Ok(Tile::Soil),
            1 => Ok(Tile::Water),
            2 => Ok(Tile::Brick),
            3 => Ok(Tile::Grass),
            4 => Ok(Tile::Steel),
            5 => Ok(Tile::AiSpawn),
            6 => Ok(Tile::PlayerSpawn),
            7 => Ok(Tile::PlayerHq),
            other => Err(other),
        }
    }
}

impl From<Tile> for u8 {
    fn from(t: Tile) -> u8 {
        t as u8
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let name = match self {
            Tile::Soil => "soil",
            Tile::Water => "water",
            Tile::Brick => "brick",
            Tile::Grass => "grass",
            Tile::Steel => "steel",
            Tile::AiSpawn => "ai-spawn",
            Tile::PlayerSpawn => "player-spawn",
            Tile::PlayerHq => "player-hq",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brick_and_hq_are_destructible_into_soil() {
        assert!(Tile::Brick.properties().destructible);
        assert!(Tile::PlayerHq.properties().destructible);
        assert_eq!(Tile::Brick.destroyed_into(), Tile::Soil);
        assert_eq!(Tile::PlayerHq.destroyed_into(), Tile::Soil);
    }

    #[test]
    fn steel_blocks_bullets_but_is_not_destructible() {
        let p = Tile::Steel.properties();
        assert!(p.blocks_bullet);
        assert!(!p.destructible);
    }

    #[test]
    fn round_trips_through_u8() {
        for id in 0u8..=7 {
            let tile = Tile::try_from(id).unwrap();
            assert_eq!(u8::from(tile), id);
        }
        assert!(Tile::try_from(8).is_err());
    }
}
