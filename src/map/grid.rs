use super::tile::Tile;
use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// On-disk map file format: `{version, mapSize, tileSize, tiles}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapFile {
    pub version: u32,
    #[serde(rename = "mapSize")]
    pub map_size: i32,
    #[serde(rename = "tileSize")]
    pub tile_size: i32,
    pub tiles: Vec<Vec<u8>>,
}

/// A loaded, validated square tile grid plus the spawn points and HQ derived
/// from scanning it once at load time.
#[derive(Debug, Clone)]
pub struct MapGrid {
    pub name: String,
    pub map_size: i32,
    pub tile_size: i32,
    pub tile_count: usize,
    tiles: Vec<Tile>,
    player_spawns: Vec<(usize, usize)>,
    ai_spawns: Vec<(usize, usize)>,
    hq: Option<(usize, usize)>,
    accessible_tile_count: usize,
}

impl MapGrid {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::InvalidMap(name.clone(), e.to_string()))?;
        let file: MapFile = serde_json::from_str(&text)
            .map_err(|e| SessionError::InvalidMap(name.clone(), e.to_string()))?;
        Self::from_file(name, file)
    }

    pub fn from_file(name: String, file: MapFile) -> Result<Self, SessionError> {
        if file.tile_size <= 0 || file.map_size <= 0 || file.map_size % file.tile_size != 0 {
            return Err(SessionError::InvalidMap(
                name,
                format!("mapSize {} not divisible by tileSize {}", file.map_size, file.tile_size),
            ));
        }
        let tile_count = (file.map_size / file.tile_size) as usize;
        if file.tiles.len() != tile_count || file.tiles.iter().any(|row| row.len() != tile_count) {
            return Err(SessionError::InvalidMap(name, "tiles grid dimension mismatch".to_string()));
        }
        let mut tiles = Vec::with_capacity(tile_count * tile_count);
        let mut player_spawns = Vec::new();
        let mut ai_spawns = Vec::new();
        let mut hq = None;
        let mut accessible_tile_count = 0usize;
        for (row, cols) in file.tiles.iter().enumerate() {
            for (col, &id) in cols.iter().enumerate() {
                let tile = Tile::try_from(id)
                    .map_err(|bad| SessionError::InvalidMap(name.clone(), format!("unknown tile id {bad}")))?;
                if tile.properties().accessible {
                    accessible_tile_count += 1;
                }
                match tile {
                    Tile::PlayerSpawn => player_spawns.push((row, col)),
                    Tile::AiSpawn => ai_spawns.push((row, col)),
                    Tile::PlayerHq => hq = Some((row, col)),
                    _ => {}
                }
                tiles.push(tile);
            }
        }
        Ok(Self {
            name,
            map_size: file.map_size,
            tile_size: file.tile_size,
            tile_count,
            tiles,
            player_spawns,
            ai_spawns,
            hq,
            accessible_tile_count,
        })
    }

    #[inline]
    fn index(&self, row: usize, col: usize) -> usize {
        row * self.tile_count + col
    }

    pub fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.tile_count && (col as usize) < self.tile_count
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Tile> {
        if row < self.tile_count && col < self.tile_count {
            Some(self.tiles[self.index(row, col)])
        } else {
            None
        }
    }

    /// Replaces a tile, returning `true` if the tile actually changed.
    pub fn set(&mut self, row: usize, col: usize, tile: Tile) -> bool {
        let idx = self.index(row, col);
        if self.tiles[idx] == tile {
            return false;
        }
        self.tiles[idx] = tile;
        true
    }

    pub fn player_spawns(&self) -> &[(usize, usize)] {
        &self.player_spawns
    }

    pub fn ai_spawns(&self) -> &[(usize, usize)] {
        &self.ai_spawns
    }

    pub fn hq(&self) -> Option<(usize, usize)> {
        self.hq
    }

    pub fn accessible_tile_count(&self) -> usize {
        self.accessible_tile_count
    }

    pub fn tile_center_px(&self, row: usize, col: usize) -> (i32, i32) {
        let half = self.tile_size / 2;
        ((col as i32) * self.tile_size + half, (row as i32) * self.tile_size + half)
    }

    pub fn px_to_tile(&self, x: i32, y: i32) -> (isize, isize) {
        (y.div_euclid(self.tile_size) as isize, x.div_euclid(self.tile_size) as isize)
    }

    pub fn to_wire(&self) -> MapFile {
        let mut tiles = Vec::with_capacity(self.tile_count);
        for row in 0..self.tile_count {
            let mut cols = Vec::with_capacity(self.tile_count);
            for col in 0..self.tile_count {
                cols.push(u8::from(self.tiles[self.index(row, col)]));
            }
            tiles.push(cols);
        }
        MapFile { version: 1, map_size: self.map_size, tile_size: self.tile_size, tiles }
    }
}

/// Normalizes a map file name into the partition key used by the Model
/// Store (`spec.md` glossary: "Map-key").
pub fn map_key_from_name(map_name: &str) -> String {
    map_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(map_name)
        .trim_end_matches(".json")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MapFile {
        MapFile {
            version: 1,
            map_size: 96,
            tile_size: 32,
            tiles: vec![vec![7, 0, 0], vec![0, 5, 0], vec![0, 0, 6]],
        }
    }

    #[test]
    fn loads_spawns_and_hq_from_scan() {
        let grid = MapGrid::from_file("t".into(), sample()).unwrap();
        assert_eq!(grid.hq(), Some((0, 0)));
        assert_eq!(grid.ai_spawns(), &[(1, 1)]);
        assert_eq!(grid.player_spawns(), &[(2, 2)]);
    }

    #[test]
    fn rejects_non_divisible_map_size() {
        let mut f = sample();
        f.map_size = 100;
        assert!(MapGrid::from_file("t".into(), f).is_err());
    }

    #[test]
    fn destroying_brick_is_monotonic_to_soil() {
        let mut grid = MapGrid::from_file("t".into(), sample()).unwrap();
        assert!(grid.set(0, 0, Tile::Soil));
        assert_eq!(grid.get(0, 0), Some(Tile::Soil));
        assert!(!grid.set(0, 0, Tile::Soil));
    }

    #[test]
    fn map_key_normalizes_path_and_extension() {
        assert_eq!(map_key_from_name("maps/Stage03.json"), "stage03");
        assert_eq!(map_key_from_name("Stage03"), "stage03");
    }
}
