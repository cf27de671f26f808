//! Tile grid loading, mutation, and map-key derivation.

pub mod grid;
pub mod tile;

pub use grid::{map_key_from_name, MapFile, MapGrid};
pub use tile::{Tile, TileProperties};
