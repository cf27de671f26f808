//! `game-backend`: the GBE tick engine and connection layer entry point
//! (`spec.md` §6 "CLI surface").

use anyhow::Context;
use std::collections::HashMap;
use tank_arena_core::config::GbeConfig;
use tank_arena_core::gbe::Server;
use tank_arena_core::map::{map_key_from_name, MapGrid};
use tank_arena_core::registry::Assets;
use tank_arena_core::tank::TankDef;

fn load_assets() -> anyhow::Result<Assets> {
    let maps_dir = std::env::var("MAPS_DIR").unwrap_or_else(|_| "maps".to_string());
    let tank_defs_path = std::env::var("TANK_DEFS_PATH").unwrap_or_else(|_| "tank_defs.json".to_string());

    let mut maps = HashMap::new();
    match std::fs::read_dir(&maps_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    let grid = MapGrid::load(&path).with_context(|| format!("loading map {}", path.display()))?;
                    maps.insert(map_key_from_name(&grid.name), grid);
                }
            }
        }
        Err(e) => log::warn!("could not read maps directory {maps_dir}: {e}"),
    }

    let tank_defs_text = std::fs::read_to_string(&tank_defs_path)
        .with_context(|| format!("reading tank definitions from {tank_defs_path}"))?;
    let defs: Vec<TankDef> = serde_json::from_str(&tank_defs_text)
        .with_context(|| format!("parsing tank definitions from {tank_defs_path}"))?;
    let tank_defs = defs.into_iter().map(|d| (d.tank_label.clone(), d)).collect();

    Ok(Assets { maps, tank_defs })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tank_arena_core::init_logging("game-backend");
    let config = GbeConfig::from_env().context("loading game-backend configuration")?;
    let assets = load_assets().context("loading maps and tank definitions")?;
    Server::run(assets, config).await.context("game-backend server exited")
}
