//! AI Backend (AIB): polls the Game Backend's session list, maintains one
//! training consumer per live session, and persists models to the Model
//! Store (`spec.md` §4.3).

pub mod client;
pub mod consumer;
pub mod feature;
pub mod model;
pub mod persistence;
pub mod poller;

use crate::map::MapGrid;
use crate::tank::TankDefTable;
use std::collections::HashMap;
use std::sync::Arc;

/// Static map/tank-definition assets the AIB needs independently of GBE,
/// since neither the session-list summary nor the wire protocol carries a
/// map's tile grid (`spec.md` §6 "Feature vector" tile window).
pub struct AibAssets {
    pub maps: HashMap<String, MapGrid>,
    pub tank_defs: Arc<TankDefTable>,
}
