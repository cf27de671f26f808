//! Shared core for the tank-arena reinforcement-learning platform.
//!
//! Three binaries link against this library: `game-backend` (the GBE tick
//! engine and connection layer), `ai-backend` (the AIB session manager and
//! persistence worker), and `model-store` (the MS allocation service). All
//! wire types live here so the three processes cannot drift apart.

pub mod ai_runtime;
pub mod bullet;
pub mod config;
pub mod episode;
pub mod error;
pub mod map;
pub mod protocol;
pub mod reward;
pub mod session;
pub mod tank;

#[cfg(feature = "server")]
pub mod aib;
#[cfg(feature = "server")]
pub mod gbe;
#[cfg(feature = "server")]
pub mod ms;
#[cfg(feature = "server")]
pub mod registry;

/// tick cadence, in milliseconds, of the GBE's fixed-rate physics step.
pub const TICK_MS: u64 = 33;

/// upper bound on player respawns before a session ends in defeat.
pub const MAX_PLAYER_RESPAWNS: u32 = 1;

/// number of ticks to hold a finished session alive for stragglers before sweep.
pub fn removal_delay_ticks() -> u64 {
    (5000 + TICK_MS - 1) / TICK_MS
}

/// initializes a combined terminal + file logger for a named process.
///
/// Mirrors the teacher's `robopoker::init()`: a `TermLogger` for operator
/// visibility and a `WriteLogger` per run under `logs/`, both at `Info`
/// unless `RUST_LOG=debug` asks for more.
#[cfg(feature = "server")]
pub fn init_logging(component: &str) {
    use simplelog::{ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger};

    let level = match std::env::var("RUST_LOG").as_deref() {
        Ok("debug") | Ok("trace") => LevelFilter::Debug,
        Ok("warn") => LevelFilter::Warn,
        Ok("error") => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    let config = ConfigBuilder::new()
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .build();
    std::fs::create_dir_all("logs").ok();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Ok(file) = std::fs::File::create(format!("logs/{component}-{now}.log")) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
    }
    let _ = CombinedLogger::init(loggers);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_delay_matches_spec_rounding() {
        assert_eq!(removal_delay_ticks(), 152);
    }
}
