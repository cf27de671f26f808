//! Environment-driven configuration for each of the three binaries.
//!
//! Every tunable named in the spec's CLI surface is read once at process
//! start. Required keys use `anyhow::Context` so a missing value fails fast
//! with the variable name in the message; optional keys fall back to the
//! documented defaults from the original implementation.

use anyhow::Context;
use std::time::Duration;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Game Backend (GBE) process configuration.
#[derive(Debug, Clone)]
pub struct GbeConfig {
    pub bind_addr: String,
    pub max_tick_catch_up: u32,
    pub enemy_spawn_interval_ticks: u64,
    pub max_enemies_alive: usize,
    pub ai_tank_labels: Vec<String>,
    pub rl_idle_ticks: u64,
    pub rl_aim_dot: f32,
    pub rl_dir_change_cooldown: u64,
    pub rl_transition_interval: u64,
    pub rl_stuck_area_ticks: u64,
    pub rl_explore_stall_ticks: u64,
    pub rl_model_base_key: String,
}

impl GbeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = env_parse("GAME_BACKEND_PORT", 5051);
        let default_stall = crate::removal_delay_ticks();
        let labels = std::env::var("AI_TANK_LABELS").unwrap_or_else(|_| "normal_en".to_string());
        Ok(Self {
            bind_addr: std::env::var("GAME_BACKEND_BIND_ADDR").unwrap_or_else(|_| format!("0.0.0.0:{port}")),
            max_tick_catch_up: env_parse("MAX_TICK_CATCH_UP", 3),
            enemy_spawn_interval_ticks: env_parse("ENEMY_SPAWN_INTERVAL_TICKS", 90),
            max_enemies_alive: env_parse("MAX_ENEMIES_ALIVE", 4usize),
            ai_tank_labels: labels.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect(),
            rl_idle_ticks: env_parse("RL_IDLE_TICKS", 20),
            rl_aim_dot: env_parse("RL_AIM_DOT", 0.85),
            rl_dir_change_cooldown: env_parse("RL_DIR_CHANGE_COOLDOWN", 6),
            rl_transition_interval: env_parse("RL_TRANSITE_GEN_INTERVAL", 1).max(1),
            rl_stuck_area_ticks: env_parse("RL_STUCK_AREA_TICKS", default_stall),
            rl_explore_stall_ticks: env_parse("RL_EXPLORE_STALL_TICKS", default_stall),
            rl_model_base_key: std::env::var("RL_MODEL_BASE_KEY").unwrap_or_else(|_| "tank-ai-dqn".to_string()),
        })
    }
}

/// AI Backend (AIB) process configuration.
#[derive(Debug, Clone)]
pub struct AibConfig {
    pub game_backend_url: String,
    pub game_backend_ws_url: String,
    pub model_store_url: String,
    pub poll_interval: Duration,
    pub learning_rate: f32,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    pub epsilon_decay: f32,
    pub model_base_key: String,
    pub save_every_steps: u64,
    pub idle_threshold: u64,
}

impl AibConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let game_backend_url = std::env::var("GAME_BACKEND_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:5051".to_string());
        let game_backend_ws_url = std::env::var("GAME_BACKEND_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:5051/ws".to_string());
        let model_store_url = std::env::var("MODEL_STORE_URL")
            .or_else(|_| std::env::var("RL_DB_URL"))
            .unwrap_or_else(|_| "http://127.0.0.1:5050".to_string());
        Ok(Self {
            game_backend_url,
            game_backend_ws_url,
            model_store_url,
            poll_interval: Duration::from_secs_f64(env_parse("AI_POLL_INTERVAL", 2.0)),
            learning_rate: env_parse("AI_LEARNING_RATE", 0.001),
            gamma: env_parse("AI_GAMMA", 0.95),
            epsilon_start: env_parse("AI_EPSILON_START", 0.2),
            epsilon_min: env_parse("AI_EPSILON_MIN", 0.05),
            epsilon_decay: env_parse("AI_EPSILON_DECAY", 0.9995),
            model_base_key: std::env::var("RL_MODEL_BASE_KEY").unwrap_or_else(|_| "tank-ai-dqn".to_string()),
            save_every_steps: env_parse("AI_SAVE_EVERY_STEPS", 200),
            idle_threshold: env_parse("RL_IDLE_TICKS", 20),
        })
    }
}

/// Model Store (MS) process configuration.
#[derive(Debug, Clone)]
pub struct MsConfig {
    pub db_path: String,
    pub host: String,
    pub port: u16,
}

impl MsConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            db_path: std::env::var("RL_DB_PATH").context("RL_DB_PATH must be set")?,
            host: std::env::var("RL_BACKEND_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_parse("RL_BACKEND_PORT", 5050),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
