//! `model-store`: the allocation service entry point (`spec.md` §6 "CLI
//! surface").

use anyhow::Context;
use tank_arena_core::config::MsConfig;
use tank_arena_core::ms::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tank_arena_core::init_logging("model-store");
    let config = MsConfig::from_env().context("loading model-store configuration")?;
    Server::run(config).await.context("model-store server exited")
}
