//! Session-discovery poll loop (`spec.md` §4.3 "Poller"): periodically lists
//! GBE's active sessions and keeps exactly one consumer task running per
//! live session.

use crate::aib::client::{GbeClient, MsClient};
use crate::aib::persistence::PersistenceHandle;
use crate::aib::{consumer, AibAssets};
use crate::config::AibConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Runs forever: polls GBE's session list on `config.poll_interval` and
/// spawns/tears down consumer tasks to match. Never returns under normal
/// operation; a poll failure is logged and retried on the next tick.
pub async fn run(config: Arc<AibConfig>, assets: Arc<AibAssets>, ms: Arc<MsClient>, persistence: PersistenceHandle) {
    let gbe = GbeClient::new(config.game_backend_url.clone());
    let mut active: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::time::sleep(config.poll_interval).await;

        let summaries = match gbe.list_sessions().await {
            Ok(s) => s,
            Err(e) => {
                log::warn!("could not list sessions from game backend: {e}");
                continue;
            }
        };

        active.retain(|session_id, handle| {
            let still_live = summaries.iter().any(|s| &s.session_id == session_id);
            if !still_live {
                log::info!("session {session_id} no longer listed, tearing down its consumer");
                handle.abort();
            }
            still_live
        });

        for summary in summaries {
            if active.contains_key(&summary.session_id) {
                continue;
            }
            let Some(map) = assets.maps.get(&summary.map_key).cloned() else {
                log::warn!("session {} references unknown map key {}", summary.session_id, summary.map_key);
                continue;
            };
            let session_id = summary.session_id.clone();
            let config = config.clone();
            let tank_defs = Arc::clone(&assets.tank_defs);
            let ms = ms.clone();
            let persistence = persistence.clone();
            let map = Arc::new(map);

            let handle = tokio::spawn(async move {
                log::info!("starting consumer for session {session_id}");
                if let Err(e) = consumer::run(summary, config, tank_defs, map, ms, persistence).await {
                    log::warn!("consumer for session {session_id} exited with error: {e}");
                }
            });
            active.insert(session_id, handle);
        }
    }
}
