//! Game Backend HTTP/WebSocket entry point. Mirrors the teacher's
//! `hosting::Server`: permissive CORS, `web::Data` app-state injection,
//! `actix_ws::handle` for the duplex stream (`spec.md` §6).

use crate::config::GbeConfig;
use crate::gbe::{handlers, socket};
use crate::registry::{Assets, SessionRegistry};
use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub assets: Arc<Assets>,
    pub config: GbeConfig,
}

pub struct Server;

impl Server {
    pub async fn run(assets: Assets, config: GbeConfig) -> std::io::Result<()> {
        let bind_addr = config.bind_addr.clone();
        let state = web::Data::new(AppState {
            registry: Arc::new(SessionRegistry::new()),
            assets: Arc::new(assets),
            config,
        });
        log::info!("starting game-backend on {bind_addr}");
        HttpServer::new(move || {
            App::new()
                .wrap(Logger::new("%r %s %Ts"))
                .wrap(Cors::default().allow_any_origin().allow_any_method().allow_any_header())
                .app_data(state.clone())
                .route("/session", web::post().to(handlers::create_session))
                .route("/session/{id}/join", web::post().to(handlers::join_session))
                .route("/session/{id}/ai-input", web::post().to(handlers::ai_input))
                .route("/sessions", web::get().to(handlers::list_sessions))
                .route("/ws", web::get().to(socket::ws_handler))
                .route("/health", web::get().to(handlers::health))
        })
        .workers(4)
        .bind(bind_addr)?
        .run()
        .await
    }
}
