//! HTTP surface for the allocation protocol (`spec.md` §4.4). Shares the
//! teacher's `actix-web` + `Logger` + `Cors` hosting idiom with the GBE
//! server (`crate::gbe::server`).

use crate::config::MsConfig;
use crate::error::StoreError;
use crate::ms::store::{map_key_from_record, Store};
use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
}

#[derive(Deserialize)]
struct ListQuery {
    #[serde(rename = "mapKey")]
    map_key: Option<String>,
}

#[derive(Deserialize)]
struct AllocateQuery {
    #[serde(rename = "baseKey", default = "default_base_key")]
    base_key: String,
}

fn default_base_key() -> String {
    "tank-ai-dqn".to_string()
}

#[derive(Deserialize)]
struct ReleaseBody {
    #[serde(rename = "modelKey")]
    model_key: String,
}

#[derive(Deserialize)]
struct ModelUpsertBody {
    #[serde(rename = "modelTopology", default)]
    model_topology: serde_json::Value,
    #[serde(rename = "weightSpecs", default)]
    weight_specs: serde_json::Value,
    #[serde(rename = "weightDataBase64", default)]
    weight_data_base64: String,
    #[serde(rename = "trainingConfig", default)]
    training_config: serde_json::Value,
    #[serde(rename = "userDefinedMetadata", default)]
    user_defined_metadata: serde_json::Value,
}

async fn list_keys(state: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    match state.store.list(query.map_key.as_deref()) {
        Ok(records) => {
            let keys: Vec<_> = records
                .into_iter()
                .map(|r| json!({"modelKey": r.model_key, "mapKey": r.map_key, "updatedAt": r.updated_at}))
                .collect();
            HttpResponse::Ok().json(json!({"models": keys}))
        }
        Err(e) => HttpResponse::InternalServerError().json(json!({"error": e.to_string()})),
    }
}

async fn allocate(state: web::Data<AppState>, path: web::Path<String>, query: web::Query<AllocateQuery>) -> impl Responder {
    let map_key = path.into_inner();
    match state.store.allocate(&map_key, &query.base_key) {
        Ok(result) => HttpResponse::Ok().json(json!({
            "modelKey": result.model_key,
            "isNew": result.is_new,
            "copiedFrom": result.copied_from,
        })),
        Err(e) => HttpResponse::InternalServerError().json(json!({"error": e.to_string()})),
    }
}

async fn release(state: web::Data<AppState>, path: web::Path<String>, body: web::Json<ReleaseBody>) -> impl Responder {
    let map_key = path.into_inner();
    match state.store.release(&map_key, &body.model_key) {
        Ok(()) => HttpResponse::Ok().json(json!({"ok": true})),
        Err(e) => HttpResponse::InternalServerError().json(json!({"error": e.to_string()})),
    }
}

async fn get_model(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let model_key = path.into_inner();
    match state.store.get(&model_key) {
        Ok(Some(record)) => HttpResponse::Ok().json(json!({
            "modelKey": record.model_key,
            "mapKey": record.map_key,
            "modelTopology": record.model_topology,
            "weightSpecs": record.weight_specs,
            "weightDataBase64": record.weight_data_base64,
            "trainingConfig": record.training_config,
            "userDefinedMetadata": record.metadata,
            "updatedAt": record.updated_at,
        })),
        Ok(None) => HttpResponse::NotFound().json(json!({"error": StoreError::NotFound(model_key).to_string()})),
        Err(e) => HttpResponse::InternalServerError().json(json!({"error": e.to_string()})),
    }
}

async fn upsert_model(state: web::Data<AppState>, path: web::Path<String>, body: web::Json<ModelUpsertBody>) -> impl Responder {
    let model_key = path.into_inner();
    let map_key = map_key_from_record(&model_key, &body.user_defined_metadata);
    let result = state.store.upsert(
        &model_key,
        &map_key,
        body.model_topology.clone(),
        body.weight_specs.clone(),
        body.weight_data_base64.clone(),
        body.training_config.clone(),
        body.user_defined_metadata.clone(),
    );
    match result {
        Ok(()) => HttpResponse::Ok().json(json!({"ok": true})),
        Err(e) => HttpResponse::InternalServerError().json(json!({"error": e.to_string()})),
    }
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "ok"}))
}

pub struct Server;

impl Server {
    pub async fn run(config: MsConfig) -> std::io::Result<()> {
        let store = Store::open(&config.db_path).map_err(|e| std::io::Error::other(e.to_string()))?;
        let state = web::Data::new(AppState { store: Arc::new(store) });
        let bind_addr = config.bind_addr();

        HttpServer::new(move || {
            App::new()
                .wrap(Logger::new("%r %s %Ts"))
                .wrap(Cors::default().allow_any_origin().allow_any_method().allow_any_header())
                .app_data(state.clone())
                .route("/api/rl-model-keys", web::get().to(list_keys))
                .route("/api/rl-allocate/{mapKey}", web::get().to(allocate))
                .route("/api/rl-release/{mapKey}", web::post().to(release))
                .route("/api/rl-model/{modelKey}", web::get().to(get_model))
                .route("/api/rl-model/{modelKey}", web::post().to(upsert_model))
                .route("/health", web::get().to(health))
        })
        .workers(2)
        .bind(&bind_addr)?
        .run()
        .await
    }
}
