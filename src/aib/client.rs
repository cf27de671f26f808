//! Thin HTTP clients to the GBE session registry and the MS allocation
//! service (`spec.md` §4.3, §4.4). Mirrors the teacher's preference for a
//! small typed wrapper over bare `reqwest` calls at each call site.

use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const MS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub tick: u64,
    #[serde(rename = "gameOver", default)]
    pub game_over: bool,
    #[serde(default)]
    pub players: usize,
    #[serde(rename = "mapName")]
    pub map_name: String,
    #[serde(rename = "modelKey", default)]
    pub model_key: Option<String>,
    #[serde(rename = "mapKey")]
    pub map_key: String,
}

pub struct GbeClient {
    http: reqwest::Client,
    base_url: String,
}

impl GbeClient {
    pub fn new(base_url: String) -> Self {
        Self { http: reqwest::Client::new(), base_url }
    }

    pub async fn list_sessions(&self) -> anyhow::Result<Vec<SessionSummary>> {
        #[derive(Deserialize)]
        struct Resp {
            sessions: Vec<SessionSummary>,
        }
        let resp: Resp = self.http.get(format!("{}/sessions", self.base_url)).send().await?.json().await?;
        Ok(resp.sessions)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocateResponse {
    #[serde(rename = "modelKey")]
    pub model_key: String,
    #[serde(rename = "isNew")]
    pub is_new: bool,
    #[serde(rename = "copiedFrom")]
    pub copied_from: Option<String>,
}

pub struct MsClient {
    http: reqwest::Client,
    base_url: String,
}

impl MsClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder().timeout(MS_REQUEST_TIMEOUT).build().unwrap_or_default();
        Self { http, base_url }
    }

    pub async fn allocate(&self, map_key: &str, base_key: &str) -> anyhow::Result<AllocateResponse> {
        let url = format!("{}/api/rl-allocate/{}?baseKey={}", self.base_url, map_key, base_key);
        Ok(self.http.get(url).send().await?.json().await?)
    }

    pub async fn release(&self, map_key: &str, model_key: &str) -> anyhow::Result<()> {
        let url = format!("{}/api/rl-release/{}", self.base_url, map_key);
        self.http.post(url).json(&json!({"modelKey": model_key})).send().await?;
        Ok(())
    }

    pub async fn get_model(&self, model_key: &str) -> anyhow::Result<Option<Value>> {
        let url = format!("{}/api/rl-model/{}", self.base_url, model_key);
        let resp = self.http.get(url).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.json().await?))
    }

    pub async fn save_model(&self, model_key: &str, body: &Value) -> anyhow::Result<()> {
        let url = format!("{}/api/rl-model/{}", self.base_url, model_key);
        self.http.post(url).json(body).send().await?;
        Ok(())
    }
}
