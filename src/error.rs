//! Typed domain errors. Process/handler boundaries wrap these in
//! `anyhow::Result`; the HTTP layer matches on the typed variants to choose
//! a status code.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("no available player spawns")]
    NoPlayerSpawns,
    #[error("session {0} is full")]
    Full(String),
    #[error("map {0} invalid: {1}")]
    InvalidMap(String, String),
    #[error("tank definition missing for label {0}")]
    MissingTankDef(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model key {0} not found")]
    NotFound(String),
    #[error("missing modelKey in request")]
    MissingModelKey,
    #[error("missing model payload fields")]
    MissingModelPayload,
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("state size mismatch: model expects {expected}, got {actual}")]
    StateSizeMismatch { expected: usize, actual: usize },
    #[error("unknown model topology: {0}")]
    UnknownTopology(String),
    #[error("malformed weight blob: {0}")]
    MalformedWeights(String),
}
