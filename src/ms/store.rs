//! SQLite-backed model key-value store (`spec.md` §4.4).
//!
//! The original implementation keeps this state in a file opened directly
//! via `sqlite3.connect(RL_DB_PATH)`; `rusqlite` with the `bundled` feature
//! is the idiomatic Rust equivalent of that same file-backed store (see
//! `DESIGN.md` for why this replaces the teacher's `tokio-postgres` pool).

use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct ModelRecord {
    pub model_key: String,
    pub map_key: String,
    pub model_topology: Value,
    pub weight_specs: Value,
    pub weight_data_base64: String,
    pub training_config: Value,
    pub metadata: Value,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct AllocateResult {
    pub model_key: String,
    pub is_new: bool,
    pub copied_from: Option<String>,
}

/// Derives a map-key when one isn't supplied directly: `metadata.mapKey`,
/// then the model-key's last `-`-delimited segment, then `"default"`.
pub fn map_key_from_record(model_key: &str, metadata: &Value) -> String {
    if let Some(mk) = metadata.get("mapKey").and_then(Value::as_str) {
        return mk.to_string();
    }
    model_key.rsplit('-').next().unwrap_or("default").to_string()
}

fn utc_now_iso() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (h, m, s) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    // days-since-epoch -> y/m/d via the civil_from_days algorithm (Howard Hinnant).
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let mo = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if mo <= 2 { y + 1 } else { y };
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{m:02}:{s:02}Z")
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path).map_err(|e| StoreError::Backend(e.to_string()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS rl_models (
                model_key TEXT PRIMARY KEY,
                map_key TEXT NOT NULL,
                model_topology TEXT NOT NULL,
                weight_specs TEXT NOT NULL,
                weight_data_base64 TEXT NOT NULL,
                training_config TEXT NOT NULL,
                metadata TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rl_free_list (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                map_key TEXT NOT NULL,
                model_key TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS rl_last_popped (
                map_key TEXT PRIMARY KEY,
                model_key TEXT NOT NULL
            );",
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn allocate(&self, map_key: &str, base_key: &str) -> Result<AllocateResult, StoreError> {
        let conn = self.conn.lock().unwrap();
        let head: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, model_key FROM rl_free_list WHERE map_key = ?1 ORDER BY id ASC LIMIT 1",
                params![map_key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        if let Some((row_id, model_key)) = head {
            conn.execute("DELETE FROM rl_free_list WHERE id = ?1", params![row_id])
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            conn.execute(
                "INSERT INTO rl_last_popped (map_key, model_key) VALUES (?1, ?2)
                 ON CONFLICT(map_key) DO UPDATE SET model_key = excluded.model_key",
                params![map_key, model_key],
            )
            .map_err(|e| StoreError::Backend(e.to_string()))?;
            return Ok(AllocateResult { model_key, is_new: false, copied_from: None });
        }

        let model_key = format!("{base_key}-{map_key}-{}", utc_now_iso().replace([':', '-', 'T', 'Z'], ""));
        let last_popped: Option<String> = conn
            .query_row("SELECT model_key FROM rl_last_popped WHERE map_key = ?1", params![map_key], |row| row.get(0))
            .optional()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let copied_from = if let Some(source_key) = &last_popped {
            if let Some(source) = Self::fetch(&conn, source_key)? {
                conn.execute(
                    "INSERT INTO rl_models (model_key, map_key, model_topology, weight_specs, weight_data_base64, training_config, metadata, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        model_key,
                        map_key,
                        source.model_topology.to_string(),
                        source.weight_specs.to_string(),
                        source.weight_data_base64,
                        source.training_config.to_string(),
                        source.metadata.to_string(),
                        utc_now_iso(),
                    ],
                )
                .map_err(|e| StoreError::Backend(e.to_string()))?;
                Some(source_key.clone())
            } else {
                None
            }
        } else {
            None
        };

        conn.execute(
            "INSERT INTO rl_last_popped (map_key, model_key) VALUES (?1, ?2)
             ON CONFLICT(map_key) DO UPDATE SET model_key = excluded.model_key",
            params![map_key, model_key],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(AllocateResult { model_key, is_new: true, copied_from })
    }

    pub fn release(&self, map_key: &str, model_key: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO rl_free_list (map_key, model_key) VALUES (?1, ?2)", params![map_key, model_key])
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, model_key: &str) -> Result<Option<ModelRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::fetch(&conn, model_key)
    }

    fn fetch(conn: &Connection, model_key: &str) -> Result<Option<ModelRecord>, StoreError> {
        conn.query_row(
            "SELECT model_key, map_key, model_topology, weight_specs, weight_data_base64, training_config, metadata, updated_at
             FROM rl_models WHERE model_key = ?1",
            params![model_key],
            |row| {
                Ok(ModelRecord {
                    model_key: row.get(0)?,
                    map_key: row.get(1)?,
                    model_topology: serde_json::from_str(&row.get::<_, String>(2)?).unwrap_or(Value::Null),
                    weight_specs: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or(Value::Null),
                    weight_data_base64: row.get(4)?,
                    training_config: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or(Value::Null),
                    metadata: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or(Value::Null),
                    updated_at: row.get(7)?,
                })
            },
        )
        .optional()
        .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn upsert(
        &self,
        model_key: &str,
        map_key: &str,
        model_topology: Value,
        weight_specs: Value,
        weight_data_base64: String,
        training_config: Value,
        metadata: Value,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO rl_models (model_key, map_key, model_topology, weight_specs, weight_data_base64, training_config, metadata, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(model_key) DO UPDATE SET
                map_key = excluded.map_key,
                model_topology = excluded.model_topology,
                weight_specs = excluded.weight_specs,
                weight_data_base64 = excluded.weight_data_base64,
                training_config = excluded.training_config,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![
                model_key,
                map_key,
                model_topology.to_string(),
                weight_specs.to_string(),
                weight_data_base64,
                training_config.to_string(),
                metadata.to_string(),
                utc_now_iso(),
            ],
        )
        .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn list(&self, map_key: Option<&str>) -> Result<Vec<ModelRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = if map_key.is_some() {
            conn.prepare(
                "SELECT model_key, map_key, model_topology, weight_specs, weight_data_base64, training_config, metadata, updated_at
                 FROM rl_models WHERE map_key = ?1",
            )
        } else {
            conn.prepare(
                "SELECT model_key, map_key, model_topology, weight_specs, weight_data_base64, training_config, metadata, updated_at
                 FROM rl_models",
            )
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        let row_to_record = |row: &rusqlite::Row| -> rusqlite::Result<ModelRecord> {
            Ok(ModelRecord {
                model_key: row.get(0)?,
                map_key: row.get(1)?,
                model_topology: serde_json::from_str(&row.get::<_, String>(2)?).unwrap_or(Value::Null),
                weight_specs: serde_json::from_str(&row.get::<_, String>(3)?).unwrap_or(Value::Null),
                weight_data_base64: row.get(4)?,
                training_config: serde_json::from_str(&row.get::<_, String>(5)?).unwrap_or(Value::Null),
                metadata: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or(Value::Null),
                updated_at: row.get(7)?,
            })
        };

        let rows = if let Some(mk) = map_key {
            stmt.query_map(params![mk], row_to_record)
        } else {
            stmt.query_map([], row_to_record)
        }
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>().map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_on_empty_free_list_mints_new_key() {
        let store = Store::open(":memory:").unwrap();
        let result = store.allocate("default", "tank-ai-dqn").unwrap();
        assert!(result.is_new);
        assert!(result.model_key.starts_with("tank-ai-dqn-default-"));
    }

    #[test]
    fn released_keys_pop_in_fifo_order() {
        let store = Store::open(":memory:").unwrap();
        store.release("default", "a").unwrap();
        store.release("default", "b").unwrap();
        let first = store.allocate("default", "base").unwrap();
        assert_eq!(first.model_key, "a");
        assert!(!first.is_new);
        let second = store.allocate("default", "base").unwrap();
        assert_eq!(second.model_key, "b");
    }

    #[test]
    fn new_allocation_copies_last_popped_record() {
        let store = Store::open(":memory:").unwrap();
        store
            .upsert("seed", "default", Value::Null, Value::Null, "AA==".into(), Value::Null, Value::Null)
            .unwrap();
        store.release("default", "seed").unwrap();
        let popped = store.allocate("default", "base").unwrap();
        assert_eq!(popped.model_key, "seed");

        let minted = store.allocate("default", "base").unwrap();
        assert!(minted.is_new);
        assert_eq!(minted.copied_from.as_deref(), Some("seed"));
        let copy = store.get(&minted.model_key).unwrap().unwrap();
        assert_eq!(copy.weight_data_base64, "AA==");
    }

    #[test]
    fn map_key_fallback_chain_prefers_metadata() {
        let meta = serde_json::json!({"mapKey": "stage03"});
        assert_eq!(map_key_from_record("tank-ai-dqn-default-123", &meta), "stage03");
        assert_eq!(map_key_from_record("tank-ai-dqn-default-123", &Value::Null), "123");
    }
}
