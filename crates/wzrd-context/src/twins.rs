//! Digital twin (persona) records.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use wzrd_types::{TwinFeatures, TwinRecord};

use crate::error::ContextError;

/// Parameters for creating a twin.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTwin {
    pub id: String,
    pub owner_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub features: TwinFeatures,
    #[serde(default)]
    pub model_data: serde_json::Map<String, serde_json::Value>,
}

/// Inserts a twin and returns the stored record.
pub fn create_twin(conn: &Connection, twin: &NewTwin) -> Result<TwinRecord, ContextError> {
    let features_json = serde_json::to_string(&twin.features)?;
    let model_data_json = serde_json::to_string(&twin.model_data)?;

    conn.execute(
        "INSERT INTO digital_twins (id, owner_id, name, description, features, model_data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            twin.id,
            twin.owner_id,
            twin.name,
            twin.description,
            features_json,
            model_data_json,
        ],
    )?;

    Ok(TwinRecord {
        id: twin.id.clone(),
        name: twin.name.clone(),
        description: twin.description.clone(),
        features: twin.features.clone(),
        model_data: twin.model_data.clone(),
    })
}

/// Reads a twin by ID. `Ok(None)` means no such row.
pub fn fetch_twin(conn: &Connection, twin_id: &str) -> Result<Option<TwinRecord>, ContextError> {
    let twin = conn
        .query_row(
            "SELECT id, name, description, features, model_data
             FROM digital_twins WHERE id = ?1",
            [twin_id],
            map_row_to_twin,
        )
        .optional()?;
    Ok(twin)
}

/// Best-effort twin lookup used while seeding a conversation.
///
/// Returns `None` when no ID is given, when the twin does not exist, or when
/// the read fails; failures are logged, never propagated, so a conversation
/// can always start without persona data.
pub fn lookup_twin(conn: &Connection, twin_id: Option<&str>) -> Option<TwinRecord> {
    let twin_id = twin_id?;

    match fetch_twin(conn, twin_id) {
        Ok(Some(twin)) => {
            tracing::info!(twin_id, name = %twin.name, "fetched twin data");
            Some(twin)
        }
        Ok(None) => {
            tracing::info!(twin_id, "no twin data found");
            None
        }
        Err(e) => {
            tracing::error!(twin_id, error = %e, "failed to fetch twin personality data");
            None
        }
    }
}

fn map_row_to_twin(row: &Row) -> rusqlite::Result<TwinRecord> {
    let id: String = row.get(0)?;
    let features: Option<String> = row.get(3)?;
    let model_data: Option<String> = row.get(4)?;

    Ok(TwinRecord {
        features: decode_json_column(&id, "features", features.as_deref()),
        model_data: decode_json_column(&id, "model_data", model_data.as_deref()),
        id,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

// Malformed persona JSON degrades to an empty value so prompt rendering can
// still proceed with the remaining fields.
fn decode_json_column<T>(twin_id: &str, column: &str, raw: Option<&str>) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    match raw.map(str::trim) {
        None | Some("") | Some("null") => T::default(),
        Some(json) => serde_json::from_str(json).unwrap_or_else(|e| {
            tracing::warn!(twin_id, column, error = %e, "ignoring malformed twin column");
            T::default()
        }),
    }
}
