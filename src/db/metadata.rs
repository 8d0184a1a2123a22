//! Types for per-drawing metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A row of the `metadata` table. The payload shape belongs to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub drawing_key: String,
    pub payload: Value,
    pub saved_at: i64,
}
