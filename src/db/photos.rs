//! Types for stored photo attachments.

use serde::{Deserialize, Serialize};

/// A photo as handed over by the capture workflow, before it is stamped and
/// attached to a drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhoto {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub original_file_name: Option<String>,
    pub image_data: String,
}

impl NewPhoto {
    /// Stamp the photo for persistence under `drawing_key`.
    pub fn into_record(self, drawing_key: &str, saved_at: i64) -> PhotoRecord {
        PhotoRecord {
            id: self.id,
            drawing_key: drawing_key.to_string(),
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            memo: self.memo.unwrap_or_default(),
            original_file_name: self.original_file_name,
            image_data: self.image_data,
            saved_at,
        }
    }
}

/// A row of the `photos` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub drawing_key: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub memo: String,
    pub original_file_name: Option<String>,
    pub image_data: String,
    pub saved_at: i64,
}

/// A photo read back from the store.
///
/// `uploaded` is always false: anything still held locally has not been
/// confirmed as uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedPhoto {
    #[serde(flatten)]
    pub record: PhotoRecord,
    pub uploaded: bool,
}

impl From<PhotoRecord> for LoadedPhoto {
    fn from(record: PhotoRecord) -> Self {
        Self { record, uploaded: false }
    }
}

impl std::ops::Deref for LoadedPhoto {
    type Target = PhotoRecord;

    fn deref(&self) -> &PhotoRecord {
        &self.record
    }
}
