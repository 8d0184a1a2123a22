use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::db::LoadedPhoto;
use crate::store::LocalStore;

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "JSON",
            ExportFormat::Csv => "CSV",
        }
    }
}

/// Everything held locally for one drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawingExport {
    pub drawing_key: String,
    pub metadata: Option<Value>,
    pub photos: Vec<LoadedPhoto>,
    pub exported_at: i64,
}

/// Write one drawing's local data to `output_path`. Returns the photo count.
pub async fn export_to_file(
    store: &LocalStore,
    drawing_key: &str,
    output_path: &Path,
    format: ExportFormat,
) -> Result<usize> {
    let export = store
        .export_drawing(drawing_key)
        .await
        .with_context(|| format!("Failed to read drawing {drawing_key}"))?;
    let count = export.photos.len();

    match format {
        ExportFormat::Json => export_json(&export, output_path)?,
        ExportFormat::Csv => export_csv(&export.photos, output_path)?,
    }

    tracing::info!(
        %drawing_key,
        photos = count,
        format = format.name(),
        "Exported drawing to {}",
        output_path.display()
    );
    Ok(count)
}

fn export_json(export: &DrawingExport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// Photo manifest without image data.
fn export_csv(photos: &[LoadedPhoto], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    wtr.write_record([
        "id",
        "drawing_key",
        "x",
        "y",
        "width",
        "height",
        "memo",
        "original_file_name",
        "saved_at",
        "uploaded",
    ])?;

    for photo in photos {
        wtr.write_record([
            photo.id.clone(),
            photo.drawing_key.clone(),
            photo.x.to_string(),
            photo.y.to_string(),
            photo.width.to_string(),
            photo.height.to_string(),
            photo.memo.clone(),
            photo.original_file_name.clone().unwrap_or_default(),
            photo.saved_at.to_string(),
            photo.uploaded.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::db::NewPhoto;
    use serde_json::json;

    async fn seeded_store() -> LocalStore {
        let store = LocalStore::open(StoreConfig::in_memory()).await.unwrap();
        store
            .save_photo(
                NewPhoto {
                    id: "p1".to_string(),
                    x: 1.5,
                    y: 2.0,
                    width: 30.0,
                    height: 40.0,
                    memo: Some("rust, stain".to_string()),
                    original_file_name: Some("IMG_0001.jpg".to_string()),
                    image_data: "data:image/jpeg;base64,/9j/".to_string(),
                },
                "plan-A.pdf",
            )
            .await
            .unwrap();
        store
            .save_metadata("plan-A.pdf", json!({"scale": 100}))
            .await
            .unwrap();
        store
    }

    #[test]
    fn test_format_extension() {
        assert_eq!(ExportFormat::Json.extension(), "json");
        assert_eq!(ExportFormat::Csv.extension(), "csv");
    }

    #[tokio::test]
    async fn test_export_json() {
        let store = seeded_store().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan-A.json");

        let count = export_to_file(&store, "plan-A.pdf", &path, ExportFormat::Json)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let export: DrawingExport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(export.drawing_key, "plan-A.pdf");
        assert_eq!(export.metadata, Some(json!({"scale": 100})));
        assert_eq!(export.photos.len(), 1);
        assert_eq!(export.photos[0].image_data, "data:image/jpeg;base64,/9j/");
    }

    #[tokio::test]
    async fn test_export_csv() {
        let store = seeded_store().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan-A.csv");

        export_to_file(&store, "plan-A.pdf", &path, ExportFormat::Csv)
            .await
            .unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "p1");
        assert_eq!(&rows[0][6], "rust, stain");
        assert_eq!(&rows[0][7], "IMG_0001.jpg");
        assert_eq!(&rows[0][9], "false");
    }

    #[tokio::test]
    async fn test_export_unknown_drawing_is_empty() {
        let store = seeded_store().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("none.json");

        let count = export_to_file(&store, "missing", &path, ExportFormat::Json)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
