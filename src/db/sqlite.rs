//! SQLite backend implementation.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use super::metadata::MetadataRecord;
use super::photos::PhotoRecord;
use super::schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION};
use crate::error::{StoreError, StoreResult};

const PHOTO_COLUMNS: &str =
    "id, drawing_key, x, y, width, height, memo, original_file_name, image_data, saved_at";

/// SQLite binds NaN as NULL; read it back the same way.
fn placement(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<f64> {
    Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(f64::NAN))
}

/// Helper to parse a `photos` row selected with `PHOTO_COLUMNS`.
fn row_to_photo(row: &rusqlite::Row) -> rusqlite::Result<PhotoRecord> {
    Ok(PhotoRecord {
        id: row.get(0)?,
        drawing_key: row.get(1)?,
        x: placement(row, 2)?,
        y: placement(row, 3)?,
        width: placement(row, 4)?,
        height: placement(row, 5)?,
        memo: row.get(6)?,
        original_file_name: row.get(7)?,
        image_data: row.get(8)?,
        saved_at: row.get(9)?,
    })
}

#[derive(Debug)]
pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::init)?;
            }
        }
        let conn = Connection::open(path).map_err(StoreError::init)?;
        conn.busy_timeout(busy_timeout).map_err(StoreError::init)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::init)?;
        Ok(Self { conn })
    }

    /// Create both tables and their indexes, then bring `user_version` up to
    /// date. Safe to call on an already-initialized database.
    pub fn initialize(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA).map_err(StoreError::init)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let current = self.schema_version()?;
        for &(version, sql) in MIGRATIONS {
            if version <= current {
                continue;
            }
            let tx = self.conn.unchecked_transaction().map_err(StoreError::init)?;
            tx.execute_batch(sql).map_err(StoreError::init)?;
            tx.pragma_update(None, "user_version", version)
                .map_err(StoreError::init)?;
            tx.commit().map_err(StoreError::init)?;
            info!(from = current, to = version, "Upgraded local storage schema");
        }
        Ok(())
    }

    pub fn schema_version(&self) -> StoreResult<u32> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(StoreError::init)
    }

    pub fn is_current(&self) -> StoreResult<bool> {
        Ok(self.schema_version()? >= SCHEMA_VERSION)
    }

    // ========================================================================
    // Photo operations
    // ========================================================================

    /// Insert or fully replace the photo with `record.id`.
    pub fn put_photo(&self, record: &PhotoRecord) -> StoreResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO photos (id, drawing_key, x, y, width, height, memo,
                                    original_file_name, image_data, saved_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    drawing_key = excluded.drawing_key,
                    x = excluded.x,
                    y = excluded.y,
                    width = excluded.width,
                    height = excluded.height,
                    memo = excluded.memo,
                    original_file_name = excluded.original_file_name,
                    image_data = excluded.image_data,
                    saved_at = excluded.saved_at
                "#,
                params![
                    record.id,
                    record.drawing_key,
                    record.x,
                    record.y,
                    record.width,
                    record.height,
                    record.memo,
                    record.original_file_name,
                    record.image_data,
                    record.saved_at,
                ],
            )
            .map_err(StoreError::persist(format!("photo {}", record.id)))?;
        debug!(id = %record.id, drawing_key = %record.drawing_key, "Stored photo");
        Ok(())
    }

    pub fn get_photo(&self, id: &str) -> StoreResult<Option<PhotoRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?"),
                [id],
                row_to_photo,
            )
            .optional()
            .map_err(StoreError::read(format!("photo {id}")))
    }

    /// All photos for a drawing, in whatever order the index yields them.
    pub fn photos_for_drawing(&self, drawing_key: &str) -> StoreResult<Vec<PhotoRecord>> {
        self.query_photos(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE drawing_key = ?"),
            drawing_key,
            || format!("photos for drawing {drawing_key}"),
        )
    }

    pub fn photos_by_original_file_name(&self, name: &str) -> StoreResult<Vec<PhotoRecord>> {
        self.query_photos(
            &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE original_file_name = ?"),
            name,
            || format!("photos named {name}"),
        )
    }

    fn query_photos(
        &self,
        sql: &str,
        key: &str,
        what: impl Fn() -> String,
    ) -> StoreResult<Vec<PhotoRecord>> {
        let mut stmt = self.conn.prepare(sql).map_err(StoreError::read(what()))?;
        let photos = stmt
            .query_map([key], row_to_photo)
            .map_err(StoreError::read(what()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::read(what()))?;
        Ok(photos)
    }

    /// Remove a photo. Missing ids are not an error.
    pub fn delete_photo(&self, id: &str) -> StoreResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM photos WHERE id = ?", [id])
            .map_err(StoreError::persist(format!("deletion of photo {id}")))?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Metadata operations
    // ========================================================================

    pub fn put_metadata(&self, record: &MetadataRecord) -> StoreResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        self.conn
            .execute(
                r#"
                INSERT INTO metadata (drawing_key, payload, saved_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(drawing_key) DO UPDATE SET
                    payload = excluded.payload,
                    saved_at = excluded.saved_at
                "#,
                params![record.drawing_key, payload, record.saved_at],
            )
            .map_err(StoreError::persist(format!(
                "metadata for drawing {}",
                record.drawing_key
            )))?;
        Ok(())
    }

    pub fn get_metadata(&self, drawing_key: &str) -> StoreResult<Option<MetadataRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT payload, saved_at FROM metadata WHERE drawing_key = ?",
                [drawing_key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(StoreError::read(format!("metadata for drawing {drawing_key}")))?;

        match row {
            Some((payload, saved_at)) => Ok(Some(MetadataRecord {
                drawing_key: drawing_key.to_string(),
                payload: serde_json::from_str(&payload)?,
                saved_at,
            })),
            None => Ok(None),
        }
    }

    pub fn delete_metadata(&self, drawing_key: &str) -> StoreResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM metadata WHERE drawing_key = ?", [drawing_key])
            .map_err(StoreError::persist(format!(
                "deletion of metadata for drawing {drawing_key}"
            )))?;
        Ok(removed > 0)
    }

    // ========================================================================
    // Drawing-wide operations
    // ========================================================================

    /// Delete every photo and the metadata record for a drawing in a single
    /// transaction. Returns the number of photos removed.
    pub fn delete_drawing(&self, drawing_key: &str) -> StoreResult<usize> {
        let what = || format!("deletion of drawing {drawing_key}");
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::persist(what()))?;
        let photos = tx
            .execute("DELETE FROM photos WHERE drawing_key = ?", [drawing_key])
            .map_err(StoreError::persist(what()))?;
        tx.execute("DELETE FROM metadata WHERE drawing_key = ?", [drawing_key])
            .map_err(StoreError::persist(what()))?;
        tx.commit().map_err(StoreError::persist(what()))?;
        Ok(photos)
    }

    /// Metadata and photos for one drawing, read from a single snapshot.
    pub fn drawing_snapshot(
        &self,
        drawing_key: &str,
    ) -> StoreResult<(Option<MetadataRecord>, Vec<PhotoRecord>)> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::read(format!("drawing {drawing_key}")))?;
        let metadata = self.get_metadata(drawing_key)?;
        let photos = self.photos_for_drawing(drawing_key)?;
        tx.finish()
            .map_err(StoreError::read(format!("drawing {drawing_key}")))?;
        Ok((metadata, photos))
    }

    /// Every drawing key with at least one photo or a metadata record.
    pub fn drawing_keys(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT drawing_key FROM photos
                UNION
                SELECT drawing_key FROM metadata
                ORDER BY 1
                "#,
            )
            .map_err(StoreError::read("drawing keys"))?;
        let keys = stmt
            .query_map([], |row| row.get(0))
            .map_err(StoreError::read("drawing keys"))?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(StoreError::read("drawing keys"))?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn photo(id: &str, drawing_key: &str) -> PhotoRecord {
        PhotoRecord {
            id: id.to_string(),
            drawing_key: drawing_key.to_string(),
            x: 10.0,
            y: 20.0,
            width: 5.0,
            height: 5.0,
            memo: String::new(),
            original_file_name: None,
            image_data: "data:image/png;base64,iVBORw0KGgo=".to_string(),
            saved_at: 1,
        }
    }

    fn test_db() -> SqliteDb {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let db = test_db();
        db.put_photo(&photo("p1", "d1")).unwrap();

        db.initialize().unwrap();
        db.initialize().unwrap();

        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert!(db.is_current().unwrap());
        assert!(db.get_photo("p1").unwrap().is_some());
    }

    #[test]
    fn test_schema_has_indexes() {
        let db = test_db();
        let mut stmt = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'photos'")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert!(names.contains(&"idx_photos_drawing_key".to_string()));
        assert!(names.contains(&"idx_photos_original_file_name".to_string()));
    }

    #[test]
    fn test_put_photo_replaces_in_place() {
        let db = test_db();
        db.put_photo(&photo("p1", "d1")).unwrap();

        let mut updated = photo("p1", "d2");
        updated.memo = "moved".to_string();
        updated.saved_at = 2;
        db.put_photo(&updated).unwrap();

        assert!(db.photos_for_drawing("d1").unwrap().is_empty());
        let stored = db.photos_for_drawing("d2").unwrap();
        assert_eq!(stored, vec![updated]);
    }

    #[test]
    fn test_non_finite_placement_round_trips() {
        let db = test_db();
        let mut odd = photo("p1", "d1");
        odd.x = f64::NAN;
        odd.width = f64::INFINITY;
        odd.height = f64::NEG_INFINITY;
        db.put_photo(&odd).unwrap();

        let stored = db.get_photo("p1").unwrap().unwrap();
        assert!(stored.x.is_nan());
        assert_eq!(stored.y, 20.0);
        assert_eq!(stored.width, f64::INFINITY);
        assert_eq!(stored.height, f64::NEG_INFINITY);
    }

    #[test]
    fn test_delete_photo_missing_is_ok() {
        let db = test_db();
        db.put_photo(&photo("p1", "d1")).unwrap();

        assert!(!db.delete_photo("nope").unwrap());
        assert!(db.delete_photo("p1").unwrap());
        assert!(db.get_photo("p1").unwrap().is_none());
    }

    #[test]
    fn test_metadata_round_trip_and_replace() {
        let db = test_db();
        assert!(db.get_metadata("d1").unwrap().is_none());

        db.put_metadata(&MetadataRecord {
            drawing_key: "d1".to_string(),
            payload: json!({"scale": 100, "layers": ["a"]}),
            saved_at: 1,
        })
        .unwrap();
        db.put_metadata(&MetadataRecord {
            drawing_key: "d1".to_string(),
            payload: json!({"scale": 50}),
            saved_at: 2,
        })
        .unwrap();

        let stored = db.get_metadata("d1").unwrap().unwrap();
        assert_eq!(stored.payload, json!({"scale": 50}));
        assert_eq!(stored.saved_at, 2);
    }

    #[test]
    fn test_delete_drawing_removes_both_tables() {
        let db = test_db();
        db.put_photo(&photo("p1", "d1")).unwrap();
        db.put_photo(&photo("p2", "d1")).unwrap();
        db.put_photo(&photo("p3", "d2")).unwrap();
        db.put_metadata(&MetadataRecord {
            drawing_key: "d1".to_string(),
            payload: json!(null),
            saved_at: 1,
        })
        .unwrap();

        assert_eq!(db.delete_drawing("d1").unwrap(), 2);
        assert!(db.photos_for_drawing("d1").unwrap().is_empty());
        assert!(db.get_metadata("d1").unwrap().is_none());
        assert_eq!(db.photos_for_drawing("d2").unwrap().len(), 1);
    }

    #[test]
    fn test_drawing_keys_union() {
        let db = test_db();
        db.put_photo(&photo("p1", "b.dwg")).unwrap();
        db.put_photo(&photo("p2", "b.dwg")).unwrap();
        db.put_metadata(&MetadataRecord {
            drawing_key: "a.dwg".to_string(),
            payload: json!({}),
            saved_at: 1,
        })
        .unwrap();

        assert_eq!(db.drawing_keys().unwrap(), vec!["a.dwg", "b.dwg"]);
    }

    #[test]
    fn test_write_failure_is_persist_error() {
        let db = test_db();
        db.conn.pragma_update(None, "query_only", true).unwrap();

        let err = db.put_photo(&photo("p1", "d1")).unwrap_err();
        assert!(err.is_persist());
        let err = db.delete_photo("p1").unwrap_err();
        assert!(err.is_persist());
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");

        let db = SqliteDb::open(&path, Duration::from_millis(100)).unwrap();
        db.initialize().unwrap();
        assert!(path.exists());
    }
}
