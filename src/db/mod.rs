mod schema;
pub mod metadata;
pub mod photos;
pub mod sqlite;

pub use metadata::MetadataRecord;
pub use photos::{LoadedPhoto, NewPhoto, PhotoRecord};
pub use schema::{DATABASE_NAME, MIGRATIONS, SCHEMA, SCHEMA_VERSION};
pub use sqlite::SqliteDb;

/// Current time as unix milliseconds, the unit of every `saved_at` column.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
