/// Logical database name; also the default file stem on disk.
pub const DATABASE_NAME: &str = "dmap-local-storage";

/// Current schema version, tracked in `PRAGMA user_version`.
pub const SCHEMA_VERSION: u32 = 1;

pub const SCHEMA: &str = r#"
-- Photos captured during a survey session
CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY NOT NULL,
    drawing_key TEXT NOT NULL,

    -- Placement on the drawing. NULL holds NaN, which SQLite cannot store.
    x REAL,
    y REAL,
    width REAL,
    height REAL,

    memo TEXT NOT NULL DEFAULT '',
    original_file_name TEXT,
    image_data TEXT NOT NULL,   -- data URI, stored verbatim
    saved_at INTEGER NOT NULL   -- unix millis, rewritten on every upsert
);

CREATE INDEX IF NOT EXISTS idx_photos_drawing_key ON photos(drawing_key);
CREATE INDEX IF NOT EXISTS idx_photos_original_file_name ON photos(original_file_name);

-- One metadata payload per drawing
CREATE TABLE IF NOT EXISTS metadata (
    drawing_key TEXT PRIMARY KEY NOT NULL,
    payload TEXT NOT NULL,      -- JSON
    saved_at INTEGER NOT NULL
);
"#;

/// Upgrade steps keyed by the version they produce. Each runs once, in
/// order, when the stored `user_version` is below its target.
pub const MIGRATIONS: &[(u32, &str)] = &[(1, SCHEMA)];
