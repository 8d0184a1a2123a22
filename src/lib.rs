//! Offline persistence for field-survey photos and per-drawing metadata.
//!
//! Photos and metadata are keyed by the drawing file they were captured
//! against and kept in a local SQLite database until the host application
//! has uploaded them and deletes them.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod logging;
pub mod store;

pub use config::StoreConfig;
pub use db::{LoadedPhoto, MetadataRecord, NewPhoto, PhotoRecord};
pub use error::{StoreError, StoreResult};
pub use export::{export_to_file, DrawingExport, ExportFormat};
pub use store::LocalStore;
