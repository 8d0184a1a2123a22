//! Async façade over the SQLite backend.
//!
//! A [`LocalStore`] is built once by the host application and cloned into
//! every collaborator that needs persistence. SQLite work runs on tokio's
//! blocking pool; each call suspends only its own caller.

use futures::future::join_all;
use serde_json::Value;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::db::{now_millis, LoadedPhoto, MetadataRecord, NewPhoto, SqliteDb};
use crate::error::{StoreError, StoreResult};
use crate::export::DrawingExport;

type Handle = Arc<Mutex<SqliteDb>>;

struct Inner {
    config: StoreConfig,
    db: OnceCell<Handle>,
    #[cfg(test)]
    opens: AtomicUsize,
}

fn open_database(config: &StoreConfig) -> StoreResult<SqliteDb> {
    let db = if config.is_in_memory() {
        SqliteDb::open_in_memory()?
    } else {
        SqliteDb::open(&config.db_path, config.busy_timeout())?
    };
    db.initialize()?;
    Ok(db)
}

/// Run an open on the blocking pool. A worker that dies mid-open is an
/// init failure like any other.
async fn open_on_blocking_pool<F>(open: F) -> StoreResult<SqliteDb>
where
    F: FnOnce() -> StoreResult<SqliteDb> + Send + 'static,
{
    tokio::task::spawn_blocking(open)
        .await
        .map_err(StoreError::init)?
}

#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Inner>,
}

impl LocalStore {
    /// Build a handle that opens the database on first use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                db: OnceCell::new(),
                #[cfg(test)]
                opens: AtomicUsize::new(0),
            }),
        }
    }

    /// Build a handle and open the database before returning it.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let store = Self::new(config);
        store.init().await?;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Open the database and create its schema if that has not happened yet.
    ///
    /// Concurrent callers share a single open. A failed open leaves the
    /// store uninitialized so a later call can try again.
    pub async fn init(&self) -> StoreResult<()> {
        self.handle().await.map(|_| ())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.db.initialized()
    }

    async fn handle(&self) -> StoreResult<Handle> {
        let handle = self
            .inner
            .db
            .get_or_try_init(|| async {
                let config = self.inner.config.clone();
                #[cfg(test)]
                self.inner.opens.fetch_add(1, Ordering::SeqCst);
                let db = open_on_blocking_pool(move || open_database(&config))
                    .await
                    .inspect_err(|e| warn!("Failed to open local storage: {e}"))?;
                info!(path = ?self.inner.config.db_path, "Opened local storage");
                Ok::<_, StoreError>(Arc::new(Mutex::new(db)))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Run `f` against the open database on the blocking pool.
    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&SqliteDb) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = self.handle().await?;
        tokio::task::spawn_blocking(move || {
            let db = handle.lock().unwrap_or_else(PoisonError::into_inner);
            f(&db)
        })
        .await?
    }

    // ========================================================================
    // Photo operations
    // ========================================================================

    /// Upsert one photo under `drawing_key`, stamping `saved_at`.
    pub async fn save_photo(&self, photo: NewPhoto, drawing_key: &str) -> StoreResult<()> {
        let record = photo.into_record(drawing_key, now_millis());
        let id = record.id.clone();
        self.run(move |db| db.put_photo(&record))
            .await
            .inspect_err(|e| warn!(%id, "Failed to save photo: {e}"))
    }

    /// Save every photo concurrently and wait for all of them.
    ///
    /// Fails with the first error once all writes have settled. Writes that
    /// succeeded stay committed.
    pub async fn save_photos(&self, photos: Vec<NewPhoto>, drawing_key: &str) -> StoreResult<()> {
        let total = photos.len();
        let results = join_all(
            photos
                .into_iter()
                .map(|photo| self.save_photo(photo, drawing_key)),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        match results.into_iter().find_map(Result::err) {
            Some(err) => {
                warn!(%drawing_key, failed, total, "Some photos were not saved");
                Err(err)
            }
            None => {
                debug!(%drawing_key, total, "Saved photos");
                Ok(())
            }
        }
    }

    /// All photos for a drawing. Order is not meaningful.
    pub async fn load_photos(&self, drawing_key: &str) -> StoreResult<Vec<LoadedPhoto>> {
        let key = drawing_key.to_string();
        let photos = self.run(move |db| db.photos_for_drawing(&key)).await?;
        Ok(photos.into_iter().map(LoadedPhoto::from).collect())
    }

    pub async fn load_photo(&self, id: &str) -> StoreResult<Option<LoadedPhoto>> {
        let id = id.to_string();
        let photo = self.run(move |db| db.get_photo(&id)).await?;
        Ok(photo.map(LoadedPhoto::from))
    }

    pub async fn find_photos_by_original_file_name(
        &self,
        name: &str,
    ) -> StoreResult<Vec<LoadedPhoto>> {
        let name = name.to_string();
        let photos = self
            .run(move |db| db.photos_by_original_file_name(&name))
            .await?;
        Ok(photos.into_iter().map(LoadedPhoto::from).collect())
    }

    /// Remove a photo by id. Removing an absent id succeeds.
    pub async fn delete_photo(&self, id: &str) -> StoreResult<()> {
        let owned = id.to_string();
        let removed = self
            .run(move |db| db.delete_photo(&owned))
            .await
            .inspect_err(|e| warn!(%id, "Failed to delete photo: {e}"))?;
        debug!(%id, removed, "Deleted photo");
        Ok(())
    }

    // ========================================================================
    // Metadata operations
    // ========================================================================

    /// Replace the metadata payload for a drawing.
    pub async fn save_metadata(&self, drawing_key: &str, payload: Value) -> StoreResult<()> {
        let record = MetadataRecord {
            drawing_key: drawing_key.to_string(),
            payload,
            saved_at: now_millis(),
        };
        self.run(move |db| db.put_metadata(&record))
            .await
            .inspect_err(|e| warn!(%drawing_key, "Failed to save metadata: {e}"))
    }

    pub async fn load_metadata(&self, drawing_key: &str) -> StoreResult<Option<Value>> {
        let key = drawing_key.to_string();
        let record = self.run(move |db| db.get_metadata(&key)).await?;
        Ok(record.map(|r| r.payload))
    }

    pub async fn delete_metadata(&self, drawing_key: &str) -> StoreResult<()> {
        let key = drawing_key.to_string();
        self.run(move |db| db.delete_metadata(&key))
            .await
            .inspect_err(|e| warn!(%drawing_key, "Failed to delete metadata: {e}"))?;
        Ok(())
    }

    // ========================================================================
    // Drawing-wide operations
    // ========================================================================

    /// Delete every photo for a drawing, then its metadata.
    ///
    /// The steps are not one transaction: if a photo deletion fails the
    /// metadata is left in place, and photos already removed stay removed.
    /// See [`LocalStore::delete_all_data_atomic`] for the all-or-nothing form.
    pub async fn delete_all_data(&self, drawing_key: &str) -> StoreResult<()> {
        let photos = self.load_photos(drawing_key).await?;
        let total = photos.len();

        let results = join_all(photos.iter().map(|photo| self.delete_photo(&photo.id))).await;
        if let Some(err) = results.into_iter().find_map(Result::err) {
            warn!(%drawing_key, "Cascade delete stopped before metadata");
            return Err(err);
        }

        self.delete_metadata(drawing_key).await?;
        info!(%drawing_key, photos = total, "Deleted all local data for drawing");
        Ok(())
    }

    /// Delete photos and metadata for a drawing inside one transaction.
    /// Returns the number of photos removed.
    pub async fn delete_all_data_atomic(&self, drawing_key: &str) -> StoreResult<usize> {
        let key = drawing_key.to_string();
        let removed = self
            .run(move |db| db.delete_drawing(&key))
            .await
            .inspect_err(|e| warn!(%drawing_key, "Failed to delete drawing: {e}"))?;
        info!(%drawing_key, photos = removed, "Deleted all local data for drawing");
        Ok(removed)
    }

    /// Every drawing key with locally held photos or metadata, sorted.
    pub async fn drawing_keys(&self) -> StoreResult<Vec<String>> {
        self.run(|db| db.drawing_keys()).await
    }

    /// Metadata and photos for a drawing, read from one snapshot.
    pub async fn export_drawing(&self, drawing_key: &str) -> StoreResult<DrawingExport> {
        let key = drawing_key.to_string();
        let (metadata, photos) = self.run(move |db| db.drawing_snapshot(&key)).await?;
        Ok(DrawingExport {
            drawing_key: drawing_key.to_string(),
            metadata: metadata.map(|m| m.payload),
            photos: photos.into_iter().map(LoadedPhoto::from).collect(),
            exported_at: now_millis(),
        })
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }
}
