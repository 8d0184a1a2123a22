//! Error types for the local store.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The database could not be opened or its schema could not be created.
    #[error("failed to initialize local storage: {0}")]
    Init(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// A write or delete transaction was rejected by the engine.
    #[error("failed to persist {what}: {source}")]
    Persist {
        what: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to read {what}: {source}")]
    Read {
        what: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("metadata payload is not valid JSON: {0}")]
    Codec(#[from] serde_json::Error),

    /// The blocking worker running an operation panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn init<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Init(Box::new(err))
    }

    pub(crate) fn persist(what: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let what = what.into();
        move |source| StoreError::Persist { what, source }
    }

    pub(crate) fn read(what: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let what = what.into();
        move |source| StoreError::Read { what, source }
    }

    pub fn is_init(&self) -> bool {
        matches!(self, StoreError::Init(_))
    }

    pub fn is_persist(&self) -> bool {
        matches!(self, StoreError::Persist { .. })
    }
}
