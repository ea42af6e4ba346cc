//! Shared error types for the services crate.

use thiserror::Error;

use mcq_core::session::SessionError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Failure talking to the remote document store on behalf of a user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    #[error("no user is signed in")]
    NotAuthenticated,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressSync`; only local persistence failures surface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("local progress could not be saved: {0}")]
    Local(#[from] StorageError),
}

/// Errors emitted by `SavedQuestionsService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SavedQuestionsError {
    #[error("saving questions requires a signed-in, non-anonymous account")]
    CapabilityDenied,
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl From<StorageError> for SavedQuestionsError {
    fn from(err: StorageError) -> Self {
        Self::Remote(RemoteError::Storage(err))
    }
}

/// Errors emitted by `NotificationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotificationError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Local(StorageError),
}

impl From<StorageError> for NotificationError {
    fn from(err: StorageError) -> Self {
        Self::Remote(RemoteError::Storage(err))
    }
}

/// Errors emitted by `ViewerService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ViewerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Local(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
