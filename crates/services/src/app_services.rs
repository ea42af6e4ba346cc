use std::path::PathBuf;
use std::sync::Arc;

use storage::repository::Storage;
use tracing::{info, warn};

use crate::Clock;
use crate::auth::{AuthSession, UserAccount};
use crate::error::AppServicesError;
use crate::notifications::NotificationService;
use crate::progress::{ProgressSync, SyncReport};
use crate::remote_progress::RemoteProgressStore;
use crate::saved::{SavedQuestionsCache, SavedQuestionsService};
use crate::viewer::ViewerService;

/// Assembles app-facing services around one auth session and one cache.
#[derive(Clone)]
pub struct AppServices {
    auth: AuthSession,
    storage: Storage,
    progress: Arc<ProgressSync>,
    saved: Arc<SavedQuestionsService>,
    notifications: Arc<NotificationService>,
    viewer: Arc<ViewerService>,
}

impl AppServices {
    /// Build services backed by `SQLite`, a local state file and a content
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        local_state: impl Into<PathBuf>,
        content_root: impl Into<PathBuf>,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url, local_state, content_root)
            .await?
            .with_clock(clock);
        Ok(Self::from_storage(storage, clock))
    }

    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(Storage::in_memory().with_clock(clock), clock)
    }

    #[must_use]
    pub fn from_storage(storage: Storage, clock: Clock) -> Self {
        let auth = AuthSession::new();
        let cache = SavedQuestionsCache::new();

        let remote = RemoteProgressStore::new(clock, auth.clone(), Arc::clone(&storage.documents));
        let progress = Arc::new(ProgressSync::new(
            auth.clone(),
            storage.local.clone(),
            remote,
        ));
        let saved = Arc::new(SavedQuestionsService::new(
            clock,
            auth.clone(),
            Arc::clone(&storage.documents),
            cache,
        ));
        let notifications = Arc::new(NotificationService::new(
            clock,
            Arc::clone(&storage.documents),
            storage.local.clone(),
        ));
        let viewer = Arc::new(ViewerService::new(
            Arc::clone(&storage.content),
            storage.local.clone(),
            saved.as_ref().clone(),
        ));

        Self {
            auth,
            storage,
            progress,
            saved,
            notifications,
            viewer,
        }
    }

    #[must_use]
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressSync> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn saved(&self) -> Arc<SavedQuestionsService> {
        Arc::clone(&self.saved)
    }

    #[must_use]
    pub fn saved_cache(&self) -> &SavedQuestionsCache {
        self.saved.cache()
    }

    #[must_use]
    pub fn notifications(&self) -> Arc<NotificationService> {
        Arc::clone(&self.notifications)
    }

    #[must_use]
    pub fn viewer(&self) -> Arc<ViewerService> {
        Arc::clone(&self.viewer)
    }

    /// Sign in, replay local progress and warm the saved-questions cache.
    pub async fn sign_in(&self, user: UserAccount) -> SyncReport {
        self.saved_cache().reset();
        self.auth.sign_in(user);
        let report = self.progress.initialize_progress_sync().await;
        if self.auth.can_save_questions() {
            self.saved_cache().initialize(&self.saved).await;
        }
        report
    }

    /// Forget the user and everything cached on their behalf.
    pub fn sign_out(&self) -> Option<UserAccount> {
        let previous = self.auth.sign_out();
        self.saved_cache().reset();
        if let Err(err) = self.storage.local.clear_viewed_notifications() {
            warn!(error = %err, "viewed notifications not cleared");
        }
        if let Some(user) = &previous {
            info!(uid = %user.uid, "session state cleared");
        }
        previous
    }
}
