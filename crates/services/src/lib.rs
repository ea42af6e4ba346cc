#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod error;
pub mod notifications;
pub mod progress;
pub mod remote_progress;
pub mod saved;
pub mod viewer;

pub use mcq_core::Clock;

pub use app_services::AppServices;
pub use auth::{AuthConfig, AuthSession, UserAccount};
pub use error::{
    AppServicesError, NotificationError, ProgressError, RemoteError, SavedQuestionsError,
    ViewerError,
};
pub use notifications::NotificationService;
pub use progress::{ProgressSync, SyncReport};
pub use remote_progress::{RemoteProgressStore, UserProgress};
pub use saved::{SaveOutcome, SavedQuestionsCache, SavedQuestionsService};
pub use viewer::{
    NavigationOutcome, SavedCheck, SavedCheckRequest, ViewerCommand, ViewerScope, ViewerService,
    ViewerSession,
};
