use std::sync::{Arc, PoisonError, RwLock};

use mcq_core::model::UserId;
use tracing::info;

use crate::error::RemoteError;

/// The signed-in account as far as this app cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub uid: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub anonymous: bool,
}

impl UserAccount {
    #[must_use]
    pub fn new(uid: UserId) -> Self {
        Self {
            uid,
            email: None,
            display_name: None,
            anonymous: false,
        }
    }

    #[must_use]
    pub fn anonymous(uid: UserId) -> Self {
        Self {
            anonymous: true,
            ..Self::new(uid)
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        if self.display_name.is_none() {
            self.display_name = email.split('@').next().map(str::to_owned);
        }
        self.email = Some(email);
        self
    }
}

/// Shared handle on the current user; cloned into every service that needs it.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    current: Arc<RwLock<Option<UserAccount>>>,
}

impl AuthSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signed_in(user: UserAccount) -> Self {
        let session = Self::new();
        session.sign_in(user);
        session
    }

    pub fn sign_in(&self, user: UserAccount) {
        info!(uid = %user.uid, anonymous = user.anonymous, "signed in");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    /// Clears the current user and returns who was signed in.
    pub fn sign_out(&self) -> Option<UserAccount> {
        let previous = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(user) = &previous {
            info!(uid = %user.uid, "signed out");
        }
        previous
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserAccount> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.current_user().map(|u| u.uid)
    }

    /// The signed-in user's id, or `NotAuthenticated`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotAuthenticated` when nobody is signed in.
    pub fn require_user(&self) -> Result<UserId, RemoteError> {
        self.user_id().ok_or(RemoteError::NotAuthenticated)
    }

    /// Saving questions needs a real (non-anonymous) account.
    #[must_use]
    pub fn can_save_questions(&self) -> bool {
        self.current_user().is_some_and(|u| !u.anonymous)
    }
}

/// Which sign-in methods the front end offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AuthConfig {
    pub email_password: bool,
    pub anonymous: bool,
    pub google: bool,
    pub github: bool,
    pub apple: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AuthConfig {
    /// Read `MCQ_AUTH_*_ENABLED` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Email and Google are on unless set to `false`; the others are off
    /// unless set to `true`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let on_unless_false = |key: &str| lookup(key).as_deref() != Some("false");
        let off_unless_true = |key: &str| lookup(key).as_deref() == Some("true");
        Self {
            email_password: on_unless_false("MCQ_AUTH_EMAIL_ENABLED"),
            anonymous: off_unless_true("MCQ_AUTH_ANONYMOUS_ENABLED"),
            google: on_unless_false("MCQ_AUTH_GOOGLE_ENABLED"),
            github: off_unless_true("MCQ_AUTH_GITHUB_ENABLED"),
            apple: off_unless_true("MCQ_AUTH_APPLE_ENABLED"),
        }
    }

    /// Whether any method that yields a full (non-anonymous) account is on.
    #[must_use]
    pub fn allows_accounts(&self) -> bool {
        self.email_password || self.google || self.github || self.apple
    }

    #[must_use]
    pub fn enabled_methods(&self) -> Vec<&'static str> {
        [
            (self.email_password, "email"),
            (self.anonymous, "anonymous"),
            (self.google, "google"),
            (self.github, "github"),
            (self.apple, "apple"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_users_cannot_save() {
        let auth = AuthSession::new();
        assert!(!auth.can_save_questions());
        assert!(matches!(
            auth.require_user(),
            Err(RemoteError::NotAuthenticated)
        ));

        auth.sign_in(UserAccount::anonymous(UserId::new("anon")));
        assert!(!auth.can_save_questions());
        assert_eq!(auth.require_user().unwrap(), UserId::new("anon"));

        auth.sign_in(UserAccount::new(UserId::new("u1")).with_email("ada@example.com"));
        assert!(auth.can_save_questions());
        assert_eq!(
            auth.current_user().and_then(|u| u.display_name).as_deref(),
            Some("ada")
        );

        assert!(auth.sign_out().is_some());
        assert!(auth.current_user().is_none());
    }

    #[test]
    fn clones_share_the_current_user() {
        let auth = AuthSession::new();
        let other = auth.clone();
        auth.sign_in(UserAccount::new(UserId::new("u1")));
        assert_eq!(other.user_id(), Some(UserId::new("u1")));
    }

    #[test]
    fn auth_config_defaults() {
        let cfg = AuthConfig::default();
        assert!(cfg.email_password && cfg.google);
        assert!(!cfg.anonymous && !cfg.github && !cfg.apple);

        let cfg = AuthConfig::from_lookup(|key| match key {
            "MCQ_AUTH_EMAIL_ENABLED" => Some("false".into()),
            "MCQ_AUTH_GITHUB_ENABLED" => Some("true".into()),
            _ => None,
        });
        assert_eq!(cfg.enabled_methods(), vec!["google", "github"]);
        assert!(cfg.allows_accounts());

        let cfg = AuthConfig::from_lookup(|key| match key {
            "MCQ_AUTH_EMAIL_ENABLED" | "MCQ_AUTH_GOOGLE_ENABLED" => Some("false".into()),
            "MCQ_AUTH_ANONYMOUS_ENABLED" => Some("true".into()),
            _ => None,
        });
        assert_eq!(cfg.enabled_methods(), vec!["anonymous"]);
        assert!(!cfg.allows_accounts());
    }
}
