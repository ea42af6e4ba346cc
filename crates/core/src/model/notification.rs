use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::DocumentId;

/// Recipient id used for notifications addressed to every user.
pub const BROADCAST_RECIPIENT: &str = "broadcast";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Body of a notification document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    #[serde(rename = "userId")]
    pub recipient: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl NotificationData {
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.recipient == BROADCAST_RECIPIENT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: DocumentId,
    pub data: NotificationData,
}
