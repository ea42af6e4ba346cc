use std::sync::Arc;

use mcq_core::model::{
    BROADCAST_RECIPIENT, DocumentId, Notification, NotificationData, NotificationKind, UserId,
};
use serde_json::Value;
use storage::local::LocalProgressStore;
use storage::repository::{Document, DocumentStore, Filter, from_document, to_document};
use tracing::warn;

use crate::Clock;
use crate::error::NotificationError;

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";

/// Notifications stored remotely, with per-device "viewed" state.
#[derive(Clone)]
pub struct NotificationService {
    clock: Clock,
    documents: Arc<dyn DocumentStore>,
    local: LocalProgressStore,
}

impl NotificationService {
    #[must_use]
    pub fn new(clock: Clock, documents: Arc<dyn DocumentStore>, local: LocalProgressStore) -> Self {
        Self {
            clock,
            documents,
            local,
        }
    }

    async fn add(
        &self,
        recipient: &str,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<DocumentId, NotificationError> {
        let data = NotificationData {
            recipient: recipient.to_owned(),
            title: title.to_owned(),
            message: message.to_owned(),
            kind,
            timestamp: self.clock.now(),
            read: false,
        };
        let id = self
            .documents
            .add(NOTIFICATIONS_COLLECTION, to_document(&data)?)
            .await?;
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `NotificationError::Remote` if the write fails.
    pub async fn add_for_user(
        &self,
        user: &UserId,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<DocumentId, NotificationError> {
        self.add(user.as_str(), title, message, kind).await
    }

    /// Address a notification to every user.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Remote` if the write fails.
    pub async fn broadcast(
        &self,
        title: &str,
        message: &str,
        kind: NotificationKind,
    ) -> Result<DocumentId, NotificationError> {
        self.add(BROADCAST_RECIPIENT, title, message, kind).await
    }

    /// Mark a notification read on this device, and remotely when it is
    /// addressed to a single user. Broadcasts stay unread for everyone else.
    ///
    /// # Errors
    ///
    /// Returns `NotificationError::Local` if the viewed list cannot be saved,
    /// `NotificationError::Remote` if the remote update fails.
    pub async fn mark_as_read(&self, id: &DocumentId) -> Result<(), NotificationError> {
        self.local
            .mark_notification_viewed(id)
            .map_err(NotificationError::Local)?;

        let Some(doc) = self.documents.get(NOTIFICATIONS_COLLECTION, id).await? else {
            return Ok(());
        };
        let is_broadcast = doc.get("userId").and_then(Value::as_str) == Some(BROADCAST_RECIPIENT);
        if !is_broadcast {
            let mut patch = Document::new();
            patch.insert("read".into(), Value::Bool(true));
            self.documents
                .update(NOTIFICATIONS_COLLECTION, id, patch)
                .await?;
        }
        Ok(())
    }

    /// Notifications for `user` plus broadcasts, newest first.
    ///
    /// Anything viewed on this device reads as read. An unavailable store
    /// yields an empty list.
    pub async fn all_for(&self, user: &UserId) -> Vec<Notification> {
        let mut out = Vec::new();
        for recipient in [user.as_str(), BROADCAST_RECIPIENT] {
            match self
                .documents
                .query(NOTIFICATIONS_COLLECTION, &[Filter::eq("userId", recipient)])
                .await
            {
                Ok(docs) => out.extend(docs.into_iter().filter_map(|doc| {
                    match from_document::<NotificationData>(doc.data) {
                        Ok(data) => Some(Notification { id: doc.id, data }),
                        Err(err) => {
                            warn!(id = %doc.id, error = %err, "skipping unreadable notification");
                            None
                        }
                    }
                })),
                Err(err) => {
                    warn!(error = %err, "notifications unavailable");
                    return Vec::new();
                }
            }
        }

        let viewed = self.local.viewed_notifications();
        for notification in &mut out {
            if viewed.contains(&notification.id) {
                notification.data.read = true;
            }
        }
        out.sort_by(|a, b| b.data.timestamp.cmp(&a.data.timestamp));
        out
    }

    pub async fn unread_for(&self, user: &UserId) -> Vec<Notification> {
        self.all_for(user)
            .await
            .into_iter()
            .filter(|n| !n.data.read)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mcq_core::time::fixed_clock;
    use storage::local::MemoryKeyValueStore;
    use storage::repository::InMemoryDocumentStore;

    fn service(clock: Clock, docs: &InMemoryDocumentStore) -> NotificationService {
        NotificationService::new(
            clock,
            Arc::new(docs.clone()),
            LocalProgressStore::new(Arc::new(MemoryKeyValueStore::new())),
        )
    }

    #[tokio::test]
    async fn user_and_broadcast_notifications_newest_first() {
        let docs = InMemoryDocumentStore::new();
        let mut clock = fixed_clock();
        let u1 = UserId::new("u1");

        service(clock, &docs)
            .broadcast("Welcome", "hello all", NotificationKind::Info)
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        service(clock, &docs)
            .add_for_user(&u1, "Saved", "question saved", NotificationKind::Success)
            .await
            .unwrap();
        clock.advance(Duration::minutes(1));
        service(clock, &docs)
            .add_for_user(&UserId::new("u2"), "Other", "not yours", NotificationKind::Info)
            .await
            .unwrap();

        let titles: Vec<String> = service(clock, &docs)
            .all_for(&u1)
            .await
            .into_iter()
            .map(|n| n.data.title)
            .collect();
        assert_eq!(titles, vec!["Saved", "Welcome"]);
    }

    #[tokio::test]
    async fn reading_a_broadcast_only_marks_this_device() {
        let docs = InMemoryDocumentStore::new();
        let svc = service(fixed_clock(), &docs);
        let u1 = UserId::new("u1");
        let broadcast = svc
            .broadcast("Maintenance", "tonight", NotificationKind::Warning)
            .await
            .unwrap();
        let personal = svc
            .add_for_user(&u1, "Hi", "there", NotificationKind::Info)
            .await
            .unwrap();

        svc.mark_as_read(&broadcast).await.unwrap();
        svc.mark_as_read(&personal).await.unwrap();

        assert!(svc.unread_for(&u1).await.is_empty());
        let stored = docs
            .get(NOTIFICATIONS_COLLECTION, &broadcast)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["read"], false);
        let stored = docs
            .get(NOTIFICATIONS_COLLECTION, &personal)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["read"], true);
    }
}
