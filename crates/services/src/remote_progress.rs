use std::sync::Arc;

use chrono::{DateTime, Utc};
use mcq_core::model::{DocumentId, InstituteId, SectionId, SectionProgress, TestId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use storage::repository::{Document, DocumentStore, Filter, from_document, to_document};

use crate::Clock;
use crate::auth::AuthSession;
use crate::error::RemoteError;

pub const SECTION_PROGRESS_COLLECTION: &str = "section_progress";
pub const TEST_PROGRESS_COLLECTION: &str = "test_progress";

/// Remote mirror of one section's completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionProgressRecord {
    pub user_id: UserId,
    pub coaching_id: InstituteId,
    pub test_id: TestId,
    pub section_id: SectionId,
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Remote mirror of a whole-test completion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestProgressRecord {
    pub user_id: UserId,
    pub coaching_id: InstituteId,
    pub test_id: TestId,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the remote store holds for the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProgress {
    pub sections: Vec<SectionProgressRecord>,
    pub tests: Vec<TestProgressRecord>,
}

fn section_doc_id(
    user: &UserId,
    coaching_id: &InstituteId,
    test_id: &TestId,
    section_id: &SectionId,
) -> DocumentId {
    DocumentId::new(format!("{user}-{coaching_id}-{test_id}-{section_id}"))
}

fn test_doc_id(user: &UserId, coaching_id: &InstituteId, test_id: &TestId) -> DocumentId {
    DocumentId::new(format!("{user}-{coaching_id}-{test_id}"))
}

/// Per-user progress records in the remote store.
///
/// Every call needs a signed-in user and fails with
/// `RemoteError::NotAuthenticated` otherwise.
#[derive(Clone)]
pub struct RemoteProgressStore {
    clock: Clock,
    auth: AuthSession,
    documents: Arc<dyn DocumentStore>,
}

impl RemoteProgressStore {
    #[must_use]
    pub fn new(clock: Clock, auth: AuthSession, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            clock,
            auth,
            documents,
        }
    }

    /// Record a section's completion flag (create or merge).
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in or the write fails.
    pub async fn save_section_progress(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
        is_completed: bool,
    ) -> Result<(), RemoteError> {
        let user = self.auth.require_user()?;
        let now = self.clock.now();
        let record = SectionProgressRecord {
            user_id: user.clone(),
            coaching_id: coaching_id.clone(),
            test_id: test_id.clone(),
            section_id: section_id.clone(),
            is_completed,
            completed_at: is_completed.then_some(now),
            updated_at: now,
        };
        let id = section_doc_id(&user, coaching_id, test_id, section_id);
        self.documents
            .set_merge(SECTION_PROGRESS_COLLECTION, &id, to_document(&record)?)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in or the read fails.
    pub async fn is_section_completed(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
    ) -> Result<bool, RemoteError> {
        let user = self.auth.require_user()?;
        let id = section_doc_id(&user, coaching_id, test_id, section_id);
        let doc = self.documents.get(SECTION_PROGRESS_COLLECTION, &id).await?;
        Ok(flag(doc.as_ref(), "isCompleted"))
    }

    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in or the write fails.
    pub async fn save_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<(), RemoteError> {
        let user = self.auth.require_user()?;
        let now = self.clock.now();
        let record = TestProgressRecord {
            user_id: user.clone(),
            coaching_id: coaching_id.clone(),
            test_id: test_id.clone(),
            is_complete: true,
            completed_at: Some(now),
            updated_at: now,
        };
        let id = test_doc_id(&user, coaching_id, test_id);
        self.documents
            .set_merge(TEST_PROGRESS_COLLECTION, &id, to_document(&record)?)
            .await?;
        Ok(())
    }

    /// Flip an existing test marker back to incomplete.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in, the marker does not
    /// exist remotely, or the write fails.
    pub async fn unmark_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<(), RemoteError> {
        let user = self.auth.require_user()?;
        let id = test_doc_id(&user, coaching_id, test_id);
        let mut patch = Document::new();
        patch.insert("isComplete".into(), Value::Bool(false));
        patch.insert(
            "updatedAt".into(),
            serde_json::to_value(self.clock.now()).unwrap_or(Value::Null),
        );
        self.documents
            .update(TEST_PROGRESS_COLLECTION, &id, patch)
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in or the read fails.
    pub async fn is_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<bool, RemoteError> {
        let user = self.auth.require_user()?;
        let id = test_doc_id(&user, coaching_id, test_id);
        let doc = self.documents.get(TEST_PROGRESS_COLLECTION, &id).await?;
        Ok(flag(doc.as_ref(), "isComplete"))
    }

    /// Section completion over the records the remote store holds for a test.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in or the query fails.
    pub async fn test_progress(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<SectionProgress, RemoteError> {
        let user = self.auth.require_user()?;
        let docs = self
            .documents
            .query(
                SECTION_PROGRESS_COLLECTION,
                &[
                    Filter::eq("userId", user.as_str()),
                    Filter::eq("coachingId", coaching_id.as_str()),
                    Filter::eq("testId", test_id.as_str()),
                ],
            )
            .await?;
        let completed = docs
            .iter()
            .filter(|d| flag(Some(&d.data), "isCompleted"))
            .count();
        Ok(SectionProgress::from_remote(completed, docs.len()))
    }

    /// # Errors
    ///
    /// Returns `RemoteError` if no user is signed in, a query fails or a
    /// record does not decode.
    pub async fn all_user_progress(&self) -> Result<UserProgress, RemoteError> {
        let user = self.auth.require_user()?;
        let by_user = [Filter::eq("userId", user.as_str())];

        let sections = self
            .documents
            .query(SECTION_PROGRESS_COLLECTION, &by_user)
            .await?
            .into_iter()
            .map(|d| from_document(d.data))
            .collect::<Result<Vec<SectionProgressRecord>, _>>()?;
        let tests = self
            .documents
            .query(TEST_PROGRESS_COLLECTION, &by_user)
            .await?
            .into_iter()
            .map(|d| from_document(d.data))
            .collect::<Result<Vec<TestProgressRecord>, _>>()?;

        Ok(UserProgress { sections, tests })
    }
}

fn flag(doc: Option<&Document>, field: &str) -> bool {
    doc.and_then(|d| d.get(field))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::UserAccount;
    use mcq_core::time::fixed_clock;
    use storage::repository::InMemoryDocumentStore;

    fn signed_in() -> (RemoteProgressStore, InMemoryDocumentStore) {
        let docs = InMemoryDocumentStore::new();
        let auth = AuthSession::signed_in(UserAccount::new(UserId::new("u1")));
        (
            RemoteProgressStore::new(fixed_clock(), auth, Arc::new(docs.clone())),
            docs,
        )
    }

    fn ids() -> (InstituteId, TestId) {
        (InstituteId::new("inst1"), TestId::new("t1"))
    }

    #[tokio::test]
    async fn section_records_use_composite_ids() {
        let (remote, docs) = signed_in();
        let (c, t) = ids();
        remote
            .save_section_progress(&c, &t, &SectionId::new("s1"), true)
            .await
            .unwrap();

        let stored = docs
            .get(SECTION_PROGRESS_COLLECTION, &DocumentId::new("u1-inst1-t1-s1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["isCompleted"], true);
        assert!(stored.contains_key("completedAt"));
        assert!(remote
            .is_section_completed(&c, &t, &SectionId::new("s1"))
            .await
            .unwrap());
        assert!(!remote
            .is_section_completed(&c, &t, &SectionId::new("s2"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_progress_counts_remote_records() {
        let (remote, _) = signed_in();
        let (c, t) = ids();
        assert_eq!(remote.test_progress(&c, &t).await.unwrap().percentage, 0);

        for (section, done) in [("s1", true), ("s2", false), ("s3", true), ("s4", true)] {
            remote
                .save_section_progress(&c, &t, &SectionId::new(section), done)
                .await
                .unwrap();
        }
        let progress = remote.test_progress(&c, &t).await.unwrap();
        assert_eq!((progress.completed, progress.total, progress.percentage), (3, 4, 75));
    }

    #[tokio::test]
    async fn unmark_requires_an_existing_marker() {
        let (remote, _) = signed_in();
        let (c, t) = ids();
        assert!(remote.unmark_test_complete(&c, &t).await.is_err());

        remote.save_test_complete(&c, &t).await.unwrap();
        assert!(remote.is_test_complete(&c, &t).await.unwrap());
        remote.unmark_test_complete(&c, &t).await.unwrap();
        assert!(!remote.is_test_complete(&c, &t).await.unwrap());

        let all = remote.all_user_progress().await.unwrap();
        assert_eq!(all.tests.len(), 1);
        assert!(!all.tests[0].is_complete);
        assert!(all.tests[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn calls_without_a_user_are_rejected() {
        let remote = RemoteProgressStore::new(
            fixed_clock(),
            AuthSession::new(),
            Arc::new(InMemoryDocumentStore::new()),
        );
        let (c, t) = ids();
        assert!(matches!(
            remote.is_test_complete(&c, &t).await,
            Err(RemoteError::NotAuthenticated)
        ));
        assert!(matches!(
            remote.all_user_progress().await,
            Err(RemoteError::NotAuthenticated)
        ));
    }
}
