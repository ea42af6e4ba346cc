use std::sync::{Arc, PoisonError, RwLock};

use mcq_core::model::{
    DocumentId, InstituteId, Question, QuestionId, SavedQuestion, SavedQuestionData,
    SavedQuestionMetadata, TestId,
};
use storage::repository::{DocumentStore, Filter, StoredDocument, from_document, to_document};
use tracing::{debug, info, warn};

use crate::Clock;
use crate::auth::AuthSession;
use crate::error::SavedQuestionsError;

pub const SAVED_QUESTIONS_COLLECTION: &str = "saved_questions";

/// Result of a save request.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Saved(SavedQuestion),
    /// The user had already saved this question; nothing was written.
    AlreadySaved(SavedQuestion),
}

impl SaveOutcome {
    #[must_use]
    pub fn question(&self) -> &SavedQuestion {
        match self {
            Self::Saved(q) | Self::AlreadySaved(q) => q,
        }
    }

    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

fn decode(doc: StoredDocument) -> Option<SavedQuestion> {
    match from_document::<SavedQuestionData>(doc.data) {
        Ok(data) => Some(SavedQuestion { id: doc.id, data }),
        Err(err) => {
            warn!(id = %doc.id, error = %err, "skipping unreadable saved question");
            None
        }
    }
}

fn newest_first(mut questions: Vec<SavedQuestion>) -> Vec<SavedQuestion> {
    questions.sort_by(|a, b| b.data.saved_at.cmp(&a.data.saved_at));
    questions
}

//
// ─── CACHE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Default)]
enum CacheState {
    #[default]
    Uninitialized,
    Ready(Vec<SavedQuestion>),
}

/// In-memory copy of the signed-in user's saved questions.
///
/// Clones share state. Until `initialize` has run the cache answers nothing
/// and callers go to the remote store.
#[derive(Debug, Clone, Default)]
pub struct SavedQuestionsCache {
    state: Arc<RwLock<CacheState>>,
}

impl SavedQuestionsCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            CacheState::Ready(_)
        )
    }

    /// Load the full saved set once; later calls are no-ops.
    ///
    /// A failed fetch still initializes the cache, empty.
    pub async fn initialize(&self, service: &SavedQuestionsService) -> usize {
        if self.is_initialized() {
            return self.len();
        }
        let loaded = service.list_saved().await.unwrap_or_else(|err| {
            warn!(error = %err, "saved questions unavailable, starting with an empty cache");
            Vec::new()
        });
        let count = loaded.len();
        self.replace(loaded);
        info!(count, "saved-questions cache initialized");
        count
    }

    /// Re-query the remote store and replace the cached set.
    ///
    /// # Errors
    ///
    /// Returns `SavedQuestionsError::Remote` if the query fails; the cache is
    /// left untouched.
    pub async fn refresh(&self, service: &SavedQuestionsService) -> Result<usize, SavedQuestionsError> {
        let loaded = service.list_saved().await?;
        let count = loaded.len();
        self.replace(loaded);
        debug!(count, "saved-questions cache refreshed");
        Ok(count)
    }

    fn replace(&self, questions: Vec<SavedQuestion>) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = CacheState::Ready(questions);
    }

    /// Back to uninitialized, e.g. after sign-out.
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = CacheState::Uninitialized;
    }

    /// `None` while uninitialized.
    #[must_use]
    pub fn lookup(&self, question_id: &QuestionId, coaching_id: &InstituteId) -> Option<bool> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            CacheState::Uninitialized => None,
            CacheState::Ready(items) => Some(items.iter().any(|q| q.matches(question_id, coaching_id))),
        }
    }

    #[must_use]
    pub fn is_saved(&self, question_id: &QuestionId, coaching_id: &InstituteId) -> bool {
        self.lookup(question_id, coaching_id).unwrap_or(false)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            CacheState::Uninitialized => 0,
            CacheState::Ready(items) => items.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached questions, optionally for one institute.
    #[must_use]
    pub fn list(&self, coaching_id: Option<&InstituteId>) -> Vec<SavedQuestion> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            CacheState::Uninitialized => Vec::new(),
            CacheState::Ready(items) => items
                .iter()
                .filter(|q| coaching_id.is_none_or(|c| &q.data.coaching_id == c))
                .cloned()
                .collect(),
        }
    }

    /// Add at the front unless the question is already cached.
    pub fn insert(&self, question: SavedQuestion) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let CacheState::Ready(items) = &mut *guard {
            if !items
                .iter()
                .any(|q| q.matches(&question.data.question_id, &question.data.coaching_id))
            {
                items.insert(0, question);
            }
        }
    }

    pub fn remove(&self, question_id: &QuestionId, coaching_id: &InstituteId) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let CacheState::Ready(items) = &mut *guard {
            items.retain(|q| !q.matches(question_id, coaching_id));
        }
    }

    pub fn remove_document(&self, id: &DocumentId) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let CacheState::Ready(items) = &mut *guard {
            items.retain(|q| &q.id != id);
        }
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Saved questions in the remote store, plus the shared cache.
#[derive(Clone)]
pub struct SavedQuestionsService {
    clock: Clock,
    auth: AuthSession,
    documents: Arc<dyn DocumentStore>,
    cache: SavedQuestionsCache,
}

impl SavedQuestionsService {
    #[must_use]
    pub fn new(
        clock: Clock,
        auth: AuthSession,
        documents: Arc<dyn DocumentStore>,
        cache: SavedQuestionsCache,
    ) -> Self {
        Self {
            clock,
            auth,
            documents,
            cache,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &SavedQuestionsCache {
        &self.cache
    }

    /// Save a question for the signed-in user. An initialized cache picks up
    /// the stored record.
    ///
    /// # Errors
    ///
    /// Returns `SavedQuestionsError::CapabilityDenied` for signed-out or
    /// anonymous users, before touching the store.
    /// Returns `SavedQuestionsError::Remote` if the store fails.
    pub async fn save_question(
        &self,
        question: &Question,
        coaching_id: &InstituteId,
        test_id: &TestId,
        metadata: SavedQuestionMetadata,
    ) -> Result<SaveOutcome, SavedQuestionsError> {
        if !self.auth.can_save_questions() {
            return Err(SavedQuestionsError::CapabilityDenied);
        }
        let user = self.auth.require_user()?;

        let existing = self
            .documents
            .query(
                SAVED_QUESTIONS_COLLECTION,
                &[
                    Filter::eq("userId", user.as_str()),
                    Filter::eq("questionId", question.id().as_str()),
                    Filter::eq("coachingId", coaching_id.as_str()),
                ],
            )
            .await?;
        if let Some(found) = existing.into_iter().find_map(decode) {
            debug!(question_id = %question.id(), "question already saved");
            self.cache.insert(found.clone());
            return Ok(SaveOutcome::AlreadySaved(found));
        }

        let data = SavedQuestionData::snapshot(
            user,
            question,
            coaching_id.clone(),
            test_id.clone(),
            metadata,
            self.clock.now(),
        );
        let id = self
            .documents
            .add(SAVED_QUESTIONS_COLLECTION, to_document(&data)?)
            .await?;
        info!(question_id = %question.id(), %id, "question saved");
        let saved = SavedQuestion { id, data };
        self.cache.insert(saved.clone());
        Ok(SaveOutcome::Saved(saved))
    }

    /// Save remotely, then record the result in the cache.
    ///
    /// # Errors
    ///
    /// Same as `save_question`; the cache is untouched on error.
    pub async fn save_and_cache(
        &self,
        question: &Question,
        coaching_id: &InstituteId,
        test_id: &TestId,
        metadata: SavedQuestionMetadata,
    ) -> Result<SaveOutcome, SavedQuestionsError> {
        self.save_question(question, coaching_id, test_id, metadata)
            .await
    }

    /// The signed-in user's saved questions, newest first; empty when signed out.
    ///
    /// # Errors
    ///
    /// Returns `SavedQuestionsError::Remote` if the query fails.
    pub async fn list_saved(&self) -> Result<Vec<SavedQuestion>, SavedQuestionsError> {
        let Some(user) = self.auth.user_id() else {
            return Ok(Vec::new());
        };
        let docs = self
            .documents
            .query(
                SAVED_QUESTIONS_COLLECTION,
                &[Filter::eq("userId", user.as_str())],
            )
            .await?;
        Ok(newest_first(docs.into_iter().filter_map(decode).collect()))
    }

    /// Every user's saved questions, newest first; empty if the store fails.
    pub async fn list_all_saved(&self) -> Vec<SavedQuestion> {
        match self.documents.query(SAVED_QUESTIONS_COLLECTION, &[]).await {
            Ok(docs) => newest_first(docs.into_iter().filter_map(decode).collect()),
            Err(err) => {
                warn!(error = %err, "shared saved questions unavailable");
                Vec::new()
            }
        }
    }

    /// # Errors
    ///
    /// Returns `SavedQuestionsError::Remote` if the delete fails.
    pub async fn remove_saved(&self, id: &DocumentId) -> Result<(), SavedQuestionsError> {
        self.documents
            .delete(SAVED_QUESTIONS_COLLECTION, id)
            .await?;
        Ok(())
    }

    /// Delete remotely, then drop the entry from the cache.
    ///
    /// # Errors
    ///
    /// Returns `SavedQuestionsError::Remote` if the delete fails; the cache is
    /// untouched on error.
    pub async fn remove_and_uncache(&self, saved: &SavedQuestion) -> Result<(), SavedQuestionsError> {
        self.remove_saved(&saved.id).await?;
        self.cache.remove_document(&saved.id);
        self.cache
            .remove(&saved.data.question_id, &saved.data.coaching_id);
        Ok(())
    }

    /// Cache first once initialized, otherwise a remote query. Failures read
    /// as "not saved".
    pub async fn is_saved(&self, question_id: &QuestionId, coaching_id: &InstituteId) -> bool {
        if let Some(hit) = self.cache.lookup(question_id, coaching_id) {
            return hit;
        }
        let Some(user) = self.auth.user_id() else {
            return false;
        };
        match self
            .documents
            .query(
                SAVED_QUESTIONS_COLLECTION,
                &[
                    Filter::eq("userId", user.as_str()),
                    Filter::eq("questionId", question_id.as_str()),
                    Filter::eq("coachingId", coaching_id.as_str()),
                ],
            )
            .await
        {
            Ok(docs) => !docs.is_empty(),
            Err(err) => {
                warn!(%question_id, error = %err, "saved check failed");
                false
            }
        }
    }
}
