use std::sync::Arc;

use mcq_core::Clock;
use mcq_core::model::{
    Bookmark, DocumentId, InstituteId, LastViewedPointer, Question, QuestionId,
    SectionCompletion, SectionId, SectionProgress, TestCompletionKey, TestId,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::KeyValueStore;
use crate::repository::StorageError;

pub const BOOKMARKS_KEY: &str = "mcq_bookmarks";
pub const COMPLETED_TESTS_KEY: &str = "completed_tests";
pub const SECTION_COMPLETION_KEY: &str = "section_completion";
pub const LAST_VIEWED_KEY: &str = "last_viewed_questions";
pub const VIEWED_NOTIFICATIONS_KEY: &str = "viewed_notifications";

/// Typed access to the progress records kept on this device.
///
/// Every record set lives under one key as a JSON array. Reads never fail:
/// missing or unreadable data is an empty list. Writes report failures.
#[derive(Clone)]
pub struct LocalProgressStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Clock,
}

impl LocalProgressStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            clock: Clock::default(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.kv.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(key, error = %err, "local state unavailable, reading as empty");
                return Vec::new();
            }
        };
        serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(key, error = %err, "corrupt local record set, reading as empty");
            Vec::new()
        })
    }

    fn write_list<T: Serialize>(&self, key: &str, values: &[T]) -> Result<(), StorageError> {
        let raw =
            serde_json::to_string(values).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.kv.set(key, raw)
    }

    //
    // ─── BOOKMARKS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.read_list(BOOKMARKS_KEY)
    }

    /// Bookmark a question; returns `false` if it was already bookmarked.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the bookmark list cannot be written.
    pub fn add_bookmark(
        &self,
        question: &Question,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<bool, StorageError> {
        let mut bookmarks = self.bookmarks();
        if bookmarks.iter().any(|b| b.matches(question.id(), coaching_id)) {
            return Ok(false);
        }
        bookmarks.push(Bookmark::from_question(
            question,
            coaching_id.clone(),
            test_id.clone(),
            self.clock.now_millis(),
        ));
        self.write_list(BOOKMARKS_KEY, &bookmarks)?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the bookmark list cannot be written.
    pub fn remove_bookmark(
        &self,
        question_id: &QuestionId,
        coaching_id: &InstituteId,
    ) -> Result<(), StorageError> {
        let mut bookmarks = self.bookmarks();
        bookmarks.retain(|b| !b.matches(question_id, coaching_id));
        self.write_list(BOOKMARKS_KEY, &bookmarks)
    }

    #[must_use]
    pub fn is_bookmarked(&self, question_id: &QuestionId, coaching_id: &InstituteId) -> bool {
        self.bookmarks()
            .iter()
            .any(|b| b.matches(question_id, coaching_id))
    }

    //
    // ─── COMPLETED TESTS ───────────────────────────────────────────────────────
    //

    fn completed_test_keys(&self) -> Vec<String> {
        self.read_list(COMPLETED_TESTS_KEY)
    }

    /// Completed-test markers; entries that do not decode are skipped.
    #[must_use]
    pub fn completed_tests(&self) -> Vec<TestCompletionKey> {
        self.completed_test_keys()
            .iter()
            .filter_map(|raw| {
                let decoded = TestCompletionKey::decode(raw);
                if decoded.is_none() {
                    warn!(key = %raw, "skipping malformed completed-test marker");
                }
                decoded
            })
            .collect()
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the marker list cannot be written.
    pub fn mark_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<(), StorageError> {
        let key = TestCompletionKey::new(coaching_id.clone(), test_id.clone()).encode();
        let mut keys = self.completed_test_keys();
        if keys.contains(&key) {
            return Ok(());
        }
        keys.push(key);
        self.write_list(COMPLETED_TESTS_KEY, &keys)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the marker list cannot be written.
    pub fn unmark_test_complete(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
    ) -> Result<(), StorageError> {
        let key = TestCompletionKey::new(coaching_id.clone(), test_id.clone()).encode();
        let mut keys = self.completed_test_keys();
        keys.retain(|k| k != &key);
        self.write_list(COMPLETED_TESTS_KEY, &keys)
    }

    #[must_use]
    pub fn is_test_complete(&self, coaching_id: &InstituteId, test_id: &TestId) -> bool {
        let key = TestCompletionKey::new(coaching_id.clone(), test_id.clone()).encode();
        self.completed_test_keys().contains(&key)
    }

    //
    // ─── SECTION COMPLETION ────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn section_completions(&self) -> Vec<SectionCompletion> {
        self.read_list(SECTION_COMPLETION_KEY)
    }

    /// Flip a section's completion flag and return the new value.
    ///
    /// A section with no record becomes completed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the completion list cannot be written.
    pub fn toggle_section_completion(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
    ) -> Result<bool, StorageError> {
        let mut completions = self.section_completions();
        let now_completed = match completions
            .iter_mut()
            .find(|c| c.matches(coaching_id, test_id, section_id))
        {
            Some(existing) => {
                existing.is_completed = !existing.is_completed;
                existing.is_completed
            }
            None => {
                completions.push(SectionCompletion {
                    coaching_id: coaching_id.clone(),
                    test_id: test_id.clone(),
                    section_id: section_id.clone(),
                    is_completed: true,
                });
                true
            }
        };
        self.write_list(SECTION_COMPLETION_KEY, &completions)?;
        Ok(now_completed)
    }

    #[must_use]
    pub fn is_section_completed(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        section_id: &SectionId,
    ) -> bool {
        self.section_completions()
            .iter()
            .find(|c| c.matches(coaching_id, test_id, section_id))
            .is_some_and(|c| c.is_completed)
    }

    #[must_use]
    pub fn test_section_progress(
        &self,
        coaching_id: &InstituteId,
        test_id: &TestId,
        total_sections: usize,
    ) -> SectionProgress {
        let completed = self
            .section_completions()
            .iter()
            .filter(|c| &c.coaching_id == coaching_id && &c.test_id == test_id && c.is_completed)
            .count();
        SectionProgress::compute(completed, total_sections)
    }

    //
    // ─── LAST VIEWED ───────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn last_viewed_pointers(&self) -> Vec<LastViewedPointer> {
        self.read_list(LAST_VIEWED_KEY)
    }

    /// Replace the pointer for `(coaching, section)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the pointer list cannot be written.
    pub fn save_last_viewed(
        &self,
        coaching_id: &InstituteId,
        section_id: &SectionId,
        question_index: usize,
    ) -> Result<(), StorageError> {
        let mut pointers = self.last_viewed_pointers();
        pointers.retain(|p| !(&p.coaching_id == coaching_id && &p.section_id == section_id));
        pointers.push(LastViewedPointer {
            coaching_id: coaching_id.clone(),
            section_id: section_id.clone(),
            question_index,
            timestamp: self.clock.now_millis(),
        });
        self.write_list(LAST_VIEWED_KEY, &pointers)
    }

    #[must_use]
    pub fn last_viewed(&self, coaching_id: &InstituteId, section_id: &SectionId) -> Option<usize> {
        self.last_viewed_pointers()
            .into_iter()
            .find(|p| &p.coaching_id == coaching_id && &p.section_id == section_id)
            .map(|p| p.question_index)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the pointer list cannot be written.
    pub fn clear_last_viewed(
        &self,
        coaching_id: &InstituteId,
        section_id: &SectionId,
    ) -> Result<(), StorageError> {
        let mut pointers = self.last_viewed_pointers();
        pointers.retain(|p| !(&p.coaching_id == coaching_id && &p.section_id == section_id));
        self.write_list(LAST_VIEWED_KEY, &pointers)
    }

    //
    // ─── VIEWED NOTIFICATIONS ──────────────────────────────────────────────────
    //

    #[must_use]
    pub fn viewed_notifications(&self) -> Vec<DocumentId> {
        self.read_list(VIEWED_NOTIFICATIONS_KEY)
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the id list cannot be written.
    pub fn mark_notification_viewed(&self, id: &DocumentId) -> Result<(), StorageError> {
        let mut viewed = self.viewed_notifications();
        if viewed.contains(id) {
            return Ok(());
        }
        viewed.push(id.clone());
        self.write_list(VIEWED_NOTIFICATIONS_KEY, &viewed)
    }

    /// Forget which notifications were viewed here (on sign-out).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the key cannot be removed.
    pub fn clear_viewed_notifications(&self) -> Result<(), StorageError> {
        self.kv.remove(VIEWED_NOTIFICATIONS_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryKeyValueStore;
    use mcq_core::model::OptionIndex;
    use mcq_core::time::{fixed_clock, fixed_now};

    fn store() -> (LocalProgressStore, MemoryKeyValueStore) {
        let kv = MemoryKeyValueStore::new();
        let store = LocalProgressStore::new(Arc::new(kv.clone())).with_clock(fixed_clock());
        (store, kv)
    }

    fn question(id: &str) -> Question {
        Question::new(
            QuestionId::new(id),
            TestId::new("t1"),
            "<p>2 + 2?</p>",
            ["3".into(), "4".into(), "5".into(), "6".into()],
            OptionIndex::new(2).unwrap(),
        )
    }

    fn ids() -> (InstituteId, TestId, SectionId) {
        (
            InstituteId::new("inst1"),
            TestId::new("t1"),
            SectionId::new("secA"),
        )
    }

    #[test]
    fn toggling_twice_restores_the_flag() {
        let (store, _) = store();
        let (c, t, s) = ids();
        assert!(!store.is_section_completed(&c, &t, &s));
        assert!(store.toggle_section_completion(&c, &t, &s).unwrap());
        assert!(store.is_section_completed(&c, &t, &s));
        assert!(!store.toggle_section_completion(&c, &t, &s).unwrap());
        assert!(!store.is_section_completed(&c, &t, &s));
    }

    #[test]
    fn two_of_five_sections_is_forty_percent() {
        let (store, _) = store();
        let (c, t, _) = ids();
        store.toggle_section_completion(&c, &t, &SectionId::new("a")).unwrap();
        store.toggle_section_completion(&c, &t, &SectionId::new("b")).unwrap();
        let progress = store.test_section_progress(&c, &t, 5);
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.percentage, 40);
        assert_eq!(store.test_section_progress(&c, &TestId::new("other"), 0).percentage, 0);
    }

    #[test]
    fn completed_test_markers_are_unique() {
        let (store, kv) = store();
        let (c, t, _) = ids();
        store.mark_test_complete(&c, &t).unwrap();
        store.mark_test_complete(&c, &t).unwrap();
        assert!(store.is_test_complete(&c, &t));
        assert_eq!(kv.get(COMPLETED_TESTS_KEY).unwrap().as_deref(), Some(r#"["inst1-t1"]"#));

        store.unmark_test_complete(&c, &t).unwrap();
        assert!(!store.is_test_complete(&c, &t));
        assert!(store.completed_tests().is_empty());
    }

    #[test]
    fn bookmarks_dedupe_by_question_and_institute() {
        let (store, _) = store();
        let (c, t, _) = ids();
        let q = question("q1");
        assert!(store.add_bookmark(&q, &c, &t).unwrap());
        assert!(!store.add_bookmark(&q, &c, &t).unwrap());
        assert!(store.add_bookmark(&q, &InstituteId::new("inst2"), &t).unwrap());

        let bookmarks = store.bookmarks();
        assert_eq!(bookmarks.len(), 2);
        assert_eq!(bookmarks[0].bookmarked_at, fixed_now().timestamp_millis());
        assert_eq!(bookmarks[0].answer, "2");

        store.remove_bookmark(q.id(), &c).unwrap();
        assert!(!store.is_bookmarked(q.id(), &c));
        assert!(store.is_bookmarked(q.id(), &InstituteId::new("inst2")));
    }

    #[test]
    fn last_viewed_keeps_one_pointer_per_section() {
        let (store, _) = store();
        let (c, _, s) = ids();
        store.save_last_viewed(&c, &s, 3).unwrap();
        store.save_last_viewed(&c, &s, 7).unwrap();
        assert_eq!(store.last_viewed(&c, &s), Some(7));
        assert_eq!(store.last_viewed_pointers().len(), 1);

        store.clear_last_viewed(&c, &s).unwrap();
        assert_eq!(store.last_viewed(&c, &s), None);
    }

    #[test]
    fn corrupt_values_read_as_empty() {
        let (store, kv) = store();
        kv.set(BOOKMARKS_KEY, "{oops".into()).unwrap();
        kv.set(SECTION_COMPLETION_KEY, r#"{"not":"a list"}"#.into()).unwrap();
        assert!(store.bookmarks().is_empty());
        assert!(store.section_completions().is_empty());

        let (c, t, s) = ids();
        assert!(store.toggle_section_completion(&c, &t, &s).unwrap());
    }

    #[test]
    fn reads_existing_browser_state() {
        let (store, kv) = store();
        kv.set(
            SECTION_COMPLETION_KEY,
            r#"[{"coachingId":"inst1","testId":"t1","sectionId":"secA","isCompleted":true}]"#.into(),
        )
        .unwrap();
        let (c, t, s) = ids();
        assert!(store.is_section_completed(&c, &t, &s));
    }

    #[test]
    fn viewed_notifications_clear_on_request() {
        let (store, _) = store();
        let id = DocumentId::new("n1");
        store.mark_notification_viewed(&id).unwrap();
        store.mark_notification_viewed(&id).unwrap();
        assert_eq!(store.viewed_notifications(), vec![id]);
        store.clear_viewed_notifications().unwrap();
        assert!(store.viewed_notifications().is_empty());
    }
}
