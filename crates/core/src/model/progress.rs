use serde::{Deserialize, Serialize};

use crate::model::ids::{InstituteId, QuestionId, SectionId, TestId};
use crate::model::question::Question;

//
// ─── LOCAL RECORDS ─────────────────────────────────────────────────────────────
//
// Field names follow the keys already present in browsers' local storage so
// existing state keeps loading.

/// A locally bookmarked question with a snapshot of its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    #[serde(rename = "id")]
    pub question_id: QuestionId,
    #[serde(rename = "question")]
    pub question_html: String,
    pub option_1: String,
    pub option_2: String,
    pub option_3: String,
    pub option_4: String,
    pub answer: String,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    #[serde(rename = "coachingId")]
    pub coaching_id: InstituteId,
    #[serde(rename = "testId")]
    pub test_id: TestId,
    #[serde(rename = "bookmarkedAt")]
    pub bookmarked_at: i64,
}

impl Bookmark {
    #[must_use]
    pub fn from_question(
        question: &Question,
        coaching_id: InstituteId,
        test_id: TestId,
        bookmarked_at: i64,
    ) -> Self {
        let [o1, o2, o3, o4] = question.options().clone();
        Self {
            question_id: question.id().clone(),
            question_html: question.question_html().to_owned(),
            option_1: o1,
            option_2: o2,
            option_3: o3,
            option_4: o4,
            answer: question.correct_option().to_string(),
            section_id: question.section_id().cloned(),
            coaching_id,
            test_id,
            bookmarked_at,
        }
    }

    #[must_use]
    pub fn matches(&self, question_id: &QuestionId, coaching_id: &InstituteId) -> bool {
        &self.question_id == question_id && &self.coaching_id == coaching_id
    }
}

/// Completion flag for one section of one test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCompletion {
    pub coaching_id: InstituteId,
    pub test_id: TestId,
    pub section_id: SectionId,
    pub is_completed: bool,
}

impl SectionCompletion {
    #[must_use]
    pub fn matches(&self, coaching_id: &InstituteId, test_id: &TestId, section_id: &SectionId) -> bool {
        &self.coaching_id == coaching_id && &self.test_id == test_id && &self.section_id == section_id
    }
}

/// Key of a completed test as stored locally: `"{coaching}-{test}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestCompletionKey {
    pub coaching_id: InstituteId,
    pub test_id: TestId,
}

impl TestCompletionKey {
    #[must_use]
    pub fn new(coaching_id: InstituteId, test_id: TestId) -> Self {
        Self {
            coaching_id,
            test_id,
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}-{}", self.coaching_id, self.test_id)
    }

    /// Split a stored key at its first `-`.
    ///
    /// Institute ids in the content dumps are numeric, so the first dash is
    /// always the separator.
    #[must_use]
    pub fn decode(raw: &str) -> Option<Self> {
        let (coaching, test) = raw.split_once('-')?;
        if coaching.is_empty() || test.is_empty() {
            return None;
        }
        Some(Self::new(InstituteId::new(coaching), TestId::new(test)))
    }
}

/// The last question a user looked at inside a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastViewedPointer {
    pub coaching_id: InstituteId,
    pub section_id: SectionId,
    pub question_index: usize,
    pub timestamp: i64,
}

//
// ─── PROGRESS MATH ─────────────────────────────────────────────────────────────
//

/// Completed-section ratio for a single test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub completed: usize,
    pub total: usize,
    pub percentage: u8,
}

impl SectionProgress {
    /// Compute progress; a zero total is treated as one so the ratio never divides by zero.
    #[must_use]
    pub fn compute(completed: usize, total_sections: usize) -> Self {
        let total = total_sections.max(1);
        Self {
            completed,
            total,
            percentage: percentage(completed, total),
        }
    }

    /// Progress as reported by the remote store, where an empty set is 0%.
    #[must_use]
    pub fn from_remote(completed: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            percentage(completed, total)
        };
        Self {
            completed,
            total,
            percentage,
        }
    }
}

/// Whether every section of a test is done; a test without sections never is.
#[must_use]
pub fn is_fully_completed(completed: usize, total: usize) -> bool {
    total > 0 && completed == total
}

/// Rounded percentage, clamped to 100.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentage(part: usize, whole: usize) -> u8 {
    if whole == 0 {
        return 0;
    }
    let pct = (100.0 * part as f64 / whole as f64).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Aggregate completion across an institute's test × section grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstituteStats {
    pub total_cells: usize,
    pub completed_cells: usize,
    pub overall_percentage: u8,
    pub completed_tests: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_of_five_is_forty_percent() {
        let p = SectionProgress::compute(2, 5);
        assert_eq!(p.percentage, 40);
        assert_eq!(p.total, 5);
    }

    #[test]
    fn zero_sections_do_not_divide_by_zero() {
        let p = SectionProgress::compute(0, 0);
        assert_eq!(p.percentage, 0);
        assert_eq!(p.total, 1);
        assert!(!is_fully_completed(0, 0));
    }

    #[test]
    fn rounding_matches_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
    }

    #[test]
    fn remote_progress_with_no_records_is_zero() {
        assert_eq!(SectionProgress::from_remote(0, 0).percentage, 0);
        assert_eq!(SectionProgress::from_remote(3, 4).percentage, 75);
    }

    #[test]
    fn completion_key_round_trips_and_splits_on_first_dash() {
        let key = TestCompletionKey::new(InstituteId::new("12"), TestId::new("abc-9"));
        let raw = key.encode();
        assert_eq!(raw, "12-abc-9");
        assert_eq!(TestCompletionKey::decode(&raw), Some(key));
        assert_eq!(TestCompletionKey::decode("nodash"), None);
    }

    #[test]
    fn local_records_use_storage_key_names() {
        let pointer = LastViewedPointer {
            coaching_id: InstituteId::new("inst1"),
            section_id: SectionId::new("secA"),
            question_index: 7,
            timestamp: 1,
        };
        let json = serde_json::to_value(&pointer).unwrap();
        assert_eq!(json["coachingId"], "inst1");
        assert_eq!(json["questionIndex"], 7);
    }
}
