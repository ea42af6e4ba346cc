use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{DocumentId, InstituteId, QuestionId, SectionId, TestId, UserId};
use crate::model::question::Question;

/// Optional display labels attached to a saved question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuestionMetadata {
    pub institute_name: Option<String>,
    pub subject: Option<String>,
    pub section_name: Option<String>,
    pub test_name: Option<String>,
}

impl SavedQuestionMetadata {
    /// Drop blank labels so only meaningful values are persisted.
    #[must_use]
    pub fn non_empty(self) -> Self {
        fn keep(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }
        Self {
            institute_name: keep(self.institute_name),
            subject: keep(self.subject),
            section_name: keep(self.section_name),
            test_name: keep(self.test_name),
        }
    }
}

/// Body of a saved-question document, keyed the way the backend stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedQuestionData {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "questionId")]
    pub question_id: QuestionId,
    #[serde(rename = "coachingId")]
    pub coaching_id: InstituteId,
    #[serde(rename = "testId")]
    pub test_id: TestId,
    #[serde(rename = "question")]
    pub question_html: String,
    pub option_1: String,
    pub option_2: String,
    pub option_3: String,
    pub option_4: String,
    pub answer: String,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    #[serde(default)]
    pub positive_marks: f64,
    #[serde(default)]
    pub negative_marks: f64,
    #[serde(rename = "solution_text", default)]
    pub solution_html: String,
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
    #[serde(rename = "instituteName", default, skip_serializing_if = "Option::is_none")]
    pub institute_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(rename = "sectionName", default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(rename = "testName", default, skip_serializing_if = "Option::is_none")]
    pub test_name: Option<String>,
}

impl SavedQuestionData {
    #[must_use]
    pub fn snapshot(
        user_id: UserId,
        question: &Question,
        coaching_id: InstituteId,
        test_id: TestId,
        metadata: SavedQuestionMetadata,
        saved_at: DateTime<Utc>,
    ) -> Self {
        let metadata = metadata.non_empty();
        let [o1, o2, o3, o4] = question.options().clone();
        Self {
            user_id,
            question_id: question.id().clone(),
            coaching_id,
            test_id,
            question_html: question.question_html().to_owned(),
            option_1: o1,
            option_2: o2,
            option_3: o3,
            option_4: o4,
            answer: question.correct_option().to_string(),
            section_id: question.section_id().cloned(),
            positive_marks: question.positive_marks(),
            negative_marks: question.negative_marks(),
            solution_html: question.solution_html().unwrap_or_default().to_owned(),
            saved_at,
            institute_name: metadata.institute_name,
            subject: metadata.subject,
            section_name: metadata.section_name,
            test_name: metadata.test_name,
        }
    }
}

/// A saved question together with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedQuestion {
    pub id: DocumentId,
    pub data: SavedQuestionData,
}

impl SavedQuestion {
    #[must_use]
    pub fn matches(&self, question_id: &QuestionId, coaching_id: &InstituteId) -> bool {
        &self.data.question_id == question_id && &self.data.coaching_id == coaching_id
    }
}

//
// ─── BROWSING HELPERS ──────────────────────────────────────────────────────────
//

/// Keep questions whose subject, section name or section id equals `subject`.
/// An empty filter keeps everything.
#[must_use]
pub fn filter_by_subject(questions: &[SavedQuestion], subject: &str) -> Vec<SavedQuestion> {
    if subject.is_empty() {
        return questions.to_vec();
    }
    questions
        .iter()
        .filter(|q| {
            q.data.subject.as_deref() == Some(subject)
                || q.data.section_name.as_deref() == Some(subject)
                || q.data.section_id.as_ref().map(SectionId::as_str) == Some(subject)
        })
        .cloned()
        .collect()
}

/// Keep questions whose institute name or institute id equals `institute`.
#[must_use]
pub fn filter_by_institute(questions: &[SavedQuestion], institute: &str) -> Vec<SavedQuestion> {
    if institute.is_empty() {
        return questions.to_vec();
    }
    questions
        .iter()
        .filter(|q| {
            q.data.institute_name.as_deref() == Some(institute)
                || q.data.coaching_id.as_str() == institute
        })
        .cloned()
        .collect()
}

/// Keep questions worth exactly `marks` positive marks; zero keeps everything.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn filter_by_marks(questions: &[SavedQuestion], marks: f64) -> Vec<SavedQuestion> {
    if marks == 0.0 {
        return questions.to_vec();
    }
    questions
        .iter()
        .filter(|q| q.data.positive_marks == marks)
        .cloned()
        .collect()
}

/// Case-insensitive search over question text, test name and section name.
#[must_use]
pub fn search(questions: &[SavedQuestion], term: &str) -> Vec<SavedQuestion> {
    if term.is_empty() {
        return questions.to_vec();
    }
    let term = term.to_lowercase();
    let contains = |value: Option<&str>| value.is_some_and(|v| v.to_lowercase().contains(&term));
    questions
        .iter()
        .filter(|q| {
            contains(Some(&q.data.question_html))
                || contains(q.data.test_name.as_deref())
                || contains(q.data.section_name.as_deref())
        })
        .cloned()
        .collect()
}

/// Sorted distinct subject labels (subject, section name and section id).
#[must_use]
pub fn unique_subjects(questions: &[SavedQuestion]) -> Vec<String> {
    let mut set = BTreeSet::new();
    for q in questions {
        set.extend(q.data.subject.clone());
        set.extend(q.data.section_name.clone());
        set.extend(q.data.section_id.as_ref().map(ToString::to_string));
    }
    set.into_iter().collect()
}

/// Sorted distinct institute labels (name and id).
#[must_use]
pub fn unique_institutes(questions: &[SavedQuestion]) -> Vec<String> {
    let mut set = BTreeSet::new();
    for q in questions {
        set.extend(q.data.institute_name.clone());
        set.insert(q.data.coaching_id.to_string());
    }
    set.into_iter().collect()
}

/// Ascending distinct positive-mark values.
#[must_use]
pub fn unique_marks(questions: &[SavedQuestion]) -> Vec<f64> {
    let mut marks: Vec<f64> = questions.iter().map(|q| q.data.positive_marks).collect();
    marks.sort_by(f64::total_cmp);
    marks.dedup();
    marks
}
