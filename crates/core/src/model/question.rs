use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::ids::{QuestionId, SectionId, TestId};

//
// ─── OPTION INDEX ──────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OptionIndexError {
    #[error("option index must be between 1 and 4, got {0}")]
    OutOfRange(i64),

    #[error("unrecognized option label: {0:?}")]
    InvalidLabel(String),
}

/// One of the four answer slots of a question, numbered 1 through 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct OptionIndex(u8);

impl OptionIndex {
    pub const COUNT: usize = 4;

    /// Create an option index from its 1-based number.
    ///
    /// # Errors
    ///
    /// Returns `OptionIndexError::OutOfRange` unless `n` is in `1..=4`.
    pub fn new(n: u8) -> Result<Self, OptionIndexError> {
        if (1..=4).contains(&n) {
            Ok(Self(n))
        } else {
            Err(OptionIndexError::OutOfRange(i64::from(n)))
        }
    }

    /// Parse a stored answer such as `"3"`.
    ///
    /// # Errors
    ///
    /// Returns `OptionIndexError` if the value is not a number in `1..=4`.
    pub fn parse_answer(raw: &str) -> Result<Self, OptionIndexError> {
        let trimmed = raw.trim();
        let n: i64 = trimmed
            .parse()
            .map_err(|_| OptionIndexError::InvalidLabel(trimmed.to_owned()))?;
        u8::try_from(n)
            .map_err(|_| OptionIndexError::OutOfRange(n))
            .and_then(Self::new)
    }

    /// Map a letter label (`A`-`D`, either case) to its option.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'a' => Some(Self(1)),
            'b' => Some(Self(2)),
            'c' => Some(Self(3)),
            'd' => Some(Self(4)),
            _ => None,
        }
    }

    #[must_use]
    pub fn number(self) -> u8 {
        self.0
    }

    /// Upper-case letter label, `A` for option 1.
    #[must_use]
    pub fn letter(self) -> char {
        char::from(b'A' + self.0 - 1)
    }

    /// Zero-based slot in the options array.
    #[must_use]
    pub fn slot(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// All four options in display order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=4).map(Self)
    }
}

impl TryFrom<u8> for OptionIndex {
    type Error = OptionIndexError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OptionIndex> for u8 {
    fn from(value: OptionIndex) -> Self {
        value.0
    }
}

impl fmt::Display for OptionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question as loaded from the content dumps.
///
/// Questions are immutable for the lifetime of a viewing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "QuestionRecord")]
pub struct Question {
    id: QuestionId,
    test_id: TestId,
    section_id: Option<SectionId>,
    question_html: String,
    options: [String; 4],
    correct_option: OptionIndex,
    positive_marks: f64,
    negative_marks: f64,
    solution_html: Option<String>,
}

/// Serialized shape of a `Question`; decoding goes through the builders so
/// blank sections and solutions normalize the same way.
#[derive(Deserialize)]
struct QuestionRecord {
    id: QuestionId,
    test_id: TestId,
    #[serde(default)]
    section_id: Option<SectionId>,
    question_html: String,
    options: [String; 4],
    correct_option: OptionIndex,
    #[serde(default)]
    positive_marks: f64,
    #[serde(default)]
    negative_marks: f64,
    #[serde(default)]
    solution_html: Option<String>,
}

impl From<QuestionRecord> for Question {
    fn from(record: QuestionRecord) -> Self {
        Self::new(
            record.id,
            record.test_id,
            record.question_html,
            record.options,
            record.correct_option,
        )
        .with_section(record.section_id)
        .with_marks(record.positive_marks, record.negative_marks)
        .with_solution(record.solution_html)
    }
}

impl Question {
    #[must_use]
    pub fn new(
        id: QuestionId,
        test_id: TestId,
        question_html: impl Into<String>,
        options: [String; 4],
        correct_option: OptionIndex,
    ) -> Self {
        Self {
            id,
            test_id,
            section_id: None,
            question_html: question_html.into(),
            options,
            correct_option,
            positive_marks: 0.0,
            negative_marks: 0.0,
            solution_html: None,
        }
    }

    /// Blank section ids are treated as absent.
    #[must_use]
    pub fn with_section(mut self, section_id: Option<SectionId>) -> Self {
        self.section_id = section_id.filter(|s| !s.as_str().trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_marks(mut self, positive: f64, negative: f64) -> Self {
        self.positive_marks = positive;
        self.negative_marks = negative;
        self
    }

    #[must_use]
    pub fn with_solution(mut self, solution_html: Option<String>) -> Self {
        self.solution_html = solution_html.filter(|s| !s.trim().is_empty());
        self
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn test_id(&self) -> &TestId {
        &self.test_id
    }

    #[must_use]
    pub fn section_id(&self) -> Option<&SectionId> {
        self.section_id.as_ref()
    }

    /// Section bucket used for grouping, `general` when the question has none.
    #[must_use]
    pub fn section_or_general(&self) -> SectionId {
        self.section_id.clone().unwrap_or_else(SectionId::general)
    }

    #[must_use]
    pub fn question_html(&self) -> &str {
        &self.question_html
    }

    #[must_use]
    pub fn options(&self) -> &[String; 4] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, index: OptionIndex) -> &str {
        &self.options[index.slot()]
    }

    #[must_use]
    pub fn correct_option(&self) -> OptionIndex {
        self.correct_option
    }

    /// Answers are stored as text in the dumps (`"1"`..`"4"`), so the check
    /// compares the textual forms.
    #[must_use]
    pub fn is_correct(&self, selected: OptionIndex) -> bool {
        selected.to_string() == self.correct_option.to_string()
    }

    #[must_use]
    pub fn positive_marks(&self) -> f64 {
        self.positive_marks
    }

    #[must_use]
    pub fn negative_marks(&self) -> f64 {
        self.negative_marks
    }

    #[must_use]
    pub fn solution_html(&self) -> Option<&str> {
        self.solution_html.as_deref()
    }
}

#[cfg(test)]
pub(crate) fn sample_question(id: &str, section: Option<&str>, answer: u8) -> Question {
    Question::new(
        QuestionId::new(id),
        TestId::new("t1"),
        format!("<p>Question {id}</p>"),
        [
            "alpha".to_owned(),
            "beta".to_owned(),
            "gamma".to_owned(),
            "delta".to_owned(),
        ],
        OptionIndex::new(answer).unwrap(),
    )
    .with_section(section.map(SectionId::new))
    .with_marks(2.0, 0.5)
}
