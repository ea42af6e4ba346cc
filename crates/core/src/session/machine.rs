use std::fmt;

use thiserror::Error;

use crate::keyboard::{ExamControls, LockCell};
use crate::model::{OptionIndex, Question, SectionId};

use super::quick::{
    AutoAdvance, FeedbackTone, QuickFeedback, QuickModeConfig, SessionScore, vibration_pattern,
};
use super::sections::{SectionGroup, group_by_section};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session has no questions")]
    Empty,

    #[error("question index {index} is out of range for {len} questions")]
    OutOfRange { index: usize, len: usize },

    #[error("section {0} has no questions in this session")]
    UnknownSection(SectionId),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Observable state of a viewing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No questions were loaded; terminal.
    Empty,
    Browsing { index: usize },
    Answered { index: usize, selected: OptionIndex },
}

/// Where a new session should open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartPosition {
    /// 1-based question number requested explicitly (e.g. from a link).
    pub requested_question: Option<usize>,
    /// 0-based index from the stored last-viewed pointer.
    pub last_viewed: Option<usize>,
}

impl StartPosition {
    #[must_use]
    pub fn last_viewed(index: Option<usize>) -> Self {
        Self {
            requested_question: None,
            last_viewed: index,
        }
    }

    /// Resolve to a 0-based index; out-of-range candidates fall back to 0.
    #[must_use]
    pub fn resolve(self, len: usize) -> usize {
        if let Some(n) = self.requested_question {
            return match n.checked_sub(1) {
                Some(index) if index < len => index,
                _ => 0,
            };
        }
        self.last_viewed.filter(|&i| i < len).unwrap_or(0)
    }
}

/// Result of a selection that was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub selected: OptionIndex,
    pub correct: bool,
    /// Present only in quick mode.
    pub quick: Option<QuickFeedback>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// Single-question-at-a-time navigation over a fixed list of questions.
///
/// The selected option is cleared whenever the index changes; once set for an
/// index it stays until the user navigates away.
pub struct QuestionSession {
    questions: Vec<Question>,
    sections: Vec<SectionGroup>,
    current: usize,
    selected: Option<OptionIndex>,
    solution_visible: bool,
    quick_mode: QuickModeConfig,
    score: SessionScore,
    generation: u64,
    lock: LockCell,
}

impl QuestionSession {
    #[must_use]
    pub fn new(questions: Vec<Question>) -> Self {
        Self::resume(questions, StartPosition::default())
    }

    /// Open a session at the resolved start position.
    #[must_use]
    pub fn resume(questions: Vec<Question>, start: StartPosition) -> Self {
        let current = start.resolve(questions.len());
        let sections = group_by_section(&questions);
        Self {
            questions,
            sections,
            current,
            selected: None,
            solution_visible: false,
            quick_mode: QuickModeConfig::default(),
            score: SessionScore::default(),
            generation: 0,
            lock: LockCell::new(false),
        }
    }

    #[must_use]
    pub fn with_quick_mode(mut self, config: QuickModeConfig) -> Self {
        self.quick_mode = config;
        self
    }

    pub fn set_quick_mode(&mut self, config: QuickModeConfig) {
        self.quick_mode = config;
    }

    #[must_use]
    pub fn quick_mode(&self) -> &QuickModeConfig {
        &self.quick_mode
    }

    /// Replace the question list, regrouping sections and restarting at 0.
    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.sections = group_by_section(&questions);
        self.questions = questions;
        self.current = 0;
        self.reset_question_state();
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.questions.is_empty() {
            return SessionState::Empty;
        }
        match self.selected {
            Some(selected) => SessionState::Answered {
                index: self.current,
                selected,
            },
            None => SessionState::Browsing {
                index: self.current,
            },
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn selected_option(&self) -> Option<OptionIndex> {
        self.selected
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.selected.is_some()
    }

    #[must_use]
    pub fn solution_visible(&self) -> bool {
        self.solution_visible
    }

    #[must_use]
    pub fn score(&self) -> SessionScore {
        self.score
    }

    #[must_use]
    pub fn section_groups(&self) -> &[SectionGroup] {
        &self.sections
    }

    #[must_use]
    pub fn current_section(&self) -> Option<SectionId> {
        self.current_question().map(Question::section_or_general)
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.current == 0
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.current + 1 >= self.questions.len()
    }

    /// Lock cell shared with the keyboard binding for this session.
    #[must_use]
    pub fn lock_cell(&self) -> LockCell {
        self.lock.clone()
    }

    /// Token that changes whenever the current question changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Lock in an answer for the current question.
    ///
    /// Ignored (returns `None`) when the question is already answered or the
    /// session is empty.
    pub fn select_option(&mut self, option: OptionIndex) -> Option<AnswerFeedback> {
        if self.selected.is_some() {
            return None;
        }
        let correct = self.current_question()?.is_correct(option);
        self.selected = Some(option);
        self.lock.set(true);

        let quick = if self.quick_mode.enabled {
            self.score.record(correct);
            Some(self.quick_feedback(correct))
        } else {
            None
        };

        Some(AnswerFeedback {
            selected: option,
            correct,
            quick,
        })
    }

    /// Move forward; a no-op on the last question.
    pub fn next(&mut self) -> bool {
        if self.questions.is_empty() || self.is_last() {
            return false;
        }
        self.move_to(self.current + 1);
        true
    }

    /// Move back; a no-op on the first question.
    pub fn prev(&mut self) -> bool {
        if self.questions.is_empty() || self.current == 0 {
            return false;
        }
        self.move_to(self.current - 1);
        true
    }

    /// Jump to any question, e.g. from the question grid.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` for an empty session and
    /// `SessionError::OutOfRange` for an invalid index; the state is unchanged.
    pub fn jump_to(&mut self, index: usize) -> Result<(), SessionError> {
        if self.questions.is_empty() {
            return Err(SessionError::Empty);
        }
        if index >= self.questions.len() {
            return Err(SessionError::OutOfRange {
                index,
                len: self.questions.len(),
            });
        }
        self.move_to(index);
        Ok(())
    }

    /// Jump to the first question of a section tab.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownSection` if no question belongs to it.
    pub fn jump_to_section(&mut self, section_id: &SectionId) -> Result<(), SessionError> {
        let index = self
            .sections
            .iter()
            .find(|g| &g.section_id == section_id)
            .and_then(SectionGroup::first_index)
            .ok_or_else(|| SessionError::UnknownSection(section_id.clone()))?;
        self.jump_to(index)
    }

    pub fn toggle_solution(&mut self) -> bool {
        if self.questions.is_empty() {
            return false;
        }
        self.solution_visible = !self.solution_visible;
        self.solution_visible
    }

    /// Honor a quick-mode ticket if the session is still where it was issued.
    pub fn apply_auto_advance(&mut self, ticket: AutoAdvance) -> bool {
        if !self.is_ticket_current(ticket) {
            return false;
        }
        self.next()
    }

    #[must_use]
    pub fn is_ticket_current(&self, ticket: AutoAdvance) -> bool {
        ticket.generation == self.generation && self.selected.is_some()
    }

    fn quick_feedback(&self, correct: bool) -> QuickFeedback {
        let config = &self.quick_mode;
        let tone = if correct {
            FeedbackTone::Correct
        } else {
            FeedbackTone::Incorrect
        };
        QuickFeedback {
            tone: config.sound_enabled.then_some(tone),
            vibration: config.vibration_enabled.then(|| vibration_pattern(correct)),
            download_wrong: config.download_wrong_enabled && !correct,
            auto_advance: config.auto_next_enabled.then_some(AutoAdvance {
                generation: self.generation,
                delay: config.auto_next_delay,
            }),
        }
    }

    fn move_to(&mut self, index: usize) {
        self.current = index;
        self.reset_question_state();
    }

    fn reset_question_state(&mut self) {
        self.selected = None;
        self.solution_visible = false;
        self.generation = self.generation.wrapping_add(1);
        self.lock.set(false);
    }
}

impl ExamControls for QuestionSession {
    fn on_next(&mut self) -> bool {
        self.next()
    }

    fn on_prev(&mut self) -> bool {
        self.prev()
    }

    fn on_select_option(&mut self, option: OptionIndex) -> Option<AnswerFeedback> {
        self.select_option(option)
    }
}

impl fmt::Debug for QuestionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionSession")
            .field("questions_len", &self.questions.len())
            .field("sections_len", &self.sections.len())
            .field("current", &self.current)
            .field("selected", &self.selected)
            .field("solution_visible", &self.solution_visible)
            .field("quick_mode", &self.quick_mode.enabled)
            .field("score", &self.score)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::ExamKeyboard;
    use crate::model::question::sample_question;

    fn questions(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                let section = if i % 2 == 0 { "even" } else { "odd" };
                sample_question(&format!("q{i}"), Some(section), 1)
            })
            .collect()
    }

    fn opt(n: u8) -> OptionIndex {
        OptionIndex::new(n).unwrap()
    }

    #[test]
    fn starts_at_zero_browsing() {
        let session = QuestionSession::new(questions(3));
        assert_eq!(session.state(), SessionState::Browsing { index: 0 });
        assert!(!session.is_answered());
    }

    #[test]
    fn navigation_stays_in_bounds() {
        let mut session = QuestionSession::new(questions(3));
        assert!(!session.prev());
        assert_eq!(session.current_index(), 0);

        assert!(session.next());
        assert!(session.next());
        assert!(!session.next());
        assert_eq!(session.current_index(), 2);

        for _ in 0..5 {
            session.prev();
        }
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn selection_is_final_until_navigation() {
        let mut session = QuestionSession::new(questions(2));
        let first = session.select_option(opt(2));
        assert!(first.is_some());
        let snapshot = session.state();

        assert!(session.select_option(opt(2)).is_none());
        assert!(session.select_option(opt(4)).is_none());
        assert_eq!(session.state(), snapshot);
        assert_eq!(session.selected_option(), Some(opt(2)));

        session.next();
        assert_eq!(session.selected_option(), None);
        session.prev();
        assert_eq!(session.selected_option(), None);
    }

    #[test]
    fn navigation_hides_the_solution() {
        let mut session = QuestionSession::new(questions(2));
        assert!(session.toggle_solution());
        assert!(session.solution_visible());
        session.next();
        assert!(!session.solution_visible());
    }

    #[test]
    fn empty_session_is_terminal() {
        let mut session = QuestionSession::new(Vec::new());
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.current_question().is_none());
        assert!(!session.next());
        assert!(!session.prev());
        assert!(session.select_option(opt(1)).is_none());
        assert_eq!(session.jump_to(0), Err(SessionError::Empty));
        assert!(!session.toggle_solution());
    }

    #[test]
    fn jump_to_rejects_out_of_range() {
        let mut session = QuestionSession::new(questions(4));
        session.jump_to(3).unwrap();
        assert_eq!(session.current_index(), 3);
        assert_eq!(
            session.jump_to(4),
            Err(SessionError::OutOfRange { index: 4, len: 4 })
        );
        assert_eq!(session.current_index(), 3);
    }

    #[test]
    fn jump_to_section_uses_first_question() {
        let mut session = QuestionSession::new(questions(4));
        session.jump_to_section(&SectionId::new("odd")).unwrap();
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.current_section(), Some(SectionId::new("odd")));
        assert!(matches!(
            session.jump_to_section(&SectionId::new("missing")),
            Err(SessionError::UnknownSection(_))
        ));
    }

    #[test]
    fn resumes_from_last_viewed_when_in_range() {
        let session = QuestionSession::resume(questions(10), StartPosition::last_viewed(Some(7)));
        assert_eq!(session.current_index(), 7);

        let session = QuestionSession::resume(questions(5), StartPosition::last_viewed(Some(7)));
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn requested_question_beats_last_viewed() {
        let start = StartPosition {
            requested_question: Some(3),
            last_viewed: Some(7),
        };
        assert_eq!(start.resolve(10), 2);
        let bad = StartPosition {
            requested_question: Some(0),
            last_viewed: Some(7),
        };
        assert_eq!(bad.resolve(10), 0);
    }

    #[test]
    fn quick_mode_tallies_and_issues_ticket() {
        let mut session =
            QuestionSession::new(questions(3)).with_quick_mode(QuickModeConfig::enabled());

        let feedback = session.select_option(opt(1)).unwrap();
        assert!(feedback.correct);
        let quick = feedback.quick.unwrap();
        assert_eq!(quick.tone, Some(FeedbackTone::Correct));
        let ticket = quick.auto_advance.unwrap();

        assert!(session.apply_auto_advance(ticket));
        assert_eq!(session.current_index(), 1);

        let wrong = session.select_option(opt(3)).unwrap();
        assert!(!wrong.correct);
        assert_eq!(session.score(), SessionScore { correct: 1, incorrect: 1 });
    }

    #[test]
    fn stale_auto_advance_ticket_is_ignored() {
        let mut session =
            QuestionSession::new(questions(3)).with_quick_mode(QuickModeConfig::enabled());
        let ticket = session
            .select_option(opt(1))
            .and_then(|f| f.quick)
            .and_then(|q| q.auto_advance)
            .unwrap();

        session.next();
        assert!(!session.apply_auto_advance(ticket));
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn score_is_not_tracked_outside_quick_mode() {
        let mut session = QuestionSession::new(questions(1));
        let feedback = session.select_option(opt(4)).unwrap();
        assert!(feedback.quick.is_none());
        assert_eq!(session.score(), SessionScore::default());
    }

    #[test]
    fn keyboard_lock_follows_session_state() {
        let mut session = QuestionSession::new(questions(3));
        let keyboard = ExamKeyboard::bind(session.lock_cell());

        keyboard.handle_key("b", &mut session);
        assert_eq!(session.selected_option(), Some(opt(2)));

        keyboard.handle_key("3", &mut session);
        assert_eq!(session.selected_option(), Some(opt(2)));

        keyboard.handle_key("n", &mut session);
        assert_eq!(session.current_index(), 1);
        keyboard.handle_key("3", &mut session);
        assert_eq!(session.selected_option(), Some(opt(3)));

        keyboard.handle_key("ArrowLeft", &mut session);
        assert_eq!(session.current_index(), 0);
    }

    #[test]
    fn replacing_questions_regroups_sections() {
        let mut session = QuestionSession::new(questions(4));
        session.next();
        session.set_questions(vec![sample_question("x", None, 1)]);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.section_groups().len(), 1);
        assert_eq!(session.section_groups()[0].section_id, SectionId::general());
    }
}
