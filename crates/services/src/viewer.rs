//! Opening and driving question sessions for a host UI.
//!
//! A `ViewerSession` pairs a `QuestionSession` with where it came from. All
//! index changes go through `ViewerService` so section sessions keep their
//! last-viewed pointer current.

use std::sync::Arc;

use mcq_core::keyboard::{ExamKeyboard, KeyOutcome};
use mcq_core::model::{
    Institute, InstituteId, OptionIndex, QuestionId, SavedQuestionMetadata, SectionId, TestId,
};
use mcq_core::session::{
    AnswerFeedback, AutoAdvance, QuestionSession, QuickModeConfig, StartPosition,
};
use storage::content::ContentSource;
use storage::local::LocalProgressStore;
use tracing::{debug, warn};

use crate::error::{SavedQuestionsError, ViewerError};
use crate::saved::{SaveOutcome, SavedQuestionsService};

/// What a session was opened on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerScope {
    Test(TestId),
    Section(SectionId),
}

/// Host-level navigation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerCommand {
    Next,
    Prev,
    Jump(usize),
    Section(SectionId),
    Select(OptionIndex),
    ToggleSolution,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigationOutcome {
    pub moved: bool,
    pub feedback: Option<AnswerFeedback>,
}

/// Snapshot of the question a saved-check was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCheckRequest {
    generation: u64,
    question_id: QuestionId,
    coaching_id: InstituteId,
}

/// Answer to a `SavedCheckRequest`; only applies to the question it was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCheck {
    generation: u64,
    pub question_id: QuestionId,
    pub saved: bool,
}

pub struct ViewerSession {
    institute: Institute,
    scope: ViewerScope,
    session: QuestionSession,
    keyboard: ExamKeyboard,
    saved: Option<(u64, bool)>,
}

impl ViewerSession {
    fn new(institute: Institute, scope: ViewerScope, session: QuestionSession) -> Self {
        let keyboard = ExamKeyboard::bind(session.lock_cell());
        Self {
            institute,
            scope,
            session,
            keyboard,
            saved: None,
        }
    }

    #[must_use]
    pub fn institute(&self) -> &Institute {
        &self.institute
    }

    #[must_use]
    pub fn scope(&self) -> &ViewerScope {
        &self.scope
    }

    #[must_use]
    pub fn session(&self) -> &QuestionSession {
        &self.session
    }

    /// Quick-mode settings may change mid-session; pending tickets survive.
    pub fn set_quick_mode(&mut self, config: QuickModeConfig) {
        self.session.set_quick_mode(config);
    }

    /// `None` if the current question has no applicable saved-check yet.
    #[must_use]
    pub fn current_saved(&self) -> Option<bool> {
        self.saved
            .filter(|(generation, _)| *generation == self.session.generation())
            .map(|(_, saved)| saved)
    }

    #[must_use]
    pub fn saved_check_request(&self) -> Option<SavedCheckRequest> {
        let question = self.session.current_question()?;
        Some(SavedCheckRequest {
            generation: self.session.generation(),
            question_id: question.id().clone(),
            coaching_id: self.institute.id().clone(),
        })
    }

    /// Record a saved-check result; stale results are dropped.
    pub fn apply_saved_check(&mut self, check: &SavedCheck) -> bool {
        if check.generation != self.session.generation() {
            debug!(question_id = %check.question_id, "discarding stale saved check");
            return false;
        }
        self.saved = Some((check.generation, check.saved));
        true
    }

    fn test_id_for_current(&self) -> Option<TestId> {
        match &self.scope {
            ViewerScope::Test(id) => Some(id.clone()),
            ViewerScope::Section(_) => self
                .session
                .current_question()
                .map(|q| q.test_id().clone()),
        }
    }
}

/// Opens sessions from content and keeps viewing state persisted.
#[derive(Clone)]
pub struct ViewerService {
    content: Arc<dyn ContentSource>,
    local: LocalProgressStore,
    saved: SavedQuestionsService,
}

impl ViewerService {
    #[must_use]
    pub fn new(
        content: Arc<dyn ContentSource>,
        local: LocalProgressStore,
        saved: SavedQuestionsService,
    ) -> Self {
        Self {
            content,
            local,
            saved,
        }
    }

    pub async fn institutes(&self) -> Vec<Institute> {
        self.content.load_institutes().await
    }

    pub async fn institute(&self, id: &InstituteId) -> Option<Institute> {
        self.institutes().await.into_iter().find(|i| i.id() == id)
    }

    /// Missing content yields an empty session.
    pub async fn open_test(&self, institute: &Institute, test_id: &TestId) -> ViewerSession {
        let questions = self
            .content
            .load_test_questions(institute.folder_name(), test_id)
            .await
            .unwrap_or_default();
        debug!(coaching_id = %institute.id(), %test_id, count = questions.len(), "opened test");
        ViewerSession::new(
            institute.clone(),
            ViewerScope::Test(test_id.clone()),
            QuestionSession::new(questions),
        )
    }

    /// Open a section, resuming at the stored pointer unless a 1-based
    /// question number is requested.
    pub async fn open_section(
        &self,
        institute: &Institute,
        section_id: &SectionId,
        requested_question: Option<usize>,
    ) -> ViewerSession {
        let questions = self
            .content
            .load_section_questions(institute.folder_name(), section_id)
            .await;
        let start = StartPosition {
            requested_question,
            last_viewed: self.local.last_viewed(institute.id(), section_id),
        };
        let session = QuestionSession::resume(questions, start);
        debug!(
            coaching_id = %institute.id(),
            %section_id,
            count = session.len(),
            index = session.current_index(),
            "opened section"
        );
        let view = ViewerSession::new(
            institute.clone(),
            ViewerScope::Section(section_id.clone()),
            session,
        );
        self.persist_position(&view);
        view
    }

    /// # Errors
    ///
    /// Returns `ViewerError::Session` for an invalid jump; the session is
    /// left where it was.
    pub fn navigate(
        &self,
        view: &mut ViewerSession,
        command: ViewerCommand,
    ) -> Result<NavigationOutcome, ViewerError> {
        let session = &mut view.session;
        let outcome = match command {
            ViewerCommand::Next => NavigationOutcome {
                moved: session.next(),
                feedback: None,
            },
            ViewerCommand::Prev => NavigationOutcome {
                moved: session.prev(),
                feedback: None,
            },
            ViewerCommand::Jump(index) => {
                let before = session.current_index();
                session.jump_to(index)?;
                NavigationOutcome {
                    moved: session.current_index() != before,
                    feedback: None,
                }
            }
            ViewerCommand::Section(section_id) => {
                let before = session.current_index();
                session.jump_to_section(&section_id)?;
                NavigationOutcome {
                    moved: session.current_index() != before,
                    feedback: None,
                }
            }
            ViewerCommand::Select(option) => NavigationOutcome {
                moved: false,
                feedback: session.select_option(option),
            },
            ViewerCommand::ToggleSolution => {
                session.toggle_solution();
                NavigationOutcome::default()
            }
        };
        if outcome.moved {
            self.persist_position(view);
        }
        Ok(outcome)
    }

    pub fn handle_key(&self, view: &mut ViewerSession, key: &str) -> KeyOutcome {
        let keyboard = view.keyboard.clone();
        let outcome = keyboard.handle_key(key, &mut view.session);
        if outcome.moved {
            self.persist_position(view);
        }
        outcome
    }

    /// Resolves once the ticket's delay has elapsed. Holds no session borrow,
    /// so the host can keep navigating while the timer runs.
    pub async fn wait_auto_advance(ticket: AutoAdvance) -> AutoAdvance {
        tokio::time::sleep(ticket.delay).await;
        ticket
    }

    /// Advance if the session has not moved since the ticket was issued.
    pub fn apply_auto_advance(&self, view: &mut ViewerSession, ticket: AutoAdvance) -> bool {
        let moved = view.session.apply_auto_advance(ticket);
        if moved {
            self.persist_position(view);
        } else {
            debug!("auto-advance ticket expired");
        }
        moved
    }

    pub async fn check_saved(&self, request: SavedCheckRequest) -> SavedCheck {
        let saved = self
            .saved
            .is_saved(&request.question_id, &request.coaching_id)
            .await;
        SavedCheck {
            generation: request.generation,
            question_id: request.question_id,
            saved,
        }
    }

    /// Save the current question with display labels from the catalog.
    ///
    /// # Errors
    ///
    /// Returns `SavedQuestionsError` from the save; an empty session is a
    /// no-op returning `Ok(None)`.
    pub async fn save_current(
        &self,
        view: &mut ViewerSession,
    ) -> Result<Option<SaveOutcome>, SavedQuestionsError> {
        let (Some(question), Some(test_id)) =
            (view.session.current_question(), view.test_id_for_current())
        else {
            return Ok(None);
        };
        let institute = &view.institute;
        let section_name = question
            .section_id()
            .map(|s| institute.section_name(s).to_owned());
        let metadata = SavedQuestionMetadata {
            institute_name: Some(institute.name().to_owned()),
            subject: section_name.clone(),
            section_name,
            test_name: institute.test(&test_id).map(|t| t.title.clone()),
        };
        let outcome = self
            .saved
            .save_and_cache(question, institute.id(), &test_id, metadata)
            .await?;
        view.saved = Some((view.session.generation(), true));
        Ok(Some(outcome))
    }

    /// Toggle a local bookmark on the current question; returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `ViewerError::Local` if the bookmark list cannot be written.
    pub fn toggle_bookmark(&self, view: &ViewerSession) -> Result<Option<bool>, ViewerError> {
        let (Some(question), Some(test_id)) =
            (view.session.current_question(), view.test_id_for_current())
        else {
            return Ok(None);
        };
        let coaching_id = view.institute.id();
        if self.local.is_bookmarked(question.id(), coaching_id) {
            self.local.remove_bookmark(question.id(), coaching_id)?;
            Ok(Some(false))
        } else {
            self.local.add_bookmark(question, coaching_id, &test_id)?;
            Ok(Some(true))
        }
    }

    fn persist_position(&self, view: &ViewerSession) {
        let ViewerScope::Section(section_id) = &view.scope else {
            return;
        };
        if view.session.is_empty() {
            return;
        }
        if let Err(err) = self.local.save_last_viewed(
            view.institute.id(),
            section_id,
            view.session.current_index(),
        ) {
            warn!(%section_id, error = %err, "last viewed question not saved");
        }
    }
}
