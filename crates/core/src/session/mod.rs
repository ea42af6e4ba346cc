mod machine;
mod quick;
mod sections;

// Public API of the viewing session.
pub use machine::{AnswerFeedback, QuestionSession, SessionError, SessionState, StartPosition};
pub use quick::{
    AutoAdvance, DEFAULT_AUTO_NEXT_DELAY, FeedbackTone, QuickFeedback, QuickModeConfig,
    SessionScore, vibration_pattern,
};
pub use sections::{SectionGroup, group_by_section};
