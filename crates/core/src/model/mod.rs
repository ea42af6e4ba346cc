mod ids;
mod institute;
mod notification;
mod progress;
pub(crate) mod question;
mod saved;

pub use ids::{
    DocumentId, GENERAL_SECTION, InstituteId, ParseIdError, QuestionId, SectionId, TestId, UserId,
};
pub use institute::{Institute, SectionEntry, TestInfo};
pub use notification::{BROADCAST_RECIPIENT, Notification, NotificationData, NotificationKind};
pub use progress::{
    Bookmark, InstituteStats, LastViewedPointer, SectionCompletion, SectionProgress,
    TestCompletionKey, is_fully_completed, percentage,
};
pub use question::{OptionIndex, OptionIndexError, Question};
pub use saved::{
    SavedQuestion, SavedQuestionData, SavedQuestionMetadata, filter_by_institute,
    filter_by_marks, filter_by_subject, search, unique_institutes, unique_marks, unique_subjects,
};
