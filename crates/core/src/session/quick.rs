use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default pause before quick mode moves to the next question.
pub const DEFAULT_AUTO_NEXT_DELAY: Duration = Duration::from_millis(1500);

/// Settings for quick mode: answer, get feedback, move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct QuickModeConfig {
    pub enabled: bool,
    pub auto_next_enabled: bool,
    #[serde(with = "millis")]
    pub auto_next_delay: Duration,
    pub sound_enabled: bool,
    pub vibration_enabled: bool,
    pub download_wrong_enabled: bool,
}

impl Default for QuickModeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_next_enabled: true,
            auto_next_delay: DEFAULT_AUTO_NEXT_DELAY,
            sound_enabled: true,
            vibration_enabled: true,
            download_wrong_enabled: false,
        }
    }
}

impl QuickModeConfig {
    /// Default settings with quick mode switched on.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}

/// Running tally of quick-mode answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScore {
    pub correct: u32,
    pub incorrect: u32,
}

impl SessionScore {
    pub(crate) fn record(&mut self, correct: bool) {
        if correct {
            self.correct = self.correct.saturating_add(1);
        } else {
            self.incorrect = self.incorrect.saturating_add(1);
        }
    }

    #[must_use]
    pub fn attempted(&self) -> u32 {
        self.correct.saturating_add(self.incorrect)
    }
}

/// Two-step tone played after an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackTone {
    Correct,
    Incorrect,
}

impl FeedbackTone {
    /// Start and end frequency in hertz.
    #[must_use]
    pub fn frequencies_hz(self) -> (u32, u32) {
        match self {
            Self::Correct => (600, 800),
            Self::Incorrect => (200, 150),
        }
    }

    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Correct => Duration::from_millis(150),
            Self::Incorrect => Duration::from_millis(200),
        }
    }
}

/// Vibration pattern in milliseconds, alternating on/off.
#[must_use]
pub fn vibration_pattern(correct: bool) -> &'static [u64] {
    if correct { &[100] } else { &[100, 50, 100] }
}

/// Pending automatic `next()` issued after a quick-mode answer.
///
/// The ticket is only honored while the session is still on the question it
/// was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoAdvance {
    pub(crate) generation: u64,
    pub delay: Duration,
}

/// Side effects a host should perform after a quick-mode answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickFeedback {
    pub tone: Option<FeedbackTone>,
    pub vibration: Option<&'static [u64]>,
    pub download_wrong: bool,
    pub auto_advance: Option<AutoAdvance>,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
