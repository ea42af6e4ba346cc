//! Keyboard shortcuts for the question viewer.
//!
//! `A`-`D` and `1`-`4` pick an option while the current question is still
//! open; `N`/`ArrowRight` and `P`/`ArrowLeft` move between questions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::OptionIndex;
use crate::session::AnswerFeedback;

/// Shared "latest value" cell for the answer lock.
///
/// The session writes it on every transition; a keyboard binding created once
/// per session reads it, so the binding never has to be rebuilt.
#[derive(Debug, Clone, Default)]
pub struct LockCell(Arc<AtomicBool>);

impl LockCell {
    #[must_use]
    pub fn new(locked: bool) -> Self {
        Self(Arc::new(AtomicBool::new(locked)))
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, locked: bool) {
        self.0.store(locked, Ordering::Release);
    }
}

/// The entry points a host UI (or a test harness) uses to drive a session.
pub trait ExamControls {
    /// Returns `true` if the session moved.
    fn on_next(&mut self) -> bool;

    /// Returns `true` if the session moved.
    fn on_prev(&mut self) -> bool;

    /// Returns `None` if the selection was ignored.
    fn on_select_option(&mut self, option: OptionIndex) -> Option<AnswerFeedback>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Select(OptionIndex),
    Next,
    Prev,
}

/// What a key press resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyOutcome {
    pub command: Option<KeyCommand>,
    /// Navigation keys suppress the host's default handling (scrolling).
    pub prevent_default: bool,
    pub moved: bool,
    pub feedback: Option<AnswerFeedback>,
}

/// Map a key name (as reported by a DOM `KeyboardEvent.key`) to an option.
#[must_use]
pub fn key_to_option(key: &str) -> Option<OptionIndex> {
    let mut chars = key.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    match c {
        '1'..='4' => c
            .to_digit(10)
            .and_then(|d| u8::try_from(d).ok())
            .and_then(|d| OptionIndex::new(d).ok()),
        _ => OptionIndex::from_letter(c),
    }
}

fn is_next_key(key: &str) -> bool {
    matches!(key, "n" | "N" | "ArrowRight")
}

fn is_prev_key(key: &str) -> bool {
    matches!(key, "p" | "P" | "ArrowLeft")
}

/// Keyboard binding for one viewing session.
#[derive(Debug, Clone)]
pub struct ExamKeyboard {
    lock: LockCell,
}

impl ExamKeyboard {
    /// Bind once per session, sharing the session's lock cell.
    #[must_use]
    pub fn bind(lock: LockCell) -> Self {
        Self { lock }
    }

    /// Resolve a key without dispatching it.
    #[must_use]
    pub fn interpret(&self, key: &str) -> Option<KeyCommand> {
        if let Some(option) = key_to_option(key) {
            if !self.lock.is_locked() {
                return Some(KeyCommand::Select(option));
            }
        }
        if is_next_key(key) {
            return Some(KeyCommand::Next);
        }
        if is_prev_key(key) {
            return Some(KeyCommand::Prev);
        }
        None
    }

    /// Resolve a key and dispatch it to `controls`.
    pub fn handle_key<C: ExamControls + ?Sized>(&self, key: &str, controls: &mut C) -> KeyOutcome {
        let Some(command) = self.interpret(key) else {
            return KeyOutcome::default();
        };
        match command {
            KeyCommand::Select(option) => {
                let feedback = controls.on_select_option(option);
                KeyOutcome {
                    command: Some(command),
                    prevent_default: false,
                    moved: false,
                    feedback,
                }
            }
            KeyCommand::Next => KeyOutcome {
                command: Some(command),
                prevent_default: true,
                moved: controls.on_next(),
                feedback: None,
            },
            KeyCommand::Prev => KeyOutcome {
                command: Some(command),
                prevent_default: true,
                moved: controls.on_prev(),
                feedback: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<KeyCommand>,
    }

    impl ExamControls for Recorder {
        fn on_next(&mut self) -> bool {
            self.calls.push(KeyCommand::Next);
            true
        }

        fn on_prev(&mut self) -> bool {
            self.calls.push(KeyCommand::Prev);
            true
        }

        fn on_select_option(&mut self, option: OptionIndex) -> Option<AnswerFeedback> {
            self.calls.push(KeyCommand::Select(option));
            None
        }
    }

    fn opt(n: u8) -> OptionIndex {
        OptionIndex::new(n).unwrap()
    }

    #[test]
    fn letters_and_digits_select_options() {
        assert_eq!(key_to_option("a"), Some(opt(1)));
        assert_eq!(key_to_option("B"), Some(opt(2)));
        assert_eq!(key_to_option("3"), Some(opt(3)));
        assert_eq!(key_to_option("d"), Some(opt(4)));
        assert_eq!(key_to_option("5"), None);
        assert_eq!(key_to_option("ArrowUp"), None);
    }

    #[test]
    fn option_keys_are_ignored_while_locked() {
        let lock = LockCell::new(false);
        let keyboard = ExamKeyboard::bind(lock.clone());
        let mut recorder = Recorder::default();

        keyboard.handle_key("2", &mut recorder);
        lock.set(true);
        let outcome = keyboard.handle_key("3", &mut recorder);

        assert_eq!(outcome.command, None);
        assert_eq!(recorder.calls, vec![KeyCommand::Select(opt(2))]);
    }

    #[test]
    fn navigation_keys_prevent_default() {
        let keyboard = ExamKeyboard::bind(LockCell::new(true));
        let mut recorder = Recorder::default();

        let next = keyboard.handle_key("ArrowRight", &mut recorder);
        let prev = keyboard.handle_key("P", &mut recorder);
        let other = keyboard.handle_key("x", &mut recorder);

        assert!(next.prevent_default && next.moved);
        assert!(prev.prevent_default);
        assert!(!other.prevent_default);
        assert_eq!(recorder.calls, vec![KeyCommand::Next, KeyCommand::Prev]);
    }
}
