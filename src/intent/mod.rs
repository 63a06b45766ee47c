//! Intent detection over recognized speech
//!
//! Pure, stateless classification of an utterance into a game launch, a
//! reminder, or nothing. Everything matches on [`normalize`]d text.

mod game;
mod reminder;
mod time;

pub use game::{GameId, detect_game_from_text};
pub use reminder::{ReminderIntent, detect_reminder};
pub use time::extract_time;

/// What an utterance asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Launch a game
    Game(GameId),
    /// Create a reminder
    Reminder(ReminderIntent),
    /// Ordinary conversation
    None,
}

/// Classify an utterance
///
/// Reminders are checked first so "remind me to play trivia" is not read as
/// a game request.
#[must_use]
pub fn detect_intent(text: &str) -> Intent {
    if let Some(reminder) = detect_reminder(text) {
        return Intent::Reminder(reminder);
    }
    detect_game_from_text(text).map_or(Intent::None, Intent::Game)
}

/// Lowercase, turn hyphens into spaces, drop punctuation, collapse whitespace
#[must_use]
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter_map(|c| match c {
            '-' | '_' | '/' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
