//! Reminder creation intent

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::normalize;
use super::time::extract_time;

/// Phrases that mark an utterance as a reminder request
static LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:remind me|(?:set|add|make|create) (?:a |an |me a )?reminder|remember to)\b")
        .expect("valid regex")
});

/// Title templates, tried in order
static TITLE_TEMPLATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // remind me to X at 6 pm
        r"\b(?:remind me|reminder) to (.+?) at \d.*$",
        // set a reminder for X at 6 pm
        r"\b(?:remind me|reminder) for (.+?) at \d.*$",
        // remind me at 6 pm to X
        r"\b(?:remind me|reminder) at \d+(?: \d{2})?(?: ?[ap] ?m)? to (.+)$",
        r"\b(?:remind me|reminder) (?:to|for|of|about) (.+)$",
        r"\bremember to (.+)$",
        r"\b(?:remind me|reminder)(?: that)? (.+)$",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex"))
    .collect()
});

/// Trailing time expression left in a title
static TRAILING_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?: (?:at|by|around))? \d{1,4}(?: \d{2})?(?: ?[ap] ?m)?$").expect("valid regex")
});

/// Trailing politeness
static TRAILING_FILLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?: (?:please|thanks|thank you))+$").expect("valid regex"));

/// A request to create a reminder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderIntent {
    /// What to be reminded of
    pub title: String,

    /// Normalized `HH:MM` time, if one was spoken
    pub time: Option<String>,
}

impl ReminderIntent {
    /// Sentence spoken back once the reminder is created
    #[must_use]
    pub fn confirmation(&self) -> String {
        match &self.time {
            Some(time) => format!("Okay, I'll remind you to {} at {time}.", self.title),
            None => format!("Okay, I'll remind you to {}.", self.title),
        }
    }
}

/// Detect a request to create a reminder
///
/// Returns `None` without a lead-in phrase, or when no title survives
/// extraction.
#[must_use]
pub fn detect_reminder(text: &str) -> Option<ReminderIntent> {
    let normalized = normalize(text);
    if !LEAD_IN.is_match(&normalized) {
        return None;
    }

    let raw_title = TITLE_TEMPLATES
        .iter()
        .find_map(|template| template.captures(&normalized)?.get(1))?
        .as_str();

    let title = clean_title(raw_title);
    if title.is_empty() {
        tracing::debug!(text, "reminder request without a title");
        return None;
    }

    Some(ReminderIntent {
        title,
        time: extract_time(text),
    })
}

fn clean_title(raw: &str) -> String {
    let mut title = raw.trim().to_string();
    loop {
        let before = title.len();
        title = TRAILING_FILLER.replace(&title, "").into_owned();
        title = TRAILING_TIME.replace(&title, "").into_owned();
        if title.len() == before {
            break;
        }
    }
    title
        .strip_prefix("to ")
        .unwrap_or(&title)
        .trim()
        .to_string()
}
