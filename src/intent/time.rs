//! Clock-time extraction from spoken text

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `18:30`, rejected later if a meridiem follows
static CLOCK_24H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b(\s*[ap]\.?\s?m\b)?").expect("valid regex")
});

/// `6 pm`, `6pm`, `6:30 p.m.`
static CLOCK_12H: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(1[0-2]|0?[1-9])(?::([0-5]\d))?\s*([ap])\.?\s?m\b").expect("valid regex")
});

/// `at 6 30`, optionally with a meridiem
static SPACED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat (\d{1,2}) ([0-5]\d)\b(?:\s*([ap])\.?\s?m\b)?").expect("valid regex")
});

/// `at 630`, `at 1830`, optionally with a meridiem
static COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat (\d{3,4})\b(?:\s*([ap])\.?\s?m\b)?").expect("valid regex")
});

/// Extract a clock time as a 24-hour `HH:MM` string
///
/// Forms are tried in priority order: 24-hour `HH:MM`, 12-hour with am/pm,
/// `at H MM`, then compact `at HMM`/`at HHMM`.
#[must_use]
pub fn extract_time(text: &str) -> Option<String> {
    let text = text.to_lowercase();

    let clock = CLOCK_24H
        .captures_iter(&text)
        .find(|caps| caps.get(3).is_none())
        .and_then(|caps| format_time(number(&caps, 1)?, number(&caps, 2)?));
    if clock.is_some() {
        return clock;
    }

    if let Some(caps) = CLOCK_12H.captures(&text) {
        let hour = number(&caps, 1)?;
        let minute = caps.get(2).map_or(Some(0), |_| number(&caps, 2))?;
        return format_time(to_24h(hour, meridiem(&caps, 3))?, minute);
    }

    if let Some(caps) = SPACED.captures(&text) {
        let hour = number(&caps, 1)?;
        let minute = number(&caps, 2)?;
        return format_time(to_24h(hour, meridiem(&caps, 3))?, minute);
    }

    if let Some(caps) = COMPACT.captures(&text) {
        let digits = number(&caps, 1)?;
        return format_time(to_24h(digits / 100, meridiem(&caps, 2))?, digits % 100);
    }

    None
}

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

fn meridiem(caps: &Captures<'_>, group: usize) -> Option<char> {
    caps.get(group)?.as_str().chars().next()
}

/// Convert an hour to 24-hour form; `None` if out of range for its form
fn to_24h(hour: u32, meridiem: Option<char>) -> Option<u32> {
    match meridiem {
        None if hour <= 23 => Some(hour),
        Some('a') if (1..=12).contains(&hour) => Some(hour % 12),
        Some('p') if (1..=12).contains(&hour) => Some(hour % 12 + 12),
        _ => None,
    }
}

fn format_time(hour: u32, minute: u32) -> Option<String> {
    (hour <= 23 && minute <= 59).then(|| format!("{hour:02}:{minute:02}"))
}
