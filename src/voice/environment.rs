//! Host environment pre-classification
//!
//! Platform speech synthesis is statistically unreliable behind remote display
//! sessions and on some low-power OS builds. The classification only biases the
//! order of the output chain; it never removes a tier.

use regex::Regex;
use std::sync::LazyLock;

/// Remote display and screen-sharing markers
const REMOTE_DISPLAY_MARKERS: &[&str] = &[
    "citrix",
    "remote desktop",
    "rdp",
    "vnc",
    "teamviewer",
    "anydesk",
    "headless",
];

/// OS families with flaky platform speech
const UNRELIABLE_OS_MARKERS: &[&str] = &[
    "raspbian",
    "linux armv6l",
    "linux armv7l",
    "linux aarch64",
    "cros",
];

static REMOTE_DISPLAY: LazyLock<Regex> = LazyLock::new(|| marker_pattern(REMOTE_DISPLAY_MARKERS));

static UNRELIABLE_OS: LazyLock<Regex> = LazyLock::new(|| marker_pattern(UNRELIABLE_OS_MARKERS));

/// How far platform speech synthesis can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reliability {
    /// No known problem signals
    #[default]
    Reliable,
    /// A signal suggests platform speech will misbehave
    Unreliable(&'static str),
}

impl Reliability {
    /// Classify a user-agent style description of the host
    #[must_use]
    pub fn classify(user_agent: &str) -> Self {
        let ua = user_agent.to_lowercase();

        find_marker(&REMOTE_DISPLAY, REMOTE_DISPLAY_MARKERS, &ua)
            .or_else(|| find_marker(&UNRELIABLE_OS, UNRELIABLE_OS_MARKERS, &ua))
            .map_or(Self::Reliable, Self::Unreliable)
    }

    /// Classify an optional description; absent means reliable
    #[must_use]
    pub fn from_hint(user_agent: Option<&str>) -> Self {
        user_agent.map_or(Self::Reliable, Self::classify)
    }

    /// Whether the chain should prefer the tone fallback
    #[must_use]
    pub const fn prefers_fallback(self) -> bool {
        matches!(self, Self::Unreliable(_))
    }
}

/// Whole-word alternation over `markers` so "rdp" does not hit inside other words
fn marker_pattern(markers: &[&str]) -> Regex {
    let alternation = markers
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"\b(?:{alternation})\b")).expect("valid regex")
}

fn find_marker(pattern: &Regex, markers: &[&'static str], ua: &str) -> Option<&'static str> {
    let found = pattern.find(ua)?.as_str();
    markers.iter().copied().find(|m| *m == found)
}
