//! Game launch intent

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use super::normalize;

/// Generic "play/start/open/launch <game>" request
static LAUNCH_TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:lets |let us |can we |could we |can you |i want to |i wanna |id like to |please )?(?:play|start|open|launch)(?: a| an| the| some| me a)?(?: game of| round of)? (.+?)(?: game)?(?: please| with me)?$",
    )
    .expect("valid regex")
});

/// Games that can be launched by voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameId {
    TicTacToe,
    Trivia,
    Sudoku,
    ColorDetection,
}

impl GameId {
    /// All games, in match priority order
    pub const ALL: [Self; 4] = [
        Self::TicTacToe,
        Self::Trivia,
        Self::Sudoku,
        Self::ColorDetection,
    ];

    /// Stable identifier handed to the feature launcher
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TicTacToe => "tic-tac-toe",
            Self::Trivia => "trivia",
            Self::Sudoku => "sudoku",
            Self::ColorDetection => "color-detection",
        }
    }

    /// Name used in spoken confirmations
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::TicTacToe => "tic-tac-toe",
            Self::Trivia => "trivia",
            Self::Sudoku => "sudoku",
            Self::ColorDetection => "color detection",
        }
    }

    /// Normalized phrases naming this game
    const fn phrases(self) -> &'static [&'static str] {
        match self {
            Self::TicTacToe => &[
                "tic tac toe",
                "tictactoe",
                "tick tack toe",
                "noughts and crosses",
                "naughts and crosses",
                "x and o",
                "xs and os",
            ],
            Self::Trivia => &["trivia", "trivia quiz", "quiz", "a quiz"],
            Self::Sudoku => &["sudoku", "soduku", "sudoku puzzle", "number puzzle"],
            Self::ColorDetection => &[
                "color detection",
                "colour detection",
                "color game",
                "colour game",
                "color finder",
                "find the color",
                "colors",
            ],
        }
    }

    fn matches(self, phrase: &str) -> bool {
        self.phrases().contains(&phrase)
    }
}

impl std::fmt::Display for GameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect a request to launch a game
///
/// Whole-utterance phrases are matched first; otherwise the object of a
/// "play/start/open/launch" request is matched against each game's phrases.
/// Matching is exact after normalization, never fuzzy.
#[must_use]
pub fn detect_game_from_text(text: &str) -> Option<GameId> {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return None;
    }

    let bare = normalized.strip_suffix(" game").unwrap_or(&normalized);
    if let Some(game) = GameId::ALL.into_iter().find(|g| g.matches(bare)) {
        return Some(game);
    }

    let caps = LAUNCH_TEMPLATE.captures(&normalized)?;
    let object = caps.get(1)?.as_str().trim();
    GameId::ALL.into_iter().find(|g| g.matches(object))
}
