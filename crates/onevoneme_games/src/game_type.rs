//! The minigames a match can be.

use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Which minigame a match plays.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
)]
pub enum GameType {
    /// 3x3 tic-tac-toe.
    #[display("tictactoe")]
    TicTacToe,
    /// Single-round rock-paper-scissors.
    #[display("rockpaperscissors")]
    RockPaperScissors,
}

impl GameType {
    /// Parses the server's game type tag.
    ///
    /// Matching ignores case and separators, so `tictactoe`, `TIC_TAC_TOE`,
    /// `rock-paper-scissors` and `rps` are all recognized.
    #[instrument]
    pub fn from_wire(tag: &str) -> Option<Self> {
        let folded: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "tictactoe" | "ttt" | "ultimatetictactoe" => Some(Self::TicTacToe),
            "rockpaperscissors" | "rps" => Some(Self::RockPaperScissors),
            _ => None,
        }
    }

    /// Path segment naming the game in move endpoints when the server
    /// does not hand out a dedicated game id.
    pub fn route_segment(self) -> &'static str {
        match self {
            Self::TicTacToe => "tictactoe",
            Self::RockPaperScissors => "rock_paper_scissors",
        }
    }
}
