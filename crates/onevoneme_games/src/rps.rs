//! Rock-paper-scissors choices and round resolution.

use crate::{Outcome, PlayerSlot};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A rock-paper-scissors throw. Serialized in upper case (`"ROCK"`).
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
#[serde(rename_all = "UPPERCASE")]
pub enum Choice {
    /// Beats scissors.
    #[display("ROCK")]
    Rock,
    /// Beats rock.
    #[display("PAPER")]
    Paper,
    /// Beats paper.
    #[display("SCISSORS")]
    Scissors,
}

impl Choice {
    /// Parses a choice ignoring case and surrounding whitespace.
    #[instrument]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ROCK" | "R" => Some(Self::Rock),
            "PAPER" | "P" => Some(Self::Paper),
            "SCISSORS" | "S" => Some(Self::Scissors),
            _ => None,
        }
    }

    /// True when `self` wins against `other`.
    pub fn beats(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Rock, Self::Scissors) | (Self::Paper, Self::Rock) | (Self::Scissors, Self::Paper)
        )
    }
}

/// The throws recorded so far in one round, by slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RpsRound {
    one: Option<Choice>,
    two: Option<Choice>,
}

impl RpsRound {
    /// Creates a round with no throws.
    pub fn new() -> Self {
        Self::default()
    }

    /// The throw recorded for `slot`, if any.
    pub fn choice_of(&self, slot: PlayerSlot) -> Option<Choice> {
        match slot {
            PlayerSlot::One => self.one,
            PlayerSlot::Two => self.two,
            PlayerSlot::Unassigned => None,
        }
    }

    /// Returns a copy with `slot`'s throw set. Unassigned slots are ignored.
    pub fn with_choice(mut self, slot: PlayerSlot, choice: Choice) -> Self {
        match slot {
            PlayerSlot::One => self.one = Some(choice),
            PlayerSlot::Two => self.two = Some(choice),
            PlayerSlot::Unassigned => {}
        }
        self
    }

    /// Decides the round once both throws are known.
    #[instrument]
    pub fn outcome(&self) -> Outcome {
        match (self.one, self.two) {
            (Some(a), Some(b)) if a == b => Outcome::Draw,
            (Some(a), Some(b)) if a.beats(b) => Outcome::Won(PlayerSlot::One),
            (Some(_), Some(_)) => Outcome::Won(PlayerSlot::Two),
            _ => Outcome::InProgress,
        }
    }
}
