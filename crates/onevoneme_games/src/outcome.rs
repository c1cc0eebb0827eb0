//! Match outcome as reported by the authoritative server.

use crate::PlayerSlot;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Result of a match.
///
/// Wire encoding: `0` in progress, `-1` draw (the "cat's game"),
/// `1`/`2` won by that slot. A draw is terminal and must never be
/// confused with "no winner yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Outcome {
    /// No result yet.
    #[default]
    InProgress,
    /// Board full or identical choices, nobody won.
    Draw,
    /// Won by the given slot (never [`PlayerSlot::Unassigned`]).
    Won(PlayerSlot),
}

impl Outcome {
    /// Decodes a wire integer. Values other than `-1..=2` are rejected.
    #[instrument]
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::InProgress),
            -1 => Some(Self::Draw),
            1 => Some(Self::Won(PlayerSlot::One)),
            2 => Some(Self::Won(PlayerSlot::Two)),
            _ => None,
        }
    }

    /// Encodes the outcome as its wire integer.
    pub fn to_wire(self) -> i64 {
        match self {
            Self::InProgress => 0,
            Self::Draw => -1,
            Self::Won(slot) => slot.to_wire(),
        }
    }

    /// True once the match is over (won or drawn).
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// The winning slot, if any.
    pub fn winner(self) -> Option<PlayerSlot> {
        match self {
            Self::Won(slot) => Some(slot),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_is_terminal_and_distinct_from_in_progress() {
        let draw = Outcome::from_wire(-1).unwrap();
        assert_eq!(draw, Outcome::Draw);
        assert!(draw.is_terminal());
        assert_eq!(draw.winner(), None);
        assert!(!Outcome::from_wire(0).unwrap().is_terminal());
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert_eq!(Outcome::from_wire(3), None);
        assert_eq!(Outcome::from_wire(-2), None);
    }

    #[test]
    fn wins_carry_slot() {
        assert_eq!(Outcome::from_wire(2).unwrap().winner(), Some(PlayerSlot::Two));
        assert_eq!(Outcome::Won(PlayerSlot::One).to_wire(), 1);
    }
}
