//! Player slots within a match.

use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A player's position within a match.
///
/// The server encodes slots as integers: `0` means "not yet assigned",
/// `1` and `2` are player one and player two.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumIter,
)]
pub enum PlayerSlot {
    /// No slot assigned (wire value 0).
    #[default]
    #[display("unassigned")]
    Unassigned,
    /// Player one (wire value 1). Moves first in tic-tac-toe.
    #[display("player 1")]
    One,
    /// Player two (wire value 2).
    #[display("player 2")]
    Two,
}

impl PlayerSlot {
    /// Decodes a wire integer, rejecting values outside `0..=2`.
    #[instrument]
    pub fn from_wire(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Unassigned),
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }

    /// Encodes the slot as its wire integer.
    pub fn to_wire(self) -> i64 {
        match self {
            Self::Unassigned => 0,
            Self::One => 1,
            Self::Two => 2,
        }
    }

    /// True for player one or player two.
    pub fn is_assigned(self) -> bool {
        self != Self::Unassigned
    }

    /// Returns the other seat. An unassigned slot has no opponent.
    pub fn opponent(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
            Self::Unassigned => Self::Unassigned,
        }
    }
}
