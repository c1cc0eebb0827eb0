//! What a session shows to the player.

use crate::machine::Phase;
use derive_getters::Getters;
use derive_new::new;
use onevoneme_games::{Board, Outcome, PlayerSlot, RpsRound, SnapshotPayload};

/// Result of a finished match from this player's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Verdict {
    /// This player's slot won.
    #[display("You won")]
    YouWon,
    /// The other slot won.
    #[display("You lost")]
    YouLost,
    /// Nobody won.
    #[display("Draw")]
    Draw,
}

impl Verdict {
    /// Reads `outcome` from `me`'s point of view.
    ///
    /// `None` while the match is running, or when a slot won but `me` was
    /// never assigned one.
    pub fn of(outcome: Outcome, me: PlayerSlot) -> Option<Self> {
        match outcome {
            Outcome::InProgress => None,
            Outcome::Draw => Some(Self::Draw),
            Outcome::Won(_) if !me.is_assigned() => None,
            Outcome::Won(winner) if winner == me => Some(Self::YouWon),
            Outcome::Won(_) => Some(Self::YouLost),
        }
    }
}

/// Render-ready state of a session.
///
/// `payload` is the optimistic payload while a submission is unconfirmed,
/// the latest authoritative payload otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct SessionView {
    phase: Phase,
    username: String,
    opponent: Option<String>,
    my_slot: PlayerSlot,
    turn_owner: PlayerSlot,
    outcome: Outcome,
    payload: Option<SnapshotPayload>,
    optimistic: bool,
}

impl SessionView {
    /// Match result for this player, once known.
    pub fn verdict(&self) -> Option<Verdict> {
        Verdict::of(self.outcome, self.my_slot)
    }

    /// Tic-tac-toe board being shown, if any.
    pub fn board(&self) -> Option<&Board> {
        match &self.payload {
            Some(SnapshotPayload::TicTacToe(board)) => Some(board),
            _ => None,
        }
    }

    /// Rock-paper-scissors round being shown, if any.
    pub fn round(&self) -> Option<&RpsRound> {
        match &self.payload {
            Some(SnapshotPayload::RockPaperScissors(round)) => Some(round),
            _ => None,
        }
    }

    /// One-line status for the player.
    pub fn status_text(&self) -> String {
        match self.phase {
            Phase::Idle => "Not in a match".to_string(),
            Phase::Queued => "Waiting for an opponent".to_string(),
            Phase::Matched => "Match found, waiting for the first move".to_string(),
            Phase::MyTurn => "Your turn".to_string(),
            Phase::AwaitingOpponent => "Waiting for opponent".to_string(),
            Phase::Resolved => match self.verdict() {
                Some(verdict) => verdict.to_string(),
                None => "Match over".to_string(),
            },
            Phase::TornDown => "Match closed".to_string(),
        }
    }
}
