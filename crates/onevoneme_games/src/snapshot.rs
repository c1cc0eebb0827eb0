//! Authoritative game snapshots and the normalizer for their wire bodies.
//!
//! The server's snapshot endpoint is loose: it answers `null` or an empty
//! body once a match is gone, omits fields it has not filled yet, and uses
//! different key names depending on the backend version. [`parse_snapshot`]
//! folds all of that into one of three answers so callers never deal with
//! optional-field duck typing.

use crate::{Board, Choice, GameType, Outcome, PlayerSlot, RpsRound};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

/// Game-specific part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotPayload {
    /// Tic-tac-toe board.
    TicTacToe(Board),
    /// Rock-paper-scissors throws for the current round.
    RockPaperScissors(RpsRound),
}

impl SnapshotPayload {
    /// Empty payload for a freshly started match of `game`.
    pub fn empty(game: GameType) -> Self {
        match game {
            GameType::TicTacToe => Self::TicTacToe(Board::new()),
            GameType::RockPaperScissors => Self::RockPaperScissors(RpsRound::new()),
        }
    }

    /// The game this payload belongs to.
    pub fn game_type(&self) -> GameType {
        match self {
            Self::TicTacToe(_) => GameType::TicTacToe,
            Self::RockPaperScissors(_) => GameType::RockPaperScissors,
        }
    }
}

/// One point-in-time view of a match.
///
/// Every game shares the `{turn_owner, outcome, participants}` envelope;
/// the board or throws live in [`SnapshotPayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    turn_owner: PlayerSlot,
    outcome: Outcome,
    participants: BTreeMap<String, PlayerSlot>,
    payload: SnapshotPayload,
}

impl GameSnapshot {
    /// Creates a snapshot from its parts.
    pub fn new(
        turn_owner: PlayerSlot,
        outcome: Outcome,
        participants: BTreeMap<String, PlayerSlot>,
        payload: SnapshotPayload,
    ) -> Self {
        Self {
            turn_owner,
            outcome,
            participants,
            payload,
        }
    }

    /// Slot whose turn it is ([`PlayerSlot::Unassigned`] if nobody's).
    pub fn turn_owner(&self) -> PlayerSlot {
        self.turn_owner
    }

    /// Match result so far.
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Username to slot map.
    pub fn participants(&self) -> &BTreeMap<String, PlayerSlot> {
        &self.participants
    }

    /// Game-specific payload.
    pub fn payload(&self) -> &SnapshotPayload {
        &self.payload
    }

    /// Which game this snapshot describes.
    pub fn game_type(&self) -> GameType {
        self.payload.game_type()
    }

    /// The slot `username` holds, or [`PlayerSlot::Unassigned`] if the
    /// snapshot does not name them.
    pub fn slot_of(&self, username: &str) -> PlayerSlot {
        self.participants
            .get(username)
            .copied()
            .unwrap_or(PlayerSlot::Unassigned)
    }

    /// The first participant other than `username`.
    pub fn opponent_of(&self, username: &str) -> Option<&str> {
        self.participants
            .keys()
            .find(|name| name.as_str() != username)
            .map(String::as_str)
    }

    /// Tic-tac-toe board, if this is a tic-tac-toe snapshot.
    pub fn board(&self) -> Option<&Board> {
        match &self.payload {
            SnapshotPayload::TicTacToe(board) => Some(board),
            SnapshotPayload::RockPaperScissors(_) => None,
        }
    }

    /// Rock-paper-scissors round, if this is an RPS snapshot.
    pub fn round(&self) -> Option<&RpsRound> {
        match &self.payload {
            SnapshotPayload::RockPaperScissors(round) => Some(round),
            SnapshotPayload::TicTacToe(_) => None,
        }
    }

    /// Returns a copy with a different turn owner.
    pub fn with_turn_owner(mut self, slot: PlayerSlot) -> Self {
        self.turn_owner = slot;
        self
    }

    /// Returns a copy with a different outcome.
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Returns a copy with a different payload.
    pub fn with_payload(mut self, payload: SnapshotPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// What a snapshot body turned out to contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotBody {
    /// Empty body or `null`: no match, or the match was torn down.
    Absent,
    /// Something was sent but it is not a usable snapshot. Treated like
    /// "no snapshot yet", never as a fatal error.
    Unreadable(String),
    /// A usable snapshot.
    Present(GameSnapshot),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSnapshot {
    #[serde(alias = "type")]
    game_type: Option<String>,
    #[serde(alias = "turn")]
    turn_owner: Option<i64>,
    #[serde(alias = "winner")]
    outcome: Option<i64>,
    #[serde(alias = "totalBoard")]
    board: Option<Vec<Vec<Option<i64>>>>,
    #[serde(alias = "usernameToTacNumber")]
    username_to_slot: Option<HashMap<String, Option<i64>>>,
    moves: Option<HashMap<String, Option<String>>>,
}

impl WireSnapshot {
    fn is_blank(&self) -> bool {
        self.game_type.is_none()
            && self.turn_owner.is_none()
            && self.outcome.is_none()
            && self.board.is_none()
            && self.username_to_slot.is_none()
            && self.moves.is_none()
    }
}

/// Decodes a username to slot map, dropping entries that are not a slot.
pub(crate) fn decode_participants(
    raw: Option<HashMap<String, Option<i64>>>,
) -> BTreeMap<String, PlayerSlot> {
    raw.unwrap_or_default()
        .into_iter()
        .filter_map(|(name, value)| {
            let slot = PlayerSlot::from_wire(value.unwrap_or(0));
            if slot.is_none() {
                warn!(username = %name, ?value, "Dropping participant with invalid slot");
            }
            slot.map(|slot| (name, slot))
        })
        .collect()
}

/// Returns true when the trimmed body means "nothing here".
pub(crate) fn is_empty_body(body: &str) -> bool {
    let trimmed = body.trim();
    trimmed.is_empty() || trimmed == "null"
}

/// Normalizes a snapshot response body.
///
/// `expected` is the game the client was matched into; it fills in a
/// missing type tag, and a body tagged as a different game is unreadable.
#[instrument(skip(body), fields(len = body.len()))]
pub fn parse_snapshot(body: &str, expected: GameType) -> SnapshotBody {
    if is_empty_body(body) {
        return SnapshotBody::Absent;
    }

    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => return SnapshotBody::Unreadable(format!("invalid JSON: {e}")),
    };
    if value.is_null() {
        return SnapshotBody::Absent;
    }
    if !value.is_object() {
        return SnapshotBody::Unreadable("snapshot is not an object".to_string());
    }

    let wire: WireSnapshot = match serde_json::from_value(value) {
        Ok(wire) => wire,
        Err(e) => return SnapshotBody::Unreadable(format!("unexpected field types: {e}")),
    };
    if wire.is_blank() {
        return SnapshotBody::Unreadable("snapshot has no populated fields".to_string());
    }

    let game = match wire.game_type.as_deref() {
        None => expected,
        Some(tag) => match GameType::from_wire(tag) {
            Some(game) if game == expected => game,
            Some(game) => {
                return SnapshotBody::Unreadable(format!(
                    "snapshot is for {game}, expected {expected}"
                ));
            }
            None => return SnapshotBody::Unreadable(format!("unknown game type {tag:?}")),
        },
    };

    let Some(turn_owner) = PlayerSlot::from_wire(wire.turn_owner.unwrap_or(0)) else {
        return SnapshotBody::Unreadable(format!("invalid turn owner {:?}", wire.turn_owner));
    };
    let Some(outcome) = Outcome::from_wire(wire.outcome.unwrap_or(0)) else {
        return SnapshotBody::Unreadable(format!("invalid outcome {:?}", wire.outcome));
    };
    let participants = decode_participants(wire.username_to_slot);

    let payload = match game {
        GameType::TicTacToe => match wire.board.as_deref() {
            None => SnapshotPayload::TicTacToe(Board::new()),
            Some(grid) => match Board::from_wire(grid) {
                Some(board) => SnapshotPayload::TicTacToe(board),
                None => return SnapshotBody::Unreadable("board is not a 3x3 slot grid".to_string()),
            },
        },
        GameType::RockPaperScissors => {
            let mut round = RpsRound::new();
            for (name, raw) in wire.moves.unwrap_or_default() {
                let slot = participants.get(&name).copied().unwrap_or_default();
                if let Some(choice) = raw.as_deref().and_then(Choice::from_wire) {
                    round = round.with_choice(slot, choice);
                }
            }
            SnapshotPayload::RockPaperScissors(round)
        }
    };

    debug!(%game, ?turn_owner, ?outcome, players = participants.len(), "Parsed snapshot");
    SnapshotBody::Present(GameSnapshot::new(turn_owner, outcome, participants, payload))
}

/// What the opponent-move endpoint reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpponentMove {
    /// The opponent has not thrown yet (`choice: null` or empty body).
    NotYet,
    /// The opponent's throw.
    Chosen(Choice),
    /// The body could not be understood.
    Unreadable,
}

#[derive(Debug, Deserialize)]
struct WireMove {
    #[serde(alias = "rps")]
    choice: Option<String>,
}

/// Normalizes a `get_move` response body.
#[instrument(skip(body), fields(len = body.len()))]
pub fn parse_opponent_choice(body: &str) -> OpponentMove {
    if is_empty_body(body) {
        return OpponentMove::NotYet;
    }
    match serde_json::from_str::<Option<WireMove>>(body) {
        Ok(None) | Ok(Some(WireMove { choice: None })) => OpponentMove::NotYet,
        Ok(Some(WireMove { choice: Some(raw) })) => match Choice::from_wire(&raw) {
            Some(choice) => OpponentMove::Chosen(choice),
            None => OpponentMove::Unreadable,
        },
        Err(_) => OpponentMove::Unreadable,
    }
}
