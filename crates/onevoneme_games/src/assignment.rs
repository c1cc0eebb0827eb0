//! Matchmaking results.

use crate::snapshot::{decode_participants, is_empty_body};
use crate::{GameType, PlayerSlot};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument};

/// The server's answer once a player has been paired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    game_type: GameType,
    opponent: Option<String>,
    game_id: Option<String>,
    participants: BTreeMap<String, PlayerSlot>,
}

impl MatchAssignment {
    /// Creates an assignment with no explicit game id or participant map.
    pub fn new(game_type: GameType, opponent: Option<String>) -> Self {
        Self {
            game_type,
            opponent,
            game_id: None,
            participants: BTreeMap::new(),
        }
    }

    /// Sets the server-provided game id.
    pub fn with_game_id(mut self, game_id: impl Into<String>) -> Self {
        self.game_id = Some(game_id.into());
        self
    }

    /// Sets the username to slot map.
    pub fn with_participants(mut self, participants: BTreeMap<String, PlayerSlot>) -> Self {
        self.participants = participants;
        self
    }

    /// The minigame to play.
    pub fn game_type(&self) -> GameType {
        self.game_type
    }

    /// Opponent username, when the server named one.
    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    /// Identifier used in move routes. Falls back to the game's route
    /// segment when the server does not issue ids.
    pub fn game_id(&self) -> &str {
        self.game_id
            .as_deref()
            .unwrap_or_else(|| self.game_type.route_segment())
    }

    /// Username to slot map, possibly empty.
    pub fn participants(&self) -> &BTreeMap<String, PlayerSlot> {
        &self.participants
    }
}

/// Interpretation of a queue response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueBody {
    /// Still waiting for an opponent.
    Pending,
    /// Paired into a match.
    Assigned(MatchAssignment),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAssignment {
    #[serde(alias = "type")]
    game_type: Option<String>,
    #[serde(alias = "opponent")]
    opponent_username: Option<String>,
    game_id: Option<String>,
    #[serde(alias = "usernameToTacNumber")]
    username_to_slot: Option<HashMap<String, Option<i64>>>,
}

/// Reads a queue or game-state body as a matchmaking result for `me`.
///
/// Anything that does not clearly name a known game type counts as still
/// pending: an empty body, `null`, a non-object, or an unknown tag. The
/// opponent is the explicit opponent field if present, otherwise the
/// participant that is not `me`.
#[instrument(skip(body), fields(len = body.len()))]
pub fn parse_queue_body(body: &str, me: &str) -> QueueBody {
    if is_empty_body(body) {
        return QueueBody::Pending;
    }
    let Ok(Some(wire)) = serde_json::from_str::<Option<WireAssignment>>(body) else {
        return QueueBody::Pending;
    };
    let Some(game_type) = wire.game_type.as_deref().and_then(GameType::from_wire) else {
        debug!(tag = ?wire.game_type, "Queue body has no recognizable game type");
        return QueueBody::Pending;
    };

    let participants = decode_participants(wire.username_to_slot);
    let opponent = wire
        .opponent_username
        .filter(|name| !name.trim().is_empty())
        .or_else(|| participants.keys().find(|name| name.as_str() != me).cloned());

    let mut assignment = MatchAssignment::new(game_type, opponent).with_participants(participants);
    if let Some(id) = wire.game_id.filter(|id| !id.is_empty()) {
        assignment = assignment.with_game_id(id);
    }
    debug!(%game_type, opponent = ?assignment.opponent(), "Matched");
    QueueBody::Assigned(assignment)
}
