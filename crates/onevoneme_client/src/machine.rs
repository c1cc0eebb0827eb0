//! Session state machine.
//!
//! Pure and synchronous: it consumes observations (tagged with the sequence
//! number of the poll that produced them) and submission results, and
//! answers with [`SessionEvent`]s. Timers and I/O live in the session
//! runtime. Every input is accepted in every phase; inputs that make no
//! sense in the current phase are ignored.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientErrorKind};
use crate::identity::PlayerIdentity;
use crate::view::{SessionView, Verdict};
use onevoneme_games::{
    Choice, GameSnapshot, GameType, Location, MatchAssignment, Outcome, PlayerSlot, RpsRound,
    SnapshotPayload,
};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Phase {
    /// Not queued and not in a match. Also where a timed-out session rests.
    Idle,
    /// Waiting for matchmaking.
    Queued,
    /// Paired, no usable snapshot yet.
    Matched,
    /// The latest snapshot says it is this player's turn.
    MyTurn,
    /// The latest snapshot says it is not this player's turn.
    AwaitingOpponent,
    /// A terminal outcome was observed.
    Resolved,
    /// Session discarded.
    TornDown,
}

/// A normalized poll result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// A usable snapshot.
    Snapshot(GameSnapshot),
    /// The opponent's rock-paper-scissors throw (`None` while pending).
    OpponentChoice(Option<Choice>),
    /// The server reported no match.
    Absent,
    /// Transport failure or an unusable body. Same as "no snapshot yet".
    Unreadable(String),
}

/// A move the player wants to make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PlayerMove {
    /// Mark a tic-tac-toe cell.
    #[display("place {_0}")]
    Place(Location),
    /// Throw in rock-paper-scissors.
    #[display("throw {_0}")]
    Throw(Choice),
}

/// Why a submission never reached the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum IgnoreReason {
    /// No match is in progress.
    #[display("not in a match")]
    NotInMatch,
    /// The latest snapshot gives the turn to someone else.
    #[display("not your turn")]
    NotYourTurn,
    /// The cell is already marked.
    #[display("cell already taken")]
    CellTaken,
    /// A throw is already recorded this round.
    #[display("already chose this round")]
    AlreadyChosen,
    /// The match has an outcome.
    #[display("match is over")]
    MatchOver,
    /// An earlier submission is still unconfirmed.
    #[display("previous move still pending")]
    SubmissionPending,
    /// The move belongs to the other game.
    #[display("move does not fit this game")]
    WrongGame,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum TeardownReason {
    /// The resolved match lingered for the teardown delay.
    #[display("resolved")]
    Elapsed,
    /// The server removed a resolved match.
    #[display("match removed after resolution")]
    Gone,
    /// The server removed a match that never showed an outcome.
    #[display("match removed before resolution")]
    GoneUnresolved,
    /// The owner shut the session down.
    #[display("shut down")]
    Shutdown,
}

/// Something the player-facing side should know about.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The phase moved.
    PhaseChanged {
        /// Previous phase.
        from: Phase,
        /// New phase.
        to: Phase,
    },
    /// The rendered state changed.
    ViewUpdated(SessionView),
    /// A terminal outcome was observed. Emitted once per session.
    Resolved {
        /// Authoritative outcome.
        outcome: Outcome,
        /// Outcome from this player's side, when the slot is known.
        verdict: Option<Verdict>,
    },
    /// Nothing changed for too long; the session went idle.
    TimedOut {
        /// Unchanged cycles observed.
        cycles: u32,
        /// User-facing timeout error.
        error: ClientError,
    },
    /// The server refused a move; optimistic state was rolled back.
    SubmissionRejected(ClientError),
    /// The session is over. No events follow.
    TornDown {
        /// Why.
        reason: TeardownReason,
    },
}

/// Whether the runtime should be polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingMode {
    /// Keep a poll scheduled.
    On,
    /// Issue no polls.
    Off,
}

/// What to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollTarget {
    /// The player's snapshot.
    GameState {
        /// Player username.
        username: String,
    },
    /// The opponent's rock-paper-scissors throw.
    OpponentChoice {
        /// Game route id.
        game_id: String,
        /// Opponent username.
        opponent: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    InFlight,
    Confirming { fence: u64, remaining: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    mv: PlayerMove,
    stage: Stage,
}

/// The session state machine.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    identity: PlayerIdentity,
    default_opponent: String,
    wait_timeout_cycles: u32,
    confirm_polls: u32,
    phase: Phase,
    assignment: Option<MatchAssignment>,
    opponent: Option<String>,
    opponent_defaulted: bool,
    my_slot: PlayerSlot,
    latest: Option<GameSnapshot>,
    overlay: Option<SnapshotPayload>,
    pending: Option<Pending>,
    /// Polling stays on in `MyTurn` until a snapshot with at least this
    /// sequence number has been applied.
    resync: Option<u64>,
    last_seq: Option<u64>,
    fence: u64,
    unchanged_cycles: u32,
    terminal: Option<Outcome>,
    gone: Option<TeardownReason>,
}

impl SessionMachine {
    /// Creates an idle machine for `identity`.
    pub fn new(identity: PlayerIdentity, config: &ClientConfig) -> Self {
        Self {
            identity,
            default_opponent: config.default_opponent().clone(),
            wait_timeout_cycles: *config.wait_timeout_cycles(),
            confirm_polls: *config.confirm_polls(),
            phase: Phase::Idle,
            assignment: None,
            opponent: None,
            opponent_defaulted: false,
            my_slot: PlayerSlot::Unassigned,
            latest: None,
            overlay: None,
            pending: None,
            resync: None,
            last_seq: None,
            fence: 0,
            unchanged_cycles: 0,
            terminal: None,
            gone: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The player this session belongs to.
    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    /// This player's slot ([`PlayerSlot::Unassigned`] until known).
    pub fn my_slot(&self) -> PlayerSlot {
        self.my_slot
    }

    /// Opponent username, if known.
    pub fn opponent(&self) -> Option<&str> {
        self.opponent.as_deref()
    }

    /// The match assignment, once matched.
    pub fn assignment(&self) -> Option<&MatchAssignment> {
        self.assignment.as_ref()
    }

    /// Latest authoritative snapshot (synthesized for rock-paper-scissors).
    pub fn latest(&self) -> Option<&GameSnapshot> {
        self.latest.as_ref()
    }

    /// First terminal outcome observed.
    pub fn terminal_outcome(&self) -> Option<Outcome> {
        self.terminal
    }

    /// Set once the server was seen to remove the match.
    pub fn gone(&self) -> Option<TeardownReason> {
        self.gone
    }

    /// Consecutive polling cycles without a visible change.
    pub fn unchanged_cycles(&self) -> u32 {
        self.unchanged_cycles
    }

    fn game_type(&self) -> Option<GameType> {
        self.assignment.as_ref().map(MatchAssignment::game_type)
    }

    /// Render-ready state.
    pub fn view(&self) -> SessionView {
        let (turn_owner, outcome, payload) = match &self.latest {
            Some(snapshot) => (
                snapshot.turn_owner(),
                snapshot.outcome(),
                Some(
                    self.overlay
                        .clone()
                        .unwrap_or_else(|| snapshot.payload().clone()),
                ),
            ),
            None => (PlayerSlot::Unassigned, Outcome::InProgress, None),
        };
        SessionView::new(
            self.phase,
            self.identity.username().to_string(),
            self.opponent.clone(),
            self.my_slot,
            turn_owner,
            outcome,
            payload,
            self.overlay.is_some(),
        )
    }

    /// Whether the runtime should keep a poll scheduled.
    pub fn polling_mode(&self) -> PollingMode {
        if self.gone.is_some() {
            return PollingMode::Off;
        }
        let on = match self.phase {
            Phase::Idle | Phase::Queued | Phase::TornDown => false,
            Phase::Matched | Phase::AwaitingOpponent => true,
            Phase::MyTurn => self.pending.is_some() || self.resync.is_some(),
            Phase::Resolved => self.game_type() == Some(GameType::TicTacToe),
        };
        if on { PollingMode::On } else { PollingMode::Off }
    }

    /// What the next poll should fetch.
    pub fn poll_target(&self) -> Option<PollTarget> {
        let assignment = self.assignment.as_ref()?;
        match assignment.game_type() {
            GameType::TicTacToe => Some(PollTarget::GameState {
                username: self.identity.username().to_string(),
            }),
            GameType::RockPaperScissors => Some(PollTarget::OpponentChoice {
                game_id: assignment.game_id().to_string(),
                opponent: self.opponent.clone()?,
            }),
        }
    }

    fn set_phase(&mut self, to: Phase, events: &mut Vec<SessionEvent>) {
        if self.phase == to {
            return;
        }
        let from = self.phase;
        self.phase = to;
        info!(username = %self.identity, %from, %to, "Phase changed");
        events.push(SessionEvent::PhaseChanged { from, to });
    }

    fn push_view(&self, events: &mut Vec<SessionEvent>) {
        events.push(SessionEvent::ViewUpdated(self.view()));
    }

    /// `Idle -> Queued`.
    #[instrument(skip(self), fields(username = %self.identity))]
    pub fn enter_queue(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.phase == Phase::Idle && self.assignment.is_none() {
            self.set_phase(Phase::Queued, &mut events);
        } else {
            debug!(phase = %self.phase, "enter_queue ignored");
        }
        events
    }

    /// `Queued -> Matched`.
    ///
    /// Rock-paper-scissors has no server-side turn, so the machine seeds a
    /// local round (this player in slot one) and moves straight to
    /// [`Phase::MyTurn`].
    #[instrument(skip(self, assignment), fields(username = %self.identity, game = %assignment.game_type()))]
    pub fn on_assignment(&mut self, assignment: MatchAssignment) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.phase != Phase::Queued {
            debug!(phase = %self.phase, "Assignment ignored");
            return events;
        }

        let me = self.identity.username().to_string();
        match assignment.opponent() {
            Some(name) => self.opponent = Some(name.to_string()),
            None => {
                warn!(default = %self.default_opponent, "Assignment names no opponent");
                self.opponent = Some(self.default_opponent.clone());
                self.opponent_defaulted = true;
            }
        }
        if let Some(slot) = assignment.participants().get(&me) {
            self.my_slot = *slot;
        }

        let game = assignment.game_type();
        self.assignment = Some(assignment);
        self.set_phase(Phase::Matched, &mut events);

        if game == GameType::RockPaperScissors {
            self.my_slot = PlayerSlot::One;
            let mut participants = BTreeMap::new();
            participants.insert(me, PlayerSlot::One);
            if let Some(opponent) = &self.opponent {
                participants.insert(opponent.clone(), PlayerSlot::Two);
            }
            self.latest = Some(GameSnapshot::new(
                PlayerSlot::One,
                Outcome::InProgress,
                participants,
                SnapshotPayload::empty(game),
            ));
            self.set_phase(Phase::MyTurn, &mut events);
        }
        self.push_view(&mut events);
        events
    }

    /// Applies one poll result. `seq` is the sequence number the poll was
    /// issued with; results older than the last applied one are dropped.
    #[instrument(skip(self, observation), fields(username = %self.identity, phase = %self.phase))]
    pub fn apply(&mut self, seq: u64, observation: Observation) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if matches!(self.phase, Phase::Idle | Phase::Queued | Phase::TornDown) {
            debug!(seq, "Observation outside a match ignored");
            return events;
        }
        if self.last_seq.is_some_and(|last| seq <= last) {
            warn!(seq, last = ?self.last_seq, "Stale observation discarded");
            return events;
        }
        self.last_seq = Some(seq);

        match observation {
            Observation::Snapshot(snapshot) => self.apply_snapshot(seq, snapshot, &mut events),
            Observation::OpponentChoice(choice) => self.apply_opponent_choice(choice, &mut events),
            Observation::Absent => self.apply_absent(),
            Observation::Unreadable(reason) => {
                debug!(seq, %reason, "No usable snapshot this cycle");
                self.note_cycle(false, &mut events);
            }
        }
        events
    }

    fn is_pre_fence(&self, seq: u64) -> bool {
        match self.pending.map(|p| p.stage) {
            Some(Stage::InFlight) => true,
            _ => seq < self.fence,
        }
    }

    fn apply_snapshot(&mut self, seq: u64, snapshot: GameSnapshot, events: &mut Vec<SessionEvent>) {
        if self.terminal.is_some() {
            debug!(seq, "Match already resolved, snapshot ignored");
            return;
        }
        if Some(snapshot.game_type()) != self.game_type() {
            warn!(seq, got = %snapshot.game_type(), "Snapshot for another game ignored");
            self.note_cycle(false, events);
            return;
        }
        if snapshot.outcome().is_terminal() {
            self.resolve(snapshot, events);
            return;
        }
        if self.is_pre_fence(seq) {
            debug!(seq, fence = self.fence, "Snapshot predates accepted move, ignored");
            return;
        }

        let me = self.identity.username();
        let slot = snapshot.slot_of(me);
        if slot.is_assigned() && slot != self.my_slot {
            info!(%slot, "Slot assigned");
            self.my_slot = slot;
        }
        if self.opponent.is_none() || self.opponent_defaulted {
            if let Some(name) = snapshot.opponent_of(me) {
                info!(opponent = %name, "Opponent learned from snapshot");
                self.opponent = Some(name.to_string());
                self.opponent_defaulted = false;
            }
        }

        if let Some(previous) = &self.latest {
            let flipped = previous.turn_owner().is_assigned()
                && snapshot.turn_owner().is_assigned()
                && previous.turn_owner() != snapshot.turn_owner();
            if flipped && previous.payload() == snapshot.payload() {
                warn!(
                    seq,
                    from = %previous.turn_owner(),
                    to = %snapshot.turn_owner(),
                    "Turn flipped without any piece moving, snapshot ignored"
                );
                self.note_cycle(false, events);
                return;
            }
        }

        let changed = self.latest.as_ref() != Some(&snapshot);
        if self.resync.is_some_and(|target| seq >= target) {
            debug!(seq, "Resynchronized with server");
            self.resync = None;
        }
        self.settle_pending(seq, &snapshot);
        self.latest = Some(snapshot);

        let next = self.turn_phase();
        self.set_phase(next, events);
        if changed {
            self.push_view(events);
        }
        self.note_cycle(changed, events);
    }

    /// Clears or ages an unconfirmed submission against a post-fence snapshot.
    fn settle_pending(&mut self, seq: u64, snapshot: &GameSnapshot) {
        let Some(Pending {
            mv,
            stage: Stage::Confirming { fence, remaining },
        }) = self.pending
        else {
            return;
        };
        let reflected = match (mv, snapshot.board()) {
            (PlayerMove::Place(location), Some(board)) => !board.is_empty_at(location),
            _ => false,
        };
        if reflected || snapshot.turn_owner() != self.my_slot {
            debug!(%mv, "Submission confirmed by snapshot");
            self.pending = None;
            self.overlay = None;
        } else if remaining <= 1 {
            warn!(%mv, "Accepted move never showed up, dropping optimistic state");
            self.pending = None;
            self.overlay = None;
            self.resync = Some(seq + 1);
        } else {
            self.pending = Some(Pending {
                mv,
                stage: Stage::Confirming {
                    fence,
                    remaining: remaining - 1,
                },
            });
        }
    }

    fn turn_phase(&self) -> Phase {
        match &self.latest {
            Some(snapshot) if self.my_slot.is_assigned() && snapshot.turn_owner() == self.my_slot => {
                Phase::MyTurn
            }
            Some(_) => Phase::AwaitingOpponent,
            None => Phase::Matched,
        }
    }

    fn resolve(&mut self, snapshot: GameSnapshot, events: &mut Vec<SessionEvent>) {
        let outcome = snapshot.outcome();
        let me = self.identity.username();
        let slot = snapshot.slot_of(me);
        if slot.is_assigned() {
            self.my_slot = slot;
        }
        self.latest = Some(snapshot);
        self.overlay = None;
        self.pending = None;
        self.resync = None;
        self.terminal = Some(outcome);
        self.unchanged_cycles = 0;

        let verdict = Verdict::of(outcome, self.my_slot);
        info!(?outcome, ?verdict, "Match resolved");
        self.set_phase(Phase::Resolved, events);
        self.push_view(events);
        events.push(SessionEvent::Resolved { outcome, verdict });
    }

    fn apply_opponent_choice(&mut self, choice: Option<Choice>, events: &mut Vec<SessionEvent>) {
        if self.terminal.is_some() || self.game_type() != Some(GameType::RockPaperScissors) {
            return;
        }
        let Some(choice) = choice else {
            self.note_cycle(false, events);
            return;
        };
        let Some(latest) = self.latest.clone() else {
            return;
        };
        let Some(round) = latest.round().copied() else {
            return;
        };
        let opponent_slot = self.my_slot.opponent();
        if round.choice_of(opponent_slot).is_some() {
            self.note_cycle(false, events);
            return;
        }

        debug!(%choice, "Opponent threw");
        let round = round.with_choice(opponent_slot, choice);
        let outcome = round.outcome();
        let snapshot = latest
            .with_payload(SnapshotPayload::RockPaperScissors(round))
            .with_outcome(outcome);
        if outcome.is_terminal() {
            self.resolve(snapshot, events);
        } else {
            self.latest = Some(snapshot);
            self.unchanged_cycles = 0;
        }
    }

    fn apply_absent(&mut self) {
        if self.gone.is_some() {
            return;
        }
        if self.terminal.is_some() {
            info!("Resolved match removed by server");
            self.gone = Some(TeardownReason::Gone);
        } else {
            warn!(
                phase = %self.phase,
                seen_snapshot = self.latest.is_some(),
                "Server removed a match that never resolved"
            );
            self.gone = Some(TeardownReason::GoneUnresolved);
            self.pending = None;
            self.resync = None;
            self.overlay = None;
        }
    }

    /// Counts a polling cycle and times out a session that waited too long.
    fn note_cycle(&mut self, changed: bool, events: &mut Vec<SessionEvent>) {
        if changed {
            self.unchanged_cycles = 0;
            return;
        }
        if !matches!(self.phase, Phase::Matched | Phase::AwaitingOpponent) {
            return;
        }
        self.unchanged_cycles += 1;
        if self.unchanged_cycles > self.wait_timeout_cycles {
            let cycles = self.unchanged_cycles;
            warn!(cycles, "Gave up waiting for the opponent");
            let error = self.timeout_error();
            self.pending = None;
            self.resync = None;
            self.overlay = None;
            self.set_phase(Phase::Idle, events);
            events.push(SessionEvent::TimedOut { cycles, error });
        }
    }

    /// Checks local preconditions and applies the optimistic update.
    ///
    /// `Err` means the move must not be sent. Nothing changes in that case.
    #[instrument(skip(self), fields(username = %self.identity, phase = %self.phase))]
    pub fn begin_submission(&mut self, mv: PlayerMove) -> Result<Vec<SessionEvent>, IgnoreReason> {
        let Some(game) = self.game_type() else {
            return Err(IgnoreReason::NotInMatch);
        };
        if self.terminal.is_some() || self.phase == Phase::Resolved {
            return Err(IgnoreReason::MatchOver);
        }
        if !matches!(self.phase, Phase::MyTurn | Phase::AwaitingOpponent | Phase::Matched) {
            return Err(IgnoreReason::NotInMatch);
        }
        if self.pending.is_some() {
            return Err(IgnoreReason::SubmissionPending);
        }
        let Some(latest) = &self.latest else {
            return Err(IgnoreReason::NotYourTurn);
        };
        if !self.my_slot.is_assigned() || latest.turn_owner() != self.my_slot {
            return Err(IgnoreReason::NotYourTurn);
        }

        let overlay = match (game, mv, latest.payload()) {
            (GameType::TicTacToe, PlayerMove::Place(location), SnapshotPayload::TicTacToe(board)) => {
                if !board.is_empty_at(location) {
                    return Err(IgnoreReason::CellTaken);
                }
                SnapshotPayload::TicTacToe(board.with_mark(location, self.my_slot))
            }
            (
                GameType::RockPaperScissors,
                PlayerMove::Throw(choice),
                SnapshotPayload::RockPaperScissors(round),
            ) => {
                if round.choice_of(self.my_slot).is_some() {
                    return Err(IgnoreReason::AlreadyChosen);
                }
                SnapshotPayload::RockPaperScissors(round.with_choice(self.my_slot, choice))
            }
            _ => return Err(IgnoreReason::WrongGame),
        };

        info!(%mv, "Submitting move");
        self.resync = None;
        self.overlay = Some(overlay);
        self.pending = Some(Pending {
            mv,
            stage: Stage::InFlight,
        });
        let mut events = Vec::new();
        self.push_view(&mut events);
        Ok(events)
    }

    /// Records how the in-flight submission ended.
    ///
    /// `fence` is the sequence number the next poll will carry; polls issued
    /// before it may still show the board without this move.
    #[instrument(skip(self, result), fields(username = %self.identity, ok = result.is_ok()))]
    pub fn finish_submission(
        &mut self,
        result: Result<(), ClientError>,
        fence: u64,
    ) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(Pending {
            mv,
            stage: Stage::InFlight,
        }) = self.pending
        else {
            debug!("No submission in flight");
            return events;
        };

        if let Err(e) = result {
            warn!(%mv, error = %e, "Submission failed, rolling back");
            // The server may have applied an earlier attempt; only a later
            // snapshot can tell.
            self.fence = self.fence.max(fence);
            self.resync = Some(fence);
            self.pending = None;
            self.overlay = None;
            self.push_view(&mut events);
            events.push(SessionEvent::SubmissionRejected(e));
            return events;
        }

        self.fence = self.fence.max(fence);
        match mv {
            PlayerMove::Throw(choice) => {
                let Some(latest) = self.latest.clone() else {
                    return events;
                };
                let round = latest
                    .round()
                    .copied()
                    .unwrap_or_else(RpsRound::new)
                    .with_choice(self.my_slot, choice);
                let outcome = round.outcome();
                let snapshot = latest
                    .with_payload(SnapshotPayload::RockPaperScissors(round))
                    .with_turn_owner(self.my_slot.opponent())
                    .with_outcome(outcome);
                self.pending = None;
                self.overlay = None;
                if outcome.is_terminal() {
                    self.resolve(snapshot, &mut events);
                } else {
                    self.latest = Some(snapshot);
                    self.unchanged_cycles = 0;
                    self.set_phase(Phase::AwaitingOpponent, &mut events);
                    self.push_view(&mut events);
                }
            }
            PlayerMove::Place(_) if self.confirm_polls == 0 => {
                self.pending = None;
                self.overlay = None;
                self.push_view(&mut events);
            }
            PlayerMove::Place(_) => {
                self.pending = Some(Pending {
                    mv,
                    stage: Stage::Confirming {
                        fence,
                        remaining: self.confirm_polls,
                    },
                });
            }
        }
        events
    }

    /// Discards the session. Idempotent.
    #[instrument(skip(self), fields(username = %self.identity))]
    pub fn tear_down(&mut self, reason: TeardownReason) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.phase == Phase::TornDown {
            return events;
        }
        self.pending = None;
        self.resync = None;
        self.overlay = None;
        self.set_phase(Phase::TornDown, &mut events);
        info!(%reason, "Session torn down");
        events.push(SessionEvent::TornDown { reason });
        events
    }

    fn timeout_error(&self) -> ClientError {
        ClientError::new(ClientErrorKind::OpponentTimeout {
            cycles: self.unchanged_cycles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onevoneme_games::{Board, Cell};

    fn config() -> ClientConfig {
        ClientConfig::default()
    }

    fn machine() -> SessionMachine {
        SessionMachine::new(PlayerIdentity::parse("alice").unwrap(), &config())
    }

    fn ttt_assignment() -> MatchAssignment {
        MatchAssignment::new(GameType::TicTacToe, Some("bob".to_string()))
    }

    fn matched_ttt() -> SessionMachine {
        let mut m = machine();
        m.enter_queue();
        m.on_assignment(ttt_assignment());
        m
    }

    fn snapshot(turn: PlayerSlot, outcome: Outcome, board: Board) -> Observation {
        let mut participants = BTreeMap::new();
        participants.insert("alice".to_string(), PlayerSlot::One);
        participants.insert("bob".to_string(), PlayerSlot::Two);
        Observation::Snapshot(GameSnapshot::new(
            turn,
            outcome,
            participants,
            SnapshotPayload::TicTacToe(board),
        ))
    }

    fn at(row: u8, col: u8) -> Location {
        Location::new(row, col).unwrap()
    }

    #[test]
    fn queue_then_match() {
        let mut m = machine();
        assert_eq!(m.phase(), Phase::Idle);
        m.enter_queue();
        assert_eq!(m.phase(), Phase::Queued);
        m.on_assignment(ttt_assignment());
        assert_eq!(m.phase(), Phase::Matched);
        assert_eq!(m.opponent(), Some("bob"));
        assert_eq!(m.polling_mode(), PollingMode::On);
    }

    #[test]
    fn missing_opponent_falls_back_to_default_then_snapshot() {
        let mut m = machine();
        m.enter_queue();
        m.on_assignment(MatchAssignment::new(GameType::TicTacToe, None));
        assert_eq!(m.opponent(), Some("opponent"));
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert_eq!(m.opponent(), Some("bob"));
    }

    #[test]
    fn unassigned_slot_never_matches_turn() {
        let mut m = matched_ttt();
        let obs = Observation::Snapshot(GameSnapshot::new(
            PlayerSlot::Unassigned,
            Outcome::InProgress,
            BTreeMap::new(),
            SnapshotPayload::TicTacToe(Board::new()),
        ));
        m.apply(1, obs);
        assert_eq!(m.my_slot(), PlayerSlot::Unassigned);
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
    }

    #[test]
    fn my_turn_suspends_polling() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert_eq!(m.phase(), Phase::MyTurn);
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }

    #[test]
    fn turn_flip_without_moves_is_ignored() {
        let mut m = matched_ttt();
        let board = Board::new().with_mark(at(1, 1), PlayerSlot::Two);
        m.apply(1, snapshot(PlayerSlot::Two, Outcome::InProgress, board.clone()));
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
        m.apply(2, snapshot(PlayerSlot::One, Outcome::InProgress, board));
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
    }

    #[test]
    fn older_observation_is_discarded() {
        let mut m = matched_ttt();
        m.apply(5, snapshot(PlayerSlot::Two, Outcome::InProgress, Board::new()));
        let events = m.apply(4, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert!(events.is_empty());
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
    }

    #[test]
    fn preconditions_are_checked_locally() {
        let mut m = matched_ttt();
        assert_eq!(
            m.begin_submission(PlayerMove::Place(at(0, 0))).unwrap_err(),
            IgnoreReason::NotYourTurn
        );
        let board = Board::new().with_mark(at(1, 1), PlayerSlot::Two);
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, board));
        assert_eq!(
            m.begin_submission(PlayerMove::Place(at(1, 1))).unwrap_err(),
            IgnoreReason::CellTaken
        );
        assert_eq!(
            m.begin_submission(PlayerMove::Throw(Choice::Rock)).unwrap_err(),
            IgnoreReason::WrongGame
        );
        assert!(m.begin_submission(PlayerMove::Place(at(0, 0))).is_ok());
        assert_eq!(
            m.begin_submission(PlayerMove::Place(at(2, 2))).unwrap_err(),
            IgnoreReason::SubmissionPending
        );
    }

    #[test]
    fn rejected_submission_rolls_back() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        m.begin_submission(PlayerMove::Place(at(0, 0))).unwrap();
        assert!(*m.view().optimistic());
        assert_eq!(
            m.view().board().unwrap().get(at(0, 0)),
            Cell::Taken(PlayerSlot::One)
        );

        let err = ClientError::new(ClientErrorKind::Rejected {
            status: 400,
            body: "occupied".to_string(),
        });
        let events = m.finish_submission(Err(err), 2);
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::SubmissionRejected(_))));
        assert!(!*m.view().optimistic());
        assert!(m.view().board().unwrap().is_empty_at(at(0, 0)));
        assert_eq!(m.phase(), Phase::MyTurn);
    }

    #[test]
    fn pre_fence_snapshot_does_not_clear_overlay() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        m.begin_submission(PlayerMove::Place(at(0, 0))).unwrap();
        m.apply(2, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert!(*m.view().optimistic());

        // Poll 3 left before the move was accepted; poll 4 is the first after.
        m.finish_submission(Ok(()), 4);
        m.apply(3, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert!(*m.view().optimistic());
        assert_eq!(m.phase(), Phase::MyTurn);

        let board = Board::new().with_mark(at(0, 0), PlayerSlot::One);
        m.apply(4, snapshot(PlayerSlot::Two, Outcome::InProgress, board));
        assert!(!*m.view().optimistic());
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
        assert_eq!(
            m.view().board().unwrap().get(at(0, 0)),
            Cell::Taken(PlayerSlot::One)
        );
    }

    #[test]
    fn terminal_outcome_is_monotonic() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::Draw, Board::new()));
        assert_eq!(m.phase(), Phase::Resolved);
        m.apply(2, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert_eq!(m.phase(), Phase::Resolved);
        assert_eq!(m.view().outcome(), &Outcome::Draw);
        assert_eq!(m.view().status_text(), "Draw");
    }

    #[test]
    fn absence_before_first_snapshot_is_anomaly() {
        let mut m = matched_ttt();
        let events = m.apply(1, Observation::Absent);
        assert!(events.is_empty());
        assert_eq!(m.gone(), Some(TeardownReason::GoneUnresolved));
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }

    #[test]
    fn rejection_keeps_polling_until_server_answers() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        m.begin_submission(PlayerMove::Place(at(0, 0))).unwrap();
        let err = ClientError::new(ClientErrorKind::Rejected {
            status: 400,
            body: "unsuccessful".to_string(),
        });
        m.finish_submission(Err(err), 3);
        assert_eq!(m.phase(), Phase::MyTurn);
        assert_eq!(m.polling_mode(), PollingMode::On);

        // Issued before the rejection came back.
        m.apply(2, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert_eq!(m.polling_mode(), PollingMode::On);

        let board = Board::new().with_mark(at(0, 0), PlayerSlot::One);
        m.apply(3, snapshot(PlayerSlot::Two, Outcome::InProgress, board));
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
        assert_eq!(
            m.view().board().unwrap().get(at(0, 0)),
            Cell::Taken(PlayerSlot::One)
        );
    }

    #[test]
    fn rejection_settles_once_server_still_gives_the_turn() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        m.begin_submission(PlayerMove::Place(at(0, 0))).unwrap();
        let err = ClientError::new(ClientErrorKind::Rejected {
            status: 400,
            body: "occupied".to_string(),
        });
        m.finish_submission(Err(err), 2);
        m.apply(2, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        assert_eq!(m.phase(), Phase::MyTurn);
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }

    #[test]
    fn unconfirmed_move_gets_one_more_look() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        m.begin_submission(PlayerMove::Place(at(0, 0))).unwrap();
        m.finish_submission(Ok(()), 2);

        let polls = *config().confirm_polls() as u64;
        for seq in 2..2 + polls {
            m.apply(seq, snapshot(PlayerSlot::One, Outcome::InProgress, Board::new()));
        }
        assert!(!*m.view().optimistic());
        assert_eq!(m.phase(), Phase::MyTurn);
        assert_eq!(m.polling_mode(), PollingMode::On);

        let board = Board::new().with_mark(at(0, 0), PlayerSlot::One);
        m.apply(2 + polls, snapshot(PlayerSlot::Two, Outcome::InProgress, board));
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
    }

    #[test]
    fn absence_of_unresolved_match_is_anomaly() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::Two, Outcome::InProgress, Board::new()));
        m.apply(2, Observation::Absent);
        assert_eq!(m.gone(), Some(TeardownReason::GoneUnresolved));
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }

    #[test]
    fn waiting_too_long_goes_idle() {
        let mut m = matched_ttt();
        m.apply(1, snapshot(PlayerSlot::Two, Outcome::InProgress, Board::new()));
        let limit = *config().wait_timeout_cycles() as u64;
        for seq in 2..=limit + 1 {
            m.apply(seq, snapshot(PlayerSlot::Two, Outcome::InProgress, Board::new()));
            assert_eq!(m.phase(), Phase::AwaitingOpponent, "seq {seq}");
        }
        let events = m.apply(
            limit + 2,
            snapshot(PlayerSlot::Two, Outcome::InProgress, Board::new()),
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, SessionEvent::TimedOut { .. })));
        assert_eq!(m.phase(), Phase::Idle);
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }

    #[test]
    fn rps_round_resolves_locally() {
        let mut m = machine();
        m.enter_queue();
        m.on_assignment(MatchAssignment::new(
            GameType::RockPaperScissors,
            Some("bob".to_string()),
        ));
        assert_eq!(m.phase(), Phase::MyTurn);
        assert_eq!(
            m.poll_target(),
            Some(PollTarget::OpponentChoice {
                game_id: "rock_paper_scissors".to_string(),
                opponent: "bob".to_string()
            })
        );

        m.begin_submission(PlayerMove::Throw(Choice::Paper)).unwrap();
        m.finish_submission(Ok(()), 1);
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
        assert_eq!(
            m.begin_submission(PlayerMove::Throw(Choice::Rock)).unwrap_err(),
            IgnoreReason::NotYourTurn
        );

        m.apply(1, Observation::OpponentChoice(None));
        assert_eq!(m.phase(), Phase::AwaitingOpponent);
        m.apply(2, Observation::OpponentChoice(Some(Choice::Paper)));
        assert_eq!(m.phase(), Phase::Resolved);
        assert_eq!(m.terminal_outcome(), Some(Outcome::Draw));
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }

    #[test]
    fn tear_down_is_idempotent() {
        let mut m = matched_ttt();
        assert_eq!(m.tear_down(TeardownReason::Shutdown).len(), 2);
        assert!(m.tear_down(TeardownReason::Shutdown).is_empty());
        assert_eq!(m.polling_mode(), PollingMode::Off);
    }
}
