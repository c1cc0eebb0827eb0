//! Snapshot polling: cadence and response normalization.

use crate::api::GameApi;
use crate::config::ClientConfig;
use crate::machine::{Observation, PollTarget};
use onevoneme_games::{parse_opponent_choice, parse_snapshot, GameType, OpponentMove, SnapshotBody};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// When the next poll is due.
///
/// Holds at most one deadline; the runtime keeps at most one poll in
/// flight and asks the schedule for the next deadline once it returns.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    burst_spacing: Duration,
    burst_polls: u32,
    burst_remaining: u32,
    /// A burst was requested and its first poll has not started yet.
    burst_due: bool,
    next_at: Option<Instant>,
}

impl PollSchedule {
    /// Creates a suspended schedule.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            burst_spacing: config.burst_spacing(),
            burst_polls: *config.burst_polls(),
            burst_remaining: 0,
            burst_due: false,
            next_at: None,
        }
    }

    /// Deadline of the next poll, `None` while suspended.
    pub fn next_at(&self) -> Option<Instant> {
        self.next_at
    }

    /// True when a poll is scheduled.
    pub fn is_active(&self) -> bool {
        self.next_at.is_some()
    }

    /// Polls left in the current burst.
    pub fn burst_remaining(&self) -> u32 {
        self.burst_remaining
    }

    /// Schedules a poll right away unless one is already scheduled.
    pub fn resume(&mut self, now: Instant) {
        if self.next_at.is_none() {
            self.next_at = Some(now);
        }
    }

    /// Drops the pending deadline and any burst.
    pub fn suspend(&mut self) {
        self.next_at = None;
        self.burst_remaining = 0;
        self.burst_due = false;
    }

    /// Polls now, then `burst_polls - 1` more at burst spacing before
    /// returning to the regular interval.
    #[instrument(skip(self))]
    pub fn request_burst(&mut self, now: Instant) {
        if self.burst_polls == 0 {
            self.resume(now);
            return;
        }
        self.burst_remaining = self.burst_polls - 1;
        self.burst_due = true;
        self.next_at = Some(now);
        debug!(remaining = self.burst_remaining, "Burst polling requested");
    }

    /// Records that a poll was issued.
    pub fn poll_started(&mut self) {
        self.burst_due = false;
    }

    /// Schedules the poll after the one that just completed.
    ///
    /// A poll that was already in flight when a burst was requested does
    /// not count toward it; the burst still starts right away.
    pub fn after_poll(&mut self, now: Instant) {
        if self.burst_due {
            self.next_at = Some(now);
            return;
        }
        let delay = if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            self.burst_spacing
        } else {
            self.interval
        };
        self.next_at = Some(now + delay);
    }
}

/// Fetches `target` once and normalizes the answer.
///
/// Never fails: transport errors, error statuses and unusable bodies all
/// become [`Observation::Unreadable`].
#[instrument(skip(api))]
pub async fn fetch_observation(api: &dyn GameApi, target: &PollTarget, game: GameType) -> Observation {
    match target {
        PollTarget::GameState { username } => match api.fetch_snapshot(username).await {
            Err(e) => Observation::Unreadable(e.to_string()),
            Ok(response) if !response.is_success() => {
                Observation::Unreadable(format!("HTTP {}", response.status))
            }
            Ok(response) => match parse_snapshot(&response.body, game) {
                SnapshotBody::Absent => Observation::Absent,
                SnapshotBody::Unreadable(reason) => Observation::Unreadable(reason),
                SnapshotBody::Present(snapshot) => Observation::Snapshot(snapshot),
            },
        },
        PollTarget::OpponentChoice { game_id, opponent } => {
            match api.fetch_opponent_choice(game_id, opponent).await {
                Err(e) => Observation::Unreadable(e.to_string()),
                Ok(response) if !response.is_success() => {
                    Observation::Unreadable(format!("HTTP {}", response.status))
                }
                Ok(response) => match parse_opponent_choice(&response.body) {
                    OpponentMove::NotYet => Observation::OpponentChoice(None),
                    OpponentMove::Chosen(choice) => Observation::OpponentChoice(Some(choice)),
                    OpponentMove::Unreadable => {
                        Observation::Unreadable("unreadable opponent move".to_string())
                    }
                },
            }
        }
    }
}
